use std::fs;
use std::io::{Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use rcgen::{
    BasicConstraints, Certificate, CertificateParams, ExtendedKeyUsagePurpose, IsCa, KeyPair,
};
use rustls::crypto::aws_lc_rs;
use rustls::pki_types::{PrivateKeyDer, PrivatePkcs8KeyDer};
use rustls::server::WebPkiClientVerifier;
use rustls::{RootCertStore, ServerConfig, ServerConnection, StreamOwned};

use prom2json::fetch::FetchError;
use prom2json::source::ClientCredential;
use prom2json::{convert, Acquisition, Error, Family, Source, TlsOptions};

const BODY: &str = "# TYPE up gauge\nup 1\n";

struct Authority {
    cert: Certificate,
    key: KeyPair,
}

fn authority() -> Authority {
    let key = KeyPair::generate().unwrap_or_else(|e| panic!("failed to generate CA key: {e:?}"));
    let mut params = CertificateParams::new(Vec::<String>::new())
        .unwrap_or_else(|e| panic!("invalid CA parameters: {e:?}"));
    params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
    let cert = params.self_signed(&key).unwrap_or_else(|e| panic!("failed to sign CA: {e:?}"));
    Authority { cert, key }
}

fn leaf(
    authority: &Authority,
    name: &str,
    purpose: ExtendedKeyUsagePurpose,
) -> (Certificate, KeyPair) {
    let key = KeyPair::generate().unwrap_or_else(|e| panic!("failed to generate key: {e:?}"));
    let mut params = CertificateParams::new(vec![name.to_string()])
        .unwrap_or_else(|e| panic!("invalid certificate parameters: {e:?}"));
    params.extended_key_usages = vec![purpose];
    let cert = params
        .signed_by(&key, &authority.cert, &authority.key)
        .unwrap_or_else(|e| panic!("failed to sign certificate: {e:?}"));
    (cert, key)
}

/// Builds a server config for `localhost`, optionally requiring client certificates issued by
/// `client_ca`.
fn server_config(server_ca: &Authority, client_ca: Option<&Authority>) -> Arc<ServerConfig> {
    let provider = Arc::new(aws_lc_rs::default_provider());
    let builder = ServerConfig::builder_with_provider(provider.clone())
        .with_safe_default_protocol_versions()
        .unwrap_or_else(|e| panic!("unsupported protocol versions: {e:?}"));

    let builder = match client_ca {
        Some(client_ca) => {
            let mut roots = RootCertStore::empty();
            roots
                .add(client_ca.cert.der().clone())
                .unwrap_or_else(|e| panic!("invalid client CA: {e:?}"));
            let verifier = WebPkiClientVerifier::builder_with_provider(Arc::new(roots), provider)
                .build()
                .unwrap_or_else(|e| panic!("failed to build client verifier: {e:?}"));
            builder.with_client_cert_verifier(verifier)
        }
        None => builder.with_no_client_auth(),
    };

    let (cert, key) = leaf(server_ca, "localhost", ExtendedKeyUsagePurpose::ServerAuth);
    let key = PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(key.serialize_der()));
    let config = builder
        .with_single_cert(vec![cert.der().clone(), server_ca.cert.der().clone()], key)
        .unwrap_or_else(|e| panic!("invalid server certificate: {e:?}"));
    Arc::new(config)
}

fn handle(config: Arc<ServerConfig>, stream: TcpStream) {
    let Ok(connection) = ServerConnection::new(config) else {
        return;
    };
    let mut tls = StreamOwned::new(connection, stream);

    let mut request = Vec::new();
    let mut chunk = [0u8; 1024];
    while !request.windows(4).any(|window| window == b"\r\n\r\n") {
        match tls.read(&mut chunk) {
            Ok(0) | Err(_) => return,
            Ok(n) => request.extend_from_slice(&chunk[..n]),
        }
    }

    let response = format!(
        "HTTP/1.1 200 OK\r\nContent-Type: text/plain; version=0.0.4\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{BODY}",
        BODY.len()
    );
    let _ = tls.write_all(response.as_bytes());
    tls.conn.send_close_notify();
    let _ = tls.flush();
}

/// Starts an HTTPS server on a random local port, one thread per connection.
fn serve(config: Arc<ServerConfig>) -> SocketAddr {
    let listener = TcpListener::bind(SocketAddr::from(([127, 0, 0, 1], 0)))
        .unwrap_or_else(|e| panic!("Unable to bind to an available port: {:?}", e));
    let address = listener
        .local_addr()
        .unwrap_or_else(|e| panic!("Unable to obtain local address from TcpListener: {:?}", e));

    thread::spawn(move || {
        for stream in listener.incoming().flatten() {
            let config = config.clone();
            thread::spawn(move || handle(config, stream));
        }
    });

    address
}

fn fetch(address: SocketAddr, tls: TlsOptions) -> Result<Vec<Family>, Error> {
    let source = Source::Url { address: format!("https://{address}/metrics"), tls };
    convert(Acquisition::new(source).with_timeout(Some(Duration::from_secs(10))))
}

fn write_credential(name: &str, cert: &Certificate, key: &KeyPair) -> ClientCredential {
    let dir = std::env::temp_dir().join(format!("prom2json-tls-{}-{name}", std::process::id()));
    fs::create_dir_all(&dir).unwrap_or_else(|e| panic!("failed to create {dir:?}: {e:?}"));

    let credential = ClientCredential { cert: dir.join("client.pem"), key: dir.join("client.key") };
    fs::write(&credential.cert, cert.pem())
        .unwrap_or_else(|e| panic!("failed to write certificate: {e:?}"));
    fs::write(&credential.key, key.serialize_pem())
        .unwrap_or_else(|e| panic!("failed to write key: {e:?}"));
    credential
}

fn remove_credential(credential: &ClientCredential) {
    if let Some(dir) = credential.cert.parent().map(PathBuf::from) {
        let _ = fs::remove_dir_all(dir);
    }
}

fn assert_single_gauge(families: &[Family]) {
    assert_eq!(families.len(), 1);
    assert_eq!(families[0].name, "up");
    assert_eq!(families[0].kind, "GAUGE");
}

#[test]
fn test_untrusted_server_is_rejected() {
    let server_ca = authority();
    let address = serve(server_config(&server_ca, None));

    match fetch(address, TlsOptions::default()) {
        Err(Error::Fetch(FetchError::Request { .. })) => {}
        other => panic!("unexpected result: {other:?}"),
    }
}

#[test]
fn test_accept_invalid_cert() {
    let server_ca = authority();
    let address = serve(server_config(&server_ca, None));

    let tls = TlsOptions { credential: None, accept_invalid_cert: true };
    let families = fetch(address, tls).unwrap();
    assert_single_gauge(&families);
}

#[test]
fn test_client_certificate() {
    let server_ca = authority();
    let client_ca = authority();
    let address = serve(server_config(&server_ca, Some(&client_ca)));

    let (cert, key) = leaf(&client_ca, "prom2json-client", ExtendedKeyUsagePurpose::ClientAuth);
    let credential = write_credential("mutual", &cert, &key);
    let tls = TlsOptions { credential: Some(credential.clone()), accept_invalid_cert: true };
    let result = fetch(address, tls);
    remove_credential(&credential);

    assert_single_gauge(&result.unwrap());
}

#[test]
fn test_missing_client_certificate_is_rejected() {
    let server_ca = authority();
    let client_ca = authority();
    let address = serve(server_config(&server_ca, Some(&client_ca)));

    let tls = TlsOptions { credential: None, accept_invalid_cert: true };
    match fetch(address, tls) {
        Err(Error::Fetch(FetchError::Request { .. } | FetchError::Body { .. })) => {}
        other => panic!("unexpected result: {other:?}"),
    }
}

#[test]
fn test_client_certificate_from_unknown_issuer_is_rejected() {
    let server_ca = authority();
    let client_ca = authority();
    let other_ca = authority();
    let address = serve(server_config(&server_ca, Some(&client_ca)));

    let (cert, key) = leaf(&other_ca, "prom2json-client", ExtendedKeyUsagePurpose::ClientAuth);
    let credential = write_credential("unknown-issuer", &cert, &key);
    let tls = TlsOptions { credential: Some(credential.clone()), accept_invalid_cert: true };
    let result = fetch(address, tls);
    remove_credential(&credential);

    match result {
        Err(Error::Fetch(FetchError::Request { .. } | FetchError::Body { .. })) => {}
        other => panic!("unexpected result: {other:?}"),
    }
}
