//! HTTP(S) retrieval of exposition data.
use std::error::Error as StdError;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use http_body_util::{BodyExt, Collected, Empty};
use hyper::body::Bytes;
use hyper::header::{HeaderValue, ACCEPT, CONTENT_TYPE};
use hyper::{Method, Request, StatusCode, Uri};
use hyper_rustls::HttpsConnector;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::{client::legacy::Client, rt::TokioExecutor};
use log::{debug, warn};
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::{aws_lc_rs, verify_tls12_signature, verify_tls13_signature, CryptoProvider};
use rustls::pki_types::pem::PemObject;
use rustls::pki_types::{CertificateDer, PrivateKeyDer, ServerName, UnixTime};
use rustls::{ClientConfig, DigitallySignedStruct, RootCertStore, SignatureScheme};
use thiserror::Error as ThisError;

use crate::decode::Format;
use crate::source::{ClientCredential, TlsOptions};

/// Accept header sent with every request: delimited protobuf preferred, text as fallback.
pub const ACCEPT_HEADER: &str = "application/vnd.google.protobuf;proto=io.prometheus.client.MetricFamily;encoding=delimited;q=0.7,text/plain;version=0.0.4;q=0.3";

const PROTOBUF_MEDIA_TYPE: &str = "application/vnd.google.protobuf";
const PROTOBUF_PROTO: &str = "io.prometheus.client.MetricFamily";
const PROTOBUF_ENCODING: &str = "delimited";

/// Errors that could occur while fetching metrics over HTTP(S).
#[derive(Debug, ThisError)]
pub enum FetchError {
    /// The address is not a valid URI.
    #[error("invalid URL {url:?}: {reason}")]
    InvalidUrl {
        /// Offending address.
        url: String,
        /// Parser message.
        reason: String,
    },

    /// The client certificate or key could not be loaded.
    #[error("loading client credential from {path:?} failed: {reason}")]
    Credential {
        /// File that failed to load.
        path: PathBuf,
        /// What went wrong.
        reason: String,
    },

    /// The TLS configuration was rejected.
    #[error("invalid TLS configuration: {0}")]
    Tls(#[from] rustls::Error),

    /// The request could not be sent or the connection failed.
    #[error("executing GET request for URL {url:?} failed: {reason}")]
    Request {
        /// Requested address.
        url: String,
        /// Flattened error chain of the transport.
        reason: String,
    },

    /// The server answered with something other than `200 OK`.
    #[error("GET request for URL {url:?} returned HTTP status {status}")]
    Status {
        /// Requested address.
        url: String,
        /// Returned status.
        status: StatusCode,
    },

    /// The response body could not be read.
    #[error("reading response body from URL {url:?} failed: {reason}")]
    Body {
        /// Requested address.
        url: String,
        /// Flattened error chain.
        reason: String,
    },

    /// The exchange did not complete in time.
    #[error("GET request for URL {url:?} timed out after {timeout:?}")]
    Timeout {
        /// Requested address.
        url: String,
        /// Configured limit.
        timeout: Duration,
    },
}

/// A fully read response body together with its wire format.
#[derive(Clone, Debug)]
pub struct Payload {
    /// Format negotiated from the `Content-Type` header.
    pub format: Format,
    /// Raw body.
    pub body: Bytes,
}

/// HTTP(S) client configured for a single source.
pub struct Fetcher {
    client: Client<HttpsConnector<HttpConnector>, Empty<Bytes>>,
    timeout: Option<Duration>,
}

impl Fetcher {
    /// Creates a fetcher using the given TLS options.
    ///
    /// `timeout` bounds the whole exchange, from connecting to reading the last body byte. `None`
    /// leaves timing to the transport.
    ///
    /// ## Errors
    ///
    /// Fails if the client credential cannot be loaded or is rejected by rustls.
    pub fn new(tls: &TlsOptions, timeout: Option<Duration>) -> Result<Self, FetchError> {
        let config = client_config(tls)?;
        let https = hyper_rustls::HttpsConnectorBuilder::new()
            .with_tls_config(config)
            .https_or_http()
            .enable_http1()
            .build();
        let client = Client::builder(TokioExecutor::new()).build(https);

        Ok(Self { client, timeout })
    }

    /// Fetches `address` and buffers the body.
    ///
    /// ## Errors
    ///
    /// Fails on an invalid address, transport or TLS errors, a status other than `200 OK`, or an
    /// expired timeout.
    pub async fn fetch(&self, address: &str) -> Result<Payload, FetchError> {
        let uri = address.parse::<Uri>().map_err(|e| FetchError::InvalidUrl {
            url: address.to_owned(),
            reason: e.to_string(),
        })?;

        match self.timeout {
            Some(timeout) => tokio::time::timeout(timeout, self.exchange(address, uri))
                .await
                .map_err(|_| FetchError::Timeout { url: address.to_owned(), timeout })?,
            None => self.exchange(address, uri).await,
        }
    }

    async fn exchange(&self, address: &str, uri: Uri) -> Result<Payload, FetchError> {
        let request = Request::builder()
            .method(Method::GET)
            .uri(uri)
            .header(ACCEPT, ACCEPT_HEADER)
            .body(Empty::<Bytes>::new())
            .map_err(|e| FetchError::InvalidUrl { url: address.to_owned(), reason: e.to_string() })?;

        debug!("sending GET request to {address}");
        let response = self.client.request(request).await.map_err(|e| FetchError::Request {
            url: address.to_owned(),
            reason: error_chain(&e),
        })?;

        let status = response.status();
        if status != StatusCode::OK {
            return Err(FetchError::Status { url: address.to_owned(), status });
        }

        let format = negotiate(response.headers().get(CONTENT_TYPE));
        debug!("response from {address} is in {format:?} format");

        let body = response
            .into_body()
            .collect()
            .await
            .map(Collected::to_bytes)
            .map_err(|e| FetchError::Body { url: address.to_owned(), reason: error_chain(&e) })?;

        Ok(Payload { format, body })
    }
}

/// Picks the decoder for a response based on its `Content-Type`.
///
/// Only `application/vnd.google.protobuf` with `proto=io.prometheus.client.MetricFamily` and
/// `encoding=delimited` is decoded as protobuf; anything else, including a missing or unparsable
/// header, falls back to the text format.
pub fn negotiate(content_type: Option<&HeaderValue>) -> Format {
    let Some(mime) = content_type
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.parse::<mime::Mime>().ok())
    else {
        return Format::Text;
    };

    let is_protobuf = mime.essence_str() == PROTOBUF_MEDIA_TYPE
        && mime.get_param("proto").is_some_and(|proto| proto.as_str() == PROTOBUF_PROTO)
        && mime.get_param("encoding").is_some_and(|enc| enc.as_str() == PROTOBUF_ENCODING);
    if is_protobuf {
        Format::Protobuf
    } else {
        Format::Text
    }
}

fn client_config(tls: &TlsOptions) -> Result<ClientConfig, FetchError> {
    let provider = Arc::new(aws_lc_rs::default_provider());
    let builder = ClientConfig::builder_with_provider(provider.clone())
        .with_safe_default_protocol_versions()?;

    let builder = if tls.accept_invalid_cert {
        warn!("server certificate verification is disabled");
        builder
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(AcceptAnyServerCert { provider }))
    } else {
        builder.with_root_certificates(native_roots())
    };

    match &tls.credential {
        Some(credential) => {
            let (chain, key) = load_credential(credential)?;
            Ok(builder.with_client_auth_cert(chain, key)?)
        }
        None => Ok(builder.with_no_client_auth()),
    }
}

fn native_roots() -> RootCertStore {
    let result = rustls_native_certs::load_native_certs();
    for error in &result.errors {
        warn!("error loading native root certificate: {error}");
    }

    let mut roots = RootCertStore::empty();
    let (added, ignored) = roots.add_parsable_certificates(result.certs);
    debug!("loaded {added} native root certificates, ignored {ignored}");
    if added == 0 {
        warn!("no native root CA certificates found, https requests will fail verification");
    }
    roots
}

fn load_credential(
    credential: &ClientCredential,
) -> Result<(Vec<CertificateDer<'static>>, PrivateKeyDer<'static>), FetchError> {
    let chain = CertificateDer::pem_file_iter(&credential.cert)
        .and_then(|certs| certs.collect::<Result<Vec<_>, _>>())
        .map_err(|e| credential_error(&credential.cert, e))?;
    if chain.is_empty() {
        return Err(credential_error(&credential.cert, "no certificates found"));
    }

    let key =
        PrivateKeyDer::from_pem_file(&credential.key).map_err(|e| credential_error(&credential.key, e))?;

    Ok((chain, key))
}

fn credential_error(path: &Path, reason: impl ToString) -> FetchError {
    FetchError::Credential { path: path.to_path_buf(), reason: reason.to_string() }
}

/// Joins an error and its sources into one line.
fn error_chain(error: &(dyn StdError + 'static)) -> String {
    let mut message = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

/// Verifier backing `--accept-invalid-cert`: any server certificate is trusted, but handshake
/// signatures are still checked so the session keys stay bound to the presented certificate.
#[derive(Debug)]
struct AcceptAnyServerCert {
    provider: Arc<CryptoProvider>,
}

impl ServerCertVerifier for AcceptAnyServerCert {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls12_signature(message, cert, dss, &self.provider.signature_verification_algorithms)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls13_signature(message, cert, dss, &self.provider.signature_verification_algorithms)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.provider.signature_verification_algorithms.supported_schemes()
    }
}
