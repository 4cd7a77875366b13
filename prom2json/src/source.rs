//! Resolution of command line input into exactly one metrics source.
use std::fmt;
use std::path::PathBuf;

use thiserror::Error as ThisError;
use url::Url;

/// Where the exposition data is read from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Source {
    /// A local file.
    File {
        /// Path of the file.
        path: PathBuf,
    },
    /// An HTTP(S) endpoint.
    Url {
        /// Address to fetch.
        address: String,
        /// TLS settings used when the address is `https`.
        tls: TlsOptions,
    },
    /// The standard input of the process.
    Stdin,
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Source::File { path } => write!(f, "file {}", path.display()),
            Source::Url { address, .. } => write!(f, "url {address}"),
            Source::Stdin => f.write_str("standard input"),
        }
    }
}

/// TLS settings for a URL source.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TlsOptions {
    /// Client certificate presented during the handshake.
    pub credential: Option<ClientCredential>,
    /// Skips verification of the server certificate. Insecure, use only for testing.
    pub accept_invalid_cert: bool,
}

/// PEM encoded client certificate chain and private key.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClientCredential {
    /// Certificate chain file.
    pub cert: PathBuf,
    /// Private key file.
    pub key: PathBuf,
}

/// Errors caused by invalid command line usage.
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
pub enum UsageError {
    /// More than one positional argument was given.
    #[error("too many arguments: expected at most one METRICS_PATH or METRICS_URL, got {0}")]
    TooManyArguments(usize),

    /// More than one source was selected.
    #[error("ambiguous source: {} are mutually exclusive", .0.join(", "))]
    AmbiguousSource(Vec<&'static str>),

    /// Only one of `--cert` and `--key` was given.
    #[error("TLS client authentication needs both --cert and --key")]
    AsymmetricCredential,

    /// An explicit source flag was given an empty value.
    #[error("{0} needs a non-empty value")]
    EmptyValue(&'static str),

    /// The option parser rejected the arguments.
    #[error("{0}")]
    InvalidOptions(String),

    /// The timeout is not a positive number of seconds.
    #[error("invalid timeout {0:?}: expected a positive number of seconds")]
    InvalidTimeout(String),
}

/// Raw source selection as given on the command line.
///
/// `url`, `file` and `stdin` record whether the flag was present; an empty value still counts.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SourceArgs {
    /// Free arguments.
    pub positional: Vec<String>,
    /// Value of `--url`.
    pub url: Option<String>,
    /// Value of `--file`.
    pub file: Option<String>,
    /// Whether `--stdin` was given.
    pub stdin: bool,
    /// Value of `--cert`.
    pub cert: Option<String>,
    /// Value of `--key`.
    pub key: Option<String>,
    /// Whether `--accept-invalid-cert` was given.
    pub accept_invalid_cert: bool,
}

/// What a single positional argument refers to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Candidate {
    /// A network address.
    Url(String),
    /// A local path.
    Path(PathBuf),
}

/// Classifies a positional argument as a URL or a path.
///
/// Anything that parses as an absolute URL is a URL, except for `file:` URLs, which become their
/// local path, and single-letter schemes, which are Windows drive letters. Everything else is
/// taken as a path verbatim.
pub fn classify(candidate: &str) -> Candidate {
    match Url::parse(candidate) {
        Ok(url) if url.scheme() == "file" => {
            Candidate::Path(url.to_file_path().unwrap_or_else(|()| PathBuf::from(candidate)))
        }
        Ok(url) if url.scheme().len() == 1 => Candidate::Path(PathBuf::from(candidate)),
        Ok(_) => Candidate::Url(candidate.to_owned()),
        Err(_) => Candidate::Path(PathBuf::from(candidate)),
    }
}

/// Checks that the client certificate and key are both given or both omitted.
///
/// Empty values count as omitted.
pub fn validate_credential(
    cert: Option<&str>,
    key: Option<&str>,
) -> Result<Option<ClientCredential>, UsageError> {
    let cert = cert.filter(|cert| !cert.is_empty());
    let key = key.filter(|key| !key.is_empty());
    match (cert, key) {
        (Some(cert), Some(key)) => {
            Ok(Some(ClientCredential { cert: PathBuf::from(cert), key: PathBuf::from(key) }))
        }
        (None, None) => Ok(None),
        _ => Err(UsageError::AsymmetricCredential),
    }
}

/// Resolves the command line selection into exactly one [`Source`].
///
/// No I/O is performed: files are not opened and URLs are not contacted.
///
/// ## Errors
///
/// Returns a [`UsageError`] when more than one source is selected, more than one positional
/// argument is given, an explicit source flag is empty, or a URL source has only one half of
/// the client credential.
pub fn resolve(args: &SourceArgs) -> Result<Source, UsageError> {
    let positional: Vec<&str> =
        args.positional.iter().map(String::as_str).filter(|arg| !arg.is_empty()).collect();
    if positional.len() > 1 {
        return Err(UsageError::TooManyArguments(positional.len()));
    }

    let mut active = Vec::new();
    if !positional.is_empty() {
        active.push("METRICS_PATH/METRICS_URL");
    }
    if args.url.is_some() {
        active.push("--url");
    }
    if args.file.is_some() {
        active.push("--file");
    }
    if args.stdin {
        active.push("--stdin");
    }
    if active.len() > 1 {
        return Err(UsageError::AmbiguousSource(active));
    }

    let candidate = if let Some(arg) = positional.first() {
        classify(arg)
    } else if let Some(url) = &args.url {
        if url.is_empty() {
            return Err(UsageError::EmptyValue("--url"));
        }
        Candidate::Url(url.clone())
    } else if let Some(file) = &args.file {
        if file.is_empty() {
            return Err(UsageError::EmptyValue("--file"));
        }
        Candidate::Path(PathBuf::from(file))
    } else {
        return Ok(Source::Stdin);
    };

    match candidate {
        Candidate::Path(path) => Ok(Source::File { path }),
        Candidate::Url(address) => {
            let credential = validate_credential(args.cert.as_deref(), args.key.as_deref())?;
            let tls = TlsOptions { credential, accept_invalid_cert: args.accept_invalid_cert };
            Ok(Source::Url { address, tls })
        }
    }
}
