//! Command line surface.
use std::time::Duration;

use getopts::{Matches, Options};
use log::warn;

use crate::source::{resolve, Source, SourceArgs, UsageError};

/// Builds the option table.
pub fn options() -> Options {
    let mut opts = Options::new();

    opts.optopt("", "url", "URL to fetch the metrics from", "URL");
    opts.optopt("", "file", "file to read the metrics from", "PATH");
    opts.optflag("", "stdin", "read the metrics from standard input (the default)");
    opts.optopt("", "cert", "client certificate file (PEM), used with --key", "PATH");
    opts.optopt("", "key", "client private key file (PEM), used with --cert", "PATH");
    opts.optflag(
        "",
        "accept-invalid-cert",
        "accept any certificate during TLS handshake (insecure, use only for testing)",
    );
    opts.optopt("", "timeout", "give up on fetching a URL after this many seconds", "SECONDS");
    opts.optflag("v", "verbose", "log debug diagnostics to stderr");
    opts.optflag("h", "help", "print this help menu");

    opts
}

/// Usage text for `program`.
pub fn usage(opts: &Options, program: &str) -> String {
    let brief = format!(
        "Usage: {program} [options] [METRICS_PATH | METRICS_URL]\n\n\
         Reads Prometheus metrics from a URL, a file or standard input and prints them as JSON."
    );
    opts.usage(&brief)
}

/// Validated settings for a conversion.
#[derive(Clone, Debug, PartialEq)]
pub struct Settings {
    /// The resolved source.
    pub source: Source,
    /// Fetch timeout, URL sources only.
    pub timeout: Option<Duration>,
    /// Whether debug logging is enabled.
    pub verbose: bool,
}

/// Parses `args`, which exclude the program name.
///
/// ## Errors
///
/// Returns [`UsageError::InvalidOptions`] for unknown options or missing option values.
pub fn parse(opts: &Options, args: &[String]) -> Result<Matches, UsageError> {
    opts.parse(args).map_err(|e| UsageError::InvalidOptions(e.to_string()))
}

/// Builds [`Settings`] from parsed options.
///
/// ## Errors
///
/// Returns a [`UsageError`] if the source selection is invalid or the timeout is not a positive
/// number of seconds.
pub fn settings(matches: &Matches) -> Result<Settings, UsageError> {
    let args = SourceArgs {
        positional: matches.free.clone(),
        url: matches.opt_str("url"),
        file: matches.opt_str("file"),
        stdin: matches.opt_present("stdin"),
        cert: matches.opt_str("cert"),
        key: matches.opt_str("key"),
        accept_invalid_cert: matches.opt_present("accept-invalid-cert"),
    };
    let source = resolve(&args)?;

    let tls_requested = args.cert.is_some() || args.key.is_some() || args.accept_invalid_cert;
    if tls_requested && !matches!(source, Source::Url { .. }) {
        warn!("TLS options are ignored for {source}");
    }

    let timeout = matches.opt_str("timeout").map(|value| parse_timeout(&value)).transpose()?;

    Ok(Settings { source, timeout, verbose: matches.opt_present("verbose") })
}

fn parse_timeout(value: &str) -> Result<Duration, UsageError> {
    value
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|secs| *secs > 0.0)
        .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
        .ok_or_else(|| UsageError::InvalidTimeout(value.to_owned()))
}
