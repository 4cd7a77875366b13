//! Converts Prometheus exposition data into JSON.
//!
//! A [`Source`] is resolved from the command line, acquired on a background thread (file,
//! standard input, or an HTTP(S) endpoint speaking the text or delimited protobuf format) and
//! converted family by family into [`Family`] values, which [`write_json`] prints as one array.
#![deny(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg), deny(broken_intra_doc_links))]
mod common;
pub use self::common::Error;

pub mod cli;
pub mod decode;

mod family;
pub use self::family::{format_float, Family, HistogramSample, Sample, SummarySample, ValueSample};

pub mod fetch;

mod output;
pub use self::output::write_json;

pub mod pipeline;
pub use self::pipeline::{convert, Acquisition};

pub mod proto;

pub mod source;
pub use self::source::{Source, TlsOptions, UsageError};
