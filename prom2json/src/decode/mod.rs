//! Decoders for the Prometheus exposition formats.
//!
//! Decoders publish every [`MetricFamily`] they produce into a [`Sink`], in decode order.
use std::io;

use crossbeam_channel::Sender;
use prost::bytes::Bytes;
use thiserror::Error as ThisError;

use crate::proto::MetricFamily;

pub mod protobuf;
pub mod text;

/// Errors that could occur while decoding exposition data.
#[derive(Debug, ThisError)]
pub enum DecodeError {
    /// Reading the underlying stream failed.
    #[error("reading text format failed: {0}")]
    Io(#[from] io::Error),

    /// The text format is malformed.
    #[error("text format parsing error in line {line}: {reason}")]
    Text {
        /// 1-based line number.
        line: usize,
        /// What is wrong with the line.
        reason: String,
    },

    /// A length-delimited protobuf message is malformed or truncated.
    #[error("reading metric family protocol buffer failed: {0}")]
    Protobuf(#[from] prost::DecodeError),

    /// The consumer stopped receiving before decoding finished.
    #[error("metric family queue closed before decoding finished")]
    Closed,
}

/// Destination for decoded metric families.
pub trait Sink {
    /// Hands over one decoded family.
    ///
    /// ## Errors
    ///
    /// Returns [`DecodeError::Closed`] if the receiving side is gone.
    fn publish(&mut self, family: MetricFamily) -> Result<(), DecodeError>;
}

impl Sink for Vec<MetricFamily> {
    fn publish(&mut self, family: MetricFamily) -> Result<(), DecodeError> {
        self.push(family);
        Ok(())
    }
}

impl Sink for Sender<MetricFamily> {
    /// Blocks while the channel is full.
    fn publish(&mut self, family: MetricFamily) -> Result<(), DecodeError> {
        self.send(family).map_err(|_| DecodeError::Closed)
    }
}

/// Wire format of a body of exposition data.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Format {
    /// Text format, version 0.0.4.
    Text,
    /// Varint length-delimited `io.prometheus.client.MetricFamily` messages.
    Protobuf,
}

impl Format {
    /// Decodes a fully buffered body in this format.
    ///
    /// ## Errors
    ///
    /// Returns a [`DecodeError`] if the body is malformed or the sink is closed.
    pub fn decode<S>(self, body: Bytes, sink: &mut S) -> Result<(), DecodeError>
    where
        S: Sink + ?Sized,
    {
        match self {
            Format::Text => text::decode(&body[..], sink),
            Format::Protobuf => protobuf::decode(body, sink),
        }
    }
}
