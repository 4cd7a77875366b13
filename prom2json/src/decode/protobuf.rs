//! Decoder for length-delimited `io.prometheus.client.MetricFamily` messages.
use prost::bytes::Buf;
use prost::Message;

use super::{DecodeError, Sink};
use crate::proto::MetricFamily;

/// Decodes varint length-prefixed families from `buf`, publishing each as soon as it is read.
///
/// ## Errors
///
/// Returns [`DecodeError::Protobuf`] for a malformed or truncated message. Families decoded
/// before the bad message have already been published.
pub fn decode<B, S>(mut buf: B, sink: &mut S) -> Result<(), DecodeError>
where
    B: Buf,
    S: Sink + ?Sized,
{
    while buf.has_remaining() {
        let family = MetricFamily::decode_length_delimited(&mut buf)?;
        sink.publish(family)?;
    }
    Ok(())
}
