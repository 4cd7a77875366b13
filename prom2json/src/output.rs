use std::io::Write;

use crate::common::Error;
use crate::family::Family;

/// Writes `families` as a single compact JSON array followed by a newline.
///
/// ## Errors
///
/// Fails if serialization or the write fails. Nothing is written if serialization fails.
pub fn write_json<W: Write>(mut writer: W, families: &[Family]) -> Result<(), Error> {
    let mut encoded = serde_json::to_vec(families)?;
    encoded.push(b'\n');

    writer.write_all(&encoded).map_err(Error::Write)?;
    writer.flush().map_err(Error::Write)
}
