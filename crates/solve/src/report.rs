//! Rendering of build results once the build has finished

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use bkctl_core::{
    Error, ExporterResponse, Result, SubRequestMetadata, RESULT_KEY_PREFIX, RESULT_TXT_KEY,
};
use serde_json::value::{to_raw_value, RawValue};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;
use tracing::debug;

/// Print sub-request results to `out`.
///
/// A `result.txt` entry is printed verbatim and nothing else is. Otherwise
/// every `result.`-prefixed entry is printed as its key on one line followed
/// by its payload and a newline, in key order.
pub fn report_sub_metadata<W: Write>(meta: &SubRequestMetadata, out: &mut W) -> Result<()> {
    if let Some(txt) = meta.get(RESULT_TXT_KEY) {
        out.write_all(txt).map_err(output_error)?;
        return out.flush().map_err(output_error);
    }

    let results = meta
        .range(RESULT_KEY_PREFIX.to_string()..)
        .take_while(|(key, _)| key.starts_with(RESULT_KEY_PREFIX));
    for (key, payload) in results {
        writeln!(out, "{key}").map_err(output_error)?;
        out.write_all(payload).map_err(output_error)?;
        writeln!(out).map_err(output_error)?;
    }
    out.flush().map_err(output_error)
}

/// Write the exporter response to `path` as a JSON object.
///
/// Values that are base64 encoded non-empty JSON objects are embedded as
/// objects; every other value is kept as the original string.
pub fn write_metadata_file(path: &Path, response: &ExporterResponse) -> Result<()> {
    let document = response
        .iter()
        .map(|(key, value)| Ok((key.as_str(), metadata_value(value)?)))
        .collect::<Result<BTreeMap<&str, Box<RawValue>>>>()?;

    let mut bytes = serde_json::to_vec_pretty(&document)?;
    bytes.push(b'\n');
    bkctl_utils::write_atomic(path, &bytes)?;

    debug!(path = %path.display(), entries = response.len(), "wrote metadata file");
    Ok(())
}

/// The decoded document is embedded byte for byte when it is a non-empty
/// JSON object.
fn metadata_value(value: &str) -> Result<Box<RawValue>> {
    if let Some(embedded) = embedded_object(value) {
        return Ok(embedded);
    }
    Ok(to_raw_value(value)?)
}

fn embedded_object(value: &str) -> Option<Box<RawValue>> {
    let decoded = STANDARD.decode(value).ok()?;
    match serde_json::from_slice::<Map<String, Value>>(&decoded) {
        Ok(object) if !object.is_empty() => {
            RawValue::from_string(String::from_utf8(decoded).ok()?).ok()
        }
        _ => None,
    }
}

fn output_error(err: std::io::Error) -> Error {
    Error::file_system("<stdout>", "write sub-request result", err)
}
