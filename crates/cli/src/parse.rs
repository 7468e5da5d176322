//! Translation of raw flag strings into request fields

use bkctl_core::{CacheOptionsEntry, Entitlement, Error, ExportEntry, Result};
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

/// Exporters whose `dest` names a directory rather than a file
const DIRECTORY_EXPORTERS: &[&str] = &["local"];

/// Split `key=value`; the value may itself contain `=`
fn key_value<'a>(kind: &str, raw: &'a str) -> Result<(&'a str, &'a str)> {
    match raw.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key, value)),
        _ => Err(Error::usage(format!(
            "invalid {kind}: '{raw}' is not of the form key=value"
        ))),
    }
}

/// `--opt key=value`, repeatable
pub fn parse_opts(raw: &[String]) -> Result<BTreeMap<String, String>> {
    raw.iter()
        .map(|opt| {
            key_value("opt", opt).map(|(key, value)| (key.to_string(), value.to_string()))
        })
        .collect()
}

/// `--local name=path`, repeatable
pub fn parse_locals(raw: &[String]) -> Result<BTreeMap<String, PathBuf>> {
    parse_paths("local", raw)
}

/// `--oci-layout name=path`, repeatable
pub fn parse_oci_layouts(raw: &[String]) -> Result<BTreeMap<String, PathBuf>> {
    parse_paths("oci-layout", raw)
}

fn parse_paths(kind: &str, raw: &[String]) -> Result<BTreeMap<String, PathBuf>> {
    raw.iter()
        .map(|entry| {
            let (name, path) = key_value(kind, entry)?;
            if path.is_empty() {
                return Err(Error::usage(format!("invalid {kind}: '{entry}' has no path")));
            }
            Ok((name.to_string(), PathBuf::from(path)))
        })
        .collect()
}

/// Comma separated `key=value` attributes; `type` is required
fn parse_csv(kind: &str, raw: &str) -> Result<(String, BTreeMap<String, String>)> {
    let mut attrs = BTreeMap::new();
    for field in raw.split(',').map(str::trim).filter(|f| !f.is_empty()) {
        let (key, value) = key_value(kind, field)?;
        attrs.insert(key.to_lowercase(), value.to_string());
    }
    match attrs.remove("type") {
        Some(kind_value) if !kind_value.is_empty() => Ok((kind_value, attrs)),
        _ => Err(Error::usage(format!("invalid {kind}: '{raw}' has no type"))),
    }
}

/// `--output type=<exporter>,key=value,...`, repeatable
pub fn parse_outputs(raw: &[String]) -> Result<Vec<ExportEntry>> {
    raw.iter()
        .map(|output| {
            let (kind, mut attrs) = parse_csv("output", output)?;
            let output_dir = if DIRECTORY_EXPORTERS.contains(&kind.as_str()) {
                attrs.remove("dest").map(PathBuf::from)
            } else {
                None
            };
            Ok(ExportEntry {
                kind,
                attrs,
                output_dir,
            })
        })
        .collect()
}

/// `--export-cache` / `--import-cache` entries.
///
/// A bare value without any `=` is read as a registry reference.
pub fn parse_cache_options(kind: &str, raw: &[String]) -> Result<Vec<CacheOptionsEntry>> {
    raw.iter()
        .map(|entry| {
            if !entry.contains('=') {
                let mut attrs = BTreeMap::new();
                attrs.insert("ref".to_string(), entry.clone());
                return Ok(CacheOptionsEntry {
                    kind: "registry".to_string(),
                    attrs,
                });
            }
            let (kind, attrs) = parse_csv(kind, entry)?;
            Ok(CacheOptionsEntry { kind, attrs })
        })
        .collect()
}

/// `--allow <entitlement>`, repeatable
pub fn parse_entitlements(raw: &[String]) -> Result<BTreeSet<Entitlement>> {
    raw.iter().map(|e| e.parse()).collect()
}
