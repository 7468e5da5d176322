use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::errors::{Error, Result};
use crate::session::Attachable;

/// Metadata returned by the exporter after a successful solve
pub type ExporterResponse = BTreeMap<String, String>;

/// Raw payloads returned for a sub-request, keyed by `result.*` names
pub type SubRequestMetadata = BTreeMap<String, Vec<u8>>;

/// Input side of a progress writer
pub type StatusSender = mpsc::UnboundedSender<SolveStatus>;

/// Output side of a progress channel
pub type StatusReceiver = mpsc::UnboundedReceiver<SolveStatus>;

/// One exporter target for the build result
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportEntry {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub attrs: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_dir: Option<PathBuf>,
}

/// One cache import or export target
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheOptionsEntry {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub attrs: BTreeMap<String, String>,
}

/// Privileged capabilities a build may be allowed to use
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Entitlement {
    #[serde(rename = "network.host")]
    NetworkHost,
    #[serde(rename = "security.insecure")]
    SecurityInsecure,
}

impl Entitlement {
    pub fn as_str(&self) -> &'static str {
        match self {
            Entitlement::NetworkHost => "network.host",
            Entitlement::SecurityInsecure => "security.insecure",
        }
    }
}

impl fmt::Display for Entitlement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Entitlement {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "network.host" => Ok(Entitlement::NetworkHost),
            "security.insecure" => Ok(Entitlement::SecurityInsecure),
            other => Err(Error::usage(format!("invalid entitlement: {other}"))),
        }
    }
}

/// Everything the engine needs to run one build, already validated.
///
/// An empty `frontend` means the build is driven by a definition supplied
/// alongside the request; a non-empty one means `frontend_attrs` alone drive it.
#[derive(Clone, Default)]
pub struct BuildRequest {
    pub frontend: String,
    pub frontend_attrs: BTreeMap<String, String>,
    pub exports: Vec<ExportEntry>,
    pub cache_exports: Vec<CacheOptionsEntry>,
    pub cache_imports: Vec<CacheOptionsEntry>,
    pub local_dirs: BTreeMap<String, PathBuf>,
    pub oci_stores: BTreeMap<String, PathBuf>,
    pub session: Vec<Arc<dyn Attachable>>,
    pub allowed_entitlements: BTreeSet<Entitlement>,
}

impl BuildRequest {
    /// Whether the frontend attributes mark this as a sub-request
    #[must_use]
    pub fn is_sub_request(&self) -> bool {
        self.frontend_attrs
            .contains_key(crate::constants::REQUEST_ID_ATTR)
    }
}

impl fmt::Debug for BuildRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let session: Vec<&str> = self.session.iter().map(|a| a.name()).collect();
        f.debug_struct("BuildRequest")
            .field("frontend", &self.frontend)
            .field("frontend_attrs", &self.frontend_attrs)
            .field("exports", &self.exports)
            .field("cache_exports", &self.cache_exports)
            .field("cache_imports", &self.cache_imports)
            .field("local_dirs", &self.local_dirs)
            .field("oci_stores", &self.oci_stores)
            .field("session", &session)
            .field("allowed_entitlements", &self.allowed_entitlements)
            .finish()
    }
}

/// A status record streamed by the engine while a build runs
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SolveStatus {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub vertexes: Vec<Vertex>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub statuses: Vec<VertexStatus>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub logs: Vec<VertexLog>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<VertexWarning>,
}

impl SolveStatus {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.vertexes.is_empty()
            && self.statuses.is_empty()
            && self.logs.is_empty()
            && self.warnings.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Vertex {
    pub digest: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub inputs: Vec<String>,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed: Option<DateTime<Utc>>,
    #[serde(default)]
    pub cached: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VertexStatus {
    pub id: String,
    pub vertex: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub total: i64,
    #[serde(default)]
    pub current: i64,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VertexLog {
    pub vertex: String,
    pub stream: i32,
    #[serde(with = "serde_b64")]
    pub data: Vec<u8>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VertexWarning {
    pub vertex: String,
    #[serde(default)]
    pub level: i32,
    #[serde(with = "serde_b64")]
    pub short: Vec<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// Serde bridge for `Vec<u8>` via standard base64, matching how byte
/// payloads appear in trace records.
pub mod serde_b64 {
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        STANDARD.decode(s).map_err(serde::de::Error::custom)
    }
}
