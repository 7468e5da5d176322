//! Typed form of a single graph operation.
//!
//! Operations travel as opaque bytes inside a definition; they are only
//! decoded when something needs to look inside them, such as the no-cache
//! pass or the dry-run engine's vertex names.

use bkctl_core::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Reference to the output of another operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Input {
    pub digest: String,
    #[serde(default)]
    pub index: i64,
}

/// A graph vertex. At most one of the operation bodies is set; an operation
/// with none of them only forwards its inputs and terminates the graph.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Op {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub inputs: Vec<Input>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<SourceOp>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exec: Option<ExecOp>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<FileOp>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub merge: Option<MergeOp>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diff: Option<DiffOp>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform: Option<Platform>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceOp {
    pub identifier: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attrs: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecOp {
    pub meta: ExecMeta,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub mounts: Vec<Mount>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecMeta {
    pub args: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub env: Vec<String>,
    #[serde(default)]
    pub cwd: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub user: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mount {
    pub input: i64,
    pub dest: String,
    #[serde(default)]
    pub output: i64,
    #[serde(default)]
    pub readonly: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileOp {
    pub actions: Vec<FileAction>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileAction {
    Mkdir { path: String, mode: u32 },
    Mkfile { path: String, mode: u32, data: String },
    Rm { path: String },
    Copy { src: String, dest: String },
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeOp {
    pub inputs: Vec<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffOp {
    pub lower: i64,
    pub upper: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Platform {
    pub os: String,
    pub architecture: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub variant: String,
}

impl Op {
    /// Decode an operation from its serialized bytes
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let op: Op = serde_json::from_slice(bytes)
            .map_err(|e| Error::parse("failed to parse llb proto op", e))?;
        if op.body_count() > 1 {
            return Err(Error::parse_detail(
                "failed to parse llb proto op",
                "operation sets more than one body",
            ));
        }
        Ok(op)
    }

    /// Serialize the operation to the bytes stored in a definition
    pub fn encode(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Short human-readable label, used for progress vertex names
    #[must_use]
    pub fn describe(&self) -> String {
        if let Some(source) = &self.source {
            return source.identifier.clone();
        }
        if let Some(exec) = &self.exec {
            return exec.meta.args.join(" ");
        }
        if let Some(file) = &self.file {
            let actions: Vec<&str> = file
                .actions
                .iter()
                .map(|action| match action {
                    FileAction::Mkdir { .. } => "mkdir",
                    FileAction::Mkfile { .. } => "mkfile",
                    FileAction::Rm { .. } => "rm",
                    FileAction::Copy { .. } => "copy",
                })
                .collect();
            return format!("file {}", actions.join(","));
        }
        if self.merge.is_some() {
            return "merge".to_string();
        }
        if self.diff.is_some() {
            return "diff".to_string();
        }
        "output".to_string()
    }

    fn body_count(&self) -> usize {
        [
            self.source.is_some(),
            self.exec.is_some(),
            self.file.is_some(),
            self.merge.is_some(),
            self.diff.is_some(),
        ]
        .into_iter()
        .filter(|set| *set)
        .count()
    }
}
