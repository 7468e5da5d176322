use crate::digest::Digest;
use crate::op::Op;
use bkctl_core::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::{Read, Write};
use tracing::debug;

const PARSE_INPUT: &str = "failed to parse input";

/// Per-operation metadata, keyed in a definition by the operation's digest
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpMetadata {
    #[serde(default, skip_serializing_if = "is_false")]
    pub ignore_cache: bool,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub description: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub export_cache: Option<ExportCache>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub caps: BTreeMap<String, bool>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportCache {
    pub value: bool,
}

fn is_false(value: &bool) -> bool {
    !*value
}

/// A serialized build graph: ordered operations plus metadata by digest.
///
/// Every metadata key refers to an operation present in `def`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Definition {
    #[serde(default, with = "b64_seq")]
    def: Vec<Vec<u8>>,
    #[serde(default)]
    metadata: BTreeMap<Digest, OpMetadata>,
}

/// Read a definition from a byte stream.
///
/// Whitespace-only input yields an empty definition; callers decide whether
/// that is acceptable.
pub fn read_from<R: Read>(mut reader: R) -> Result<Definition> {
    let mut buf = Vec::new();
    reader
        .read_to_end(&mut buf)
        .map_err(|e| Error::parse(PARSE_INPUT, e))?;

    if buf.iter().all(u8::is_ascii_whitespace) {
        return Ok(Definition::default());
    }

    let def: Definition = serde_json::from_slice(&buf).map_err(|e| Error::parse(PARSE_INPUT, e))?;
    def.validate()?;

    debug!(
        operations = def.def.len(),
        metadata_entries = def.metadata.len(),
        "loaded definition"
    );
    Ok(def)
}

impl Definition {
    /// Build a definition from typed operations, in order
    pub fn from_ops<'a>(ops: impl IntoIterator<Item = &'a Op>) -> Result<Self> {
        let def = ops
            .into_iter()
            .map(Op::encode)
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            def,
            metadata: BTreeMap::new(),
        })
    }

    /// The serialized operations, in graph order
    #[must_use]
    pub fn ops(&self) -> &[Vec<u8>] {
        &self.def
    }

    #[must_use]
    pub fn metadata(&self) -> &BTreeMap<Digest, OpMetadata> {
        &self.metadata
    }

    /// Metadata recorded for the operation with `digest`
    #[must_use]
    pub fn metadata_for(&self, digest: &Digest) -> Option<&OpMetadata> {
        self.metadata.get(digest)
    }

    /// Attach metadata to a present operation
    pub fn set_metadata(&mut self, digest: Digest, metadata: OpMetadata) -> Result<()> {
        if !self.contains(&digest) {
            return Err(unknown_digest(&digest));
        }
        self.metadata.insert(digest, metadata);
        Ok(())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.def.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.def.is_empty()
    }

    /// Decode every operation together with its digest
    pub fn decode_ops(&self) -> Result<Vec<(Digest, Op)>> {
        self.def
            .iter()
            .map(|dt| Ok((Digest::from_bytes(dt), Op::decode(dt)?)))
            .collect()
    }

    /// Mark every operation as bypassing the cache.
    ///
    /// Only the `ignore_cache` flag is touched; other metadata on an operation
    /// is kept. Running the pass again changes nothing.
    pub fn apply_no_cache(&mut self) -> Result<()> {
        for dt in &self.def {
            Op::decode(dt)?;
            let digest = Digest::from_bytes(dt);
            let mut metadata = self.metadata.get(&digest).cloned().unwrap_or_default();
            metadata.ignore_cache = true;
            self.metadata.insert(digest, metadata);
        }
        debug!(operations = self.def.len(), "disabled cache for all operations");
        Ok(())
    }

    /// Write the definition in the format `read_from` accepts
    pub fn write_to<W: Write>(&self, writer: W) -> Result<()> {
        serde_json::to_writer(writer, self)?;
        Ok(())
    }

    fn contains(&self, digest: &Digest) -> bool {
        self.def.iter().any(|dt| &Digest::from_bytes(dt) == digest)
    }

    fn validate(&self) -> Result<()> {
        if self.metadata.is_empty() {
            return Ok(());
        }
        let present: std::collections::BTreeSet<Digest> =
            self.def.iter().map(|dt| Digest::from_bytes(dt)).collect();
        match self.metadata.keys().find(|digest| !present.contains(*digest)) {
            Some(digest) => Err(unknown_digest(digest)),
            None => Ok(()),
        }
    }
}

fn unknown_digest(digest: &Digest) -> Error {
    Error::parse_detail(PARSE_INPUT, format!("metadata for unknown operation {digest}"))
}

/// Serde bridge for the operation list, each entry a standard base64 string
mod b64_seq {
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    use serde::{Deserialize, Deserializer, Serializer};

    pub(crate) fn serialize<S>(ops: &[Vec<u8>], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_seq(ops.iter().map(|op| STANDARD.encode(op)))
    }

    pub(crate) fn deserialize<'de, D>(deserializer: D) -> Result<Vec<Vec<u8>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Vec::<String>::deserialize(deserializer)?
            .into_iter()
            .map(|s| STANDARD.decode(s).map_err(serde::de::Error::custom))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::op::{ExecMeta, ExecOp, Input, SourceOp};
    use proptest::prelude::*;

    fn sample_ops() -> Vec<Op> {
        let source = Op {
            source: Some(SourceOp {
                identifier: "docker-image://docker.io/library/alpine:latest".to_string(),
                attrs: BTreeMap::new(),
            }),
            ..Op::default()
        };
        let source_digest = Digest::from_bytes(&source.encode().unwrap());
        let exec = Op {
            inputs: vec![Input {
                digest: source_digest.to_string(),
                index: 0,
            }],
            exec: Some(ExecOp {
                meta: ExecMeta {
                    args: vec!["apk".into(), "add".into(), "git".into()],
                    cwd: "/".into(),
                    ..ExecMeta::default()
                },
                mounts: vec![],
            }),
            ..Op::default()
        };
        vec![source, exec]
    }

    fn serialized(def: &Definition) -> Vec<u8> {
        let mut buf = Vec::new();
        def.write_to(&mut buf).unwrap();
        buf
    }

    #[test]
    fn test_read_back_written_definition() {
        let def = Definition::from_ops(&sample_ops()).unwrap();
        let loaded = read_from(serialized(&def).as_slice()).unwrap();

        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded, def);
    }

    #[test]
    fn test_malformed_input_is_parse_error() {
        let err = read_from(&b"{not json"[..]).unwrap_err();
        assert!(matches!(err, Error::Parse { .. }));
        assert!(err.to_string().starts_with("failed to parse input"));
    }

    #[test]
    fn test_bad_base64_is_parse_error() {
        let err = read_from(&br#"{"def":["%%%"]}"#[..]).unwrap_err();
        assert!(err.to_string().starts_with("failed to parse input"));
    }

    #[test]
    fn test_empty_input_is_empty_definition() {
        let def = read_from(&b"  \n"[..]).unwrap();
        assert!(def.is_empty());
    }

    #[test]
    fn test_unknown_metadata_digest_is_rejected() {
        let def = Definition::from_ops(&sample_ops()).unwrap();
        let mut value: serde_json::Value = serde_json::from_slice(&serialized(&def)).unwrap();
        let stray = Digest::from_bytes(b"not an op in this definition");
        value["metadata"][stray.as_str()] = serde_json::json!({ "ignore_cache": true });

        let err = read_from(value.to_string().as_bytes()).unwrap_err();
        assert!(err.to_string().contains("unknown operation"));
    }

    #[test]
    fn test_set_metadata_rejects_unknown_digest() {
        let mut def = Definition::from_ops(&sample_ops()).unwrap();
        let err = def
            .set_metadata(Digest::from_bytes(b"missing"), OpMetadata::default())
            .unwrap_err();
        assert!(matches!(err, Error::Parse { .. }));
    }

    #[test]
    fn test_no_cache_marks_every_op() {
        let mut def = Definition::from_ops(&sample_ops()).unwrap();
        def.apply_no_cache().unwrap();

        assert_eq!(def.metadata().len(), 2);
        for dt in def.ops() {
            let metadata = def.metadata_for(&Digest::from_bytes(dt)).unwrap();
            assert!(metadata.ignore_cache);
        }
    }

    #[test]
    fn test_no_cache_keeps_unrelated_metadata() {
        let mut def = Definition::from_ops(&sample_ops()).unwrap();
        let digest = Digest::from_bytes(&def.ops()[0]);
        let mut metadata = OpMetadata::default();
        metadata
            .description
            .insert("llb.customname".to_string(), "fetch base".to_string());
        metadata.caps.insert("source.image".to_string(), true);
        def.set_metadata(digest.clone(), metadata).unwrap();

        def.apply_no_cache().unwrap();

        let rewritten = def.metadata_for(&digest).unwrap();
        assert!(rewritten.ignore_cache);
        assert_eq!(rewritten.description["llb.customname"], "fetch base");
        assert!(rewritten.caps["source.image"]);
    }

    #[test]
    fn test_no_cache_fails_on_corrupt_op() {
        let value = serde_json::json!({ "def": ["bm90IGFuIG9w"] });
        let mut def: Definition = serde_json::from_value(value).unwrap();
        let err = def.apply_no_cache().unwrap_err();
        assert!(err.to_string().starts_with("failed to parse llb proto op"));
    }

    proptest! {
        #[test]
        fn proptest_no_cache_is_idempotent(
            identifiers in proptest::collection::vec("[a-z]{1,12}", 0..8),
            described in proptest::collection::vec(any::<bool>(), 0..8),
        ) {
            let ops: Vec<Op> = identifiers
                .iter()
                .map(|id| Op {
                    source: Some(SourceOp {
                        identifier: format!("local://{id}"),
                        attrs: BTreeMap::new(),
                    }),
                    ..Op::default()
                })
                .collect();
            let mut def = Definition::from_ops(&ops).unwrap();
            let digests: Vec<Digest> = def.ops().iter().map(|dt| Digest::from_bytes(dt)).collect();
            for (digest, describe) in digests.iter().zip(described.iter()) {
                if *describe {
                    let mut metadata = OpMetadata::default();
                    metadata.description.insert("llb.customname".into(), digest.to_string());
                    def.set_metadata(digest.clone(), metadata).unwrap();
                }
            }

            def.apply_no_cache().unwrap();
            let once = def.clone();
            def.apply_no_cache().unwrap();

            prop_assert_eq!(&def, &once);
            prop_assert!(def.metadata().values().all(|m| m.ignore_cache));
        }
    }
}
