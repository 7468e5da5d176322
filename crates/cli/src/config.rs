use bkctl_core::{BuildRequest, CacheOptionsEntry, Entitlement, ExportEntry};
use bkctl_progress::ProgressMode;
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

/// Validated settings of one `bkctl build` invocation.
///
/// Built once from the command line and never changed afterwards.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BuildConfig {
    pub frontend: String,
    pub frontend_attrs: BTreeMap<String, String>,
    pub exports: Vec<ExportEntry>,
    pub cache_exports: Vec<CacheOptionsEntry>,
    pub cache_imports: Vec<CacheOptionsEntry>,
    pub local_dirs: BTreeMap<String, PathBuf>,
    pub oci_stores: BTreeMap<String, PathBuf>,
    pub allowed_entitlements: BTreeSet<Entitlement>,
    pub progress: ProgressMode,
    pub trace: Option<PathBuf>,
    pub metadata_file: Option<PathBuf>,
    pub no_cache: bool,
}

impl BuildConfig {
    /// Whether the build graph has to come from stdin
    #[must_use]
    pub fn needs_definition(&self) -> bool {
        self.frontend.is_empty()
    }

    /// The engine request for this configuration, without session attachables
    #[must_use]
    pub fn request(&self) -> BuildRequest {
        BuildRequest {
            frontend: self.frontend.clone(),
            frontend_attrs: self.frontend_attrs.clone(),
            exports: self.exports.clone(),
            cache_exports: self.cache_exports.clone(),
            cache_imports: self.cache_imports.clone(),
            local_dirs: self.local_dirs.clone(),
            oci_stores: self.oci_stores.clone(),
            session: Vec::new(),
            allowed_entitlements: self.allowed_entitlements.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_carries_every_field() {
        let mut config = BuildConfig {
            frontend: "dockerfile.v0".to_string(),
            ..BuildConfig::default()
        };
        config
            .frontend_attrs
            .insert("target".to_string(), "release".to_string());
        config
            .local_dirs
            .insert("context".to_string(), PathBuf::from("."));
        config.allowed_entitlements.insert(Entitlement::NetworkHost);

        let request = config.request();

        assert!(!config.needs_definition());
        assert_eq!(request.frontend, "dockerfile.v0");
        assert_eq!(request.frontend_attrs, config.frontend_attrs);
        assert_eq!(request.local_dirs, config.local_dirs);
        assert_eq!(request.allowed_entitlements, config.allowed_entitlements);
        assert!(request.session.is_empty());
    }
}
