use std::collections::BTreeMap;
use std::path::{
    Path,
    PathBuf,
};

use ci_artifacts_api::{
    BuildRecord,
    CiResult,
    JobPath,
};
use serde::{
    Deserialize,
    Serialize,
};

pub const MANIFEST_FILE: &str = ".ci-artifacts.json";

/// Local record of what was downloaded into an output directory
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DownloadManifest {
    #[serde(default)]
    pub job: Option<JobPath>,

    #[serde(default)]
    pub build: Option<u64>,

    #[serde(default)]
    pub path_hashes: Option<BTreeMap<String, String>>,

    /// Artifact path to MD5
    #[serde(default)]
    pub files: BTreeMap<String, String>,
}

impl DownloadManifest {
    pub fn for_build(build: &BuildRecord) -> Self {
        Self {
            job: Some(build.job.clone()),
            build: Some(build.number),
            path_hashes: build.path_hashes.clone(),
            files: BTreeMap::new(),
        }
    }

    pub fn path(out_dir: &Path) -> PathBuf {
        out_dir.join(MANIFEST_FILE)
    }

    /// A missing or unreadable manifest yields an empty one
    pub fn load(out_dir: &Path) -> Self {
        let path = Self::path(out_dir);
        let content = match std::fs::read_to_string(&path) {
            Ok(content) => content,
            Err(_) => return Self::default(),
        };
        serde_json::from_str(&content).unwrap_or_else(|e| {
            tracing::warn!("Ignoring unreadable manifest {}: {e}", path.display());
            Self::default()
        })
    }

    pub fn save(&self, out_dir: &Path) -> CiResult<()> {
        let path = Self::path(out_dir);
        let tmp = out_dir.join(format!("{MANIFEST_FILE}.tmp"));
        std::fs::write(&tmp, serde_json::to_string_pretty(self)?)?;
        std::fs::rename(&tmp, &path)?;
        tracing::debug!("Wrote manifest {}", path.display());
        Ok(())
    }

    /// True if the manifest was written for `build`
    pub fn describes(&self, build: &BuildRecord) -> bool {
        self.job.as_ref() == Some(&build.job) && self.build == Some(build.number)
    }
}
