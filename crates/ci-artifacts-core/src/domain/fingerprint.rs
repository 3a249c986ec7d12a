//! Content fingerprints of dependency paths
//!
//! A build triggered with `--dependency-paths` records one hash per path. A
//! later lookup only reuses it if the local content still hashes the same.

use std::collections::BTreeMap;
use std::path::Path;

use ci_artifacts_api::{
    parse_params,
    CiError,
    CiResult,
    ParamValue,
    ParameterSet,
};
use ci_artifacts_jenkins::DEPENDENCY_HASHES_PARAM;
use sha2::{
    Digest,
    Sha256,
};

/// Hashes each of `paths` (relative to `base_dir`)
pub fn path_hashes(base_dir: &Path, paths: &[String]) -> CiResult<BTreeMap<String, String>> {
    let mut hashes = BTreeMap::new();
    for path in paths {
        let key = path.trim().trim_end_matches('/');
        if key.is_empty() {
            continue;
        }
        if key.contains([',', '=']) {
            return Err(CiError::ParameterFormat(format!(
                "dependency path '{key}' must not contain ',' or '='"
            )));
        }
        let hash = hash_path(&base_dir.join(key))?;
        tracing::debug!("dependency path {key}: {hash}");
        hashes.insert(key.to_string(), hash);
    }
    Ok(hashes)
}

/// SHA-256 over a file, or over all files below a directory together with
/// their relative names
pub fn hash_path(path: &Path) -> CiResult<String> {
    if !path.exists() {
        return Err(CiError::ParameterFormat(format!(
            "dependency path {} does not exist",
            path.display()
        )));
    }

    let mut hasher = Sha256::new();
    if path.is_file() {
        hasher.update(std::fs::read(path)?);
        return Ok(hex::encode(hasher.finalize()));
    }

    let root = path.to_string_lossy();
    let pattern = format!(
        "{}/**/*",
        glob::Pattern::escape(root.trim_end_matches('/'))
    );
    let mut files = glob::glob(&pattern)
        .map_err(|e| CiError::ParameterFormat(format!("{}: {e}", path.display())))?
        .filter_map(Result::ok)
        .filter(|entry| entry.is_file())
        .collect::<Vec<_>>();
    files.sort();

    for file in files {
        let relative = file.strip_prefix(path).unwrap_or(&file);
        hasher.update(relative.to_string_lossy().as_bytes());
        hasher.update([0u8]);
        hasher.update(std::fs::read(&file)?);
        hasher.update([0u8]);
    }
    Ok(hex::encode(hasher.finalize()))
}

/// `path=hash,...` as sent with the `DEPENDENCY_PATH_HASHES` parameter
pub fn encode_path_hashes(hashes: &BTreeMap<String, String>) -> String {
    hashes
        .iter()
        .map(|(path, hash)| format!("{path}={hash}"))
        .collect::<Vec<_>>()
        .join(",")
}

/// Fingerprint a queued or started build was requested with
pub fn requested_path_hashes(params: &ParameterSet) -> Option<BTreeMap<String, String>> {
    match params.get(DEPENDENCY_HASHES_PARAM)? {
        ParamValue::Text(packed) => parse_params(packed).ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_directory_hash_tracks_content_and_names() {
        let dir = tempfile::tempdir().unwrap();
        let agents = dir.path().join("agents");
        std::fs::create_dir_all(agents.join("plugins")).unwrap();
        std::fs::write(agents.join("check_mk_agent"), "#!/bin/sh\n").unwrap();
        std::fs::write(agents.join("plugins/mk_docker"), "print(1)\n").unwrap();

        let first = path_hashes(dir.path(), &["agents/".to_string()]).unwrap();
        assert_eq!(first.keys().collect::<Vec<_>>(), vec!["agents"]);
        assert_eq!(first, path_hashes(dir.path(), &["agents".to_string()]).unwrap());

        std::fs::write(agents.join("plugins/mk_docker"), "print(2)\n").unwrap();
        let changed = path_hashes(dir.path(), &["agents".to_string()]).unwrap();
        assert_ne!(first, changed);

        std::fs::rename(agents.join("plugins/mk_docker"), agents.join("plugins/mk_podman"))
            .unwrap();
        let renamed = path_hashes(dir.path(), &["agents".to_string()]).unwrap();
        assert_ne!(changed, renamed);
    }

    #[test]
    fn test_missing_path_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let result = path_hashes(dir.path(), &["omd".to_string()]);
        assert!(matches!(result, Err(CiError::ParameterFormat(_))));
    }

    #[test]
    fn test_requested_hashes_round_trip() {
        let hashes = BTreeMap::from([
            ("agents".to_string(), "ab12".to_string()),
            ("omd/packages".to_string(), "cd34".to_string()),
        ]);
        let mut params = ParameterSet::new();
        params.insert(
            DEPENDENCY_HASHES_PARAM,
            ParamValue::Text(encode_path_hashes(&hashes)),
        );
        assert_eq!(requested_path_hashes(&params), Some(hashes));
        assert_eq!(requested_path_hashes(&ParameterSet::new()), None);
    }
}
