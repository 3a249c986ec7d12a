use std::collections::BTreeSet;
use std::io::Read;
use std::path::{
    Component,
    Path,
    PathBuf,
};
use std::time::Duration;

use ci_artifacts_api::{
    Artifact,
    BuildRecord,
    CiError,
    CiResult,
    JenkinsApi,
    RetryPolicy,
};
use md5::{
    Digest,
    Md5,
};

use crate::domain::manifest::{
    DownloadManifest,
    MANIFEST_FILE,
};

pub const DEFAULT_DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(300);

const PARTIAL_SUFFIX: &str = ".part";

#[derive(Debug, Clone)]
pub struct DownloadOptions {
    /// Delete files in the output directory which are not artifacts of the build
    pub remove_others: bool,
    /// Fail with [`CiError::NoArtifacts`] for builds without artifacts
    pub strict: bool,
    /// Bound for a single artifact download, retries included
    pub timeout: Duration,
    pub retry: RetryPolicy,
}

impl Default for DownloadOptions {
    fn default() -> Self {
        Self {
            remove_others: true,
            strict: false,
            timeout: DEFAULT_DOWNLOAD_TIMEOUT,
            retry: RetryPolicy::transient(),
        }
    }
}

/// Downloads the artifacts of `build` into `base_dir/out_dir`
///
/// Files already present with the fingerprinted MD5 are kept. Artifacts
/// without a fingerprint are kept when the manifest of the same build
/// recorded the local MD5. Returns the artifact paths now available locally.
pub async fn download(
    api: &dyn JenkinsApi, build: &BuildRecord, out_dir: &Path, base_dir: &Path,
    options: &DownloadOptions,
) -> CiResult<Vec<String>> {
    let target = base_dir.join(out_dir);
    let artifacts = api.list_artifacts(build).await?;

    if artifacts.is_empty() {
        if options.strict {
            return Err(CiError::NoArtifacts(build.describe()));
        }
        tracing::warn!("{} has no artifacts", build.describe());
        return Ok(Vec::new());
    }

    std::fs::create_dir_all(&target)?;
    let mut manifest = DownloadManifest::for_build(build);
    let previous = DownloadManifest::load(&target);
    if !previous.describes(build) && previous.build.is_some() {
        tracing::info!(
            "{} previously held artifacts of {}#{}",
            target.display(),
            previous.job.as_ref().map(|j| j.as_str()).unwrap_or("?"),
            previous.build.unwrap_or_default()
        );
    }

    let same_build = previous.describes(build);
    let mut fetched = Vec::with_capacity(artifacts.len());
    for artifact in &artifacts {
        let dest = artifact_destination(&target, &artifact.path)?;
        let recorded = same_build
            .then(|| previous.files.get(&artifact.path))
            .flatten()
            .map(String::as_str);
        let md5 = fetch_one(api, build, artifact, recorded, &dest, options).await?;
        manifest.files.insert(artifact.path.clone(), md5);
        fetched.push(artifact.path.clone());
    }

    if options.remove_others {
        remove_others(&target, &artifacts)?;
    }
    manifest.save(&target)?;

    Ok(fetched)
}

/// Makes sure `dest` holds `artifact`, returns its MD5. `recorded` is the
/// MD5 the manifest lists for this artifact of the same build.
async fn fetch_one(
    api: &dyn JenkinsApi, build: &BuildRecord, artifact: &Artifact, recorded: Option<&str>,
    dest: &Path, options: &DownloadOptions,
) -> CiResult<String> {
    tracing::debug!("Handle artifact: {} (md5: {:?})", artifact.path, artifact.md5);
    let local_hash = md5_of(dest)?;

    match (&local_hash, &artifact.md5) {
        (Some(local), Some(remote)) if local == remote => {
            tracing::debug!(
                "File is already available locally: {} (md5: {remote})",
                artifact.path
            );
            return Ok(local.clone());
        }
        (Some(local), Some(remote)) => {
            tracing::warn!(
                "File exists locally but hashes differ: {} {local} != {remote}",
                artifact.path
            );
        }
        (Some(local), None) if recorded == Some(local.as_str()) => {
            tracing::debug!(
                "File unchanged since the last download of this build: {}",
                artifact.path
            );
            return Ok(local.clone());
        }
        _ => {}
    }

    if let Some(parent) = dest.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let partial = partial_path(dest);
    let what = format!("download of {}", artifact.path);

    tracing::info!("Download: {}", artifact.path);
    let downloaded = tokio::time::timeout(
        options.timeout,
        options
            .retry
            .retry(&what, || api.download_artifact(build, &artifact.path, &partial)),
    )
    .await;

    let size = match downloaded {
        Ok(Ok(size)) => size,
        Ok(Err(e)) => {
            let _ = std::fs::remove_file(&partial);
            return Err(e);
        }
        Err(_) => {
            let _ = std::fs::remove_file(&partial);
            return Err(CiError::PollTimeout {
                what,
                elapsed: options.timeout,
            });
        }
    };

    let hash = md5_of(&partial)?.unwrap_or_default();
    if let Some(remote) = &artifact.md5 {
        if remote != &hash {
            tracing::warn!(
                "{}: downloaded content has md5 {hash}, Jenkins reports {remote}",
                artifact.path
            );
        }
    }
    std::fs::rename(&partial, dest)?;
    tracing::debug!("Wrote {} ({size} bytes)", dest.display());
    Ok(hash)
}

/// Artifact paths come from Jenkins and must stay below the output directory
fn artifact_destination(target: &Path, relative: &str) -> CiResult<PathBuf> {
    let path = Path::new(relative);
    let escapes = path
        .components()
        .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
    if relative.is_empty() || escapes {
        return Err(CiError::RemoteSchema(format!(
            "artifact path '{relative}' is not a plain relative path"
        )));
    }
    Ok(target.join(path))
}

fn partial_path(dest: &Path) -> PathBuf {
    let mut name = dest.file_name().unwrap_or_default().to_os_string();
    name.push(PARTIAL_SUFFIX);
    dest.with_file_name(name)
}

/// MD5 of a file as lowercase hex, `None` if it doesn't exist
pub fn md5_of(path: &Path) -> CiResult<Option<String>> {
    let mut file = match std::fs::File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };

    let mut hasher = Md5::new();
    let mut buffer = vec![0u8; 1 << 16];
    loop {
        let read = file.read(&mut buffer)?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }
    Ok(Some(hex::encode(hasher.finalize())))
}

/// Deletes everything below `target` that is not one of `artifacts`, then
/// prunes directories left empty
fn remove_others(target: &Path, artifacts: &[Artifact]) -> CiResult<()> {
    let keep = artifacts
        .iter()
        .map(|a| target.join(&a.path))
        .chain([target.join(MANIFEST_FILE)])
        .collect::<BTreeSet<_>>();

    let root = target.to_string_lossy();
    let pattern = format!(
        "{}/**/*",
        glob::Pattern::escape(root.trim_end_matches('/'))
    );
    let options = glob::MatchOptions {
        require_literal_leading_dot: false,
        ..glob::MatchOptions::new()
    };
    let entries = glob::glob_with(&pattern, options)
        .map_err(|e| CiError::InvalidConfig(format!("{}: {e}", target.display())))?
        .filter_map(Result::ok)
        .collect::<Vec<_>>();

    let mut dirs = Vec::new();
    for entry in entries {
        if entry.is_dir() {
            dirs.push(entry);
        } else if !keep.contains(&entry) {
            tracing::info!("Remove {}", entry.display());
            std::fs::remove_file(&entry)?;
        }
    }

    // deepest first so parents become empty before they are checked
    dirs.sort_by_key(|dir| std::cmp::Reverse(dir.components().count()));
    for dir in dirs {
        let empty = std::fs::read_dir(&dir)?.next().is_none();
        if empty {
            tracing::debug!("Remove empty directory {}", dir.display());
            std::fs::remove_dir(&dir)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use ci_artifacts_api::BuildState;

    use super::*;
    use crate::test_support::{
        build,
        params,
        FakeJenkins,
    };

    const JOB: &str = "checkmk/master/winagt-build";

    fn finished(number: u64) -> BuildRecord {
        build(JOB, number, BuildState::Success, params(&[]))
    }

    #[tokio::test]
    async fn test_download_and_reconcile() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out");
        std::fs::create_dir_all(out.join("old")).unwrap();
        std::fs::write(out.join("check_mk_agent.msi"), b"msi v1").unwrap();
        std::fs::write(out.join("stale.txt"), b"from an earlier build").unwrap();
        std::fs::write(out.join("old/leftover.log"), b"log").unwrap();

        let api = FakeJenkins::new();
        api.add_artifact(12, "check_mk_agent.msi", b"msi v1", true);
        api.add_artifact(12, "plugins/mk_logwatch.py", b"print()", true);

        let options = DownloadOptions::default();
        let fetched = download(&api, &finished(12), Path::new("out"), dir.path(), &options)
            .await
            .unwrap();

        assert_eq!(fetched, vec!["check_mk_agent.msi", "plugins/mk_logwatch.py"]);
        assert_eq!(std::fs::read(out.join("check_mk_agent.msi")).unwrap(), b"msi v1");
        assert_eq!(std::fs::read(out.join("plugins/mk_logwatch.py")).unwrap(), b"print()");
        assert!(!out.join("stale.txt").exists());
        assert!(!out.join("old").exists());
        assert!(out.join(MANIFEST_FILE).exists());
        // the unchanged file was not downloaded again
        assert_eq!(api.called("download"), 1);

        let manifest = DownloadManifest::load(&out);
        assert_eq!(manifest.build, Some(12));
        assert_eq!(manifest.files.len(), 2);
    }

    #[tokio::test]
    async fn test_keep_other_files_when_asked() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"mine").unwrap();
        let api = FakeJenkins::new();
        api.add_artifact(13, "agent.deb", b"deb", true);
        let options = DownloadOptions {
            remove_others: false,
            ..DownloadOptions::default()
        };

        download(&api, &finished(13), Path::new("."), dir.path(), &options)
            .await
            .unwrap();

        assert!(dir.path().join("notes.txt").exists());
        assert!(dir.path().join("agent.deb").exists());
    }

    #[tokio::test]
    async fn test_hash_mismatch_triggers_download() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("agent.deb"), b"outdated").unwrap();
        let api = FakeJenkins::new();
        api.add_artifact(14, "agent.deb", b"fresh", true);

        let options = DownloadOptions::default();
        download(&api, &finished(14), Path::new(""), dir.path(), &options)
            .await
            .unwrap();

        assert_eq!(std::fs::read(dir.path().join("agent.deb")).unwrap(), b"fresh");
    }

    #[tokio::test]
    async fn test_no_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        let api = FakeJenkins::new();

        let options = DownloadOptions::default();
        let fetched = download(&api, &finished(15), Path::new("out"), dir.path(), &options)
            .await
            .unwrap();
        assert!(fetched.is_empty());

        let strict = DownloadOptions {
            strict: true,
            ..DownloadOptions::default()
        };
        let result = download(&api, &finished(15), Path::new("out"), dir.path(), &strict).await;
        assert!(matches!(result, Err(CiError::NoArtifacts(_))));
    }

    #[tokio::test]
    async fn test_transient_download_failures_are_retried() {
        let dir = tempfile::tempdir().unwrap();
        let api = FakeJenkins::new();
        api.add_artifact(16, "agent.rpm", b"rpm", false);
        api.fail_downloads(4);

        let options = DownloadOptions::default();
        let fetched = download(&api, &finished(16), Path::new(""), dir.path(), &options)
            .await
            .unwrap();
        assert_eq!(fetched, vec!["agent.rpm"]);
        assert_eq!(api.called("download"), 5);

        api.fail_downloads(5);
        let result = download(&api, &finished(16), Path::new("x"), dir.path(), &options).await;
        assert!(matches!(result, Err(CiError::TransientNetwork(_))));
        assert!(!dir.path().join("x/agent.rpm.part").exists());
    }

    #[tokio::test]
    async fn test_manifest_keeps_unfingerprinted_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        let api = FakeJenkins::new();
        api.add_artifact(18, "agent.rpm", b"rpm", false);
        let options = DownloadOptions::default();

        for _ in 0..2 {
            download(&api, &finished(18), Path::new("out"), dir.path(), &options)
                .await
                .unwrap();
        }
        assert_eq!(api.called("download"), 1);

        // a locally modified file no longer matches the manifest
        std::fs::write(dir.path().join("out/agent.rpm"), b"patched").unwrap();
        download(&api, &finished(18), Path::new("out"), dir.path(), &options)
            .await
            .unwrap();
        assert_eq!(api.called("download"), 2);
        assert_eq!(std::fs::read(dir.path().join("out/agent.rpm")).unwrap(), b"rpm");

        // the manifest of another build does not count
        api.add_artifact(19, "agent.rpm", b"rpm", false);
        download(&api, &finished(19), Path::new("out"), dir.path(), &options)
            .await
            .unwrap();
        assert_eq!(api.called("download"), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_download_timeout() {
        let dir = tempfile::tempdir().unwrap();
        let api = FakeJenkins::new();
        api.add_artifact(17, "huge.iso", b"iso", true);
        api.delay_downloads(Duration::from_secs(600));

        let options = DownloadOptions::default();
        let result = download(&api, &finished(17), Path::new(""), dir.path(), &options).await;
        assert!(matches!(result, Err(CiError::PollTimeout { .. })));
        assert!(!dir.path().join("huge.iso").exists());
    }

    #[test]
    fn test_artifact_paths_must_stay_inside() {
        let target = Path::new("/tmp/out");
        assert!(artifact_destination(target, "../etc/passwd").is_err());
        assert!(artifact_destination(target, "/etc/passwd").is_err());
        assert_eq!(
            artifact_destination(target, "sub/file.txt").unwrap(),
            PathBuf::from("/tmp/out/sub/file.txt")
        );
    }
}
