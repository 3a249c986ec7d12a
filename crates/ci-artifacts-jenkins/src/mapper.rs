//! Mapping of raw Jenkins payloads into the typed build model

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::Utc;
use ci_artifacts_api::{
    parse_params,
    Artifact,
    BuildRecord,
    BuildRef,
    BuildState,
    CiError,
    CiResult,
    JobInfo,
    JobKind,
    JobPath,
    LockableResource,
    ParamValue,
    ParameterSet,
    QueueItem,
};

use crate::config::DEPENDENCY_HASHES_PARAM;
use crate::types;

fn required<T>(value: Option<T>, field: &str, context: &str) -> CiResult<T> {
    value.ok_or_else(|| CiError::RemoteSchema(format!("{context}: missing field '{field}'")))
}

fn class_name(class: &str) -> &str {
    class.rsplit('.').next().unwrap_or(class)
}

/// Maps a Jenkins build result to a [`BuildState`]
pub(crate) fn map_jenkins_result(
    building: bool, in_progress: bool, result: Option<&str>,
) -> BuildState {
    if building || in_progress {
        return BuildState::Running;
    }
    match result {
        Some("SUCCESS") => BuildState::Success,
        Some("FAILURE") => BuildState::Failure,
        Some("UNSTABLE") => BuildState::Unstable,
        Some("ABORTED") => BuildState::Aborted,
        Some("NOT_BUILT") => BuildState::NotBuilt,
        other => {
            tracing::error!("Build result has unexpected value {other:?}");
            BuildState::Unknown
        }
    }
}

pub(crate) fn map_job_kind(class: &str) -> JobKind {
    match class_name(class) {
        "Folder" | "OrganizationFolder" => JobKind::Folder,
        "WorkflowJob" => JobKind::Workflow,
        "FreeStyleProject" => JobKind::Freestyle,
        "WorkflowMultiBranchProject" => JobKind::MultiBranch,
        _ => JobKind::Other,
    }
}

fn parameters_from(actions: &[Option<types::BuildAction>]) -> ParameterSet {
    actions
        .iter()
        .flatten()
        .filter(|action| {
            action
                ._class
                .as_deref()
                .map(|class| class_name(class) == "ParametersAction")
                .unwrap_or(!action.parameters.is_empty())
        })
        .flat_map(|action| action.parameters.iter())
        .map(|param| {
            (
                param.name.clone(),
                ParamValue::from_json(&param.value, false),
            )
        })
        .collect()
}

/// Dependency fingerprint as stored by the pipeline in its custom build
/// properties, falling back to the parameter we pass when triggering
fn path_hashes_from(
    actions: &[Option<types::BuildAction>], parameters: &ParameterSet,
) -> Option<BTreeMap<String, String>> {
    let from_properties = actions
        .iter()
        .flatten()
        .filter(|action| {
            action
                ._class
                .as_deref()
                .is_some_and(|class| class_name(class) == "CustomBuildPropertiesAction")
        })
        .find_map(|action| action.properties.as_ref()?.get("path_hashes")?.as_object())
        .map(|hashes| {
            hashes
                .iter()
                .filter_map(|(path, hash)| Some((path.clone(), hash.as_str()?.to_string())))
                .collect::<BTreeMap<_, _>>()
        });

    from_properties.or_else(|| match parameters.get(DEPENDENCY_HASHES_PARAM)? {
        ParamValue::Text(packed) => parse_params(packed)
            .ok()
            .map(|hashes| hashes.into_iter().collect()),
        _ => None,
    })
}

pub(crate) fn map_build(job: &JobPath, build: types::Build) -> CiResult<BuildRecord> {
    let context = format!("build of {job}");
    let number = required(build.number, "number", &context)?;
    let context = format!("{job}#{number}");
    let url = required(build.url, "url", &context)?;
    let timestamp = required(build.timestamp, "timestamp", &context)?;
    let timestamp = chrono::DateTime::from_timestamp_millis(timestamp)
        .map(|dt| dt.with_timezone(&Utc))
        .ok_or_else(|| CiError::RemoteSchema(format!("{context}: invalid timestamp")))?;

    let state = map_jenkins_result(build.building, build.in_progress, build.result.as_deref());
    let parameters = parameters_from(&build.actions);
    let path_hashes = path_hashes_from(&build.actions, &parameters);

    let artifacts = build
        .artifacts
        .into_iter()
        .map(|artifact| required(artifact.relative_path, "relativePath", &context))
        .collect::<CiResult<Vec<_>>>()?;

    Ok(BuildRecord {
        job: job.clone(),
        number,
        url,
        timestamp,
        duration: Duration::from_millis(build.duration.max(0) as u64),
        state,
        parameters,
        artifacts,
        path_hashes,
    })
}

pub(crate) fn map_queue_item(job: &JobPath, item: types::QueueItem) -> CiResult<QueueItem> {
    let id = required(item.id, "id", &format!("queue item of {job}"))?;
    Ok(QueueItem {
        job: job.clone(),
        id,
        parameters: parameters_from(&item.actions),
        executable: item.executable.and_then(|executable| executable.number),
        cancelled: item.cancelled,
        why: item.why,
    })
}

fn map_build_ref(build: types::BuildRef, context: &str) -> CiResult<BuildRef> {
    Ok(BuildRef {
        number: required(build.number, "number", context)?,
        url: build.url.unwrap_or_default(),
    })
}

const BOOLEAN_PARAMETER_TYPE: &str = "BooleanParameterDefinition";

pub(crate) fn map_job(path: &JobPath, job: types::Job) -> CiResult<JobInfo> {
    let context = format!("job {path}");
    let class = required(job._class, "_class", &context)?;
    let url = required(job.url, "url", &context)?;

    let mut builds = job
        .builds
        .into_iter()
        .map(|build| map_build_ref(build, &context))
        .collect::<CiResult<Vec<_>>>()?;
    builds.sort_by(|a, b| b.number.cmp(&a.number));

    if let Some(full_name) = job.full_name.as_deref() {
        if full_name != path.as_str() {
            tracing::debug!("Job {path} reports full name {full_name}");
        }
    }

    let boolean_params = job
        .property
        .into_iter()
        .flat_map(|property| property.parameter_definitions)
        .filter(|definition| definition.kind.as_deref() == Some(BOOLEAN_PARAMETER_TYPE))
        .filter_map(|definition| definition.name)
        .collect();

    Ok(JobInfo {
        path: path.clone(),
        name: job.name.unwrap_or_else(|| path.name().to_string()),
        url,
        kind: map_job_kind(&class),
        class,
        builds,
        in_queue: job.in_queue,
        children: job.jobs.into_iter().filter_map(|child| child.name).collect(),
        last_successful_build: job.last_successful_build.and_then(|b| b.number),
        last_completed_build: job.last_completed_build.and_then(|b| b.number),
        boolean_params,
    })
}

fn file_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

/// Hash of the fingerprint recorded for `path`. Fingerprints usually carry the
/// bare file name only, a name shared by several fingerprints gives no hash.
fn fingerprint_hash<'a>(
    fingerprints: &'a [(String, Option<String>)], path: &str,
) -> Option<&'a str> {
    if let Some((_, hash)) = fingerprints.iter().find(|(name, _)| name == path) {
        return hash.as_deref();
    }
    let name = file_name(path);
    let mut same_name = fingerprints.iter().filter(|(other, _)| other == name);
    match (same_name.next(), same_name.next()) {
        (Some((_, hash)), None) => hash.as_deref(),
        _ => None,
    }
}

/// Pairs the artifacts of a build with the MD5 hashes of its fingerprints.
/// An exact relative path wins over a matching file name.
pub(crate) fn map_artifacts(
    build: &BuildRecord, response: types::FingerprintResponse,
) -> CiResult<Vec<Artifact>> {
    let fingerprints = response
        .fingerprint
        .into_iter()
        .map(|fingerprint| {
            Ok((
                required(fingerprint.file_name, "fileName", "fingerprint")?,
                fingerprint.hash,
            ))
        })
        .collect::<CiResult<Vec<_>>>()?;

    if build.artifacts.is_empty() {
        return Ok(fingerprints
            .into_iter()
            .map(|(path, md5)| Artifact { path, md5 })
            .collect());
    }

    Ok(build
        .artifacts
        .iter()
        .map(|path| Artifact {
            path: path.clone(),
            md5: fingerprint_hash(&fingerprints, path).map(str::to_string),
        })
        .collect())
}

pub(crate) fn map_resource(resource: types::Resource) -> CiResult<LockableResource> {
    Ok(LockableResource {
        name: required(resource.name, "name", "lockable resource")?,
        labels: resource.labels_as_list,
        description: resource.description,
        locked: resource.locked,
        reserved: resource.reserved,
        reserved_by: resource.reserved_by,
    })
}
