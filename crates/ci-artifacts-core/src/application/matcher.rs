use std::collections::{
    BTreeMap,
    BTreeSet,
};

use chrono::{
    DateTime,
    Local,
};
use ci_artifacts_api::{
    BuildHandle,
    BuildRecord,
    BuildState,
    CiResult,
    JenkinsApi,
    JobInfo,
    JobPath,
    ParameterSet,
};
use ci_artifacts_jenkins::DEPENDENCY_HASHES_PARAM;

use crate::domain::constraint::MatchConstraint;
use crate::domain::fingerprint::requested_path_hashes;

/// Finds the most recent queued item or build satisfying `constraint`
///
/// Queued items are considered first since they are newer than any started
/// build. Started builds are inspected newest first, at most
/// `constraint.max_builds` of them.
pub async fn find_match(
    api: &dyn JenkinsApi, job: &JobPath, constraint: &MatchConstraint,
) -> CiResult<Option<BuildHandle>> {
    let info = api.job_info(job).await?;
    find_match_in(api, &info, &constraint.with_boolean_params(&info.boolean_params)).await
}

/// [`find_match`] for a job whose info is already known. `constraint` has to
/// be normalized for the job's boolean parameters.
pub async fn find_match_in(
    api: &dyn JenkinsApi, info: &JobInfo, constraint: &MatchConstraint,
) -> CiResult<Option<BuildHandle>> {
    let job = &info.path;
    if constraint.force_new_build {
        tracing::info!("--force-new-build given, not looking for existing builds of {job}");
        return Ok(None);
    }

    let ignore = ignore_list(constraint);
    let mut queued = api.queued_items(job).await?;
    queued.sort_by(|a, b| b.id.cmp(&a.id));
    for item in queued {
        if item.cancelled {
            continue;
        }
        if !params_match(&item.parameters, constraint, &ignore, &info.boolean_params) {
            tracing::debug!("queue item {} doesn't match: {}", item.id, item.parameters);
            continue;
        }
        if !hashes_match(requested_path_hashes(&item.parameters).as_ref(), constraint) {
            tracing::debug!("queue item {} has other dependency hashes", item.id);
            continue;
        }
        tracing::info!("Found matching queued build request: {}", item.describe());
        return Ok(Some(BuildHandle::Queued(item)));
    }

    let now = Local::now();
    for build_ref in info.builds.iter().take(constraint.max_builds) {
        let build = api.build_info(job, build_ref.number).await?;
        match check_build(&build, constraint, &ignore, &info.boolean_params, &now) {
            Verdict::Match => {
                tracing::info!(
                    "Found matching build: {} {} {} {}",
                    build.describe(),
                    build.timestamp,
                    build.state,
                    build.parameters
                );
                return Ok(Some(BuildHandle::Started(build)));
            }
            Verdict::Skip(reason) => {
                tracing::debug!("{} doesn't match: {reason}", build.describe());
            }
            Verdict::OutOfWindow => {
                tracing::debug!(
                    "{} started {} which is outside of '{}', stop looking",
                    build.describe(),
                    build.timestamp,
                    constraint.time_window
                );
                break;
            }
        }
    }

    tracing::info!("No matching build found for {job}");
    Ok(None)
}

enum Verdict {
    Match,
    Skip(String),
    /// Older builds can't be in the window either
    OutOfWindow,
}

fn check_build(
    build: &BuildRecord, constraint: &MatchConstraint, ignore: &BTreeSet<String>,
    boolean_keys: &BTreeSet<String>, now: &DateTime<Local>,
) -> Verdict {
    if build.state == BuildState::Unknown {
        return Verdict::Skip("result is unknown".to_string());
    }
    if !params_match(&build.parameters, constraint, ignore, boolean_keys) {
        return Verdict::Skip(format!("{} != {}", build.parameters, constraint.params));
    }
    if !constraint.time_window.contains(build.timestamp, now) {
        return Verdict::OutOfWindow;
    }
    if !hashes_match(build.path_hashes.as_ref(), constraint) {
        return Verdict::Skip(format!(
            "dependency hashes {:?} != {:?}",
            build.path_hashes, constraint.path_hashes
        ));
    }
    Verdict::Match
}

fn ignore_list(constraint: &MatchConstraint) -> BTreeSet<String> {
    let mut ignore = constraint.ignore.clone();
    ignore.insert(DEPENDENCY_HASHES_PARAM.to_string());
    ignore
}

fn params_match(
    candidate: &ParameterSet, constraint: &MatchConstraint, ignore: &BTreeSet<String>,
    boolean_keys: &BTreeSet<String>,
) -> bool {
    candidate
        .normalized(boolean_keys)
        .satisfies(&constraint.params, ignore)
}

/// A candidate without a fingerprint never matches a constraint that has one
fn hashes_match(
    candidate: Option<&BTreeMap<String, String>>, constraint: &MatchConstraint,
) -> bool {
    match &constraint.path_hashes {
        None => true,
        Some(expected) => candidate == Some(expected),
    }
}
