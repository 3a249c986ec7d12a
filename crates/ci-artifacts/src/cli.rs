use std::collections::{
    BTreeMap,
    BTreeSet,
};
use std::path::PathBuf;
use std::time::Duration;

use ci_artifacts_api::{
    normalize,
    parse_params,
    CiResult,
    JobPath,
    ParameterSet,
    RetryPolicy,
};
use ci_artifacts_core::domain::fingerprint::path_hashes;
use ci_artifacts_core::infrastructure::config::DefaultsConfig;
use ci_artifacts_core::{
    DownloadOptions,
    DownloadTarget,
    JobRequest,
    MatchConstraint,
    OnMissing,
    PollSettings,
    ReservationOptions,
    TimeWindow,
};
use clap::{
    Args,
    Parser,
    Subcommand,
};

#[derive(Debug, Parser)]
#[command(name = "ci-artifacts", version)]
#[command(about = "Find, trigger, await and download Jenkins builds", long_about = None)]
pub struct Cli {
    /// Used when RUST_LOG is not set
    #[arg(
        short,
        long,
        global = true,
        default_value = "info",
        ignore_case = true,
        value_parser = ["trace", "debug", "info", "warn", "error"]
    )]
    pub log_level: String,

    /// Config file, defaults to $CI_ARTIFACTS_CONFIG or <config dir>/ci-artifacts/config.toml
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// 'url', 'username' and 'password' or 'url_env', 'username_env' and
    /// 'password_env' naming environment variables. Falls back to the config
    /// file and then to ~/.config/jenkins_jobs/jenkins_jobs.ini
    #[arg(short, long, global = true, value_name = "KEY=VALUE,..")]
    pub credentials: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Find a matching build or trigger one, without waiting
    Request {
        #[command(flatten)]
        job: JobArgs,
    },

    /// Find or trigger a build and wait for its result
    AwaitResult {
        #[command(flatten)]
        job: JobArgs,
    },

    /// Like await-result, but a non-successful build is an error
    Validate {
        #[command(flatten)]
        job: JobArgs,
    },

    /// Download the artifacts of an existing matching build
    Download {
        #[command(flatten)]
        job: JobArgs,

        #[command(flatten)]
        download: DownloadArgs,
    },

    /// Find or trigger a build, wait for it and download its artifacts
    Fetch {
        #[command(flatten)]
        job: JobArgs,

        #[command(flatten)]
        download: DownloadArgs,
    },

    /// Describe a job or folder
    Info {
        job: JobPath,
    },

    /// List, reserve and unreserve lockable resources
    LockableResources {
        #[command(subcommand)]
        action: ResourceCommand,
    },
}

#[derive(Debug, Subcommand)]
pub enum ResourceCommand {
    /// List all resources grouped by label
    List,

    /// Reserve resources
    Reserve {
        #[command(flatten)]
        reservation: ReservationArgs,
    },

    /// Free resources
    Unreserve {
        #[command(flatten)]
        reservation: ReservationArgs,
    },
}

#[derive(Debug, Args)]
pub struct ReservationArgs {
    #[arg(required = true, value_name = "NAME")]
    pub names: Vec<String>,

    /// Only log what would be done
    #[arg(short = 'n', long)]
    pub dry_run: bool,

    /// Fail instead of warning when a resource is already locked
    #[arg(long)]
    pub fail_already_locked: bool,
}

impl ReservationArgs {
    pub fn options(&self) -> ReservationOptions {
        ReservationOptions {
            dry_run: self.dry_run,
            fail_already_locked: self.fail_already_locked,
        }
    }
}

#[derive(Debug, Args)]
pub struct JobArgs {
    /// Job path, e.g. folder/sub-folder/job
    pub job: JobPath,

    /// Parameters a build has to match, may be given more than once
    #[arg(short, long, value_name = "KEY=VALUE,..")]
    pub params: Vec<String>,

    /// Parameters only passed when a new build gets triggered
    #[arg(long, value_name = "KEY=VALUE,..")]
    pub params_no_check: Vec<String>,

    /// Parameters not compared when matching, defaults to the config file list
    #[arg(long, value_name = "KEY,..")]
    pub ignore_params: Option<String>,

    /// today, any, none, <N>h or <N>d
    #[arg(short, long, default_value = "today")]
    pub time_constraints: String,

    /// Paths below --base-dir whose content has to match the build's fingerprint
    #[arg(long, value_name = "PATH,..")]
    pub dependency_paths: Option<String>,

    /// Never trigger, report that nothing was found
    #[arg(long, conflicts_with = "passive")]
    pub omit_new_build: bool,

    /// Never trigger, report the request that would have been made
    #[arg(long)]
    pub passive: bool,

    /// Trigger a new build even if a matching one exists
    #[arg(long, conflicts_with_all = ["omit_new_build", "passive"])]
    pub force_new_build: bool,

    /// Seconds between polls of a running build
    #[arg(long, value_name = "SECS")]
    pub poll_sleep: Option<u64>,

    /// Seconds between polls of a queued build
    #[arg(long, value_name = "SECS")]
    pub poll_queue_sleep: Option<u64>,

    /// Give up waiting after this many seconds, the build keeps running
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Number of most recent builds inspected when matching
    #[arg(long, value_name = "N")]
    pub max_builds: Option<usize>,

    /// Treat a non-successful build or a build without artifacts as an error
    #[arg(long)]
    pub strict: bool,

    #[arg(long, default_value = ".", value_name = "DIR")]
    pub base_dir: PathBuf,
}

#[derive(Debug, Args)]
pub struct DownloadArgs {
    /// Relative to --base-dir
    #[arg(short, long, default_value = "out", value_name = "DIR")]
    pub out_dir: PathBuf,

    /// Keep files in the output directory which are not artifacts of the build
    #[arg(long)]
    pub no_remove_others: bool,

    /// Seconds a single artifact download may take
    #[arg(long, value_name = "SECS")]
    pub download_timeout: Option<u64>,
}

fn split_list(list: &str) -> impl Iterator<Item = String> + '_ {
    list.split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
}

/// Merges repeated `key=value,..` flags, later keys win
fn merged_params(packed: &[String]) -> CiResult<ParameterSet> {
    let mut raw = BTreeMap::new();
    for entry in packed {
        raw.extend(parse_params(entry)?);
    }
    Ok(normalize(&raw, &BTreeSet::new()))
}

impl JobArgs {
    pub fn to_request(&self, defaults: &DefaultsConfig) -> CiResult<JobRequest> {
        let mut constraint = MatchConstraint::new(merged_params(&self.params)?);
        constraint.params_no_check = merged_params(&self.params_no_check)?;
        constraint.ignore = match &self.ignore_params {
            Some(list) => split_list(list).collect(),
            None => defaults.ignore_params.iter().cloned().collect(),
        };
        constraint.time_window = self.time_constraints.parse::<TimeWindow>()?;
        constraint.force_new_build = self.force_new_build;
        constraint.max_builds = self.max_builds.unwrap_or(defaults.max_builds);

        if let Some(paths) = &self.dependency_paths {
            let paths = split_list(paths).collect::<Vec<_>>();
            let hashes = path_hashes(&self.base_dir, &paths)?;
            tracing::debug!("Dependency fingerprint: {hashes:?}");
            constraint.path_hashes = Some(hashes);
        }

        let on_missing = if self.omit_new_build {
            OnMissing::Omit
        } else if self.passive {
            OnMissing::Passive
        } else {
            OnMissing::Trigger
        };

        Ok(JobRequest {
            job: self.job.clone(),
            constraint,
            on_missing,
        })
    }

    pub fn poll_settings(&self, defaults: &DefaultsConfig) -> PollSettings {
        PollSettings {
            queue_interval: Duration::from_secs(
                self.poll_queue_sleep
                    .unwrap_or(defaults.poll_queue_sleep_secs),
            ),
            build_interval: Duration::from_secs(
                self.poll_sleep.unwrap_or(defaults.poll_build_sleep_secs),
            ),
            timeout: self.timeout.map(Duration::from_secs),
            strict: self.strict,
        }
    }

    pub fn download_target(
        &self, download: &DownloadArgs, defaults: &DefaultsConfig,
    ) -> DownloadTarget {
        DownloadTarget {
            base_dir: self.base_dir.clone(),
            out_dir: download.out_dir.clone(),
            options: DownloadOptions {
                remove_others: !download.no_remove_others,
                strict: self.strict,
                timeout: Duration::from_secs(
                    download
                        .download_timeout
                        .unwrap_or(defaults.download_timeout_secs),
                ),
                retry: RetryPolicy::new(defaults.retry_attempts, Duration::ZERO, false),
            },
        }
    }
}

/// Parses the packed `--credentials` value
pub fn credential_map(packed: Option<&str>) -> CiResult<Option<BTreeMap<String, String>>> {
    packed.map(parse_params).transpose()
}

#[cfg(test)]
mod tests {
    use ci_artifacts_api::{
        CiError,
        ParamValue,
    };

    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(args).unwrap()
    }

    fn job_args(cli: Cli) -> JobArgs {
        match cli.command {
            Command::Request { job }
            | Command::AwaitResult { job }
            | Command::Validate { job }
            | Command::Download { job, .. }
            | Command::Fetch { job, .. } => job,
            other => panic!("not a job command: {other:?}"),
        }
    }

    #[test]
    fn test_request_flags() {
        let cli = parse(&[
            "ci-artifacts",
            "-l",
            "DEBUG",
            "request",
            "/checkmk/master/builders/build-cmk-distro-package/",
            "-p",
            "EDITION=enterprise,DISTRO=ubuntu-22.04",
            "--params",
            "DISTRO=debian-12,FAKE_WINDOWS_ARTIFACTS=true",
            "--params-no-check",
            "CUSTOM_GIT_REF=abc123",
            "--time-constraints",
            "2d",
            "--omit-new-build",
        ]);
        assert_eq!(cli.log_level, "DEBUG");

        let request = job_args(cli)
            .to_request(&DefaultsConfig::default())
            .unwrap();
        assert_eq!(
            request.job.as_str(),
            "checkmk/master/builders/build-cmk-distro-package"
        );
        assert_eq!(request.on_missing, OnMissing::Omit);

        let params = &request.constraint.params;
        assert_eq!(
            params.get("DISTRO"),
            Some(&ParamValue::Text("debian-12".into()))
        );
        assert_eq!(
            params.get("FAKE_WINDOWS_ARTIFACTS"),
            Some(&ParamValue::Bool(true))
        );
        assert_eq!(params.len(), 3);
        assert!(request
            .constraint
            .params_no_check
            .contains_key("CUSTOM_GIT_REF"));
        assert_eq!(request.constraint.time_window.to_string(), "2d");
        assert!(request.constraint.ignore.contains("DISABLE_CACHE"));
    }

    #[test]
    fn test_defaults_from_config() {
        let defaults = DefaultsConfig {
            poll_queue_sleep_secs: 5,
            poll_build_sleep_secs: 7,
            max_builds: 10,
            ..DefaultsConfig::default()
        };
        let args = job_args(parse(&[
            "ci-artifacts",
            "await-result",
            "job",
            "--poll-sleep",
            "3",
            "--ignore-params",
            "A, B",
        ]));

        let poll = args.poll_settings(&defaults);
        assert_eq!(poll.queue_interval, Duration::from_secs(5));
        assert_eq!(poll.build_interval, Duration::from_secs(3));
        assert!(poll.timeout.is_none());

        let request = args.to_request(&defaults).unwrap();
        assert_eq!(request.constraint.max_builds, 10);
        assert_eq!(
            request.constraint.ignore,
            BTreeSet::from(["A".to_string(), "B".to_string()])
        );
    }

    #[test]
    fn test_fetch_download_target() {
        let cli = parse(&[
            "ci-artifacts",
            "fetch",
            "job",
            "--base-dir",
            "/tmp/checkout",
            "--no-remove-others",
            "--download-timeout",
            "30",
        ]);
        let Command::Fetch { job, download } = cli.command else {
            panic!("expected fetch");
        };
        let target = job.download_target(&download, &DefaultsConfig::default());
        assert_eq!(target.out_dir, PathBuf::from("out"));
        assert_eq!(target.base_dir, PathBuf::from("/tmp/checkout"));
        assert!(!target.options.remove_others);
        assert_eq!(target.options.timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_malformed_params() {
        let args = job_args(parse(&["ci-artifacts", "request", "job", "-p", "EDITION"]));
        let err = args.to_request(&DefaultsConfig::default()).unwrap_err();
        assert!(matches!(err, CiError::ParameterFormat(_)));

        let args = job_args(parse(&["ci-artifacts", "request", "job", "-t", "soon"]));
        let err = args.to_request(&DefaultsConfig::default()).unwrap_err();
        assert!(matches!(err, CiError::ParameterFormat(_)));
    }

    #[test]
    fn test_conflicting_flags() {
        let result = Cli::try_parse_from([
            "ci-artifacts",
            "request",
            "job",
            "--passive",
            "--force-new-build",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_lockable_resources() {
        let cli = parse(&[
            "ci-artifacts",
            "lockable-resources",
            "reserve",
            "win-vm-1",
            "win-vm-2",
            "--dry-run",
        ]);
        let Command::LockableResources {
            action: ResourceCommand::Reserve { reservation },
        } = cli.command
        else {
            panic!("expected reserve");
        };
        assert_eq!(reservation.names, ["win-vm-1", "win-vm-2"]);
        assert!(reservation.options().dry_run);

        assert!(Cli::try_parse_from(["ci-artifacts", "lockable-resources", "unreserve"]).is_err());
    }

    #[test]
    fn test_credential_map() {
        let map = credential_map(Some("url=https://ci,username_env=CI_USER,password_env=CI_PW"))
            .unwrap()
            .unwrap();
        assert_eq!(map["username_env"], "CI_USER");
        assert!(credential_map(None).unwrap().is_none());
    }
}
