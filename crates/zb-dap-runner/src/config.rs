use std::env;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;

use zb_dap_client::LaunchConfig;

use crate::scenario::Target;

/// Paths of the circuit debugged by CVM scenarios, relative to the working directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CvmTarget {
    pub artifact: PathBuf,
    pub calldata: PathBuf,
    pub source: PathBuf,
}

/// Paths of the contract test debugged by TXE scenarios, relative to the working directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxeTarget {
    pub test: PathBuf,
    pub source: PathBuf,
}

#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// The `zb` binary. Paths with a directory part are resolved against `workdir`.
    pub adapter: PathBuf,
    pub workdir: PathBuf,
    pub cvm: CvmTarget,
    pub txe: TxeTarget,
    pub request_timeout: Duration,
    pub scenario_timeout: Duration,
    pub grace_period: Duration,
    pub jobs: usize,
    pub log_level: String,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            adapter: PathBuf::from("./zig-out/bin/zb"),
            workdir: PathBuf::from("."),
            cvm: CvmTarget {
                artifact: PathBuf::from("./simple_test/target/simple_test.json"),
                calldata: PathBuf::from("./simple_test/Prover.toml"),
                source: PathBuf::from("simple_test/src/main.nr"),
            },
            txe: TxeTarget {
                test: PathBuf::from(
                    "./aztec-packages/noir-projects/noir-contracts/target/tests/Counter__extended_incrementing_and_decrementing_pass.json",
                ),
                source: PathBuf::from(
                    "aztec-packages/noir-projects/noir-contracts/contracts/test/counter_contract/src/main.nr",
                ),
            },
            request_timeout: zb_dap_client::session::DEFAULT_REQUEST_TIMEOUT,
            scenario_timeout: Duration::from_secs(60),
            grace_period: zb_dap_client::process::DEFAULT_GRACE_PERIOD,
            jobs: std::thread::available_parallelism()
                .map(usize::from)
                .unwrap_or(4),
            log_level: "zb_dap_runner=info,zb_dap_client=info".to_string(),
        }
    }
}

impl RunnerConfig {
    pub fn from_env() -> Self {
        Self::from_vars(|key| env::var(key).ok())
    }

    /// Builds a config from the `ZB_DAP_*` variables returned by `lookup`.
    pub fn from_vars<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        let path = |key: &str, target: &mut PathBuf| {
            if let Some(value) = lookup(key).filter(|value| !value.is_empty()) {
                *target = PathBuf::from(value);
            }
        };
        path("ZB_DAP_ADAPTER", &mut config.adapter);
        path("ZB_DAP_WORKDIR", &mut config.workdir);
        path("ZB_DAP_CVM_ARTIFACT", &mut config.cvm.artifact);
        path("ZB_DAP_CVM_CALLDATA", &mut config.cvm.calldata);
        path("ZB_DAP_CVM_SOURCE", &mut config.cvm.source);
        path("ZB_DAP_TXE_TEST", &mut config.txe.test);
        path("ZB_DAP_TXE_SOURCE", &mut config.txe.source);

        if let Some(ms) = parse_var::<u64, _>(&lookup, "ZB_DAP_TIMEOUT_MS", config.request_timeout.as_millis()) {
            config.request_timeout = Duration::from_millis(ms);
        }
        if let Some(secs) =
            parse_var::<u64, _>(&lookup, "ZB_DAP_SCENARIO_TIMEOUT_SECS", config.scenario_timeout.as_secs())
        {
            config.scenario_timeout = Duration::from_secs(secs);
        }
        if let Some(ms) = parse_var::<u64, _>(&lookup, "ZB_DAP_GRACE_MS", config.grace_period.as_millis()) {
            config.grace_period = Duration::from_millis(ms);
        }
        if let Some(jobs) = parse_var::<usize, _>(&lookup, "ZB_DAP_JOBS", config.jobs) {
            if jobs > 0 {
                config.jobs = jobs;
            } else {
                eprintln!("Warning: ZB_DAP_JOBS must be at least 1, using default {}", config.jobs);
            }
        }

        if let Some(log_level) = lookup("RUST_LOG") {
            config.log_level = log_level;
        } else if let Some(log_level) = lookup("ZB_DAP_LOG") {
            config.log_level = log_level;
        }

        config
    }

    /// Resolves a path from the config against the working directory.
    pub fn resolve(&self, path: &Path) -> PathBuf {
        let joined = self.workdir.join(path);
        std::path::absolute(&joined).unwrap_or(joined)
    }

    /// The adapter program; a bare command name is left for `PATH` lookup.
    pub fn adapter_program(&self) -> PathBuf {
        if self.adapter.components().count() > 1 {
            self.resolve(&self.adapter)
        } else {
            self.adapter.clone()
        }
    }

    /// Source file of the given target as an absolute path, the way an editor sends it.
    pub fn source_for(&self, target: Target) -> PathBuf {
        match target {
            Target::Cvm => self.resolve(&self.cvm.source),
            Target::Txe => self.resolve(&self.txe.source),
        }
    }

    /// The adapter invocation for one scenario. `extra_args` go before the subcommand.
    pub fn launch_for(&self, label: &str, target: Target, extra_args: &[&str]) -> LaunchConfig {
        let args: Vec<OsString> = match target {
            Target::Cvm => vec![
                "cvm".into(),
                "run".into(),
                "--artifact_path".into(),
                self.cvm.artifact.clone().into_os_string(),
                "--calldata_path".into(),
                self.cvm.calldata.clone().into_os_string(),
                "--debug-dap".into(),
            ],
            Target::Txe => vec![
                "txe".into(),
                self.txe.test.clone().into_os_string(),
                "--debug-dap".into(),
            ],
        };

        LaunchConfig::new(self.adapter_program())
            .args(extra_args.iter().copied())
            .args(args)
            .current_dir(&self.workdir)
            .label(label)
            .grace_period(self.grace_period)
    }
}

fn parse_var<T, F>(lookup: &F, key: &str, default: impl std::fmt::Display) -> Option<T>
where
    T: std::str::FromStr,
    F: Fn(&str) -> Option<String>,
{
    let value = lookup(key)?;
    match value.trim().parse::<T>() {
        Ok(parsed) => Some(parsed),
        Err(_) => {
            eprintln!("Warning: Invalid {} value '{}', using default {}", key, value, default);
            None
        }
    }
}
