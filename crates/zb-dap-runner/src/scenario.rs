use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crossbeam_channel::Sender;
use miette::IntoDiagnostic;
use zb_dap_client::{DiagnosticLog, KillSwitch, LaunchConfig, Session};

/// Which `zb` subcommand a scenario debugs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Target {
    Cvm,
    Txe,
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::Cvm => write!(f, "cvm"),
            Target::Txe => write!(f, "txe"),
        }
    }
}

pub type ScenarioFn = fn(&mut Session, &ScenarioContext) -> miette::Result<()>;

/// One entry of the catalog: a script run against a freshly spawned adapter.
#[derive(Debug, Clone, Copy)]
pub struct Scenario {
    pub name: &'static str,
    pub description: &'static str,
    pub target: Target,
    /// Passed to the adapter ahead of the subcommand.
    pub extra_args: &'static [&'static str],
    pub run: ScenarioFn,
}

impl Scenario {
    pub const fn new(name: &'static str, target: Target, description: &'static str, run: ScenarioFn) -> Self {
        Self {
            name,
            description,
            target,
            extra_args: &[],
            run,
        }
    }

    pub const fn with_args(mut self, extra_args: &'static [&'static str]) -> Self {
        self.extra_args = extra_args;
        self
    }
}

/// What a running scenario knows about its environment.
pub struct ScenarioContext {
    pub target: Target,
    /// Absolute path of the target's main source file.
    pub source: PathBuf,
    launch: LaunchConfig,
    log: DiagnosticLog,
    request_timeout: Duration,
    kill_switches: Sender<KillSwitch>,
}

impl ScenarioContext {
    pub fn new(
        target: Target,
        source: PathBuf,
        launch: LaunchConfig,
        log: DiagnosticLog,
        request_timeout: Duration,
        kill_switches: Sender<KillSwitch>,
    ) -> Self {
        Self {
            target,
            source,
            launch,
            log,
            request_timeout,
            kill_switches,
        }
    }

    pub fn source_path(&self) -> String {
        self.source.to_string_lossy().to_string()
    }

    /// Another file next to the main source.
    pub fn sibling_source(&self, file_name: &str) -> String {
        self.source
            .parent()
            .unwrap_or_else(|| Path::new("."))
            .join(file_name)
            .to_string_lossy()
            .to_string()
    }

    /// Spawns a new adapter session, guarded by the same watchdog as the scenario.
    pub fn spawn_session(&self) -> miette::Result<Session> {
        let mut session = Session::spawn(&self.launch, self.log.clone()).into_diagnostic()?;
        session.set_default_timeout(self.request_timeout);
        if let Some(switch) = session.kill_switch() {
            // The watchdog is gone once the scenario finished; nothing left to guard.
            let _ = self.kill_switches.send(switch);
        }
        Ok(session)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context(source: &str) -> ScenarioContext {
        let (log, _rx) = DiagnosticLog::new();
        let (tx, _switches) = crossbeam_channel::unbounded();
        ScenarioContext::new(
            Target::Cvm,
            PathBuf::from(source),
            LaunchConfig::new("zb"),
            log,
            Duration::from_secs(2),
            tx,
        )
    }

    #[test]
    fn test_sibling_source() {
        let ctx = context("/work/simple_test/src/main.nr");
        assert_eq!(ctx.source_path(), "/work/simple_test/src/main.nr");
        assert_eq!(ctx.sibling_source("helpers.nr"), "/work/simple_test/src/helpers.nr");
    }

    #[test]
    fn test_spawn_failure_is_a_diagnostic() {
        let ctx = context("/work/simple_test/src/main.nr");
        let ctx = ScenarioContext {
            launch: LaunchConfig::new("./zig-out/bin/zb-does-not-exist"),
            ..ctx
        };
        let err = ctx.spawn_session().err().unwrap();
        assert!(err.to_string().contains("zb-does-not-exist"));
    }

    #[test]
    fn test_with_args() {
        fn noop(_: &mut Session, _: &ScenarioContext) -> miette::Result<()> {
            Ok(())
        }
        let scenario = Scenario::new("noop", Target::Txe, "does nothing", noop).with_args(&["--fault", "crash"]);
        assert_eq!(scenario.extra_args, &["--fault", "crash"]);
        assert_eq!(scenario.target.to_string(), "txe");
    }
}
