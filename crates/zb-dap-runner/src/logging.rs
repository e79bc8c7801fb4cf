use std::io;

use tracing::Subscriber;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, fmt};
use zb_dap_client::DiagnosticLog;

use crate::config::RunnerConfig;

fn console_filter(log_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| log_level.into())
}

/// Process-wide subscriber for everything outside a scenario.
pub fn init_tracing(config: &RunnerConfig) {
    tracing_subscriber::registry()
        .with(console_filter(&config.log_level))
        .with(fmt::layer().with_writer(io::stderr))
        .init();
}

/// Subscriber installed on a scenario's thread while it runs.
///
/// The console layer follows the configured filter; the capture layer records
/// everything down to `debug` into the scenario's log, shown if it fails.
pub fn scenario_subscriber(log_level: &str, log: DiagnosticLog) -> impl Subscriber + Send + Sync + use<> {
    let console = fmt::layer()
        .with_writer(io::stderr)
        .with_filter(console_filter(log_level));
    let capture = fmt::layer()
        .with_writer(log)
        .with_ansi(false)
        .with_target(true)
        .without_time()
        .with_filter(LevelFilter::DEBUG);

    tracing_subscriber::registry().with(console).with(capture)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scenario_subscriber_captures_debug_events() {
        let (log, rx) = DiagnosticLog::new();
        let subscriber = scenario_subscriber("off", log);

        tracing::subscriber::with_default(subscriber, || {
            tracing::debug!(command = "initialize", "Sending request");
            tracing::trace!("too chatty");
        });

        let captured = zb_dap_client::diagnostics::collect(&rx);
        assert!(captured.contains("Sending request"));
        assert!(captured.contains("command=\"initialize\""));
        assert!(!captured.contains("too chatty"));
    }
}
