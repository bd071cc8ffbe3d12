use std::io::IsTerminal;
use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Configuration for the logging system
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Log level for this crate when `RUST_LOG` is unset (default: WARN)
    pub level: Level,
    /// Whether to colorize logs when output is a terminal (default: true)
    pub colorize: bool,
    /// Targets the level applies to (default: "qalamx")
    pub log_targets: Vec<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: Level::WARN,
            colorize: true,
            log_targets: vec!["qalamx".to_string()],
        }
    }
}

fn filter_for(config: &LoggingConfig) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = config.level.as_str().to_ascii_lowercase();
        let directives = config
            .log_targets
            .iter()
            .map(|target| format!("{target}={level}"))
            .collect::<Vec<_>>()
            .join(",");
        EnvFilter::new(directives)
    })
}

fn use_ansi(config: &LoggingConfig, stderr_is_terminal: bool) -> bool {
    config.colorize && stderr_is_terminal
}

/// Installs a stderr subscriber. Stdout stays reserved for the answer text.
///
/// Repeated initialization is ignored.
pub fn init_logging(config: LoggingConfig) {
    let layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_ansi(use_ansi(&config, std::io::stderr().is_terminal()))
        .with_target(true);

    let _ = tracing_subscriber::registry()
        .with(filter_for(&config))
        .with(layer)
        .try_init();
}
