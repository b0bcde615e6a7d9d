//! Tracing subscriber setup: console output plus an optional JSON-lines file.

use std::path::Path;

use microdoser_config::Logging;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::prelude::*;

use crate::cli::FILE_GUARD;

/// Install the global subscriber.
///
/// Level priority: `RUST_LOG`, then `--log-level`, then `logging.level` from
/// the config. Console logs go to stderr so stdout stays machine-readable.
pub fn init(json: bool, cli_level: &str, cfg: &Logging) {
    let filter = build_filter(cli_level, cfg.level.as_deref());

    let json_console = json.then(|| fmt::layer().json().with_writer(std::io::stderr));
    let pretty_console = (!json).then(|| {
        fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(false)
    });

    let file_layer = cfg.file.as_deref().map(|file| {
        let appender = rolling_appender(Path::new(file), cfg.rotation.as_deref());
        let (writer, guard) = tracing_appender::non_blocking(appender);
        let _ = FILE_GUARD.set(guard);
        fmt::layer().json().with_ansi(false).with_writer(writer)
    });

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(json_console)
        .with(pretty_console)
        .with(file_layer)
        .try_init();
}

fn build_filter(cli_level: &str, cfg_level: Option<&str>) -> EnvFilter {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return filter;
    }
    // an explicit non-default CLI level wins over the config file
    let level = match cfg_level {
        Some(l) if cli_level == "info" => l,
        _ => cli_level,
    };
    EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"))
}

fn rolling_appender(
    path: &Path,
    rotation: Option<&str>,
) -> tracing_appender::rolling::RollingFileAppender {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let name = path
        .file_name()
        .map_or_else(|| "microdoser.log".into(), |n| n.to_os_string());
    match rotation {
        Some("daily") => tracing_appender::rolling::daily(dir, name),
        Some("hourly") => tracing_appender::rolling::hourly(dir, name),
        _ => tracing_appender::rolling::never(dir, name),
    }
}
