//! Console and optional file logging.

use eyre::{Result, WrapErr};
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::filter::{EnvFilter, LevelFilter};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{Layer, Registry, fmt};

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

fn filter_for(level: &str) -> Result<EnvFilter> {
    let lf: LevelFilter = level.parse().map_err(|_| {
        eyre::eyre!("invalid log level '{level}' (expected error|warn|info|debug|trace|off)")
    })?;
    Ok(EnvFilter::default().add_directive(lf.into()))
}

/// Console level: `--log-level` if given, else `[logging].level`, else info.
pub fn console_level<'a>(cli: Option<&'a str>, file_cfg: &'a gaze_config::Logging) -> &'a str {
    cli.or(file_cfg.level.as_deref()).unwrap_or("info")
}

/// Install the global subscriber.
///
/// Console output goes to stderr so stdout stays clean for results. `RUST_LOG`
/// overrides both `--log-level` and `[logging].level`. When `[logging].file`
/// is set, JSON lines are also written there through a non-blocking
/// appender. Keep the returned guard alive until exit or buffered lines are
/// lost.
pub fn init_tracing(
    json: bool,
    cli_level: Option<&str>,
    file_cfg: &gaze_config::Logging,
) -> Result<Option<WorkerGuard>> {
    let level = console_level(cli_level, file_cfg);
    let console_filter = match EnvFilter::try_from_default_env() {
        Ok(f) => f,
        Err(_) => filter_for(level)?,
    };
    let console: BoxedLayer = if json {
        fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_filter(console_filter)
            .boxed()
    } else {
        fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(false)
            .with_filter(console_filter)
            .boxed()
    };
    let mut layers = vec![console];
    let mut guard = None;

    if let Some(path) = file_cfg.file.as_deref() {
        let path = Path::new(path);
        let dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let name = path
            .file_name()
            .ok_or_else(|| eyre::eyre!("logging.file has no file name: {path:?}"))?;
        std::fs::create_dir_all(dir).wrap_err_with(|| format!("create log dir {dir:?}"))?;
        let appender = match file_cfg.rotation.as_deref().unwrap_or("never") {
            "never" => tracing_appender::rolling::never(dir, name),
            "daily" => tracing_appender::rolling::daily(dir, name),
            "hourly" => tracing_appender::rolling::hourly(dir, name),
            other => eyre::bail!("logging.rotation must be never|daily|hourly, got '{other}'"),
        };
        let (writer, g) = tracing_appender::non_blocking(appender);
        guard = Some(g);
        let file_filter = filter_for(file_cfg.level.as_deref().unwrap_or(level))?;
        layers.push(
            fmt::layer()
                .json()
                .with_ansi(false)
                .with_writer(writer)
                .with_filter(file_filter)
                .boxed(),
        );
    }

    tracing_subscriber::registry()
        .with(layers)
        .try_init()
        .wrap_err("install tracing subscriber")?;
    Ok(guard)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn logging(level: Option<&str>) -> gaze_config::Logging {
        gaze_config::Logging {
            level: level.map(str::to_string),
            ..Default::default()
        }
    }

    #[test]
    fn console_level_prefers_flag_then_config() {
        assert_eq!(console_level(Some("warn"), &logging(Some("debug"))), "warn");
        assert_eq!(console_level(None, &logging(Some("debug"))), "debug");
        assert_eq!(console_level(None, &logging(None)), "info");
    }

    #[test]
    fn bad_levels_are_rejected() {
        assert!(filter_for("trace").is_ok());
        assert!(filter_for("loud").is_err());
    }
}
