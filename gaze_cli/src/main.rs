mod cli;
mod commands;
mod error_fmt;
mod logging;

use clap::Parser;
use cli::{Cli, DEFAULT_CONFIG, JSON_MODE};
use eyre::{Result, WrapErr};
use gaze_core::config::RigCfg;
use std::path::Path;

fn load_config(path: Option<&Path>) -> Result<gaze_config::Config> {
    match path {
        Some(p) => gaze_config::load_file(p),
        None if Path::new(DEFAULT_CONFIG).exists() => gaze_config::load_file(Path::new(DEFAULT_CONFIG)),
        None => Ok(gaze_config::Config::default()),
    }
}

fn real_main(cli: &Cli) -> Result<()> {
    let cfg = load_config(cli.config.as_deref())?;
    let _log_guard = logging::init_tracing(cli.json, cli.log_level.as_deref(), &cfg.logging)?;
    tracing::debug!(config = ?cli.config, "config loaded");

    let mut rig = RigCfg::from(&cfg);
    commands::apply_overrides(&mut rig, &cli.cmd);
    let mut sup = commands::build_supervisor(&cfg, rig)?;

    // Ctrl-C only flips the running flag; loops notice at their next check.
    let running = sup.running();
    ctrlc::set_handler(move || {
        if running.is_running() {
            eprintln!("\nCtrl-C: stopping, returning to neutral...");
        }
        running.cancel();
    })
    .wrap_err("install Ctrl-C handler")?;

    // No sensor, no rig.
    sup.init_sensor()?;

    let result = commands::run(&mut sup, &cli.cmd);
    let parked = sup.shutdown();
    if !parked.all_confirmed() {
        tracing::warn!(
            failed = parked.failed.len(),
            pending = parked.pending.len(),
            "not every channel confirmed neutral on exit"
        );
    }

    let out = result?;
    if cli.json {
        println!("{}", out.json);
    } else {
        println!("{}", out.text);
    }
    Ok(())
}

fn main() {
    let _ = color_eyre::install();
    let cli = Cli::parse();
    let _ = JSON_MODE.set(cli.json);

    if let Err(e) = real_main(&cli) {
        tracing::error!(error = %e, "command failed");
        if JSON_MODE.get().copied().unwrap_or(false) {
            eprintln!("{}", error_fmt::format_error_json(&e));
        } else {
            eprintln!("{}", error_fmt::humanize(&e));
        }
        std::process::exit(error_fmt::exit_code_for_error(&e));
    }
}
