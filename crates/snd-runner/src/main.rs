// ─────────────────────────────────────────────────────────────────────
// SND Online Model — snd-twin
// (C) 1998-2026 Miroslav Sotek. All rights reserved.
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
#![deny(unsafe_code)]
//! Runs the SND online model until interrupted.
//!
//! Exit status is 0 after an operator stop or an exhausted tick bound,
//! 1 when startup fails.

mod app;

use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use clap::Parser;
use env_logger::Env;
use log::LevelFilter;

use app::{build_driver, Cli};

fn init_logging(level: LevelFilter) {
    let mut builder =
        env_logger::Builder::from_env(Env::default().default_filter_or(level.as_str()));
    builder.format_timestamp_millis();
    let _ = builder.try_init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.log_level);

    let stop = Arc::new(AtomicBool::new(false));
    let handler_flag = Arc::clone(&stop);
    if let Err(e) = ctrlc::set_handler(move || {
        log::info!("interrupt received, stopping");
        handler_flag.store(true, Ordering::SeqCst);
    }) {
        log::warn!("could not install interrupt handler: {e}");
    }

    let mut driver = match build_driver(&cli) {
        Ok(driver) => driver.with_stop_flag(stop),
        Err(e) => {
            log::error!("startup failed [{}]: {e}", e.category());
            return ExitCode::FAILURE;
        }
    };
    log::info!("starting SND online model with the {:?} interface", driver.cycle().source_kind());

    let summary = driver.run();
    log::info!(
        "exiting after {} ticks ({:.1}% failed)",
        summary.ticks,
        summary.failure_rate() * 100.0
    );
    ExitCode::SUCCESS
}
