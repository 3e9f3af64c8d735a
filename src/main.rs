mod actions;
mod cli;
mod config;
mod flow;
mod matcher;
mod model;
mod monitor;
mod nudge;
mod readiness;
mod stage;
mod storage;
mod tracker;

use std::process;

fn main() {
    // Logs go to stderr so stdout stays parseable.
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "cadence=info".into());
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();

    let config = match config::Config::load() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("{e}");
            process::exit(2);
        }
    };

    if let Err(e) = cli::run(&config) {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}
