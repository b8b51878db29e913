use std::io::{self, BufRead, IsTerminal, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use faceguard::{
    app::{self, Command},
    config, console,
    matcher::Matcher,
    storage::FaceStore,
    Pipeline,
};
use log::error;

#[derive(Parser)]
#[command(name = "faceguard")]
#[command(version, about = "Face recognition access control")]
struct Cli {
    /// Config file (defaults to faceguard.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Face database, overrides the config file
    #[arg(long, global = true)]
    database: Option<PathBuf>,
    /// Maximum distance for a match, overrides the config file
    #[arg(long, global = true)]
    threshold: Option<f32>,
    /// Without a command an interactive menu starts
    #[command(subcommand)]
    command: Option<Command>,
}

fn main() -> ExitCode {
    env_logger::builder()
        .filter_level(log::LevelFilter::Info)
        .parse_env("FACEGUARD_LOG")
        .format_target(false)
        .format_timestamp(None)
        .init();

    match run(Cli::parse()) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<bool> {
    let mut cfg = config::load_config(cli.config.as_deref())?;
    if let Some(database) = cli.database {
        cfg.database = database;
    }
    if let Some(threshold) = cli.threshold {
        cfg.threshold = threshold;
    }
    cfg.validate()?;

    let mut store = FaceStore::load(&cfg.database).context("Failed to load face database")?;
    let mut pipeline = Pipeline::new(cfg.pipeline_options());

    let Some(command) = cli.command else {
        console::run_menu(
            &mut io::stdin().lock(),
            &mut io::stdout().lock(),
            &mut store,
            &mut pipeline,
            &Matcher::new(cfg.threshold),
        )?;
        return Ok(true);
    };

    let mut ask = confirm_on_tty;
    let confirm: app::Confirm<'_> = if io::stdin().is_terminal() {
        Some(&mut ask)
    } else {
        None
    };
    app::execute(command, &cfg, &mut store, &mut pipeline, &mut io::stdout(), confirm)
}

fn confirm_on_tty(identity: &str) -> bool {
    let mut out = io::stdout().lock();
    let asked = write!(out, "'{identity}' already exists. Overwrite? (y/n): ").and_then(|_| out.flush());
    if asked.is_err() {
        return false;
    }
    let mut answer = String::new();
    match io::stdin().lock().read_line(&mut answer) {
        Ok(_) => answer.trim().eq_ignore_ascii_case("y"),
        Err(_) => false,
    }
}
