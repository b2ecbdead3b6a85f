mod bootstrap_helpers;
mod cli_args;
mod console_gateway;
mod file_render;
mod replay;
mod store_admin;

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use gacha_config::load_gacha_config;
use gacha_core::{Clock, ManualClock, SystemClock};
use gacha_runtime::{GachaRuntime, GachaRuntimeOptions};
use gacha_store::RetentionStore;
use serde_json::{json, Value};

use crate::bootstrap_helpers::init_tracing;
use crate::cli_args::{Cli, CliCommand, ReplayArgs};
use crate::console_gateway::{load_roster, ConsoleGateway};
use crate::file_render::FileRenderService;
use crate::replay::{parse_replay_events, replay_events};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    match &cli.command {
        CliCommand::Replay(args) => run_replay(&cli, args).await,
        CliCommand::ResetRecords => {
            let mut store = open_store(&cli)?;
            print_json(&store_admin::reset_records(&mut store, &SystemClock)?)
        }
        CliCommand::ResetCooldown { group } => {
            let mut store = open_store(&cli)?;
            print_json(&store_admin::reset_cooldown(&mut store, group)?)
        }
        CliCommand::CleanRanking => {
            let mut store = open_store(&cli)?;
            print_json(&store_admin::clean_ranking(&mut store, &SystemClock)?)
        }
        CliCommand::Inspect => {
            let store = open_store(&cli)?;
            print_json(&store_admin::inspect(&store))
        }
    }
}

fn open_store(cli: &Cli) -> Result<RetentionStore> {
    let config = load_gacha_config(&cli.config_path())?;
    RetentionStore::open(&cli.data_dir, &config)
}

fn print_json(value: &Value) -> Result<()> {
    let rendered = serde_json::to_string_pretty(value).context("failed to render JSON output")?;
    println!("{rendered}");
    Ok(())
}

async fn run_replay(cli: &Cli, args: &ReplayArgs) -> Result<()> {
    let config = load_gacha_config(&cli.config_path())?;
    let roster = match &args.roster {
        Some(path) => load_roster(path)?,
        None => Default::default(),
    };
    let raw_events = tokio::fs::read_to_string(&args.events)
        .await
        .with_context(|| format!("failed to read replay events {}", args.events.display()))?;
    let events = parse_replay_events(&raw_events)?;

    let gateway = Arc::new(ConsoleGateway::new(roster, std::io::stdout()));
    let clock = Arc::new(ManualClock::new(SystemClock.now()));
    let render_dir = args
        .render_dir
        .clone()
        .unwrap_or_else(|| cli.data_dir.join("renders"));
    let runtime = GachaRuntime::open(GachaRuntimeOptions {
        data_dir: cli.data_dir.clone(),
        templates_dir: cli.templates_dir.clone(),
        config,
        gateway: gateway.clone(),
        renderer: Arc::new(FileRenderService::new(render_dir)),
        clock: clock.clone(),
        registry: None,
        rng_seed: args.seed,
    })?;

    let summary = replay_events(&runtime, &gateway, &clock, events).await?;
    let report = runtime.teardown().await?;
    gateway.emit(&json!({
        "event": "summary",
        "events": summary.events,
        "handled": summary.handled,
        "skipped": summary.skipped,
        "commands": summary.commands,
        "cancelled_withdrawals": report.cancelled_withdrawals,
    }))
}
