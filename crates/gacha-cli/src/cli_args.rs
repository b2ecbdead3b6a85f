use std::path::PathBuf;

use clap::{ArgAction, Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(
    name = "gacha",
    about = "Operate the group-chat partner gacha state locally",
    version
)]
pub struct Cli {
    #[arg(
        long = "data-dir",
        env = "GACHA_DATA_DIR",
        default_value = ".gacha/data",
        help = "Directory holding the four persisted state documents"
    )]
    pub data_dir: PathBuf,

    #[arg(
        long,
        env = "GACHA_CONFIG",
        help = "Path to config.json; defaults to <data-dir>/config.json, missing file means defaults"
    )]
    pub config: Option<PathBuf>,

    #[arg(
        long = "templates-dir",
        env = "GACHA_TEMPLATES_DIR",
        default_value = "templates",
        help = "Directory with graph_template.html, vis-network.min.js, and rbq_ranking.html"
    )]
    pub templates_dir: PathBuf,

    #[arg(
        short,
        long,
        action = ArgAction::Count,
        global = true,
        help = "Raise log verbosity when RUST_LOG is unset (-v info, -vv debug)"
    )]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: CliCommand,
}

impl Cli {
    pub fn config_path(&self) -> PathBuf {
        self.config
            .clone()
            .unwrap_or_else(|| self.data_dir.join(gacha_config::GACHA_CONFIG_FILE_NAME))
    }
}

#[derive(Debug, Subcommand)]
pub enum CliCommand {
    /// Feed inbound messages through activity tracking and keyword dispatch.
    Replay(ReplayArgs),
    /// Discard every record of the current day.
    ResetRecords,
    /// Clear force-marry cooldowns of one group.
    ResetCooldown {
        #[arg(long, help = "Group id whose cooldowns are cleared")]
        group: String,
    },
    /// Apply the reverse-ranking decay policy now.
    CleanRanking,
    /// Print a JSON summary of the persisted collections.
    Inspect,
}

#[derive(Debug, clap::Args)]
pub struct ReplayArgs {
    #[arg(long, help = "JSONL file with one inbound message per line")]
    pub events: PathBuf,

    #[arg(
        long,
        help = "Optional JSON object mapping group id to member list, served as the group roster"
    )]
    pub roster: Option<PathBuf>,

    #[arg(
        long = "render-dir",
        help = "Where rendered HTML cards are written; defaults to <data-dir>/renders"
    )]
    pub render_dir: Option<PathBuf>,

    #[arg(long, help = "Seed for reproducible draws")]
    pub seed: Option<u64>,
}
