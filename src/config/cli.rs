use crate::domain::model::TreatmentKind;
use clap::{Parser, Subcommand};

pub const DEFAULT_STORE_PATH: &str = "./tailoring-entries.json";

#[derive(Debug, Clone, Parser)]
#[command(name = "search-tailor")]
#[command(about = "Spotlight, suppress or screen search results by domain")]
pub struct CliConfig {
    /// TOML configuration file (engines, colors, defaults, store path)
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    /// JSON file holding the tailoring entries; overrides the config file
    #[arg(long, global = true)]
    pub store: Option<String>,

    #[arg(short, long, global = true, help = "Enable verbose output")]
    pub verbose: bool,

    /// Emit logs as JSON lines instead of the compact format
    #[arg(long, global = true)]
    pub json_logs: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Tailor a saved result page and print each result's treatment
    Tailor {
        /// JSON page fixture: {"url": ..., "body": [elements]}
        page: String,

        /// Also print the stylesheet for the treatment markers
        #[arg(long)]
        with_styles: bool,
    },
    /// List the current entries in priority order
    List,
    /// Append an entry
    Add {
        domain: String,

        #[arg(short, long, value_parser = parse_treatment)]
        treatment: Option<TreatmentKind>,
    },
    /// Remove an entry by id
    Remove { id: String },
    /// Show the engine table, or which engine a URL resolves to
    Engines {
        #[arg(long)]
        url: Option<String>,
    },
    /// Print the stylesheet for the treatment markers
    Stylesheet,
}

fn parse_treatment(value: &str) -> Result<TreatmentKind, String> {
    value.parse()
}
