use clap::{Args, Parser, Subcommand};
use clap_complete::Shell;

#[derive(Parser)]
#[command(name = "grantsync")]
#[command(author = "Alberto Cavalcante")]
#[command(version)]
#[command(about = "Declarative Grafana data-source permissions and service-account tokens", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Config file (default: ~/.config/grantsync/config.toml)
    #[arg(long, global = true)]
    pub config: Option<String>,

    /// State file (default: ~/.local/state/grantsync/state.toml)
    #[arg(long, global = true)]
    pub state: Option<String>,

    /// Grafana base URL, overrides the config file
    #[arg(long, env = "GRAFANA_URL", global = true)]
    pub url: Option<String>,

    /// Grafana service-account token or API key, overrides the config file
    #[arg(long, env = "GRAFANA_AUTH", hide_env_values = true, global = true)]
    pub auth: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Preview what apply would change
    Plan,

    /// Make the remote match the config
    Apply(ApplyArgs),

    /// Re-read recorded resources and drop the ones that are gone
    Refresh,

    /// Remove every recorded grant and token
    Destroy(DestroyArgs),

    /// Show recorded resources
    Status(StatusArgs),

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Args)]
pub struct ApplyArgs {
    /// Skip confirmation prompt
    #[arg(short, long)]
    pub yes: bool,
}

#[derive(Args)]
pub struct DestroyArgs {
    /// Skip confirmation prompt
    #[arg(short, long)]
    pub yes: bool,
}

#[derive(Args)]
pub struct StatusArgs {
    /// Print captured token secrets instead of masking them
    #[arg(long)]
    pub show_secrets: bool,
}
