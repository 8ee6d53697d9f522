use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "safeguard")]
#[command(author, version, about = "Telegram bot for community vouches and vetoes", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the bot in normal mode
    Run,

    /// Run the bot in staging mode (uses staging environment variables)
    RunStaging,

    /// Recompute record statuses directly, without starting the bot
    UpdateStatuses {
        /// Override the required upvote threshold for this run
        #[arg(long)]
        upvotes: Option<i64>,

        /// Override the required downvote threshold for this run
        #[arg(long)]
        downvotes: Option<i64>,

        /// Only touch records updated within this many days
        #[arg(short, long, default_value_t = 30)]
        days: i64,
    },
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
