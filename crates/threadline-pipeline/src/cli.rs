use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "threadline")]
#[command(about = "Disentangles a chat feed into calendar conversations")]
pub struct Args {
    /// Path to a TOML config file. Environment variables always override it.
    #[arg(long, env = "THREADLINE_CONFIG")]
    pub config: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run the ingest-to-archive pipeline until the feed closes.
    Run,
    /// Emit synthetic chat frames for manually exercising a running pipeline.
    Synthesize {
        /// Number of messages to generate.
        #[arg(long, default_value_t = 20)]
        count: usize,
        /// First seqid to assign.
        #[arg(long, default_value_t = 1)]
        start_seqid: i64,
    },
}
