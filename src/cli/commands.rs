use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "mcp-orchestra")]
#[command(author, version, about = "Route questions to tool-using agents", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Ask a single question and stream the answer
    Ask {
        question: String,

        /// Customer the question is asked on behalf of
        #[arg(short = 'c', long)]
        customer_id: Option<String>,

        /// Give up after N seconds
        #[arg(short, long)]
        timeout_secs: Option<u64>,
    },

    /// Read questions from stdin until EOF
    Interactive {
        #[arg(short = 'c', long)]
        customer_id: Option<String>,
    },

    /// Answer questions from a file, one per line
    Batch {
        file: String,

        #[arg(short, long, default_value = "5")]
        concurrency: usize,
    },

    /// List the tools each agent discovered
    Tools,

    /// Show liveness of every tool process
    Health,
}
