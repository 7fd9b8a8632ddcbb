use crate::analysis::NodeFilterMode;
use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "couplingmap")]
#[command(about = "Finds element pairs on which coupling views disagree", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Hide progress bars
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Configuration file to use instead of the nearest .couplingmap.toml
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Find element pairs matching disagreement patterns
    Analyze {
        /// Repository whose views are analyzed
        repo: String,

        /// Views to compare, in pattern slot order
        #[arg(long, value_delimiter = ',')]
        views: Vec<String>,

        /// Granularity of the analyzed elements
        #[arg(long, value_enum)]
        filter: Option<NodeFilterMode>,

        /// Pattern such as `1,0,*` or `1,0,*:Hidden dependency` (repeatable)
        #[arg(short, long = "pattern")]
        patterns: Vec<String>,

        /// Ranking weights, one per fixed slot plus one for support
        #[arg(long, value_delimiter = ',')]
        weights: Option<Vec<f64>>,

        /// Rank by squared errors
        #[arg(long)]
        squared: bool,

        /// Matches kept per pattern
        #[arg(long)]
        keep_size: Option<usize>,

        /// Drop pairs with less support
        #[arg(long)]
        min_support: Option<f64>,

        /// Skip pairs fewer than this many tree edges apart
        #[arg(long)]
        min_module_distance: Option<usize>,

        /// Threads in process, worker processes when distributed
        #[arg(short = 'j', long)]
        workers: Option<usize>,

        /// Run pairs on worker processes
        #[arg(long, conflicts_with = "in_process")]
        distributed: bool,

        /// Run in this process even if the config asks for workers
        #[arg(long)]
        in_process: bool,

        /// Shuffle seed for distributed runs
        #[arg(long)]
        seed: Option<u64>,

        /// Matches shown per pattern
        #[arg(long, default_value = "10")]
        top: usize,

        /// Output format
        #[arg(short, long, value_enum, default_value = "terminal")]
        format: OutputFormat,

        /// Output file (defaults to stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Directory holding `<repo>/<view>.json`
        #[arg(long)]
        data_dir: Option<PathBuf>,

        /// Result cache directory
        #[arg(long)]
        cache_dir: Option<PathBuf>,

        /// Neither reuse nor store results
        #[arg(long)]
        no_cache: bool,
    },

    /// Show statistics of one view
    Stats {
        repo: String,

        #[arg(long)]
        view: String,

        #[arg(long)]
        data_dir: Option<PathBuf>,

        #[arg(short, long, value_enum, default_value = "terminal")]
        format: OutputFormat,
    },

    /// Print one view as plain text
    Export {
        repo: String,

        #[arg(long)]
        view: String,

        #[arg(long)]
        data_dir: Option<PathBuf>,

        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Speak the job protocol on stdin and stdout
    #[command(hide = true)]
    Worker {
        /// JSON encoded worker specification
        #[arg(long)]
        spec: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Terminal,
    Json,
}
