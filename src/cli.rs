use std::path::PathBuf;

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;

use crate::{
    matrix::{Orientation, ScoreRule},
    news_index::DocField,
};

#[derive(Debug, Parser)]
#[command(
    name = "newsdex",
    about = "Index news articles and rank them against free-text queries"
)]
pub struct Cli {
    /// Override the XDG data directory
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    /// Keep the index and archive in memory for this run only
    #[arg(long, global = true)]
    pub ephemeral: bool,

    /// Increase log verbosity (can be repeated: -v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Only log warnings and errors, and hide progress bars
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Index fetched articles (JSON array) from a file or stdin
    Ingest(IngestArgs),
    /// Rebuild the index from the archived articles
    Reindex(ReindexArgs),
    /// Rank indexed articles against a query
    Search(SearchArgs),
    /// Build the term-frequency matrix and export it
    Matrix(MatrixArgs),
    /// Show a stored article by ordinal or name
    Get(GetArgs),
    /// Extract and geocode the places an article mentions
    Analyze(AnalyzeArgs),
    /// Show or clear recent searches
    History(HistoryArgs),
    /// Show index and archive statistics
    Status(StatusArgs),
    /// Generate shell completions
    #[command(hide = true)]
    Completions(CompletionsArgs),
}

// -- Ingest --

#[derive(Debug, Parser)]
pub struct IngestArgs {
    /// Fetcher output files, or `-` for stdin
    #[arg(required = true)]
    pub sources: Vec<PathBuf>,
}

// -- Reindex --

#[derive(Debug, Parser)]
pub struct ReindexArgs {
    /// Delete the index first, so ordinals follow article names
    #[arg(long)]
    pub fresh: bool,
}

// -- Search --

#[derive(Debug, Parser)]
pub struct SearchArgs {
    /// The search query
    pub query: String,

    /// Number of results to return
    #[arg(short = 'n', long, default_value = "10")]
    pub count: usize,

    /// Return all results above the score threshold
    #[arg(long)]
    pub all: bool,

    /// Minimum cosine similarity
    #[arg(long, default_value = "0.0")]
    pub min_score: f64,

    /// How term scores are computed
    #[arg(long, value_enum, default_value_t = ScoreRule::Exact)]
    pub rule: ScoreRule,

    /// Output results as JSON
    #[arg(long)]
    pub json: bool,
}

// -- Matrix --

#[derive(Debug, Parser)]
pub struct MatrixArgs {
    /// Outer key of the matrix
    #[arg(long, value_enum, default_value_t = Orientation::ByTerm)]
    pub orientation: Orientation,

    /// How term scores are computed
    #[arg(long, value_enum, default_value_t = ScoreRule::Exact)]
    pub rule: ScoreRule,

    /// Export file (defaults to frequency_matrix.txt in the data directory)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Print the matrix as JSON instead of exporting the grid
    #[arg(long)]
    pub json: bool,
}

// -- Get --

#[derive(Debug, Parser)]
pub struct GetArgs {
    /// Ordinal, or article name
    pub reference: String,

    /// Treat the reference as a name even when it is a number
    #[arg(long)]
    pub name: bool,

    /// Print a single field
    #[arg(long, value_enum)]
    pub field: Option<DocField>,

    /// Output as JSON with metadata
    #[arg(long)]
    pub json: bool,
}

// -- Analyze --

#[derive(Debug, Parser)]
pub struct AnalyzeArgs {
    /// Ordinal, or article name
    pub reference: String,

    /// Treat the reference as a name even when it is a number
    #[arg(long)]
    pub name: bool,

    /// Place-name list, one per line (optionally `name<TAB>label`)
    #[arg(long)]
    pub gazetteer: PathBuf,

    /// Geocoder search endpoint
    #[arg(long, env = "NEWSDEX_GEOCODER_URL")]
    pub geocoder_url: Option<String>,

    /// User agent sent to the geocoder
    #[arg(long)]
    pub user_agent: Option<String>,

    /// Restrict geocoding to these ISO country codes
    #[arg(long, value_delimiter = ',')]
    pub countries: Vec<String>,

    /// List entity names with this label instead of geocoding places
    #[arg(long)]
    pub entities: Option<String>,
}

// -- History --

#[derive(Debug, Parser)]
pub struct HistoryArgs {
    /// Number of searches to show
    #[arg(short = 'n', long, default_value = "20")]
    pub count: usize,

    /// Forget every recorded search
    #[arg(long)]
    pub clear: bool,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

// -- Status --

#[derive(Debug, Parser)]
pub struct StatusArgs {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

// -- Completions --

#[derive(Debug, Parser)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    #[arg(value_enum)]
    pub shell: Shell,
}

impl CompletionsArgs {
    /// Generate shell completions and print to stdout.
    pub fn generate(&self) {
        let mut cmd = Cli::command();
        clap_complete::generate(
            self.shell,
            &mut cmd,
            "newsdex",
            &mut std::io::stdout(),
        );
    }
}
