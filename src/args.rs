use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "focus-crawl")]
#[command(about = "Focused crawler that follows seed links within allowed domains and paths")]
#[command(version)]
pub struct Args {
    /// Seed manifest (start urls, target domains, target paths)
    pub manifest: PathBuf,

    /// JSON crawler configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// WebDriver endpoint (overrides config and WEBDRIVER_URL)
    #[arg(long)]
    pub webdriver_url: Option<String>,

    /// Number of parallel workers
    #[arg(short, long)]
    pub workers: Option<usize>,

    /// Maximum page visits for the run
    #[arg(short, long)]
    pub max_visits: Option<usize>,

    /// Directory for stored page content
    #[arg(short, long)]
    pub store_dir: Option<PathBuf>,

    /// Print the run report as JSON on stdout
    #[arg(long)]
    pub json: bool,

    /// Default log level to debug (RUST_LOG still wins)
    #[arg(short, long)]
    pub verbose: bool,
}
