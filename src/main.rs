use clap::Parser;
use focus_crawl::Crawl;
use std::error::Error;

mod args;
use args::Args;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();

    // Initialize logging
    let default_level = if args.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .init();

    let mut crawl = Crawl::new();
    if let Some(path) = &args.config {
        crawl = crawl.with_config_file(path)?;
    }
    if let Some(url) = args.webdriver_url {
        crawl = crawl.with_webdriver_url(url);
    }
    if let Some(workers) = args.workers {
        crawl = crawl.with_workers(workers);
    }
    if let Some(max_visits) = args.max_visits {
        crawl = crawl.with_max_visits(max_visits);
    }
    if let Some(dir) = args.store_dir {
        crawl = crawl.with_store_dir(dir);
    }

    // Manifest problems are fatal and surface before any browser work
    let input = crawl.load_input(&args.manifest)?;
    ::log::info!(
        "Loaded {} seeds from {} (crawl {})",
        input.seed_entries.len(),
        args.manifest.display(),
        input.crawl_id
    );

    let frontier = crawl.frontier();
    {
        let frontier = frontier.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                frontier.cancel();
            }
        });
    }

    let start_time = std::time::Instant::now();
    let report = crawl.run_with(&input, frontier).await?;

    ::log::info!(
        "Crawl {} complete - visited {} pages in {:.2} seconds",
        report.crawl_id,
        report.visited,
        start_time.elapsed().as_secs_f64()
    );

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    }

    Ok(())
}
