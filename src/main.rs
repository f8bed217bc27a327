use anyhow::{Context, Result};
use clap::Parser;
use rss_reader::config::Config;
use rss_reader::feed::{
    FeedCache, FeedResolver, FeedRsParser, FetchResult, Fetcher, ReqwestTransport,
};
use std::path::PathBuf;
use std::sync::Arc;

/// Get the default config file path (~/.config/rss-reader/config.toml)
fn default_config_path() -> Result<PathBuf> {
    let home = std::env::var("HOME").context("HOME environment variable not set")?;
    Ok(PathBuf::from(home)
        .join(".config")
        .join("rss-reader")
        .join("config.toml"))
}

#[derive(Parser, Debug)]
#[command(name = "rss-reader", about = "Fetch RSS/Atom feeds and list their entries")]
struct Args {
    /// Feed URLs; a missing scheme defaults to http://
    #[arg(value_name = "URL", required = true)]
    urls: Vec<String>,

    /// Config file (defaults to ~/.config/rss-reader/config.toml)
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Print each result as JSON instead of plain text
    #[arg(long)]
    json: bool,
}

fn print_feed(url: &str, result: &FetchResult) {
    let feed = &result.parsed_feed;
    println!("{}", feed.title.as_deref().unwrap_or(url));
    if feed.malformed {
        println!(
            "  (feed is malformed; showing {} recovered entries)",
            feed.entries.len()
        );
    }
    for entry in &feed.entries {
        match (&entry.published, &entry.link) {
            (Some(published), Some(link)) => {
                println!("  {} {} <{}>", published.format("%Y-%m-%d"), entry.title, link)
            }
            (Some(published), None) => {
                println!("  {} {}", published.format("%Y-%m-%d"), entry.title)
            }
            (None, Some(link)) => println!("  {} <{}>", entry.title, link),
            (None, None) => println!("  {}", entry.title),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let config_path = match args.config {
        Some(path) => path,
        None => default_config_path()?,
    };
    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;

    let transport = ReqwestTransport::new().context("Failed to build HTTP client")?;
    let fetcher = Fetcher::new(transport, FeedRsParser, config.fetch_options());
    let cache = Arc::new(FeedCache::with_capacity(config.cache_capacity));
    let resolver = FeedResolver::new(fetcher, cache);

    let mut failures = 0usize;
    for url in &args.urls {
        match resolver.resolve(url.trim()).await {
            Ok(result) => {
                if result.used_insecure {
                    eprintln!(
                        "Warning: loaded {} with SSL verification disabled (self-signed certificate).",
                        url
                    );
                }
                if args.json {
                    let json = serde_json::to_string_pretty(result.as_ref())
                        .context("Failed to serialize feed")?;
                    println!("{json}");
                } else {
                    print_feed(url, &result);
                }
            }
            Err(e) => {
                failures += 1;
                eprintln!("Error: {url}: {e}");
            }
        }
    }

    if failures > 0 {
        anyhow::bail!("{} of {} feeds failed", failures, args.urls.len());
    }
    Ok(())
}
