use clap::Parser;
use page_watch::{
    CycleReport, HttpFetcher, JsonFileStore, Monitor, MonitorConfig, Normalizer, PageStore,
    StoreError, SummaryRequest, Transition,
};
use std::error::Error;
use std::path::Path;
use std::sync::Arc;

mod args;
use args::{Args, Command};

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    // Initialize logging
    env_logger::init();

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => MonitorConfig::from_file(path)?,
        None => MonitorConfig::default(),
    };
    if let Some(concurrency) = args.concurrency {
        config.max_concurrency = concurrency;
    }
    if let Some(timeout) = args.timeout {
        config.fetch_timeout_secs = timeout;
    }

    match args.command {
        Command::Normalize { file } => {
            let raw = std::fs::read_to_string(&file)?;
            let normalizer = Normalizer::from_config(&config.normalizer)?;
            ::log::debug!(
                "Normalizing {} with {:?}",
                file.display(),
                normalizer.filter_names()
            );
            println!("{}", normalizer.normalize(&raw));
        }
        Command::Add { url, name } => {
            let monitor = open_monitor(&args.store, &config)?;
            let page = monitor.register(&url, name.as_deref()).await?;
            println!("{}\t{}\t{}", page.id, page.display_name, page.url);
        }
        Command::List => {
            let monitor = open_monitor(&args.store, &config)?;
            for page in monitor.pages().await? {
                let checked = page
                    .last_checked_at
                    .map(|t| t.to_rfc3339())
                    .unwrap_or_else(|| "never".to_string());
                let flag = if page.changed { "CHANGED" } else { "-" };
                println!(
                    "{}\t{}\t{}\t{}\t{}",
                    page.id, flag, checked, page.display_name, page.url
                );
            }
        }
        Command::Remove { id } => {
            let monitor = open_monitor(&args.store, &config)?;
            let page = monitor.remove(id).await?;
            println!("Removed {} ({})", page.display_name, page.url);
        }
        Command::Check => {
            let monitor = open_monitor(&args.store, &config)?;
            let report = monitor.run_check_cycle().await?;
            print_report(&report);
        }
        Command::Diff { id } => {
            let monitor = open_monitor(&args.store, &config)?;
            let page = monitor
                .store()
                .get(id)
                .await?
                .ok_or(StoreError::NotFound(id))?;
            match page.describe_last_change() {
                Some(change) => println!("{}", change),
                None => println!("No change recorded for {}", page.url),
            }
        }
        Command::SummaryRequest { id } => {
            let monitor = open_monitor(&args.store, &config)?;
            let page = monitor
                .store()
                .get(id)
                .await?
                .ok_or(StoreError::NotFound(id))?;
            match SummaryRequest::for_page(&page) {
                Some(request) => println!("{}", serde_json::to_string_pretty(&request)?),
                None => println!("No change recorded for {}", page.url),
            }
        }
    }

    Ok(())
}

/// Open the page store and build a monitor fetching over HTTP
fn open_monitor(
    store_path: &Path,
    config: &MonitorConfig,
) -> Result<Monitor<JsonFileStore, HttpFetcher>, Box<dyn Error>> {
    let store = Arc::new(JsonFileStore::open(store_path)?);
    let fetcher = Arc::new(HttpFetcher::new(config)?);
    Ok(Monitor::new(store, fetcher).with_config(config)?)
}

fn print_report(report: &CycleReport) {
    for page_report in &report.pages {
        let page = &page_report.page;
        match &page_report.transition {
            Transition::Baseline => println!("BASELINE  {}", page.url),
            Transition::Unchanged => println!("UNCHANGED {}", page.url),
            Transition::Changed { .. } => {
                println!("CHANGED   {}", page.url);
                for line in page.describe_last_change().unwrap_or_default().lines() {
                    println!("    {}", line);
                }
            }
            Transition::Failed(failure) => println!("FAILED    {} ({})", page.url, failure),
        }
    }

    println!(
        "{} pages checked, {} changed, {} failed",
        report.pages.len(),
        report.changed().count(),
        report.failed().count()
    );
}
