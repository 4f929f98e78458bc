use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use ipad_chatbot::core::config::{AppPaths, ConfigService};
use ipad_chatbot::core::logging;
use ipad_chatbot::corpus::topics::find_category;
use ipad_chatbot::corpus::wikipedia::WIKIPEDIA_API;
use ipad_chatbot::corpus::{Category, ExtractionMode, Extractor, WikipediaClient, CATEGORIES};

#[derive(Parser, Debug)]
#[command(
    name = "extract",
    about = "Fetch iPad articles from Wikipedia into per-category text files"
)]
struct ExtractCli {
    /// `main` fetches each category page plus three generations; `comprehensive` fetches every title
    #[arg(long, value_enum, default_value_t = ExtractionMode::Main)]
    mode: ExtractionMode,

    /// Only extract this category (ipad_general, ipad_pro, ipad_air, ipad_mini)
    #[arg(long)]
    category: Option<String>,

    /// Directory the category files are written to
    #[arg(long, env = "IPAD_CHATBOT_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// MediaWiki API endpoint
    #[arg(long, default_value = WIKIPEDIA_API)]
    api_url: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = ExtractCli::parse();
    let paths = match &cli.data_dir {
        Some(dir) => AppPaths::with_data_dir(dir),
        None => AppPaths::new(),
    };
    logging::init(&paths, "extract.log");

    let settings = ConfigService::new(Arc::new(paths.clone()))
        .load_settings()
        .context("failed to load configuration")?;

    let categories: Vec<Category> = match &cli.category {
        Some(name) => vec![*find_category(name).ok_or_else(|| {
            anyhow!(
                "unknown category {}; expected one of {}",
                name,
                CATEGORIES.iter().map(|c| c.name).collect::<Vec<_>>().join(", ")
            )
        })?],
        None => CATEGORIES.to_vec(),
    };

    let client = WikipediaClient::new(
        cli.api_url.clone(),
        Duration::from_secs(settings.llm.timeout_secs),
    )?;
    let extractor = Extractor::new(client, paths, cli.mode);
    let report = extractor.run(&categories).await?;

    for category in &report.categories {
        tracing::info!(
            "{}: {} extracted, {} skipped",
            category.category,
            category.extracted,
            category.skipped.len()
        );
        for skipped in &category.skipped {
            tracing::info!("  skipped {}: {}", skipped.title, skipped.reason);
        }
    }

    let files = report.files();
    if files.is_empty() {
        return Err(anyhow!("no pages could be extracted"));
    }
    for file in files {
        println!("{}", file.display());
    }
    Ok(())
}
