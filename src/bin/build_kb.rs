use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use ipad_chatbot::core::config::{AppPaths, ConfigService};
use ipad_chatbot::core::logging;
use ipad_chatbot::corpus::CATEGORIES;
use ipad_chatbot::llm::{LlmProvider, OpenAiCompatibleProvider};
use ipad_chatbot::rag::{load_documents, KnowledgeBaseBuilder, RecursiveChunker};

#[derive(Parser, Debug)]
#[command(
    name = "build_kb",
    about = "Chunk and embed the extracted category files into vectorstore.db"
)]
struct BuildCli {
    /// Directory holding the category files and the index
    #[arg(long, env = "IPAD_CHATBOT_DATA_DIR")]
    data_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = BuildCli::parse();
    let paths = match &cli.data_dir {
        Some(dir) => AppPaths::with_data_dir(dir),
        None => AppPaths::new(),
    };
    logging::init(&paths, "build_kb.log");

    let settings = ConfigService::new(Arc::new(paths.clone()))
        .load_settings()
        .context("failed to load configuration")?;
    settings.llm.require_api_key()?;

    let documents = load_documents(&paths, &CATEGORIES).await?;
    let chunker = RecursiveChunker::new(settings.chunking)?;
    let llm: Arc<dyn LlmProvider> = Arc::new(OpenAiCompatibleProvider::new(&settings.llm)?);
    tracing::info!("Embedding with {} via {}", settings.llm.embedding_model, llm.name());

    let builder = KnowledgeBaseBuilder::new(
        llm,
        chunker,
        settings.llm.embedding_model.clone(),
        paths.index_dir.clone(),
    );
    let summary = builder.build(&documents).await?;

    println!(
        "Knowledge base saved to {} ({} documents, {} chunks)",
        summary.index_path.display(),
        summary.documents,
        summary.chunks
    );
    Ok(())
}
