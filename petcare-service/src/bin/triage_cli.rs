//! Runs one triage from the command line and prints the report as JSON.
//!
//! Usage:
//!   OPENROUTER_API_KEY=key cargo run --bin triage_cli -- --text "밥을 안 먹고 토해요" --species dog

use anyhow::{Context, Result};
use clap::Parser;
use petcare_flow::PipelineState;
use petcare_service::{
    FileReportStore, LanguageModel, OpenRouterModel, ServiceConfig, TriageRequest,
    build_triage_pipeline, init_tracing,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "triage_cli", version, about = "Pet symptom triage from the command line")]
struct Cli {
    /// Symptom description as the guardian would write it
    #[arg(short, long)]
    text: String,

    #[arg(long)]
    species: Option<String>,

    #[arg(long)]
    breed: Option<String>,

    /// Age in years
    #[arg(long)]
    age: Option<f64>,

    /// Image URL (repeatable)
    #[arg(long = "image", value_name = "URL")]
    images: Vec<String>,

    /// Directory to save the report into (overrides REPORT_DIR)
    #[arg(long, value_name = "DIR")]
    save: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing("petcare_service=info,petcare_flow=info");

    let config = ServiceConfig::from_env()?;
    let llm: Arc<dyn LanguageModel> = Arc::new(OpenRouterModel::new(
        &config.openrouter_api_key,
        config.llm_timeout,
    ));
    let pipeline = build_triage_pipeline(&config, llm)?;

    let request = TriageRequest {
        symptom_description: cli.text,
        species: cli.species,
        breed: cli.breed,
        age: cli.age,
        image_urls: (!cli.images.is_empty()).then_some(cli.images),
        ..TriageRequest::default()
    };
    request.validate().map_err(anyhow::Error::msg)?;

    let user_input = request.compose_user_input();
    let mut state = PipelineState::new(user_input.clone(), request.image_refs());
    let report = pipeline
        .run_to_completion(&mut state, &user_input)
        .await
        .context("triage pipeline failed")?;

    println!("{}", serde_json::to_string_pretty(&report)?);

    if let Some(dir) = cli.save.or(config.report_dir) {
        let name = FileReportStore::new(&dir).save(&report).await?;
        info!(file = %name, "Report saved");
        eprintln!("Saved {}", dir.join(name).display());
    }

    Ok(())
}
