mod cli;

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use cli::{Cli, Command};
use cvmatch::config::MatchConfig;
use cvmatch::llm::LlmClient;
use cvmatch::pipeline::{
    CHUNK_SIZE, LlmCvParser, MatchingPipeline, PipelineConfig, Stage, StageObserver, StageReport,
    StageSink, load_documents, parse_in_chunks,
};
use cvmatch::profile::{load_candidates, load_job};
use cvmatch::timeline::ExperienceAnalyzer;
use cvmatch::ui::{StageProgress, print_match_report, print_parse_summary, print_timeline};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = MatchConfig::load(cli.config.as_deref()).context("loading configuration")?;

    match cli.command {
        Command::Match {
            job,
            candidates,
            top,
            json,
        } => run_match(&config, &job, &candidates, top, json).await,
        Command::Parse { dir, out } => run_parse(&config, &dir, out.as_deref()).await,
        Command::Timeline { candidates } => run_timeline(&candidates),
        Command::Config => {
            let rendered = toml::to_string_pretty(&config.redacted())
                .context("rendering configuration")?;
            println!("{rendered}");
            Ok(())
        }
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "cvmatch=debug" } else { "cvmatch=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn client(config: &MatchConfig) -> Result<Arc<LlmClient>> {
    let api_key = config.require_api_key()?;
    let client = LlmClient::with_base_url(api_key, &config.model, &config.base_url)
        .context("building HTTP client")?;
    Ok(Arc::new(client))
}

async fn run_match(
    config: &MatchConfig,
    job_path: &Path,
    candidates_path: &Path,
    top: Option<usize>,
    json: bool,
) -> Result<()> {
    let job = load_job(job_path).with_context(|| format!("reading job {}", job_path.display()))?;
    let candidates = load_candidates(candidates_path)
        .with_context(|| format!("reading candidates {}", candidates_path.display()))?;
    let client = client(config)?;

    let mut pipeline_config = PipelineConfig::from_config(config);
    if let Some(top) = top {
        pipeline_config.top_rerank = top;
    }
    let model = client.model().to_string();
    let pipeline = MatchingPipeline::new(client, model, pipeline_config);
    let ui = StageProgress::new();
    let report = pipeline.run(&job, &candidates, &ui).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_match_report(&report);
    }
    Ok(())
}

async fn run_parse(config: &MatchConfig, dir: &Path, out: Option<&Path>) -> Result<()> {
    let documents =
        load_documents(dir).with_context(|| format!("reading CVs from {}", dir.display()))?;
    let client = client(config)?;
    let model = client.model().to_string();
    let parser = Arc::new(LlmCvParser::new(client, model));
    let settings = config.cv_parsing_settings();

    let ui = StageProgress::new();
    let started = std::time::Instant::now();
    ui.stage_started(Stage::Parsing, documents.len());
    let total = documents.len();
    let sink = StageSink::new(&ui, Stage::Parsing);
    let report = parse_in_chunks(parser, &settings, documents, CHUNK_SIZE, &sink).await?;
    ui.stage_finished(&StageReport::new(
        Stage::Parsing,
        total,
        report.combined_meta(),
        started.elapsed(),
    ));
    print_parse_summary(&report);

    let profiles = serde_json::to_string_pretty(&report.into_profiles())?;
    match out {
        Some(path) => std::fs::write(path, profiles)
            .with_context(|| format!("writing {}", path.display()))?,
        None => println!("{profiles}"),
    }
    Ok(())
}

fn run_timeline(candidates_path: &Path) -> Result<()> {
    let candidates = load_candidates(candidates_path)
        .with_context(|| format!("reading candidates {}", candidates_path.display()))?;
    let analyzer = ExperienceAnalyzer::today_utc();
    for candidate in &candidates {
        let flags = analyzer.analyze(&candidate.timeline_entries());
        print_timeline(&candidate.id, &flags);
    }
    Ok(())
}
