//! fanpulse: audience analytics CLI over a JSON dataset
//!
//! Loads the dataset into an in-memory store, runs the requested analysis
//! for one artist and prints it as text or JSON.

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use fanpulse::{
    report, AnalyticsContext, AnalyticsService, Args, Command, InMemoryStore, OutputFormat,
};
use serde::Serialize;
use std::time::Instant;
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.verbose);

    let start_time = Instant::now();
    let config = args.load_config().context("Failed to load configuration")?;

    let store = InMemoryStore::from_json_file(&args.input)
        .with_context(|| format!("Failed to load dataset from {}", args.input.display()))?;
    tracing::info!(input = %args.input.display(), "dataset loaded");

    let service = AnalyticsService::new(store, AnalyticsContext::new(config));
    run(&args, &service)?;

    tracing::info!(
        elapsed_secs = start_time.elapsed().as_secs_f64(),
        command = ?args.command,
        "done"
    );
    Ok(())
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "fanpulse=debug" } else { "fanpulse=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn run(args: &Args, service: &AnalyticsService<InMemoryStore>) -> Result<()> {
    let artist = args.artist.as_str();
    let now = Utc::now();

    match args.command {
        Command::Segment => {
            let analysis = service
                .analyze(artist, now)
                .with_context(|| format!("Analysis failed for artist {}", artist))?;
            emit(args.format, &analysis, || {
                let mut text = report::segmentation_summary(&analysis.segmentation);
                text.push_str("\n=== Recommendations ===\n");
                for rec in &analysis.recommendations {
                    text.push_str(&format!(
                        "[{:?}] {}: {}\n",
                        rec.priority, rec.title, rec.description
                    ));
                }
                text
            })
        }
        Command::Compare => {
            let result = service
                .compare_clustering(artist)
                .context("Clustering comparison failed")?;
            emit(args.format, &result, || {
                let mut text = report::comparison_table(&result);
                if let Some(best) = &result.best_model {
                    text.push_str(&format!("\n{}\n", best.recommendation));
                }
                text
            })
        }
        Command::Churn => {
            let training = service
                .train_churn(artist, now)
                .context("Churn model training failed")?;
            let prediction = service
                .predict_churn(artist, now)
                .context("Churn prediction failed")?;
            emit(args.format, &(&training, &prediction), || {
                format!(
                    "{}\n{}",
                    report::training_summary(&training),
                    report::churn_summary(&prediction)
                )
            })
        }
        Command::Emotions => {
            let analysis = service.emotions(artist).context("Emotion analysis failed")?;
            emit(args.format, &analysis, || report::emotion_summary(&analysis))
        }
        Command::Growth => {
            let intelligence = service
                .growth_intelligence(artist, now)
                .context("Growth intelligence failed")?;
            emit(args.format, &intelligence, || report::growth_report(&intelligence))
        }
        Command::Report => {
            // Churn needs a fit first; a failed training shows up as an unavailable section
            if let Err(err) = service.train_churn(artist, now) {
                tracing::warn!(error = %err, "churn model not trained");
            }
            let full = service.full_analysis(artist, now).context("Full analysis failed")?;
            emit(args.format, &full, || report::full_report(&full))
        }
    }
}

fn emit<T: Serialize>(
    format: OutputFormat,
    value: &T,
    text: impl FnOnce() -> String,
) -> Result<()> {
    match format {
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(value).context("Failed to serialize result")?;
            println!("{}", json);
        }
        OutputFormat::Text => print!("{}", text()),
    }
    Ok(())
}
