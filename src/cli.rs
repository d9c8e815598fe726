//! Command-line interface definitions and argument parsing

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::config::AnalysisConfig;

/// Audience-growth analytics for independent musicians
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to the JSON dataset file
    #[arg(short, long, global = true, default_value = "dataset.json", env = "FANPULSE_INPUT")]
    pub input: PathBuf,

    /// Artist identifier to analyze
    #[arg(short, long, global = true, default_value = "")]
    pub artist: String,

    /// Optional TOML configuration file
    #[arg(short, long, global = true, env = "FANPULSE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Override the number of clusters
    #[arg(short = 'k', long, global = true)]
    pub clusters: Option<usize>,

    /// Override every random seed
    #[arg(long, global = true)]
    pub seed: Option<u64>,

    /// Output format
    #[arg(short, long, global = true, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Segment listeners into superfans, casual and one-time listeners
    Segment,
    /// Compare k-means with GMM, hierarchical and DBSCAN clustering
    Compare,
    /// Train the churn model and score every listener
    Churn,
    /// Classify emotions in comments and reviews
    Emotions,
    /// Growth intelligence for a newly onboarded artist
    Growth,
    /// Run every advanced analysis in one report
    Report,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Text,
    Json,
}

impl Args {
    /// Load the configuration file (or defaults) and apply flag overrides
    pub fn load_config(&self) -> crate::Result<AnalysisConfig> {
        let mut config = match &self.config {
            Some(path) => AnalysisConfig::from_file(path)?,
            None => AnalysisConfig::default(),
        };

        if let Some(k) = self.clusters {
            config.segmentation.n_clusters = k;
        }
        if let Some(seed) = self.seed {
            config.segmentation.random_seed = seed;
            config.churn.random_seed = seed;
        }
        config.validate()?;
        Ok(config)
    }
}
