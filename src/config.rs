use clap::{Parser, ValueEnum};
use std::path::PathBuf;

use crate::artifacts::ArtifactConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Clone, Parser)]
#[command(author, version, about, long_about = None)]
pub struct Config {
    /// Server host to bind to
    #[arg(long, env = "HOST", default_value = "127.0.0.1")]
    pub host: String,

    /// Server port to bind to
    #[arg(long, env = "PORT", default_value = "5000")]
    pub port: u16,

    /// Local directory holding the vectorizer and classifier artifacts
    #[arg(long, env = "ARTIFACTS_PATH")]
    pub artifacts_path: Option<PathBuf>,

    /// Hugging Face Hub repository holding the artifacts
    #[arg(long, env = "ARTIFACTS_REPO")]
    pub artifacts_repo: Option<String>,

    /// Artifact repository revision/branch
    #[arg(long, env = "ARTIFACTS_REVISION", default_value = "main")]
    pub artifacts_revision: String,

    /// File name of the fitted vectorizer
    #[arg(long, env = "VECTORIZER_FILE", default_value = "vectorizer.json")]
    pub vectorizer_file: String,

    /// File name of the classifier label set
    #[arg(long, env = "CLASSIFIER_CONFIG_FILE", default_value = "classifier.json")]
    pub classifier_config_file: String,

    /// File name of the classifier weights
    #[arg(
        long,
        env = "CLASSIFIER_WEIGHTS_FILE",
        default_value = "classifier.safetensors"
    )]
    pub classifier_weights_file: String,

    /// Run on CPU instead of GPU
    #[arg(long, env = "CPU_ONLY")]
    pub cpu_only: bool,

    /// Log output format
    #[arg(long, env = "LOG_FORMAT", value_enum, default_value = "text")]
    pub log_format: LogFormat,
}

impl From<&Config> for ArtifactConfig {
    fn from(config: &Config) -> Self {
        Self {
            artifacts_path: config.artifacts_path.clone(),
            artifacts_repo: config.artifacts_repo.clone(),
            revision: config.artifacts_revision.clone(),
            vectorizer_file: config.vectorizer_file.clone(),
            classifier_config_file: config.classifier_config_file.clone(),
            classifier_weights_file: config.classifier_weights_file.clone(),
        }
    }
}

impl Config {
    pub fn server_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
