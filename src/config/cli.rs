use crate::config::toml_config::EngineConfig;
use crate::utils::error::Result;
use crate::utils::validation::Validate;
use chrono::{DateTime, Utc};
use clap::Parser;
use std::path::PathBuf;

#[derive(Debug, Clone, Parser)]
#[command(name = "alert-geocoder")]
#[command(about = "Resolves weapon-direction alerts into validated map coordinates")]
pub struct CliArgs {
    #[arg(long, short, default_value = "resolver.toml", help = "TOML configuration file")]
    pub config: PathBuf,

    #[arg(long, short, help = "JSON array of exported alert messages")]
    pub input: String,

    #[arg(long, env = "GEMINI_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    #[arg(long)]
    pub database_url: Option<String>,

    #[arg(long)]
    pub output_path: Option<String>,

    #[arg(long)]
    pub workers: Option<usize>,

    #[arg(long, help = "Reference time for the recency filter (RFC 3339)")]
    pub now: Option<DateTime<Utc>>,

    #[arg(long, help = "Resolve and print the payload without writing it")]
    pub dry_run: bool,

    #[arg(long, help = "Emit JSON log lines")]
    pub json_logs: bool,

    #[arg(long, short, help = "Enable verbose output")]
    pub verbose: bool,
}

impl CliArgs {
    /// Config file (or defaults when it is absent) with command-line
    /// overrides applied, validated.
    pub fn load_config(&self) -> Result<EngineConfig> {
        let mut config = if self.config.exists() {
            EngineConfig::from_file(&self.config)?
        } else {
            tracing::warn!(
                "⚠️ Config file {} not found, using defaults",
                self.config.display()
            );
            EngineConfig::default()
        };

        self.apply_overrides(&mut config);
        config.validate()?;
        Ok(config)
    }

    pub fn apply_overrides(&self, config: &mut EngineConfig) {
        if let Some(api_key) = &self.api_key {
            config.ai.api_key = Some(api_key.clone());
        }
        if let Some(database_url) = &self.database_url {
            config.store.database_url = database_url.clone();
        }
        if let Some(output_path) = &self.output_path {
            config.output.output_path = output_path.clone();
        }
        if let Some(workers) = self.workers {
            config.resolution.workers = workers;
        }
    }
}
