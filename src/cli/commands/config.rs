use anyhow::Result;
use std::path::PathBuf;
use std::process::ExitCode;

use super::Command;
use crate::config::RiderStateConfig;

/// Shows the configuration after defaults, file and environment are merged
pub struct ConfigCommand {
    pub write: Option<PathBuf>,
    pub config: RiderStateConfig,
}

impl Command for ConfigCommand {
    async fn execute(&self) -> Result<ExitCode> {
        match &self.write {
            Some(path) => {
                self.config.save_to_file(path)?;
                println!("✅ Wrote configuration to {}", path.display());
            }
            None => print!("{}", toml::to_string_pretty(&self.config)?),
        }
        Ok(ExitCode::SUCCESS)
    }
}
