use crate::cli::actions::Action;
use crate::konsenti::{self, config::Config};
use anyhow::{Context, Result};
use std::fs::File;

/// Handle the server action
pub async fn handle(action: Action) -> Result<()> {
    match action {
        Action::Server { config } => {
            let file = File::open(&config)
                .with_context(|| format!("failed to open config file {}", config.display()))?;

            let config: Config =
                serde_json::from_reader(file).context("failed to parse config file")?;

            konsenti::new(config).await?;
        }
    }

    Ok(())
}
