//! `lesca init` — create the on-disk layout and write a starter config.

use crate::config::CliConfig;
use crate::error::CliError;
use crate::output;

pub async fn execute(config: &CliConfig) -> Result<(), CliError> {
    for dir in [&config.sessions_dir, &config.cache_dir, &config.output_dir] {
        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|e| CliError::operational(anyhow::anyhow!("creating {}: {e}", dir.display())))?;
    }

    let config_path = CliConfig::config_file_path();
    if config_path.exists() {
        output::print_info(&format!("config already exists at {}", config_path.display()));
    } else {
        config.save(&config_path).map_err(CliError::operational)?;
        output::print_success(&format!("wrote config to {}", config_path.display()));
    }

    output::print_success("initialised sessions/cache/output directories");
    Ok(())
}
