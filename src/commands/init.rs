//! Init command implementation

use crate::config::Config;
use crate::error::{Error, Result};
use crate::store::Store;
use std::path::PathBuf;
use tracing::info;

/// Initialize curator configuration and database
pub async fn cmd_init(base_dir: Option<PathBuf>, force: bool) -> Result<Config> {
    let mut config = Config::default();
    config.init_paths(base_dir);

    if config.paths.config_file.exists() && !force {
        return Err(Error::Config(format!(
            "Config already exists at {}. Use --force to overwrite.",
            config.paths.config_file.display()
        )));
    }

    config.validate()?;
    config.save()?;
    info!("Created config at {:?}", config.paths.config_file);

    let store = Store::connect(&config).await?;
    store.init_schema().await?;
    info!("Created database at {:?}", config.paths.db_file);

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_init_creates_config_and_db() {
        let tmp = TempDir::new().unwrap();
        let config = cmd_init(Some(tmp.path().to_path_buf()), false).await.unwrap();
        assert!(config.paths.config_file.exists());
        assert!(config.paths.db_file.exists());
        assert!(config.is_initialized());
    }

    #[tokio::test]
    async fn test_init_refuses_overwrite_without_force() {
        let tmp = TempDir::new().unwrap();
        cmd_init(Some(tmp.path().to_path_buf()), false).await.unwrap();

        let err = cmd_init(Some(tmp.path().to_path_buf()), false).await.unwrap_err();
        assert!(matches!(err, Error::Config(_)));

        cmd_init(Some(tmp.path().to_path_buf()), true).await.unwrap();
    }
}
