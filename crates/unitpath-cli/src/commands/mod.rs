pub mod access;
pub mod check;
pub mod forget;
pub mod init;
pub mod progress;
pub mod serve;
pub mod validate;

use std::path::Path;

use anyhow::Result;

use unitpath_backends::{create_content, create_store, UnitpathConfig};
use unitpath_core::engine::LearningEngine;

/// Build an engine from the config at `config_path` (or the default search
/// locations).
pub async fn open_engine(config_path: Option<&Path>) -> Result<(UnitpathConfig, LearningEngine)> {
    let config = unitpath_backends::load_config_from(config_path)?;
    let store = create_store(&config.store).await?;
    let content = create_content(&config.content)?;
    let engine = LearningEngine::new(content, store, config.engine_config());
    Ok((config, engine))
}
