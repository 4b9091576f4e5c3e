//! The `unitpath serve` command.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;

pub async fn execute(config_path: Option<PathBuf>, bind: Option<String>) -> Result<()> {
    let (config, engine) = super::open_engine(config_path.as_deref()).await?;
    let addr = bind.unwrap_or(config.server.bind);

    unitpath_server::serve(Arc::new(engine), &addr).await
}
