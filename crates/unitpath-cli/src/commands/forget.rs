//! The `unitpath forget` command.

use std::path::PathBuf;

use anyhow::Result;

pub async fn execute(student: String, config_path: Option<PathBuf>) -> Result<()> {
    let (_, engine) = super::open_engine(config_path.as_deref()).await?;
    let removed = engine.forget_student(&student).await?;
    println!("Removed {removed} record(s) for {student}.");
    Ok(())
}
