//! The `unitpath access` command.

use std::path::PathBuf;

use anyhow::Result;

use unitpath_core::gate::AccessReason;

pub async fn execute(student: String, unit: String, config_path: Option<PathBuf>) -> Result<()> {
    let (_, engine) = super::open_engine(config_path.as_deref()).await?;
    let access = engine.unit_access(&student, &unit).await?;

    let state = if access.accessible { "open" } else { "locked" };
    println!("{} ({}): {state}", access.name, access.unit_id);
    println!("  {}", describe(access.reason));
    if access.completed || access.stars > 0 {
        println!(
            "  {} star(s){}",
            access.stars,
            if access.completed { ", completed" } else { "" }
        );
    }
    Ok(())
}

fn describe(reason: AccessReason) -> &'static str {
    match reason {
        AccessReason::FirstUnit => "first unit of the track",
        AccessReason::PredecessorCompleted => "previous unit completed",
        AccessReason::PlacementUnlocked => "unlocked by placement test",
        AccessReason::PredecessorIsExercise => "previous unit is a practice checkpoint",
        AccessReason::Locked => "complete the previous unit first",
    }
}
