//! The `unitpath progress` command.

use std::path::PathBuf;

use anyhow::Result;
use comfy_table::{Cell, Table};

use unitpath_core::model::UnitProgress;

pub async fn execute(
    student: String,
    subject: String,
    grade: Option<u8>,
    format: String,
    config_path: Option<PathBuf>,
) -> Result<()> {
    let (_, engine) = super::open_engine(config_path.as_deref()).await?;
    let access = engine.track_access(&student, &subject, grade).await?;

    let mut rows: Vec<UnitProgress> = Vec::with_capacity(access.units.len());
    for unit in &access.units {
        rows.push(engine.get_unit_progress(&student, &unit.unit_id).await?);
    }

    match format.as_str() {
        "json" => {
            let out = serde_json::json!({
                "student": student,
                "track": access,
                "progress": rows,
            });
            println!("{}", serde_json::to_string_pretty(&out)?);
        }
        "text" => {
            println!("{} for {student}", access.name);

            let mut table = Table::new();
            table.set_header(vec![
                "Unit", "Name", "Access", "Stars", "Done", "Completion", "Mastery",
            ]);
            for (unit, row) in access.units.iter().zip(&rows) {
                table.add_row(vec![
                    Cell::new(&unit.unit_id),
                    Cell::new(&unit.name),
                    Cell::new(if unit.accessible { "open" } else { "locked" }),
                    Cell::new("*".repeat(row.stars as usize)),
                    Cell::new(format!(
                        "{}/{}",
                        row.completed_exercises, row.total_exercises
                    )),
                    Cell::new(format!("{:.0}%", row.completion_rate * 100.0)),
                    Cell::new(format!("{:.0}%", row.mastery_level * 100.0)),
                ]);
            }
            println!("{table}");
        }
        other => anyhow::bail!("unknown format: {other} (expected text or json)"),
    }

    Ok(())
}
