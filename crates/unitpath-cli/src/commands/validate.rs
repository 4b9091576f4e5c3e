//! The `unitpath validate` command.

use std::path::PathBuf;

use anyhow::Result;

pub fn execute(catalog_path: PathBuf) -> Result<()> {
    let catalog = unitpath_core::parser::load_catalog(&catalog_path)?;

    for track in catalog.tracks() {
        let grade = track
            .grade
            .map(|g| format!(" grade {g}"))
            .unwrap_or_default();
        println!(
            "Track: {} ({}{grade}, {} units)",
            track.name,
            track.subject_code,
            track.units.len()
        );
    }
    println!("{} exercises", catalog.exercises().len());

    let warnings = unitpath_core::parser::validate_catalog(&catalog);
    for w in &warnings {
        let prefix = w
            .item_id
            .as_ref()
            .map(|id| format!("  [{id}]"))
            .unwrap_or_else(|| "  ".to_string());
        println!("{prefix} WARNING: {}", w.message);
    }

    if warnings.is_empty() {
        println!("All catalogs valid.");
    } else {
        println!("\n{} warning(s) found.", warnings.len());
    }

    Ok(())
}
