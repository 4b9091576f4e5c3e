//! The `unitpath init` command.

use anyhow::Result;

pub fn execute() -> Result<()> {
    if std::path::Path::new("unitpath.toml").exists() {
        println!("unitpath.toml already exists, skipping.");
    } else {
        std::fs::write("unitpath.toml", SAMPLE_CONFIG)?;
        println!("Created unitpath.toml");
    }

    std::fs::create_dir_all("catalogs")?;
    let example_path = std::path::Path::new("catalogs/example.toml");
    if example_path.exists() {
        println!("catalogs/example.toml already exists, skipping.");
    } else {
        std::fs::write(example_path, EXAMPLE_CATALOG)?;
        println!("Created catalogs/example.toml");
    }

    println!("\nNext steps:");
    println!("  1. Run: unitpath validate --catalog catalogs/example.toml");
    println!("  2. Run: unitpath serve");
    println!("  3. Run: unitpath progress --student s1 --subject math --grade 1");

    Ok(())
}

const SAMPLE_CONFIG: &str = r#"# unitpath configuration

[store]
type = "json"
path = "./unitpath-data"

[content]
type = "catalog"
path = "./catalogs"

[server]
bind = "127.0.0.1:8080"

[policy]
star_two_rate = 0.6
star_three_rate = 0.8
completion_rate = 0.8
mastery_error_weight = 0.5
application = "count_as_passed"

[policy.placement]
rule = "any_correct"
"#;

const EXAMPLE_CATALOG: &str = r#"[[tracks]]
subject_code = "math"
grade = 1
name = "Math - Grade 1"

[[tracks.units]]
id = "math1-counting"
name = "Counting to 20"

[[tracks.units.exercises]]
id = "count-1"
kind = "choice"
prompt = "What comes after 9?"
options = ["8", "10", "11"]
correct_answer = 1
explanation = "Counting up: 8, 9, 10."
help = "Count up from 1 on your fingers."

[[tracks.units.exercises]]
id = "count-2"
kind = "fill_blank"
prompt = "12, 13, ___, 15"
correct_answer = [["14", "fourteen"]]
explanation = "Each number is one more than the last."

[[tracks.units]]
id = "math1-adding"
name = "Adding within 10"

[[tracks.units.exercises]]
id = "add-1"
kind = "choice"
prompt = "3 + 4 = ?"
options = ["6", "7", "8"]
correct_answer = 1
explanation = "Start at 3 and count on 4 more."
"#;
