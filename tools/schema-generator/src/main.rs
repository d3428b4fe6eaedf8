//! Generate JSON schemas for the stagewatch data model
//!
//! This tool writes one schema per wire type of the stagewatch-schemas crate
//! to the json_schema directory, for producers of stage events and consumers
//! of run snapshots.

use schemars::{schema::RootSchema, schema_for};
use stagewatch_schemas::{RunSnapshot, StageEvent, StageRange};
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

fn write_schema(dir: &Path, name: &str, schema: RootSchema) -> Result<(), Box<dyn std::error::Error>> {
    let schema_json = serde_json::to_string_pretty(&schema)?;
    let output_path = dir.join(format!("{name}.schema.json"));

    let mut file = File::create(&output_path)?;
    file.write_all(schema_json.as_bytes())?;

    println!("Generated JSON schema at: {}", output_path.display());
    Ok(())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let output_dir = PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .ancestors()
        .nth(2)
        .ok_or("schema-generator must live two levels below the workspace root")?
        .join("json_schema");
    std::fs::create_dir_all(&output_dir)?;

    write_schema(&output_dir, "stage_event", schema_for!(StageEvent))?;
    write_schema(&output_dir, "stage_range", schema_for!(StageRange))?;
    write_schema(&output_dir, "run_snapshot", schema_for!(RunSnapshot))?;

    Ok(())
}
