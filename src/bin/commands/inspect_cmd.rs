use anyhow::{Context, Result};
use geoatlas::{DataValue, GeoConfig, GeoDatabase};
use serde_json::json;

use crate::cli_utils::{data_value_to_json, format_unix_timestamp, print_json};

pub fn cmd_inspect(config: &GeoConfig, verify: bool) -> Result<()> {
    let path = &config.database;
    let db = GeoDatabase::open(path)
        .with_context(|| format!("Failed to load index: {}", path.display()))?;
    let metadata = db
        .metadata()
        .with_context(|| format!("Failed to read metadata: {}", path.display()))?;

    let mut output = json!({
        "file": path.display().to_string(),
        "size_bytes": db.len(),
        "node_count": db.node_count(),
        "record_size": db.record_size(),
        "record_count": db.record_count(),
        "metadata": data_value_to_json(&metadata),
    });

    if let Some(epoch) = metadata
        .get_path(&["build_epoch"])
        .and_then(DataValue::as_u64)
    {
        output["build_time"] = json!(format_unix_timestamp(epoch));
    }

    let mut valid = true;
    if verify {
        let report = db.verify();
        valid = report.is_valid();
        output["checksum"] = json!({
            "stored": report.stored.map(|v| format!("{:016x}", v)),
            "computed": format!("{:016x}", report.computed),
            "valid": valid,
        });
    }

    print_json(&output)?;
    if !valid {
        std::process::exit(1);
    }
    Ok(())
}
