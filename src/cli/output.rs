//! JSON-lines output for CLI commands

use anyhow::{Context, Result};
use serde::Serialize;
use std::io::Write;

/// Write one record as a single JSON line
pub fn write_json_line<T: Serialize, W: Write>(out: &mut W, data: &T) -> Result<()> {
    serde_json::to_writer(&mut *out, data).context("Failed to serialize to JSON")?;
    out.write_all(b"\n").context("Failed to write output")?;
    Ok(())
}

/// Write every record of a collection, one per line
pub fn write_json_lines<T: Serialize, W: Write>(out: &mut W, records: &[T]) -> Result<()> {
    for record in records {
        write_json_line(out, record)?;
    }
    Ok(())
}
