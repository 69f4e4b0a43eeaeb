//! Input handling: reading the script and the optional schema file.

use anyhow::{Context, Result};
use std::path::Path;

/// Reads the SQL script at `path` as UTF-8.
pub fn read_script(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("failed to read script file: {}", path.display()))
}
