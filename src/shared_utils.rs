use std::fs;
use std::io::Write;
use std::path::Path;
use std::time::SystemTime;

use anyhow::{Context, Result};
use chrono::{DateTime, Local};

/// Lowercase an extension and strip the leading separator: ".PDF" -> "pdf"
pub fn normalize_extension(extension: &str) -> String {
    extension.trim().trim_start_matches('.').to_lowercase()
}

/// Normalized extension of a path, if it has one
pub fn extension_of(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(normalize_extension)
        .filter(|ext| !ext.is_empty())
}

/// File name of a path for display, falling back to the full path
pub fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Directory a file would be written into; "" means the working directory
pub fn parent_dir(path: &Path) -> &Path {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    }
}

/// Format a filesystem timestamp as RFC 3339 in local time
pub fn format_system_time(time: SystemTime) -> String {
    DateTime::<Local>::from(time).to_rfc3339()
}

/// Size in megabytes rounded to two decimals
pub fn size_in_mb(size_bytes: u64) -> f64 {
    (size_bytes as f64 / (1024.0 * 1024.0) * 100.0).round() / 100.0
}

/// Write bytes to a temporary file next to `target`, then rename it over the
/// target. Readers never observe a partially written target. An existing
/// target keeps its permissions; a new one gets the same mode a plain create would.
pub fn write_atomically(target: &Path, bytes: &[u8]) -> Result<u64> {
    let dir = parent_dir(target);
    let existing = fs::metadata(target).ok().map(|metadata| metadata.permissions());

    let mut builder = tempfile::Builder::new();
    builder.prefix(".kb-mcp-").suffix(".tmp");
    if existing.is_none() {
        if let Some(permissions) = new_file_permissions() {
            builder.permissions(permissions);
        }
    }
    let mut temp_file = builder
        .tempfile_in(dir)
        .with_context(|| format!("Failed to create temporary file in {}", dir.display()))?;

    if let Some(permissions) = existing {
        temp_file
            .as_file()
            .set_permissions(permissions)
            .with_context(|| format!("Failed to copy permissions of {}", target.display()))?;
    }

    temp_file
        .write_all(bytes)
        .with_context(|| "Failed to write temporary file")?;
    temp_file
        .as_file()
        .sync_all()
        .with_context(|| "Failed to flush temporary file")?;

    temp_file
        .persist(target)
        .map_err(|e| e.error)
        .with_context(|| format!("Failed to move temporary file to {}", target.display()))?;

    Ok(bytes.len() as u64)
}

/// 0o666 before the umask, as `File::create` uses
#[cfg(unix)]
fn new_file_permissions() -> Option<fs::Permissions> {
    use std::os::unix::fs::PermissionsExt;
    Some(fs::Permissions::from_mode(0o666))
}

#[cfg(not(unix))]
fn new_file_permissions() -> Option<fs::Permissions> {
    None
}

/// Render rows as a markdown table; the first row is the header
pub fn rows_to_markdown_table(rows: &[Vec<String>]) -> String {
    let Some(header) = rows.first() else {
        return "Empty sheet".to_string();
    };

    let width = rows.iter().map(|r| r.len()).max().unwrap_or(0);
    let mut table = String::new();

    let push_row = |table: &mut String, row: &[String]| {
        table.push_str("| ");
        for col in 0..width {
            let cell = row.get(col).map(|c| c.replace('|', "\\|")).unwrap_or_default();
            table.push_str(&format!("{} | ", cell));
        }
        table.push('\n');
    };

    push_row(&mut table, header);

    table.push_str("| ");
    for _ in 0..width {
        table.push_str("--- | ");
    }
    table.push('\n');

    for row in &rows[1..] {
        push_row(&mut table, row);
    }

    table
}
