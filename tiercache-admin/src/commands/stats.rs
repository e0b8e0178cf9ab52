use anyhow::{Context, Result};
use serde_json::json;
use std::path::Path;
use tiercache_core::STORE_EXTENSION;
use crate::target::StoreTarget;

pub fn execute_stats(target: &StoreTarget, as_json: bool) -> Result<()> {
    let stats = target.store.stats()?;

    if as_json {
        let output = json!({
            "name": target.name,
            "path": target.path.display().to_string(),
            "stats": stats,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    println!("\nCache Statistics: {}", target.name);
    println!("{}", "=".repeat(50));
    println!("Path:            {}", target.path.display());
    println!("Entries:         {}", stats.entries);
    println!("Expired Entries: {}", stats.expired_entries);
    println!("Payload Size:    {}", format_bytes(stats.payload_bytes));
    println!("File Size:       {}", format_bytes(stats.file_size_bytes));
    Ok(())
}

/// List cache instances found in `dir`
pub fn execute_list(dir: &Path) -> Result<()> {
    let names = instance_names(dir)?;

    if names.is_empty() {
        println!("No caches in {}", dir.display());
        return Ok(());
    }

    println!("\nCaches in {}", dir.display());
    println!("{}", "=".repeat(50));
    println!("{:<40} {:>10}", "NAME", "SIZE");
    println!("{}", "-".repeat(50));
    for (name, size) in names {
        println!("{:<40} {:>10}", name, format_bytes(size));
    }
    Ok(())
}

fn instance_names(dir: &Path) -> Result<Vec<(String, u64)>> {
    let entries = std::fs::read_dir(dir)
        .with_context(|| format!("Failed to read {}", dir.display()))?;

    let mut names = Vec::new();
    for entry in entries {
        let path = entry?.path();
        if path.extension().and_then(|e| e.to_str()) != Some(STORE_EXTENSION) {
            continue;
        }
        if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
            let size = std::fs::metadata(&path).map(|m| m.len()).unwrap_or(0);
            names.push((stem.to_string(), size));
        }
    }
    names.sort();
    Ok(names)
}

fn format_bytes(bytes: u64) -> String {
    const KB: f64 = 1024.0;
    const MB: f64 = KB * 1024.0;

    let value = bytes as f64;
    if value >= MB {
        format!("{:.2} MB", value / MB)
    } else if value >= KB {
        format!("{:.2} KB", value / KB)
    } else {
        format!("{} B", bytes)
    }
}
