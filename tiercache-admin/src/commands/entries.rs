use anyhow::Result;
use chrono::{DateTime, Utc};
use crate::target::StoreTarget;

const PREVIEW_BYTES: usize = 32;

pub fn execute_keys(target: &StoreTarget) -> Result<()> {
    let keys = target.store.keys()?;

    if keys.is_empty() {
        println!("No entries in '{}'", target.name);
        return Ok(());
    }

    for key in &keys {
        println!("{}", key);
    }
    println!("\n{} key(s)", keys.len());
    Ok(())
}

pub fn execute_inspect(target: &StoreTarget, key: &str) -> Result<()> {
    let Some(row) = target.store.inspect(key)? else {
        println!("Key '{}' not found", key);
        return Ok(());
    };

    println!("\nEntry: {}", row.key);
    println!("{}", "=".repeat(50));
    println!("Updated At:   {}", format_time(row.updated_at));

    let record = match &row.record {
        Ok(record) => record,
        Err(e) => {
            println!("Integrity:    FAILED ({})", e);
            return Ok(());
        }
    };

    println!("Stored Size:  {} bytes", record.payload.len());
    println!("Checksum:     {:08x}", record.checksum);
    println!("Compressed:   {}", yes_no(record.compressed));
    println!("Expires At:   {}", format_time(record.expires_at));
    if record.is_expired(Utc::now()) {
        println!("Status:       expired");
    }

    match record.open() {
        Ok(bytes) => {
            println!("Integrity:    ok");
            println!("Encoded Size: {} bytes", bytes.len());
            println!("Preview:      {}", preview(&bytes));
        }
        Err(e) => {
            println!("Integrity:    FAILED ({})", e);
        }
    }

    Ok(())
}

pub fn execute_remove(target: &StoreTarget, key: &str) -> Result<()> {
    if target.store.delete(key)? {
        println!("✓ Removed '{}'", key);
    } else {
        println!("Key '{}' not found", key);
    }
    Ok(())
}

fn yes_no(flag: bool) -> &'static str {
    if flag { "yes" } else { "no" }
}

fn format_time(at: Option<DateTime<Utc>>) -> String {
    at.map(|t| t.to_rfc3339())
        .unwrap_or_else(|| "never".to_string())
}

fn preview(bytes: &[u8]) -> String {
    let shown = &bytes[..bytes.len().min(PREVIEW_BYTES)];
    let mut out = hex::encode(shown);
    if bytes.len() > PREVIEW_BYTES {
        out.push_str("...");
    }
    out
}
