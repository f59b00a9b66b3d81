//! `ctxdb info`: resource counts, pipeline health, and index coverage.

use anyhow::Result;

use crate::config::Config;
use crate::engine::{ContextDb, StatusCounts};

pub async fn run_info(db: &ContextDb, config: &Config) -> Result<()> {
    let stats = db.info().await?;
    let db_size = std::fs::metadata(&config.db.path)
        .map(|m| m.len())
        .unwrap_or(0);

    println!("Context DB — Stats");
    println!("==================");
    println!();
    println!("  Database:    {}", config.db.path.display());
    println!("  Size:        {}", format_bytes(db_size));
    println!("  Root:        {}", db.root());
    println!();
    println!("  Resources:   {}", stats.resources);
    println!(
        "  Searchable:  {} / {} ({}%)",
        stats.indexed,
        stats.resources,
        if stats.resources > 0 {
            (stats.indexed * 100) / stats.resources
        } else {
            0
        }
    );
    println!(
        "  In flight:   {} queued, {} running",
        stats.queued, stats.active
    );
    println!();
    println!(
        "  {:<14} {:>8} {:>8} {:>8} {:>8}   {}",
        "PIPELINE", "PENDING", "RUNNING", "DONE", "FAILED", "MODEL"
    );
    println!("  {}", "-".repeat(70));
    print_row("embedding", &stats.embedding, &stats.embedding_model);
    print_row("summarization", &stats.summarization, &stats.summarization_model);
    println!();
    Ok(())
}

fn print_row(name: &str, c: &StatusCounts, model: &str) {
    println!(
        "  {:<14} {:>8} {:>8} {:>8} {:>8}   {}",
        name, c.pending, c.running, c.done, c.failed, model
    );
}

/// Format a byte count as a human-readable string.
fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(2048), "2.0 KB");
        assert_eq!(format_bytes(3 * 1024 * 1024), "3.0 MB");
    }
}
