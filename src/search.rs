//! `ctxdb search`: semantic search over embedded resources.

use anyhow::Result;

use crate::engine::ContextDb;
use crate::pipeline::truncate_chars;

pub async fn run_search(
    db: &ContextDb,
    query: &str,
    limit: Option<usize>,
    scope: Option<&str>,
) -> Result<()> {
    let hits = db.find(query, limit, scope).await?;

    if hits.is_empty() {
        println!("No results.");
        return Ok(());
    }

    for (i, hit) in hits.iter().enumerate() {
        println!("{}. [{:.4}] {}", i + 1, hit.score, hit.uri);
        // Prefer the abstract; without one, show the start of the content.
        let text = match db.abstract_(hit.uri.as_str()).await {
            Ok(summary) => summary,
            Err(_) => db.read(hit.uri.as_str()).await?,
        };
        let preview = preview(&text, PREVIEW_CHARS);
        if !preview.is_empty() {
            println!("    {}", preview);
        }
    }
    Ok(())
}

const PREVIEW_CHARS: usize = 150;

/// Single-line preview of at most `max_chars` characters.
fn preview(text: &str, max_chars: usize) -> String {
    let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");
    let cut = truncate_chars(&flat, max_chars);
    if cut.len() < flat.len() {
        format!("{}...", cut)
    } else {
        flat
    }
}
