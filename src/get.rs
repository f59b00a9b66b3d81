//! Browse commands: `ls`, `read`, `abstract`, `overview`, `status`.

use anyhow::Result;
use chrono::DateTime;

use context_db_core::models::{ListEntry, PipelineKind, Resource};

use crate::engine::ContextDb;

pub async fn run_ls(db: &ContextDb, uri: Option<&str>, all: bool) -> Result<()> {
    let entries = db.ls(uri).await?;
    let visible: Vec<&ListEntry> = entries
        .iter()
        .filter(|e| all || !e.name.starts_with('.'))
        .collect();

    if visible.is_empty() {
        println!("(empty)");
        return Ok(());
    }
    for entry in visible {
        if entry.is_dir {
            println!("{:>10}  {}/", "-", entry.name);
        } else {
            println!("{:>10}  {}", entry.size, entry.name);
        }
        println!("{:>10}  {}", "", entry.uri);
    }
    Ok(())
}

pub async fn run_read(db: &ContextDb, uri: &str) -> Result<()> {
    let content = db.read(uri).await?;
    print!("{}", content);
    if !content.ends_with('\n') {
        println!();
    }
    Ok(())
}

pub async fn run_abstract(db: &ContextDb, uri: &str) -> Result<()> {
    println!("{}", db.abstract_(uri).await?);
    Ok(())
}

pub async fn run_overview(db: &ContextDb, uri: &str) -> Result<()> {
    println!("{}", db.overview(uri).await?);
    Ok(())
}

pub async fn run_status(db: &ContextDb, uri: &str) -> Result<()> {
    let resource = db.status(uri).await?;
    print_resource(&resource);
    Ok(())
}

fn print_resource(r: &Resource) {
    println!("--- Resource ---");
    println!("uri:            {}", r.uri);
    println!("origin:         {} ({})", r.origin, r.origin.kind());
    println!("content_type:   {}", r.content_type);
    println!("size:           {}", r.size);
    println!("content_hash:   {}", r.content_hash);
    println!("created_at:     {}", format_ts(r.created_at));
    println!("updated_at:     {}", format_ts(r.updated_at));
    for kind in [PipelineKind::Embed, PipelineKind::Summarize] {
        match r.error(kind) {
            Some(err) => println!("{:<15} {} ({})", format!("{}:", kind), r.status(kind), err),
            None => println!("{:<15} {}", format!("{}:", kind), r.status(kind)),
        }
    }
}

fn format_ts(ts: i64) -> String {
    DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| ts.to_string())
}
