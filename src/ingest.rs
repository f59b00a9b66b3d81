//! `ctxdb add` and `ctxdb add-dir`.
//!
//! Directory import is caller-side: the tree is walked here and every
//! matching file becomes one `add_resource` call, with the parent subpath
//! mirroring the directory layout. The engine itself only ever sees single
//! files and URLs.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use anyhow::{bail, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use walkdir::WalkDir;

use context_db_core::models::{AddResult, AddStatus, PipelineStatus};
use context_db_core::uri::sanitize_segment;
use context_db_core::ResourceUri;

use crate::engine::ContextDb;
use crate::tracker::JoinScope;

/// `add-dir` pattern when none is given.
pub const DEFAULT_DIR_PATTERN: &str = "**/*.md";

/// Always skipped by `add-dir`.
const DEFAULT_EXCLUDES: &[&str] = &["**/.git/**", "**/target/**", "**/node_modules/**", "**/.*"];

/// A file found under an `add-dir` root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirFile {
    pub path: PathBuf,
    /// Relative parent subpath, `a/b` style.
    pub parent: String,
}

pub async fn run_add(
    db: &ContextDb,
    targets: &[String],
    parent: Option<&str>,
    wait: bool,
) -> Result<()> {
    let mut results = Vec::with_capacity(targets.len());
    for target in targets {
        let result = db.add_resource(target, parent).await;
        print_add_result(target, &result);
        results.push(result);
    }
    finish(db, &results, wait).await
}

pub async fn run_add_dir(
    db: &ContextDb,
    dir: &Path,
    pattern: Option<&str>,
    parent: Option<&str>,
    wait: bool,
) -> Result<()> {
    let base = match parent {
        Some(p) if p.contains("://") => {
            let uri = db.parse_uri(p)?;
            uri.segments().collect::<Vec<_>>().join("/")
        }
        Some(p) => p.trim_matches('/').to_string(),
        None => String::new(),
    };

    let files = collect_files(dir, pattern)?;
    if files.is_empty() {
        println!("No matching files under {}", dir.display());
        return Ok(());
    }

    let mut results = Vec::with_capacity(files.len());
    for file in &files {
        let subpath = join_subpath(&base, &file.parent);
        let target = file.path.to_string_lossy();
        let result = db
            .add_resource(&target, (!subpath.is_empty()).then_some(subpath.as_str()))
            .await;
        print_add_result(&target, &result);
        results.push(result);
    }
    finish(db, &results, wait).await
}

/// Walk `root` and return matching files, sorted by path.
///
/// The root directory's own name is the first segment of every parent
/// subpath, so `docs/guide/a.md` lands under `docs/guide`.
pub fn collect_files(root: &Path, pattern: Option<&str>) -> Result<Vec<DirFile>> {
    if !root.is_dir() {
        bail!("Not a directory: {}", root.display());
    }
    let root = root.canonicalize()?;
    let root_name = root
        .file_name()
        .and_then(|n| sanitize_segment(&n.to_string_lossy()))
        .unwrap_or_default();

    let include = match pattern {
        Some(p) => Some(build_globset(&[p])?),
        None => None,
    };
    let exclude = build_globset(DEFAULT_EXCLUDES)?;

    let mut files = Vec::new();
    for entry in WalkDir::new(&root).sort_by_file_name() {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        let relative = path.strip_prefix(&root).unwrap_or(path);
        let rel_str = relative.to_string_lossy().to_string();

        if exclude.is_match(&rel_str) {
            continue;
        }
        if let Some(include) = &include {
            if !include.is_match(&rel_str) {
                continue;
            }
        }

        let mut parent = root_name.clone();
        if let Some(dir) = relative.parent() {
            for component in dir.components() {
                if let Some(seg) = sanitize_segment(&component.as_os_str().to_string_lossy()) {
                    parent = join_subpath(&parent, &seg);
                }
            }
        }
        files.push(DirFile {
            path: path.to_path_buf(),
            parent,
        });
    }
    Ok(files)
}

fn join_subpath(a: &str, b: &str) -> String {
    match (a.is_empty(), b.is_empty()) {
        (true, _) => b.to_string(),
        (_, true) => a.to_string(),
        _ => format!("{}/{}", a, b),
    }
}

fn build_globset<S: AsRef<str>>(patterns: &[S]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern.as_ref())?);
    }
    Ok(builder.build()?)
}

fn print_add_result(target: &str, result: &AddResult) {
    match (result.status, &result.uri) {
        (AddStatus::Success, Some(uri)) => println!("added      {}", uri),
        (AddStatus::Collision, _) => println!(
            "collision  {}: {}",
            target,
            result.error.as_deref().unwrap_or("name already bound")
        ),
        _ => println!(
            "failed     {}: {}",
            target,
            result.error.as_deref().unwrap_or("unknown error")
        ),
    }
}

async fn finish(db: &ContextDb, results: &[AddResult], wait: bool) -> Result<()> {
    let added: BTreeSet<&ResourceUri> = results
        .iter()
        .filter(|r| r.is_success())
        .filter_map(|r| r.uri.as_ref())
        .collect();

    if wait && !added.is_empty() {
        db.wait_processed(JoinScope::All).await;
        report(db, &added).await?;
    }

    let rejected = results.iter().filter(|r| !r.is_success()).count();
    if rejected > 0 {
        bail!("{} of {} resources could not be added", rejected, results.len());
    }
    Ok(())
}

/// Print pipeline outcomes for resources whose work has finished.
async fn report(db: &ContextDb, uris: &BTreeSet<&ResourceUri>) -> Result<()> {
    let mut embedded = 0;
    let mut summarized = 0;
    let mut embed_failed = 0;
    let mut summary_failed = 0;
    for uri in uris {
        let resource = db.status(uri.as_str()).await?;
        match resource.embed_status {
            PipelineStatus::Done => embedded += 1,
            PipelineStatus::Failed => embed_failed += 1,
            _ => {}
        }
        match resource.summary_status {
            PipelineStatus::Done => summarized += 1,
            PipelineStatus::Failed => summary_failed += 1,
            _ => {}
        }
    }

    println!(
        "processed  {} resources: {} embedded, {} summarized",
        uris.len(),
        embedded,
        summarized
    );
    if embed_failed + summary_failed > 0 {
        println!(
            "failures   {} embedding, {} summarization (see `ctxdb status <uri>`, re-run with `ctxdb retry`)",
            embed_failed, summary_failed
        );
    }
    Ok(())
}
