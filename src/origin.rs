//! Origin classification and raw-content loading.
//!
//! Turns a caller-supplied target (a path or an `http(s)` URL) into an
//! [`Origin`] and, for supported origins, the plain text that becomes the
//! resource's L2 content.

use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use sha2::{Digest, Sha256};

use context_db_core::models::Origin;
use context_db_core::ContextError;

pub const MIME_PDF: &str = "application/pdf";

/// Raw content fetched for one origin.
#[derive(Debug, Clone)]
pub struct LoadedContent {
    pub text: String,
    pub content_type: String,
}

impl LoadedContent {
    pub fn hash(&self) -> String {
        hash_text(&self.text)
    }

    pub fn size(&self) -> u64 {
        self.text.len() as u64
    }
}

/// Classify a target string.
///
/// URLs are kept verbatim (trimmed); paths are canonicalized so the same
/// file reached through different relative paths is the same origin.
pub fn classify(target: &str) -> Result<Origin> {
    let target = target.trim();
    if target.starts_with("http://") || target.starts_with("https://") {
        return Ok(Origin::Url(target.to_string()));
    }
    if let Some((scheme, _)) = target.split_once("://") {
        return Err(ContextError::UnsupportedOrigin(format!(
            "unsupported scheme '{}' in {}",
            scheme, target
        ))
        .into());
    }

    let path = Path::new(target);
    let canonical = path
        .canonicalize()
        .with_context(|| format!("cannot access {}", target))?;
    let display = canonical.to_string_lossy().into_owned();
    if canonical.is_dir() {
        Ok(Origin::Directory(display))
    } else {
        Ok(Origin::File(display))
    }
}

/// Fetch the text content of a file or URL origin.
pub async fn load(origin: &Origin, timeout: Duration) -> Result<LoadedContent> {
    match origin {
        Origin::File(path) => load_file(Path::new(path)).await,
        Origin::Url(url) => load_url(url, timeout).await,
        Origin::Directory(path) => Err(ContextError::UnsupportedOrigin(format!(
            "{} is a directory",
            path
        ))
        .into()),
    }
}

async fn load_file(path: &Path) -> Result<LoadedContent> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("failed to read {}", path.display()))?;
    let content_type = content_type_for_path(path);
    let text = decode(bytes, content_type)
        .with_context(|| format!("failed to decode {}", path.display()))?;
    Ok(LoadedContent {
        text,
        content_type: content_type.to_string(),
    })
}

async fn load_url(url: &str, timeout: Duration) -> Result<LoadedContent> {
    let client = reqwest::Client::builder().timeout(timeout).build()?;
    let response = client.get(url).send().await?;
    let status = response.status();
    if !status.is_success() {
        bail!("GET {} returned {}", url, status);
    }

    let header_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.split(';').next().unwrap_or(v).trim().to_string());
    let content_type = match header_type {
        Some(t) if !t.is_empty() => t,
        _ => content_type_for_path(Path::new(url)).to_string(),
    };

    let bytes = response.bytes().await?.to_vec();
    let text = decode(bytes, &content_type).with_context(|| format!("failed to decode {}", url))?;
    Ok(LoadedContent { text, content_type })
}

fn decode(bytes: Vec<u8>, content_type: &str) -> Result<String> {
    if content_type == MIME_PDF {
        return pdf_extract::extract_text_from_mem(&bytes)
            .map_err(|e| anyhow::anyhow!("PDF extraction failed: {}", e));
    }
    String::from_utf8(bytes).map_err(|_| {
        ContextError::UnsupportedOrigin(format!("{} content is not UTF-8 text", content_type))
            .into()
    })
}

pub fn content_type_for_path(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());
    match ext.as_deref() {
        Some("md") | Some("markdown") => "text/markdown",
        Some("html") | Some("htm") => "text/html",
        Some("json") => "application/json",
        Some("pdf") => MIME_PDF,
        Some("rs") | Some("py") | Some("js") | Some("ts") | Some("go") | Some("toml")
        | Some("yaml") | Some("yml") => "text/x-source",
        _ => "text/plain",
    }
}

pub fn hash_text(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}
