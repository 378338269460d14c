//! Filesystem source fetcher.
//!
//! Walks a directory tree and turns matching files into
//! [`SourceDocument`]s for the chunking engine. Markdown files become
//! [`SourceDocument::DocPage`] with their headings pre-parsed; everything
//! else becomes [`SourceDocument::CodeFile`]. Binary files (NUL byte in
//! the probe window) and oversized files are skipped with a warning, not
//! an error, so one bad file never aborts an ingest run.

use anyhow::{bail, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::path::Path;
use walkdir::WalkDir;

use crate::chunker::detect_language;
use crate::config::FetcherConfig;
use crate::models::SourceDocument;
use crate::splitter::parse_headings;

/// How far into a file to look for NUL bytes before calling it binary.
const BINARY_PROBE_BYTES: usize = 8192;

/// Result of one filesystem scan.
pub struct FetchBatch {
    pub documents: Vec<SourceDocument>,
    /// Paths skipped and why, for operator visibility.
    pub skipped: Vec<String>,
}

/// Scan `config.root` and collect every file matching the include globs
/// and no exclude glob. Documents come back sorted by path so repeated
/// runs over the same tree produce the same order.
pub fn scan_filesystem(config: &FetcherConfig) -> Result<FetchBatch> {
    let root = &config.root;
    if !root.exists() {
        bail!("Fetch root does not exist: {}", root.display());
    }

    let include_set = build_globset(&config.include_globs)?;

    let mut default_excludes = vec![
        "**/.git/**".to_string(),
        "**/target/**".to_string(),
        "**/node_modules/**".to_string(),
    ];
    default_excludes.extend(config.exclude_globs.clone());
    let exclude_set = build_globset(&default_excludes)?;

    let mut documents = Vec::new();
    let mut skipped = Vec::new();

    let walker = WalkDir::new(root).follow_links(config.follow_symlinks);
    for entry in walker {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let relative = path.strip_prefix(root).unwrap_or(path);
        let rel_str = relative.to_string_lossy().to_string();

        if exclude_set.is_match(&rel_str) {
            continue;
        }
        if !include_set.is_match(&rel_str) {
            continue;
        }

        let metadata = std::fs::metadata(path)?;
        if metadata.len() > config.max_file_bytes {
            skipped.push(format!(
                "{}: {} bytes exceeds limit of {}",
                rel_str,
                metadata.len(),
                config.max_file_bytes
            ));
            continue;
        }

        let bytes = std::fs::read(path)?;
        if looks_binary(&bytes) {
            skipped.push(format!("{}: binary content", rel_str));
            continue;
        }

        let text = match String::from_utf8(bytes) {
            Ok(text) => text,
            Err(_) => {
                skipped.push(format!("{}: not valid UTF-8", rel_str));
                continue;
            }
        };

        documents.push(file_to_document(path, &rel_str, text));
    }

    documents.sort_by(|a, b| a.origin().cmp(b.origin()));

    Ok(FetchBatch { documents, skipped })
}

fn file_to_document(path: &Path, relative_path: &str, text: String) -> SourceDocument {
    if is_markdown(relative_path) {
        let headings = parse_headings(&text);
        // Prefer the first top-level heading as the title, else the filename.
        let title = headings
            .iter()
            .find(|h| h.level == 1)
            .map(|h| h.text.clone())
            .or_else(|| {
                path.file_stem()
                    .map(|stem| stem.to_string_lossy().to_string())
            });
        SourceDocument::DocPage {
            url: format!("file://{}", relative_path),
            title,
            text,
            headings,
        }
    } else {
        let byte_size = text.len();
        SourceDocument::CodeFile {
            path: relative_path.to_string(),
            language: detect_language(relative_path).map(str::to_string),
            text,
            byte_size,
        }
    }
}

fn is_markdown(path: &str) -> bool {
    let lower = path.to_ascii_lowercase();
    lower.ends_with(".md") || lower.ends_with(".markdown")
}

fn looks_binary(bytes: &[u8]) -> bool {
    bytes
        .iter()
        .take(BINARY_PROBE_BYTES)
        .any(|&b| b == 0)
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}
