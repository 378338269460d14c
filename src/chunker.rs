//! The chunking engine.
//!
//! Turns a [`SourceDocument`] into an ordered sequence of [`Chunk`]s using
//! the splitter primitives, picking a policy per document:
//!
//! 1. Code with recognized structural markers → structure-first split.
//! 2. Code without markers (or oversized structural pieces) → line windows.
//! 3. Documentation with headings → heading sections, oversized sections
//!    recursively character-windowed with the section label preserved.
//! 4. Documentation without headings → character windows.
//!
//! Each chunk receives a deterministic UUIDv5 derived from the document
//! origin and sequence index, plus a SHA-256 hash of its text so unchanged
//! chunks can be detected across re-ingestions. Chunking is a pure function
//! of its inputs; the same document and limits always reproduce the same
//! ids, hashes, and content.

use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::error::ChunkError;
use crate::models::{Chunk, ChunkKind, ChunkMetadata, Heading, SourceDocument, SourceRef};
use crate::splitter;

/// Default overlap as a fraction of the window when not configured: 10%.
const DEFAULT_OVERLAP_DIVISOR: usize = 10;

/// Processing limits for one chunking call.
#[derive(Debug, Clone, Copy)]
pub struct ChunkLimits {
    /// Maximum chunk content size in bytes.
    pub max_chunk_size: usize,
    /// Overlap in bytes at internal boundaries. `None` means 10% of the
    /// window.
    pub overlap_size: Option<usize>,
}

impl ChunkLimits {
    pub fn new(max_chunk_size: usize) -> Self {
        Self {
            max_chunk_size,
            overlap_size: None,
        }
    }

    /// Effective overlap in bytes.
    pub fn overlap(&self) -> usize {
        self.overlap_size
            .unwrap_or(self.max_chunk_size / DEFAULT_OVERLAP_DIVISOR)
    }

    /// Reject limit combinations that would stall window advancement.
    pub fn validate(&self) -> Result<(), ChunkError> {
        if self.max_chunk_size == 0 {
            return Err(ChunkError::ZeroWindow);
        }
        if self.overlap() >= self.max_chunk_size {
            return Err(ChunkError::OverlapExceedsWindow {
                overlap: self.overlap(),
                max: self.max_chunk_size,
            });
        }
        Ok(())
    }
}

/// Output of [`chunk_batch`]: per-document chunk sequences plus warnings
/// for documents that were skipped.
#[derive(Debug, Default)]
pub struct ChunkBatch {
    pub chunks: Vec<Vec<Chunk>>,
    pub warnings: Vec<String>,
}

impl ChunkBatch {
    pub fn total_chunks(&self) -> usize {
        self.chunks.iter().map(|c| c.len()).sum()
    }
}

/// Chunk a single document. Pure; never suspends.
///
/// Empty documents yield zero chunks (not an error). Limit misconfiguration
/// is the only failure mode.
pub fn chunk_document(
    document: &SourceDocument,
    limits: &ChunkLimits,
) -> Result<Vec<Chunk>, ChunkError> {
    limits.validate()?;

    if document.text().is_empty() {
        return Ok(Vec::new());
    }

    let pieces = match document {
        SourceDocument::CodeFile {
            path,
            text,
            language,
            ..
        } => {
            let lang = language
                .clone()
                .or_else(|| detect_language(path).map(str::to_string));
            chunk_code(text, lang.as_deref(), limits)
        }
        SourceDocument::DocPage { text, headings, .. } => chunk_docs(text, headings, limits),
    };

    let kind = chunk_kind(document);
    let source = source_ref(document);
    let language = match document {
        SourceDocument::CodeFile { path, language, .. } => language
            .clone()
            .or_else(|| detect_language(path).map(str::to_string)),
        SourceDocument::DocPage { .. } => None,
    };

    let chunks = pieces
        .into_iter()
        .filter(|p| !p.text.is_empty())
        .enumerate()
        .map(|(index, piece)| {
            let dependencies = language
                .as_deref()
                .and_then(|lang| extract_dependencies(&piece.text, lang));
            make_chunk(
                document.origin(),
                index,
                piece,
                kind,
                source.clone(),
                language.clone(),
                dependencies,
            )
        })
        .collect();

    Ok(chunks)
}

/// Chunk many documents, skipping malformed ones.
///
/// One undecodable document never aborts its siblings; it is skipped and
/// reported in the returned warnings. Limit misconfiguration is still fatal
/// for the whole batch.
pub fn chunk_batch(
    documents: &[SourceDocument],
    limits: &ChunkLimits,
) -> Result<ChunkBatch, ChunkError> {
    limits.validate()?;

    let mut batch = ChunkBatch::default();

    for document in documents {
        if document.text().contains('\u{0}') {
            batch.warnings.push(format!(
                "skipping {}: content looks binary or undecodable",
                document.origin()
            ));
            continue;
        }
        batch.chunks.push(chunk_document(document, limits)?);
    }

    Ok(batch)
}

/// A split piece before metadata attachment.
struct Piece {
    text: String,
    section: Option<String>,
    heading_level: Option<u8>,
}

impl Piece {
    fn plain(text: String) -> Self {
        Self {
            text,
            section: None,
            heading_level: None,
        }
    }
}

fn chunk_code(text: &str, language: Option<&str>, limits: &ChunkLimits) -> Vec<Piece> {
    let max = limits.max_chunk_size;
    let overlap = limits.overlap();

    if let Some(lang) = language {
        if let Some(structural) = splitter::split_code_structure(text, lang, max) {
            return structural
                .into_iter()
                .flat_map(|piece| {
                    // A structural piece past the window falls back to line
                    // windowing for that piece only.
                    if piece.len() > max {
                        splitter::split_lines(&piece, max, overlap)
                    } else {
                        vec![piece]
                    }
                })
                .map(Piece::plain)
                .collect();
        }
    }

    splitter::split_lines(text, max, overlap)
        .into_iter()
        .map(Piece::plain)
        .collect()
}

fn chunk_docs(text: &str, headings: &[Heading], limits: &ChunkLimits) -> Vec<Piece> {
    let max = limits.max_chunk_size;
    let overlap = limits.overlap();

    // The fetcher pre-parses the heading list; an empty list means there is
    // no structure to honor. The splitter still computes the exact section
    // byte ranges, which the flat list cannot carry.
    if headings.is_empty() {
        return splitter::split_chars(text, max, overlap)
            .into_iter()
            .map(Piece::plain)
            .collect();
    }

    let sections = splitter::split_headings(text);
    if sections.is_empty() {
        return splitter::split_chars(text, max, overlap)
            .into_iter()
            .map(Piece::plain)
            .collect();
    }

    sections
        .into_iter()
        .flat_map(|section| {
            let heading = section.heading;
            let level = section.level;
            let bodies = if section.body.len() > max {
                splitter::split_chars(&section.body, max, overlap)
            } else {
                vec![section.body]
            };
            bodies
                .into_iter()
                .map(move |text| Piece {
                    text,
                    section: heading.clone(),
                    heading_level: level,
                })
                .collect::<Vec<_>>()
        })
        .collect()
}

fn chunk_kind(document: &SourceDocument) -> ChunkKind {
    match document {
        SourceDocument::CodeFile { path, .. } => {
            let name = path.rsplit('/').next().unwrap_or(path);
            if name.to_ascii_lowercase().starts_with("readme") {
                ChunkKind::Readme
            } else {
                ChunkKind::Code
            }
        }
        SourceDocument::DocPage { .. } => ChunkKind::Documentation,
    }
}

fn source_ref(document: &SourceDocument) -> SourceRef {
    match document {
        SourceDocument::CodeFile { path, .. } => SourceRef {
            origin: path.clone(),
            path: Some(path.clone()),
            title: None,
        },
        SourceDocument::DocPage { url, title, .. } => SourceRef {
            origin: url.clone(),
            path: None,
            title: title.clone(),
        },
    }
}

#[allow(clippy::too_many_arguments)]
fn make_chunk(
    origin: &str,
    index: usize,
    piece: Piece,
    kind: ChunkKind,
    source: SourceRef,
    language: Option<String>,
    dependencies: Option<Vec<String>>,
) -> Chunk {
    let mut hasher = Sha256::new();
    hasher.update(piece.text.as_bytes());
    let content_hash = format!("{:x}", hasher.finalize());

    // Identity is a pure function of origin and sequence index, so
    // re-chunking identical input reproduces identical ids.
    let seed = format!("{}#{}", origin, index);
    let id = Uuid::new_v5(&Uuid::NAMESPACE_URL, seed.as_bytes()).to_string();

    let byte_size = piece.text.len();

    Chunk {
        id,
        content: piece.text,
        kind,
        source,
        metadata: ChunkMetadata {
            language,
            byte_size,
            content_hash,
            heading_level: piece.heading_level,
            section: piece.section,
            dependencies,
        },
    }
}

/// Map a file extension to a language with recognized structural markers.
pub fn detect_language(path: &str) -> Option<&'static str> {
    let ext = path.rsplit('.').next()?;
    match ext {
        "rs" => Some("rust"),
        "py" => Some("python"),
        "js" | "jsx" | "mjs" => Some("javascript"),
        "ts" | "tsx" => Some("typescript"),
        "go" => Some("go"),
        "java" => Some("java"),
        "rb" => Some("ruby"),
        "c" | "h" => Some("c"),
        "cc" | "cpp" | "hpp" | "cxx" => Some("cpp"),
        _ => None,
    }
}

/// Scan import/require-style lines and return their targets, in order of
/// first appearance. `None` when the chunk imports nothing.
pub fn extract_dependencies(text: &str, language: &str) -> Option<Vec<String>> {
    let mut deps: Vec<String> = Vec::new();

    for line in text.lines() {
        let trimmed = line.trim_start();
        let target = match language {
            "rust" => trimmed
                .strip_prefix("use ")
                .map(|r| r.trim_end_matches(';').trim().to_string()),
            "python" => trimmed
                .strip_prefix("import ")
                .map(|r| r.split(" as ").next().unwrap_or(r).trim().to_string())
                .or_else(|| {
                    trimmed.strip_prefix("from ").and_then(|r| {
                        r.split_whitespace().next().map(str::to_string)
                    })
                }),
            "javascript" | "typescript" => quoted_import(trimmed),
            "go" => trimmed
                .strip_prefix("import ")
                .and_then(|r| r.trim().strip_prefix('"'))
                .map(|r| r.trim_end_matches('"').to_string()),
            "ruby" => trimmed
                .strip_prefix("require ")
                .or_else(|| trimmed.strip_prefix("require_relative "))
                .map(|r| r.trim_matches(|c| c == '\'' || c == '"' || c == ' ').to_string()),
            "c" | "cpp" => trimmed.strip_prefix("#include ").map(|r| {
                r.trim_matches(|c| c == '<' || c == '>' || c == '"' || c == ' ')
                    .to_string()
            }),
            _ => None,
        };

        if let Some(t) = target {
            if !t.is_empty() && !deps.contains(&t) {
                deps.push(t);
            }
        }
    }

    if deps.is_empty() {
        None
    } else {
        Some(deps)
    }
}

/// Pull the module specifier out of `import … from 'x'` or `require('x')`.
fn quoted_import(line: &str) -> Option<String> {
    let has_import = line.starts_with("import ") || line.contains("require(");
    if !has_import {
        return None;
    }
    let quote = line.find(['\'', '"'])?;
    let q = line.as_bytes()[quote] as char;
    let rest = &line[quote + 1..];
    let end = rest.find(q)?;
    Some(rest[..end].to_string())
}
