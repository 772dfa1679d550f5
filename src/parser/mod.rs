//! Code structure parser.
//!
//! Tree-sitter based extraction of files, functions, classes, and imports,
//! with signature normalization for overload disambiguation and
//! diff-mode chunking for large inputs. See DESIGN.md for the tree-sitter
//! usage this is grounded on.

mod languages;
mod signature;

pub use languages::{is_generated, Lang};
pub use signature::{normalize as normalize_signature, RawParam};

use tracing::{instrument, warn};
use tree_sitter::{Node, Parser};

use crate::config::Config;
use crate::errors::CoreError;
use crate::model::{BlockType, CodeEntity};

/// Outcome of parsing one file (or one diff's worth of chunks): extracted
/// entities plus the diagnostics the commit row records.
#[derive(Debug, Default)]
pub struct ParseOutcome {
    pub entities: Vec<CodeEntity>,
    pub imports: Vec<String>,
    pub diff_chunks_processed: u32,
    pub diff_chunks_skipped: u32,
    pub diff_truncation_reason: Option<String>,
}

/// Parses a single source file's full content (not diff mode). Returns
/// `Ok(None)` for files that are skipped with a diagnostic (binary,
/// oversized, generated, or unrecognized extension) rather than an error,
/// since skipping is an expected, common outcome.
#[instrument(skip(content))]
pub fn parse_file(path: &str, content: &[u8], config: &Config) -> Result<Option<ParseOutcome>, CoreError> {
    if is_generated(path) {
        return Ok(None);
    }
    if content.len() as u64 > config.parser_max_file_size_bytes {
        warn!(path, size = content.len(), "skipping oversized file");
        return Ok(None);
    }
    if is_binary(content) {
        warn!(path, "skipping binary file");
        return Ok(None);
    }

    let Some(spec) = languages::by_extension(path) else {
        return Ok(None);
    };

    let text = String::from_utf8_lossy(content);
    let mut parser = Parser::new();
    parser
        .set_language(&languages::grammar(spec.lang))
        .map_err(|e| CoreError::parse_failure(path, e.to_string()))?;

    let tree = parser
        .parse(text.as_bytes(), None)
        .ok_or_else(|| CoreError::parse_failure(path, "tree-sitter produced no tree"))?;

    let mut outcome = ParseOutcome {
        diff_chunks_processed: 1,
        ..ParseOutcome::default()
    };
    walk(tree.root_node(), text.as_bytes(), path, &spec, &mut outcome);
    Ok(Some(outcome))
}

fn is_binary(content: &[u8]) -> bool {
    content.iter().take(8000).any(|&b| b == 0)
}

fn walk(
    node: Node,
    source: &[u8],
    canonical_path: &str,
    spec: &languages::LanguageSpec,
    outcome: &mut ParseOutcome,
) {
    let kind = node.kind();

    if spec.function_node_kinds.contains(&kind) {
        if let Some(entity) = extract_function(node, source, canonical_path, spec, BlockType::Function) {
            outcome.entities.push(entity);
        }
    } else if spec.class_node_kinds.contains(&kind) {
        if let Some(entity) = extract_function(node, source, canonical_path, spec, BlockType::Class) {
            outcome.entities.push(entity);
        }
    } else if spec.import_node_kinds.contains(&kind) {
        outcome.imports.push(node_text(node, source));
    }

    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        walk(child, source, canonical_path, spec, outcome);
    }
}

fn extract_function(
    node: Node,
    source: &[u8],
    canonical_path: &str,
    spec: &languages::LanguageSpec,
    block_type: BlockType,
) -> Option<CodeEntity> {
    let name_node = node.child_by_field_name(spec.name_field)?;
    let name = node_text(name_node, source);

    let params = node
        .child_by_field_name("parameters")
        .map(|p| extract_params(p, source))
        .unwrap_or_default();
    let sig = signature::normalize(&params);

    Some(CodeEntity {
        name,
        canonical_file_path: canonical_path.to_string(),
        signature: sig,
        block_type,
        start_line: node.start_position().row as u32 + 1,
        end_line: node.end_position().row as u32 + 1,
        historical_names: Vec::new(),
    })
}

/// Best-effort parameter extraction: walks direct children of a parameter
/// list, treating each named child as one parameter. Languages whose
/// grammar has no `type` field on a parameter node (plain `identifier`
/// params, e.g. Python) leave `declared_type` as `None`, which
/// `signature::normalize` turns into the untyped placeholder rather than
/// the parameter's own name.
fn extract_params(params_node: Node, source: &[u8]) -> Vec<RawParam> {
    let mut out = Vec::new();
    let mut cursor = params_node.walk();
    for child in params_node.named_children(&mut cursor) {
        let declared_type = child.child_by_field_name("type").map(|t| node_text(t, source));
        out.push(RawParam {
            name: node_text(child, source),
            declared_type,
        });
    }
    out
}

fn node_text(node: Node, source: &[u8]) -> String {
    node.utf8_text(source).unwrap_or_default().to_string()
}

/// Diff-mode chunking: splits a large diff into chunks by function
/// boundary using a language-agnostic regex fallback (a line starting a new
/// top-level declaration), parses each chunk independently, and merges
/// results by `(canonical_path, block_name, signature)` with additive
/// line-range union.
#[instrument(skip(diff_text))]
pub fn parse_diff_chunked(
    path: &str,
    diff_text: &str,
    config: &Config,
) -> Result<ParseOutcome, CoreError> {
    let lines: Vec<&str> = diff_text.lines().collect();
    if lines.len() <= config.agent_diff_truncation_lines {
        let outcome = parse_file(path, diff_text.as_bytes(), config)?.unwrap_or_default();
        return Ok(outcome);
    }

    let chunk_boundary = regex_like_boundary();
    let mut chunks: Vec<Vec<&str>> = Vec::new();
    let mut current = Vec::new();
    for line in &lines {
        if chunk_boundary(line) && !current.is_empty() {
            chunks.push(std::mem::take(&mut current));
        }
        current.push(*line);
    }
    if !current.is_empty() {
        chunks.push(current);
    }

    let mut merged = ParseOutcome::default();
    for chunk in chunks {
        let chunk_text = chunk.join("\n");
        match parse_file(path, chunk_text.as_bytes(), config) {
            Ok(Some(parsed)) => merge(&mut merged, parsed),
            Ok(None) => merged.diff_chunks_skipped += 1,
            Err(e) => {
                warn!(path, error = %e, "chunk parse failed, skipping chunk");
                merged.diff_chunks_skipped += 1;
            }
        }
    }
    if merged.diff_chunks_skipped > 0 {
        merged.diff_truncation_reason = Some("one or more diff chunks failed to parse".to_string());
    }
    Ok(merged)
}

fn regex_like_boundary() -> impl Fn(&str) -> bool {
    |line: &str| {
        let trimmed = line.trim_start();
        trimmed.starts_with("func ")
            || trimmed.starts_with("def ")
            || trimmed.starts_with("function ")
            || trimmed.starts_with("class ")
            || trimmed.starts_with("public ")
            || trimmed.starts_with("private ")
    }
}

fn merge(into: &mut ParseOutcome, from: ParseOutcome) {
    into.diff_chunks_processed += from.diff_chunks_processed;
    into.diff_chunks_skipped += from.diff_chunks_skipped;
    into.imports.extend(from.imports);

    for entity in from.entities {
        let existing = into.entities.iter_mut().find(|e| {
            e.canonical_file_path == entity.canonical_file_path
                && e.name == entity.name
                && e.signature == entity.signature
        });
        match existing {
            Some(existing) => {
                existing.start_line = existing.start_line.min(entity.start_line);
                existing.end_line = existing.end_line.max(entity.end_line);
            }
            None => into.entities.push(entity),
        }
    }
}
