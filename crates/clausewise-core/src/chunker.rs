//! Parent/child chunking.
//!
//! Parents are built per page by greedily accumulating paragraphs up to
//! `parent_max_chars`; a paragraph that alone exceeds the maximum is split on
//! whitespace. Children slide a `child_chars` window with `child_overlap`
//! over each parent. All offsets are char offsets into the document text and
//! every id is derived from position, so the same input always produces the
//! same fragments.

use tracing::debug;

use crate::config::ChunkingConfig;
use crate::error::Result;
use crate::types::{CharSpan, ChildFragment, ChunkedDocument, Document, ParentFragment};

#[derive(Debug, Clone)]
pub struct Chunker {
    config: ChunkingConfig,
}

impl Chunker {
    pub fn new(config: ChunkingConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn chunk(&self, document: &Document) -> ChunkedDocument {
        let chars: Vec<char> = document.full_text().chars().collect();
        let mut parents = Vec::new();
        let mut children = Vec::new();

        for (page_index, page) in document.page_spans().into_iter().enumerate() {
            for span in self.parent_spans(&chars, page) {
                let parent_id = format!("{}:p{}", document.id(), parents.len());
                for (n, child_span) in self.child_spans(&chars, span).into_iter().enumerate() {
                    children.push(ChildFragment {
                        id: format!("{}:c{}", parent_id, n),
                        parent_id: parent_id.clone(),
                        document_id: document.id().to_string(),
                        text: slice(&chars, child_span),
                        char_span: child_span,
                    });
                }
                parents.push(ParentFragment {
                    id: parent_id,
                    document_id: document.id().to_string(),
                    text: slice(&chars, span),
                    page_number: u32::try_from(page_index + 1).unwrap_or(u32::MAX),
                    char_span: span,
                });
            }
        }

        debug!(document = document.filename(), parents = parents.len(), children = children.len(), "chunked document");
        ChunkedDocument {
            document_id: document.id().to_string(),
            filename: document.filename().to_string(),
            parents,
            children,
            fingerprint: self.fingerprint(document),
        }
    }

    fn parent_spans(&self, chars: &[char], page: CharSpan) -> Vec<CharSpan> {
        let max = self.config.parent_max_chars;
        let mut out = Vec::new();
        let mut current: Option<CharSpan> = None;
        for paragraph in paragraphs(chars, page) {
            let pieces = if paragraph.len() > max { split_long(chars, paragraph, max) } else { vec![paragraph] };
            for piece in pieces {
                current = match current {
                    Some(cur) if piece.end - cur.start <= max => Some(CharSpan::new(cur.start, piece.end)),
                    Some(cur) => {
                        out.push(cur);
                        Some(piece)
                    }
                    None => Some(piece),
                };
            }
        }
        out.extend(current);
        out
    }

    fn child_spans(&self, chars: &[char], parent: CharSpan) -> Vec<CharSpan> {
        let size = self.config.child_chars;
        if parent.len() <= size {
            return vec![parent];
        }
        let mut out = Vec::new();
        let mut start = parent.start;
        loop {
            let mut end = (start + size).min(parent.end);
            if end < parent.end {
                end = snap_to_whitespace(chars, start, end);
            }
            out.push(CharSpan::new(start, end));
            if end >= parent.end {
                break;
            }
            let mut next = end.saturating_sub(self.config.child_overlap);
            if next <= start {
                next = end;
            }
            while next < end && chars[next].is_whitespace() {
                next += 1;
            }
            start = next;
        }
        out
    }

    fn fingerprint(&self, document: &Document) -> String {
        let mut hasher = blake3::Hasher::new();
        hasher.update(document.filename().as_bytes());
        hasher.update(&[0]);
        hasher.update(document.full_text().as_bytes());
        for b in document.page_boundaries() {
            hasher.update(&(*b as u64).to_le_bytes());
        }
        for v in [self.config.parent_max_chars, self.config.child_chars, self.config.child_overlap] {
            hasher.update(&(v as u64).to_le_bytes());
        }
        hasher.finalize().to_hex().to_string()
    }
}

fn slice(chars: &[char], span: CharSpan) -> String {
    chars[span.start..span.end].iter().collect()
}

/// Non-blank paragraph spans of a page, trimmed. Paragraphs are separated by
/// whitespace runs containing at least two newlines.
fn paragraphs(chars: &[char], page: CharSpan) -> Vec<CharSpan> {
    let mut out = Vec::new();
    let mut i = page.start;
    while i < page.end {
        while i < page.end && chars[i].is_whitespace() {
            i += 1;
        }
        if i >= page.end {
            break;
        }
        let start = i;
        let mut end = i;
        while i < page.end {
            if chars[i].is_whitespace() {
                let mut newlines = 0;
                while i < page.end && chars[i].is_whitespace() {
                    if chars[i] == '\n' {
                        newlines += 1;
                    }
                    i += 1;
                }
                if newlines >= 2 {
                    break;
                }
            } else {
                i += 1;
                end = i;
            }
        }
        out.push(CharSpan::new(start, end));
    }
    out
}

/// Cut a paragraph longer than `max` into consecutive trimmed pieces.
fn split_long(chars: &[char], span: CharSpan, max: usize) -> Vec<CharSpan> {
    let mut out = Vec::new();
    let mut start = span.start;
    while start < span.end {
        let mut end = (start + max).min(span.end);
        if end < span.end {
            end = snap_to_whitespace(chars, start, end);
        }
        let mut trimmed_end = end;
        while trimmed_end > start && chars[trimmed_end - 1].is_whitespace() {
            trimmed_end -= 1;
        }
        if trimmed_end > start {
            out.push(CharSpan::new(start, trimmed_end));
        }
        start = end;
        while start < span.end && chars[start].is_whitespace() {
            start += 1;
        }
    }
    out
}

/// Move `end` back onto a whitespace char in the second half of
/// `[start, end)` so words are not cut; keep `end` if there is none.
fn snap_to_whitespace(chars: &[char], start: usize, end: usize) -> usize {
    let floor = (start + (end - start) / 2).max(start + 1);
    (floor..end).rev().find(|&p| chars[p].is_whitespace()).unwrap_or(end)
}
