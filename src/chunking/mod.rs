//! Document chunking
//!
//! Splits a document into a title chunk followed by paragraph-packed content chunks.
//! Paragraphs are separated by blank lines, including whitespace-only lines and
//! CRLF line endings. Chunks are produced lazily; calling [`Chunker::chunks`] again
//! restarts the sequence.

use serde::{Deserialize, Serialize};
use std::fmt;

const PARAGRAPH_BREAK: &str = "\n\n";

/// Chunk type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChunkKind {
    Title,
    Content,
}

impl fmt::Display for ChunkKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChunkKind::Title => write!(f, "title"),
            ChunkKind::Content => write!(f, "content"),
        }
    }
}

/// A bounded unit of document text
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub text: String,
    /// 0-based; the title chunk, when present, is position 0
    pub position: usize,
    pub kind: ChunkKind,
}

/// Paragraph-packing chunker
#[derive(Debug, Clone, Copy)]
pub struct Chunker {
    target_size: usize,
}

impl Chunker {
    pub fn new(target_size: usize) -> Self {
        Self { target_size }
    }

    pub fn target_size(&self) -> usize {
        self.target_size
    }

    /// Lazily chunk a document
    ///
    /// Paragraphs are accumulated until adding the next one would exceed the target
    /// size in characters. A paragraph longer than the target is emitted whole.
    pub fn chunks<'a>(&self, title: &'a str, body: &'a str) -> Chunks<'a> {
        let title = title.trim();
        Chunks {
            title: (!title.is_empty()).then_some(title),
            paragraphs: Paragraphs { rest: body },
            carry: None,
            target_size: self.target_size,
            position: 0,
        }
    }

    /// Collect every chunk of a document
    pub fn chunk(&self, title: &str, body: &str) -> Vec<Chunk> {
        self.chunks(title, body).collect()
    }
}

impl Default for Chunker {
    fn default() -> Self {
        Self::new(500)
    }
}

/// Trimmed, non-empty runs of lines between blank lines
struct Paragraphs<'a> {
    rest: &'a str,
}

impl<'a> Iterator for Paragraphs<'a> {
    type Item = &'a str;

    fn next(&mut self) -> Option<&'a str> {
        let mut start = None;
        let mut end = 0;
        let mut offset = 0;

        for line in self.rest.split_inclusive('\n') {
            let blank = line.trim().is_empty();
            match (start, blank) {
                (None, true) => {}
                (None, false) => {
                    start = Some(offset);
                    end = offset + line.len();
                }
                (Some(_), false) => end = offset + line.len(),
                (Some(_), true) => break,
            }
            offset += line.len();
        }

        let text = self.rest;
        self.rest = &text[offset..];
        start.map(|start| text[start..end].trim())
    }
}

/// Iterator over the chunks of one document
pub struct Chunks<'a> {
    title: Option<&'a str>,
    paragraphs: Paragraphs<'a>,
    carry: Option<&'a str>,
    target_size: usize,
    position: usize,
}

impl<'a> Chunks<'a> {
    fn next_paragraph(&mut self) -> Option<&'a str> {
        if let Some(paragraph) = self.carry.take() {
            return Some(paragraph);
        }
        self.paragraphs.next()
    }

    fn emit(&mut self, text: String, kind: ChunkKind) -> Chunk {
        let chunk = Chunk {
            text,
            position: self.position,
            kind,
        };
        self.position += 1;
        chunk
    }
}

impl<'a> Iterator for Chunks<'a> {
    type Item = Chunk;

    fn next(&mut self) -> Option<Chunk> {
        if let Some(title) = self.title.take() {
            return Some(self.emit(title.to_string(), ChunkKind::Title));
        }

        let mut buffer = String::new();
        let mut buffer_chars = 0;

        while let Some(paragraph) = self.next_paragraph() {
            let paragraph_chars = paragraph.chars().count();
            if !buffer.is_empty() && buffer_chars + paragraph_chars > self.target_size {
                self.carry = Some(paragraph);
                break;
            }
            if !buffer.is_empty() {
                buffer.push_str(PARAGRAPH_BREAK);
                buffer_chars += PARAGRAPH_BREAK.len();
            }
            buffer.push_str(paragraph);
            buffer_chars += paragraph_chars;
        }

        if buffer.is_empty() {
            None
        } else {
            Some(self.emit(buffer, ChunkKind::Content))
        }
    }
}
