//! Markdown-structure-aware chunking.
//!
//! Splits markdown documents into retrieval chunks in four priority
//! levels, each preserving the atomic units of the prior level:
//!
//! 1. Atomic regions: fenced code blocks and contiguous tables are
//!    never cut. An atomic region larger than the max size is emitted
//!    as a single oversized chunk with a warning.
//! 2. Header segmentation: split on ATX headers, each segment carrying
//!    its ancestor headers as context (e.g. `# Markets / ## Gold`).
//! 3. Progressive subdivision of oversized segments: paragraphs, then
//!    sentences, then words.
//! 4. Small-chunk merging: adjacent chunks with the same header
//!    context are merged while the combined size stays within target.
//!
//! Frontmatter is stripped before chunking; its tags are recovered
//! separately by the metadata extractor.

use std::sync::Arc;

use semvault_core::{ChunkPiece, ChunkSizes};
use tracing::warn;

use crate::metadata::remove_frontmatter;
use crate::tokens::{HeuristicTokenizer, TokenCounter};

/// Chunks markdown documents based on header structure with size
/// constraints. A pure function of its input.
pub struct MarkdownChunker {
    sizes: ChunkSizes,
    tokens: Arc<dyn TokenCounter>,
}

/// A blank-line-delimited unit; atomic units are code fences and tables.
#[derive(Debug)]
struct Block {
    text: String,
    atomic: bool,
}

/// A header-delimited segment with its ancestor-header context.
#[derive(Debug)]
struct Section {
    header_context: String,
    content: String,
}

impl MarkdownChunker {
    pub fn new(sizes: ChunkSizes, tokens: Arc<dyn TokenCounter>) -> Self {
        Self { sizes, tokens }
    }

    /// Default sizes with the heuristic token estimator.
    pub fn with_defaults() -> Self {
        Self::new(ChunkSizes::default(), Arc::new(HeuristicTokenizer))
    }

    pub fn sizes(&self) -> ChunkSizes {
        self.sizes
    }

    /// Split markdown content into an ordered sequence of chunks.
    ///
    /// `origin` is only used to annotate warnings about oversized
    /// atomic regions.
    pub fn chunk(&self, content: &str, origin: Option<&str>) -> Vec<ChunkPiece> {
        let body = remove_frontmatter(content);
        if body.trim().is_empty() {
            return Vec::new();
        }

        let mut pieces = Vec::new();
        for section in split_by_headers(body) {
            self.process_section(&section, origin, &mut pieces);
        }

        self.merge_adjacent(pieces)
    }

    /// Emit a section as-is when it fits, otherwise subdivide.
    fn process_section(&self, section: &Section, origin: Option<&str>, out: &mut Vec<ChunkPiece>) {
        let content = section.content.trim();
        if content.is_empty() {
            return;
        }

        let token_count = self.tokens.count(content);
        if token_count <= self.sizes.max {
            out.push(ChunkPiece {
                text: content.to_string(),
                header_context: section.header_context.clone(),
                token_count,
            });
            return;
        }

        self.split_by_paragraphs(&section.header_context, content, origin, out);
    }

    /// Subdivide a section on paragraph boundaries, keeping atomic
    /// regions whole. When a chunk fills up, its trailing paragraphs
    /// (up to `overlap` tokens) are carried forward into the next
    /// chunk; atomic regions are never carried.
    fn split_by_paragraphs(
        &self,
        context: &str,
        content: &str,
        origin: Option<&str>,
        out: &mut Vec<ChunkPiece>,
    ) {
        // (text, tokens, atomic) per accumulated block
        let mut current: Vec<(String, u32, bool)> = Vec::new();
        let mut current_tokens = 0u32;

        let emit = |current: &[(String, u32, bool)], tokens: u32, out: &mut Vec<ChunkPiece>| {
            out.push(ChunkPiece {
                text: current
                    .iter()
                    .map(|(text, _, _)| text.as_str())
                    .collect::<Vec<_>>()
                    .join("\n\n"),
                header_context: context.to_string(),
                token_count: tokens,
            });
        };

        for block in logical_paragraphs(content) {
            let text = block.text.trim();
            if text.is_empty() {
                continue;
            }

            let block_tokens = self.tokens.count(text);

            // Atomic regions start their own chunk, with no carry-over.
            if block.atomic && !current.is_empty() {
                emit(&current, current_tokens, out);
                current.clear();
                current_tokens = 0;
            }

            if block_tokens > self.sizes.max {
                if !current.is_empty() {
                    emit(&current, current_tokens, out);
                    current.clear();
                    current_tokens = 0;
                }

                if block.atomic {
                    // Never cut; emit whole and move on.
                    warn!(
                        origin = origin.unwrap_or("<memory>"),
                        tokens = block_tokens,
                        max = self.sizes.max,
                        "atomic region exceeds max chunk size, emitting oversized chunk"
                    );
                    out.push(ChunkPiece {
                        text: text.to_string(),
                        header_context: context.to_string(),
                        token_count: block_tokens,
                    });
                } else {
                    self.split_by_sentences(context, text, out);
                }
                continue;
            }

            if current_tokens + block_tokens > self.sizes.target && !current.is_empty() {
                emit(&current, current_tokens, out);

                // Carry trailing paragraphs into the next chunk. An
                // atomic block stops the walk so its structure is
                // never repeated or broken.
                let mut carried: Vec<(String, u32, bool)> = Vec::new();
                let mut carried_tokens = 0u32;
                if !block.atomic {
                    for prior in current.iter().rev() {
                        if prior.2 || carried_tokens + prior.1 > self.sizes.overlap {
                            break;
                        }
                        carried_tokens += prior.1;
                        carried.insert(0, prior.clone());
                    }
                }
                current = carried;
                current_tokens = carried_tokens;
            }
            current.push((text.to_string(), block_tokens, block.atomic));
            current_tokens += block_tokens;
        }

        if !current.is_empty() {
            emit(&current, current_tokens, out);
        }
    }

    /// Subdivide an oversized paragraph on sentence boundaries.
    fn split_by_sentences(&self, context: &str, content: &str, out: &mut Vec<ChunkPiece>) {
        let mut current: Vec<String> = Vec::new();
        let mut current_tokens = 0u32;

        for sentence in split_sentences(content) {
            let sentence = sentence.trim();
            if sentence.is_empty() {
                continue;
            }

            let sent_tokens = self.tokens.count(sentence);

            if sent_tokens > self.sizes.max {
                if !current.is_empty() {
                    out.push(ChunkPiece {
                        text: current.join(" "),
                        header_context: context.to_string(),
                        token_count: current_tokens,
                    });
                    current.clear();
                    current_tokens = 0;
                }
                self.hard_split(context, sentence, out);
                continue;
            }

            if current_tokens + sent_tokens > self.sizes.target && !current.is_empty() {
                out.push(ChunkPiece {
                    text: current.join(" "),
                    header_context: context.to_string(),
                    token_count: current_tokens,
                });
                current.clear();
                current_tokens = 0;
            }
            current.push(sentence.to_string());
            current_tokens += sent_tokens;
        }

        if !current.is_empty() {
            out.push(ChunkPiece {
                text: current.join(" "),
                header_context: context.to_string(),
                token_count: current_tokens,
            });
        }
    }

    /// Last resort: split on whitespace-delimited words at the max size.
    fn hard_split(&self, context: &str, content: &str, out: &mut Vec<ChunkPiece>) {
        let mut current: Vec<&str> = Vec::new();
        let mut current_tokens = 0u32;

        for word in content.split_whitespace() {
            let word_tokens = self.tokens.count(word);
            if current_tokens + word_tokens > self.sizes.max && !current.is_empty() {
                out.push(ChunkPiece {
                    text: current.join(" "),
                    header_context: context.to_string(),
                    token_count: current_tokens,
                });
                current.clear();
                current_tokens = 0;
            }
            current.push(word);
            current_tokens += word_tokens;
        }

        if !current.is_empty() {
            out.push(ChunkPiece {
                text: current.join(" "),
                header_context: context.to_string(),
                token_count: current_tokens,
            });
        }
    }

    /// Merge adjacent chunks with identical header context while the
    /// combined size stays within the target.
    fn merge_adjacent(&self, pieces: Vec<ChunkPiece>) -> Vec<ChunkPiece> {
        let mut merged: Vec<ChunkPiece> = Vec::with_capacity(pieces.len());

        for piece in pieces {
            if let Some(last) = merged.last_mut() {
                let combined = last.token_count + piece.token_count;
                if last.header_context == piece.header_context && combined <= self.sizes.target {
                    last.text.push_str("\n\n");
                    last.text.push_str(&piece.text);
                    last.token_count = combined;
                    continue;
                }
            }
            merged.push(piece);
        }

        merged
    }
}

// ============================================================================
// Header segmentation
// ============================================================================

/// Parse an ATX header line outside of code fences.
fn parse_header(line: &str) -> Option<(usize, &str)> {
    let trimmed = line.trim_start();
    if !trimmed.starts_with('#') {
        return None;
    }
    let level = trimmed.chars().take_while(|&c| c == '#').count();
    if level > 6 {
        return None;
    }
    let rest = &trimmed[level..];
    if rest.is_empty() || !rest.starts_with(char::is_whitespace) {
        return None;
    }
    Some((level, rest.trim()))
}

/// Detect the opening of a code fence; returns the tick count.
fn fence_open(line: &str) -> Option<usize> {
    let trimmed = line.trim_start();
    let ticks = trimmed.chars().take_while(|&c| c == '`').count();
    if ticks >= 3 { Some(ticks) } else { None }
}

/// Build the "/"-joined context string from the header stack.
fn build_header_context(stack: &[(usize, String)]) -> String {
    stack
        .iter()
        .map(|(level, title)| format!("{} {}", "#".repeat(*level), title))
        .collect::<Vec<_>>()
        .join(" / ")
}

/// Split content on ATX headers, tracking the header hierarchy.
///
/// Header lines inside code fences do not split; the fence content
/// stays with the section it started in.
fn split_by_headers(content: &str) -> Vec<Section> {
    let mut sections = Vec::new();
    let mut stack: Vec<(usize, String)> = Vec::new();
    let mut current_lines: Vec<&str> = Vec::new();
    let mut fence: Option<usize> = None;
    let mut saw_header = false;

    let close_section = |stack: &[(usize, String)], lines: &mut Vec<&str>, out: &mut Vec<Section>| {
        if !lines.is_empty() {
            let content = lines.join("\n").trim().to_string();
            if !content.is_empty() {
                out.push(Section {
                    header_context: build_header_context(stack),
                    content,
                });
            }
            lines.clear();
        }
    };

    for line in content.lines() {
        if let Some(open) = fence {
            current_lines.push(line);
            if fence_open(line).is_some_and(|ticks| ticks >= open) {
                fence = None;
            }
            continue;
        }

        if let Some(ticks) = fence_open(line) {
            fence = Some(ticks);
            current_lines.push(line);
            continue;
        }

        if let Some((level, title)) = parse_header(line) {
            saw_header = true;
            close_section(&stack, &mut current_lines, &mut sections);

            while stack.last().is_some_and(|(l, _)| *l >= level) {
                stack.pop();
            }
            stack.push((level, title.to_string()));
        } else {
            current_lines.push(line);
        }
    }

    close_section(&stack, &mut current_lines, &mut sections);

    if !saw_header && sections.is_empty() && !content.trim().is_empty() {
        return vec![Section {
            header_context: String::new(),
            content: content.trim().to_string(),
        }];
    }

    sections
}

// ============================================================================
// Logical paragraphs
// ============================================================================

/// Split content into blank-line-separated paragraphs, keeping fenced
/// code blocks and contiguous tables as single atomic blocks.
fn logical_paragraphs(content: &str) -> Vec<Block> {
    let mut blocks = Vec::new();
    let mut current: Vec<&str> = Vec::new();

    let flush = |current: &mut Vec<&str>, blocks: &mut Vec<Block>| {
        if !current.is_empty() {
            let text = current.join("\n");
            if !text.trim().is_empty() {
                blocks.push(Block {
                    text,
                    atomic: false,
                });
            }
            current.clear();
        }
    };

    let lines: Vec<&str> = content.lines().collect();
    let mut i = 0;

    while i < lines.len() {
        let line = lines[i];

        if let Some(open) = fence_open(line) {
            flush(&mut current, &mut blocks);
            let mut fenced = vec![line];
            i += 1;
            while i < lines.len() {
                fenced.push(lines[i]);
                if fence_open(lines[i]).is_some_and(|ticks| ticks >= open) {
                    i += 1;
                    break;
                }
                i += 1;
            }
            blocks.push(Block {
                text: fenced.join("\n"),
                atomic: true,
            });
            continue;
        }

        if line.trim_start().starts_with('|') {
            flush(&mut current, &mut blocks);
            let mut table = Vec::new();
            while i < lines.len() && lines[i].trim_start().starts_with('|') {
                table.push(lines[i]);
                i += 1;
            }
            blocks.push(Block {
                text: table.join("\n"),
                atomic: true,
            });
            continue;
        }

        if line.trim().is_empty() {
            flush(&mut current, &mut blocks);
        } else {
            current.push(line);
        }
        i += 1;
    }

    flush(&mut current, &mut blocks);
    blocks
}

// ============================================================================
// Sentence splitting
// ============================================================================

const ABBREVIATIONS: &[&str] = &[
    "e.g", "i.e", "etc", "vs", "cf", "al", "mr", "mrs", "ms", "dr", "prof", "st", "no", "fig",
];

/// Split on `.`/`?`/`!` followed by whitespace, skipping boundaries
/// after common abbreviations.
fn split_sentences(text: &str) -> Vec<String> {
    let bytes = text.as_bytes();
    let mut sentences = Vec::new();
    let mut start = 0;

    for (i, &b) in bytes.iter().enumerate() {
        if !matches!(b, b'.' | b'?' | b'!') {
            continue;
        }
        let followed_by_space = bytes.get(i + 1).is_some_and(u8::is_ascii_whitespace);
        if !followed_by_space {
            continue;
        }
        if b == b'.' && is_abbreviation(&text[start..=i]) {
            continue;
        }
        let sentence = text[start..=i].trim();
        if !sentence.is_empty() {
            sentences.push(sentence.to_string());
        }
        start = i + 1;
    }

    let tail = text[start..].trim();
    if !tail.is_empty() {
        sentences.push(tail.to_string());
    }

    sentences
}

/// Check whether a span ending in `.` ends with a known abbreviation.
fn is_abbreviation(span: &str) -> bool {
    let word = span
        .trim_end_matches('.')
        .rsplit(char::is_whitespace)
        .next()
        .unwrap_or("")
        .to_ascii_lowercase();
    ABBREVIATIONS.contains(&word.as_str())
}
