//! Transcript chunking along sentence boundaries
//!
//! This module splits normalized document text into overlapping,
//! bounded-size chunks while:
//! - Never breaking inside a sentence
//! - Seeding each chunk with the trailing sentences of the previous one
//! - Attaching speaker and keyword metadata for retrieval filtering
//!
//! Chunking is deterministic for a given input and config, and it never
//! fails: empty or whitespace-only input simply yields no chunks.

use crate::config::ChunkConfig;
use regex::Regex;
use std::sync::OnceLock;
use unicode_segmentation::UnicodeSegmentation;

/// Multiplier from word count to estimated token count
const TOKENS_PER_WORD: f64 = 1.3;

/// Maximum keywords attached to a chunk
const MAX_KEYWORDS: usize = 10;

/// Words excluded from keyword extraction
const STOP_WORDS: &[&str] = &[
    "this", "that", "with", "from", "have", "been", "were", "they", "them", "their", "there",
    "which", "would", "could", "should", "about", "because", "like", "just", "really", "yeah",
    "okay", "well", "know", "think", "going", "what", "when", "where", "then", "than", "some",
    "very", "into", "over", "also", "more", "most", "other", "such", "only", "those", "these",
    "does", "being", "will", "your", "yours", "ours", "mine", "said", "says",
];

/// A bounded slice of normalized document text, the unit of embedding
#[derive(Debug, Clone, PartialEq)]
pub struct TextChunk {
    /// Chunk index (0-based, contiguous per document)
    pub index: usize,

    /// The chunk text (whole sentences, space-joined)
    pub text: String,

    /// Approximate character start in the normalized text (advisory)
    pub start_offset: usize,

    /// Approximate character end in the normalized text (advisory)
    pub end_offset: usize,

    /// Estimated token count of `text`
    pub token_count: usize,

    /// Detected speaker from a leading "Name: " pattern, if any
    pub speaker: Option<String>,

    /// Naive keyword list extracted from the chunk text
    pub keywords: Vec<String>,
}

/// A sentence with positional bookkeeping, internal to the chunker
#[derive(Debug, Clone)]
struct Sentence {
    text: String,
    start: usize,
    end: usize,
    tokens: usize,
}

fn timestamp_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    // [00:12:34], (1:02:03), bare 00:12 / 00:12:34 markers
    RE.get_or_init(|| {
        Regex::new(r"[\[(]?\b\d{1,2}:\d{2}(:\d{2})?\b[\])]?").expect("valid timestamp regex")
    })
}

fn speaker_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^([A-Z][A-Za-z .'\-]{0,40}?):\s").expect("valid speaker regex")
    })
}

/// Estimate the token count of a text as `ceil(word_count * 1.3)`
pub fn estimate_tokens(text: &str) -> usize {
    let words = text.unicode_words().count();
    (words as f64 * TOKENS_PER_WORD).ceil() as usize
}

/// Normalize raw transcript text: strip embedded timestamps, canonicalize
/// quote characters, collapse whitespace runs
pub fn normalize(text: &str) -> String {
    let stripped = timestamp_re().replace_all(text, " ");
    let canonical: String = stripped
        .chars()
        .map(|c| match c {
            '\u{2018}' | '\u{2019}' => '\'',
            '\u{201C}' | '\u{201D}' => '"',
            other => other,
        })
        .collect();
    canonical.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Split normalized text into sentences on `.`, `!`, `?` boundaries.
///
/// Deliberately naive: punctuation inside abbreviations is not special-cased.
fn split_sentences(text: &str) -> Vec<Sentence> {
    let mut sentences = Vec::new();
    let mut start = 0;
    let chars: Vec<(usize, char)> = text.char_indices().collect();

    for (i, &(pos, c)) in chars.iter().enumerate() {
        let is_terminal = matches!(c, '.' | '!' | '?');
        // A boundary is a terminal char followed by whitespace or end of text
        let at_boundary = is_terminal
            && chars
                .get(i + 1)
                .map(|&(_, next)| next.is_whitespace())
                .unwrap_or(true);

        if at_boundary {
            let end = pos + c.len_utf8();
            let raw = text[start..end].trim();
            if !raw.is_empty() {
                sentences.push(Sentence {
                    text: raw.to_string(),
                    start,
                    end,
                    tokens: estimate_tokens(raw),
                });
            }
            start = end;
        }
    }

    // Trailing text without terminal punctuation is still a sentence
    let tail = text[start..].trim();
    if !tail.is_empty() {
        sentences.push(Sentence {
            text: tail.to_string(),
            start,
            end: text.len(),
            tokens: estimate_tokens(tail),
        });
    }

    sentences
}

/// Detect a leading `Name: ` speaker pattern
fn detect_speaker(text: &str) -> Option<String> {
    speaker_re()
        .captures(text)
        .map(|caps| caps[1].trim().to_string())
}

/// Extract a naive keyword list: lowercased, punctuation-stripped words
/// longer than 3 characters, minus stop words, capped at 10
fn extract_keywords(text: &str) -> Vec<String> {
    let mut keywords: Vec<String> = Vec::new();
    for word in text.unicode_words() {
        let cleaned: String = word
            .chars()
            .filter(|c| c.is_alphanumeric())
            .collect::<String>()
            .to_lowercase();
        if cleaned.len() <= 3 || STOP_WORDS.contains(&cleaned.as_str()) {
            continue;
        }
        if !keywords.contains(&cleaned) {
            keywords.push(cleaned);
        }
        if keywords.len() >= MAX_KEYWORDS {
            break;
        }
    }
    keywords
}

/// Choose the trailing slice of `buffer` whose cumulative token count is
/// nearest to `overlap_tokens`. Returns the start index of the slice
/// (`buffer.len()` means an empty overlap).
fn overlap_seed_start(buffer: &[Sentence], overlap_tokens: usize) -> usize {
    let mut best_start = buffer.len();
    let mut best_distance = overlap_tokens as i64; // distance of the empty slice
    let mut cumulative = 0i64;

    for start in (0..buffer.len()).rev() {
        cumulative += buffer[start].tokens as i64;
        let distance = (cumulative - overlap_tokens as i64).abs();
        if distance < best_distance {
            best_distance = distance;
            best_start = start;
        }
    }

    best_start
}

fn emit_chunk(chunks: &mut Vec<TextChunk>, buffer: &[Sentence]) {
    let text = buffer
        .iter()
        .map(|s| s.text.as_str())
        .collect::<Vec<_>>()
        .join(" ");
    let token_count = buffer.iter().map(|s| s.tokens).sum();

    chunks.push(TextChunk {
        index: chunks.len(),
        text: text.clone(),
        // Offsets drift slightly under overlap recombination; advisory only
        start_offset: buffer.first().map(|s| s.start).unwrap_or(0),
        end_offset: buffer.last().map(|s| s.end).unwrap_or(0),
        token_count,
        speaker: detect_speaker(&text),
        keywords: extract_keywords(&text),
    });
}

/// Split normalized document text into overlapping, bounded-size chunks
/// along sentence boundaries.
///
/// Greedily accumulates sentences until adding the next one would exceed
/// `target_tokens`, emits the buffer as a chunk, then seeds the next buffer
/// with the trailing sentences closest to `overlap_tokens`. A single
/// sentence larger than the target is emitted as its own oversized chunk
/// rather than split mid-sentence. A buffer holding only the carried
/// overlap seed always accepts at least one more sentence, so a chunk can
/// exceed the target by up to the seed's size; the effective size bound is
/// `target_tokens + overlap_tokens`, not `target_tokens` alone. Pure and
/// non-throwing.
pub fn chunk(text: &str, config: &ChunkConfig) -> Vec<TextChunk> {
    let normalized = normalize(text);
    if normalized.is_empty() {
        return Vec::new();
    }

    let sentences = split_sentences(&normalized);
    if sentences.is_empty() {
        return Vec::new();
    }

    let mut chunks: Vec<TextChunk> = Vec::new();
    let mut buffer: Vec<Sentence> = Vec::new();
    let mut buffer_tokens = 0usize;
    // Sentences carried over from the previous chunk's overlap do not count
    // as progress; every emitted chunk must contain at least one new one.
    let mut fresh_in_buffer = 0usize;

    for sentence in sentences {
        let would_exceed = buffer_tokens + sentence.tokens > config.target_tokens;

        if would_exceed && fresh_in_buffer > 0 {
            emit_chunk(&mut chunks, &buffer);

            let seed_start = overlap_seed_start(&buffer, config.overlap_tokens);
            buffer.drain(..seed_start);
            buffer_tokens = buffer.iter().map(|s| s.tokens).sum();
            fresh_in_buffer = 0;
        }

        buffer_tokens += sentence.tokens;
        buffer.push(sentence);
        fresh_in_buffer += 1;
    }

    if fresh_in_buffer > 0 {
        emit_chunk(&mut chunks, &buffer);
    }

    chunks
}
