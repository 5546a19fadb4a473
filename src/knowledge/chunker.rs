//! Paragraph-preserving document chunking.
//!
//! Documents are split on blank-line paragraph boundaries and paragraphs are
//! grouped greedily under an approximate token budget. A chunk never starts
//! mid-paragraph; a single paragraph that alone exceeds the budget becomes
//! its own oversized chunk rather than being truncated.

use regex::Regex;
use std::sync::OnceLock;

/// Approximate character budget per chunk (~500 tokens).
pub const CHUNK_CHAR_BUDGET: usize = 2000;

fn paragraph_splitter() -> &'static Regex {
    static SPLITTER: OnceLock<Regex> = OnceLock::new();
    SPLITTER.get_or_init(|| Regex::new(r"\n\s*\n").expect("static regex"))
}

/// Split `content` into chunks bounded by `budget` characters.
pub fn chunk_paragraphs(content: &str, budget: usize) -> Vec<String> {
    let paragraphs: Vec<&str> = paragraph_splitter()
        .split(content)
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .collect();

    let mut chunks = Vec::new();
    let mut current = String::new();

    for paragraph in paragraphs {
        if paragraph.len() > budget {
            // Oversized paragraph: flush whatever is pending, then accept
            // the paragraph whole as its own chunk.
            if !current.is_empty() {
                chunks.push(std::mem::take(&mut current));
            }
            chunks.push(paragraph.to_string());
            continue;
        }

        let projected = if current.is_empty() {
            paragraph.len()
        } else {
            current.len() + 2 + paragraph.len()
        };

        if projected > budget && !current.is_empty() {
            chunks.push(std::mem::take(&mut current));
        }

        if current.is_empty() {
            current.push_str(paragraph);
        } else {
            current.push_str("\n\n");
            current.push_str(paragraph);
        }
    }

    if !current.is_empty() {
        chunks.push(current);
    }

    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_document_is_one_chunk() {
        let chunks = chunk_paragraphs("First paragraph.\n\nSecond paragraph.", CHUNK_CHAR_BUDGET);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0], "First paragraph.\n\nSecond paragraph.");
    }

    #[test]
    fn empty_content_yields_no_chunks() {
        assert!(chunk_paragraphs("", CHUNK_CHAR_BUDGET).is_empty());
        assert!(chunk_paragraphs("\n\n  \n\n", CHUNK_CHAR_BUDGET).is_empty());
    }

    #[test]
    fn paragraphs_group_under_budget() {
        let p = "x".repeat(40);
        let content = format!("{p}\n\n{p}\n\n{p}");
        let chunks = chunk_paragraphs(&content, 100);
        // 40 + 2 + 40 = 82 fits; adding the third (124) does not.
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].len(), 82);
        assert_eq!(chunks[1].len(), 40);
    }

    #[test]
    fn no_chunk_starts_mid_paragraph() {
        let a = "a".repeat(60);
        let b = "b".repeat(60);
        let chunks = chunk_paragraphs(&format!("{a}\n\n{b}"), 100);
        assert_eq!(chunks.len(), 2);
        assert!(chunks[0].chars().all(|c| c == 'a'));
        assert!(chunks[1].chars().all(|c| c == 'b'));
    }

    #[test]
    fn oversized_paragraph_becomes_its_own_chunk_untruncated() {
        let huge = "y".repeat(5000);
        let content = format!("intro\n\n{huge}\n\noutro");
        let chunks = chunk_paragraphs(&content, CHUNK_CHAR_BUDGET);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0], "intro");
        assert_eq!(chunks[1].len(), 5000);
        assert_eq!(chunks[2], "outro");
    }

    #[test]
    fn windows_style_blank_lines_split_paragraphs() {
        let chunks = chunk_paragraphs("one\n \ntwo", CHUNK_CHAR_BUDGET);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0], "one\n\ntwo");
    }

    #[test]
    fn chunking_is_deterministic() {
        let content = "alpha\n\nbeta\n\ngamma\n\ndelta";
        let first = chunk_paragraphs(content, 12);
        let second = chunk_paragraphs(content, 12);
        assert_eq!(first, second);
    }
}
