// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Message chunking for the platform's 4096-character limit.
//!
//! Oversized text splits at the last newline (preferred) or space within
//! the window; every emitted chunk is non-empty after trimming.

/// Telegram's hard per-message character limit.
pub const MESSAGE_LIMIT: usize = 4096;

/// Split text into sendable chunks.
pub fn split_message(text: &str, max_len: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut rest = text;

    while !rest.is_empty() {
        if rest.chars().count() <= max_len {
            if !rest.trim().is_empty() {
                chunks.push(rest.to_string());
            }
            break;
        }

        let window_end = char_boundary_at(rest, max_len);
        let window = &rest[..window_end];

        // Prefer the last newline, then the last space, then hard-split.
        let split_at = window
            .rfind('\n')
            .or_else(|| window.rfind(' '))
            .filter(|&pos| pos > 0)
            .unwrap_or(window_end);

        let (chunk, tail) = rest.split_at(split_at);
        if !chunk.trim().is_empty() {
            chunks.push(chunk.to_string());
        }
        rest = tail.trim_start_matches(['\n', ' ']);
    }

    chunks
}

/// Byte index of the `n`-th char boundary (or the end of the string).
fn char_boundary_at(text: &str, n: usize) -> usize {
    text.char_indices()
        .nth(n)
        .map(|(idx, _)| idx)
        .unwrap_or(text.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_text_is_one_chunk() {
        assert_eq!(split_message("hello", 4096), vec!["hello"]);
    }

    #[test]
    fn splits_at_last_newline() {
        let text = "first line\nsecond line\nthird line";
        let chunks = split_message(text, 25);
        assert_eq!(chunks, vec!["first line\nsecond line", "third line"]);
    }

    #[test]
    fn splits_at_last_space_without_newlines() {
        let text = "one two three four five six";
        let chunks = split_message(text, 12);
        assert_eq!(chunks[0], "one two");
        assert!(chunks.iter().all(|c| c.chars().count() <= 12));
        assert_eq!(chunks.join(" "), text);
    }

    #[test]
    fn hard_splits_unbroken_runs() {
        let text = "a".repeat(30);
        let chunks = split_message(&text, 10);
        assert_eq!(chunks.len(), 3);
        assert!(chunks.iter().all(|c| c.len() == 10));
    }

    #[test]
    fn chunks_are_non_empty_after_trim() {
        let text = format!("{}\n\n\n{}", "x".repeat(10), " ".repeat(20));
        let chunks = split_message(&text, 12);
        assert!(chunks.iter().all(|c| !c.trim().is_empty()));
    }

    #[test]
    fn multibyte_text_splits_on_char_boundaries() {
        let text = "héllo wörld ".repeat(20);
        let chunks = split_message(&text, 50);
        // Reassembly preserves every non-space character.
        let rejoined: String = chunks.join(" ");
        assert_eq!(
            rejoined.replace(' ', ""),
            text.trim_end().replace(' ', "")
        );
    }

    #[test]
    fn empty_text_produces_no_chunks() {
        assert!(split_message("", 4096).is_empty());
        assert!(split_message("   ", 4096).is_empty());
    }
}
