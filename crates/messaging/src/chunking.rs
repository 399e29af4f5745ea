//! Outbound message chunking.
//!
//! Splits on sentence boundaries (`". "`) and paragraph breaks (`"\n\n"`);
//! an oversized single sentence falls back to word splitting.  A chunk is
//! never empty and never longer than the platform limit.

/// Discord's hard message length limit.
pub const MAX_CHUNK: usize = 2000;

pub fn chunk_message(text: &str, max_length: usize) -> Vec<String> {
    if text.trim().is_empty() {
        // Empty content is a platform error; send a visible placeholder.
        return vec!["...".to_string()];
    }

    if text.chars().count() <= max_length {
        return vec![text.to_string()];
    }

    let sentences = split_boundaries(text);
    let mut chunks: Vec<String> = Vec::new();
    let mut current = String::new();

    for sentence in sentences {
        if current.chars().count() + sentence.chars().count() > max_length {
            if !current.trim().is_empty() {
                chunks.push(current.trim().to_string());
                current.clear();
            }

            if sentence.chars().count() > max_length {
                // A single oversized sentence: split on words, never mid-word.
                for word in sentence.split_whitespace() {
                    if current.chars().count() + word.chars().count() + 1 > max_length {
                        if !current.trim().is_empty() {
                            chunks.push(current.trim().to_string());
                        }
                        current = format!("{word} ");
                    } else {
                        current.push_str(word);
                        current.push(' ');
                    }
                }
            } else {
                current = sentence;
            }
        } else {
            current.push_str(&sentence);
        }
    }

    if !current.trim().is_empty() {
        chunks.push(current.trim().to_string());
    }

    if chunks.is_empty() {
        chunks.push("...".to_string());
    }
    chunks
}

/// Split on `". "` and `"\n\n"` while keeping the delimiters attached to the
/// preceding fragment.
fn split_boundaries(text: &str) -> Vec<String> {
    let marked = text.replace("\n\n", "\n\n\u{0}").replace(". ", ". \u{0}");
    marked.split('\u{0}').map(str::to_string).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_text_is_one_chunk() {
        let chunks = chunk_message("hello there", MAX_CHUNK);
        assert_eq!(chunks, vec!["hello there"]);
    }

    #[test]
    fn empty_text_becomes_placeholder() {
        assert_eq!(chunk_message("", MAX_CHUNK), vec!["..."]);
        assert_eq!(chunk_message("   \n ", MAX_CHUNK), vec!["..."]);
    }

    #[test]
    fn long_text_splits_on_sentences() {
        let text = format!("{}. {}. {}.", "a".repeat(900), "b".repeat(900), "c".repeat(900));
        let chunks = chunk_message(&text, 2000);
        assert!(chunks.len() >= 2);
        for chunk in &chunks {
            assert!(chunk.chars().count() <= 2000);
            assert!(!chunk.trim().is_empty());
        }
    }

    #[test]
    fn oversized_sentence_splits_on_words_never_mid_word() {
        let word = "hippopotamus";
        let text = std::iter::repeat(word)
            .take(400)
            .collect::<Vec<_>>()
            .join(" ");
        let chunks = chunk_message(&text, 2000);
        assert!(chunks.len() >= 2);
        for chunk in &chunks {
            assert!(chunk.chars().count() <= 2000);
            for w in chunk.split_whitespace() {
                assert_eq!(w, word, "word was split mid-word: {w:?}");
            }
        }
    }

    #[test]
    fn paragraph_breaks_are_boundaries() {
        let text = format!("{}\n\n{}", "x".repeat(1500), "y".repeat(1500));
        let chunks = chunk_message(&text, 2000);
        assert_eq!(chunks.len(), 2);
    }

    #[test]
    fn every_chunk_is_within_bounds() {
        let text = "word ".repeat(3000);
        for chunk in chunk_message(&text, 2000) {
            let len = chunk.chars().count();
            assert!(len >= 1 && len <= 2000);
        }
    }
}
