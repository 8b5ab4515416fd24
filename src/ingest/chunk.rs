//! Text chunking and lightweight entity extraction.

/// A chunk slice of a document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextChunk {
    /// Byte offset of the chunk start.
    pub start: usize,
    /// Byte offset of the chunk end (exclusive).
    pub end: usize,
    /// The chunk text.
    pub text: String,
}

/// Splits `text` into overlapping chunks of roughly `size` bytes.
///
/// Cut points prefer whitespace near the target so words stay whole; offsets
/// always land on char boundaries. `overlap` bytes of the previous chunk lead
/// each following one.
pub fn chunk_text(text: &str, size: usize, overlap: usize) -> Vec<TextChunk> {
    let size = size.max(1);
    let overlap = overlap.min(size.saturating_sub(1));
    let bytes = text.len();
    if bytes == 0 {
        return Vec::new();
    }

    let mut chunks = Vec::new();
    let mut start = 0usize;

    while start < bytes {
        let mut end = snap_to_char_boundary(text, (start + size).min(bytes));

        // Prefer a whitespace cut within the last 20% of the chunk.
        if end < bytes {
            let window_start = start + size - size / 5;
            if let Some(ws) = text[..end]
                .char_indices()
                .rev()
                .take_while(|(i, _)| *i >= window_start)
                .find(|(_, c)| c.is_whitespace())
                .map(|(i, _)| i)
            {
                if ws > start {
                    end = ws;
                }
            }
        }

        let slice = text[start..end].trim();
        if !slice.is_empty() {
            // Offsets refer to the trimmed slice within the document.
            let lead = text[start..end].len() - text[start..end].trim_start().len();
            let chunk_start = start + lead;
            chunks.push(TextChunk {
                start: chunk_start,
                end: chunk_start + slice.len(),
                text: slice.to_string(),
            });
        }

        if end >= bytes {
            break;
        }
        let next = end.saturating_sub(overlap).max(start + 1);
        start = snap_to_char_boundary(text, next);
    }

    chunks
}

fn snap_to_char_boundary(text: &str, mut index: usize) -> usize {
    index = index.min(text.len());
    while index > 0 && !text.is_char_boundary(index) {
        index -= 1;
    }
    index
}

/// Words never treated as entity heads even when capitalized mid-sentence.
const ENTITY_STOPWORDS: &[&str] = &[
    "The", "A", "An", "This", "That", "These", "Those", "It", "He", "She", "They", "We", "I",
    "You", "If", "In", "On", "At", "For", "And", "But", "Or", "As", "By", "To", "Of", "What",
    "When", "Where", "Why", "How",
];

/// Extracts entity candidates: runs of capitalized words (up to four).
///
/// A deliberately shallow pass — the production extractor is an upstream
/// collaborator; this keeps the graph populated and traversable without it.
pub fn extract_entities(text: &str) -> Vec<String> {
    let mut entities: Vec<String> = Vec::new();
    let mut run: Vec<&str> = Vec::new();

    let mut flush = |run: &mut Vec<&str>, entities: &mut Vec<String>| {
        if run.is_empty() {
            return;
        }
        let candidate = run.join(" ");
        run.clear();
        if candidate.len() < 3 {
            return;
        }
        if !entities.contains(&candidate) {
            entities.push(candidate);
        }
    };

    for token in text.split_whitespace() {
        let word = token.trim_matches(|c: char| !c.is_alphanumeric());
        let is_capitalized = word
            .chars()
            .next()
            .map(|c| c.is_uppercase())
            .unwrap_or(false)
            && word.chars().any(|c| c.is_lowercase());

        if is_capitalized && !ENTITY_STOPWORDS.contains(&word) && run.len() < 4 {
            run.push(word);
        } else {
            flush(&mut run, &mut entities);
        }
        // A sentence boundary always ends the current run.
        if token.ends_with(['.', '!', '?', ';', ':']) {
            flush(&mut run, &mut entities);
        }
    }
    flush(&mut run, &mut entities);

    entities
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunking_respects_size_and_overlap() {
        let text = "word ".repeat(200);
        let chunks = chunk_text(&text, 100, 20);

        assert!(chunks.len() > 5);
        for chunk in &chunks {
            assert!(chunk.text.len() <= 100);
            assert_eq!(&text[chunk.start..chunk.end], chunk.text);
        }
        // Consecutive chunks overlap.
        assert!(chunks[1].start < chunks[0].end);
    }

    #[test]
    fn test_chunking_small_text_is_one_chunk() {
        let chunks = chunk_text("short text", 1000, 100);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, "short text");
        assert_eq!(chunks[0].start, 0);
    }

    #[test]
    fn test_chunking_handles_multibyte() {
        let text = "日本語のテキスト ".repeat(50);
        let chunks = chunk_text(&text, 64, 16);
        for chunk in &chunks {
            assert_eq!(&text[chunk.start..chunk.end], chunk.text);
        }
    }

    #[test]
    fn test_chunking_empty() {
        assert!(chunk_text("", 100, 10).is_empty());
        assert!(chunk_text("   ", 100, 10).is_empty());
    }

    #[test]
    fn test_entity_extraction() {
        let entities = extract_entities(
            "Artificial Intelligence is a branch of Computer Science. \
             The field overlaps with Machine Learning and statistics.",
        );
        assert!(entities.contains(&"Artificial Intelligence".to_string()));
        assert!(entities.contains(&"Computer Science".to_string()));
        assert!(entities.contains(&"Machine Learning".to_string()));
        assert!(!entities.iter().any(|e| e == "The"));
    }

    #[test]
    fn test_entity_runs_break_at_sentence_end() {
        let entities = extract_entities("We visited Paris. London was next.");
        assert!(entities.contains(&"Paris".to_string()));
        assert!(entities.contains(&"London".to_string()));
        assert!(!entities.contains(&"Paris London".to_string()));
    }
}
