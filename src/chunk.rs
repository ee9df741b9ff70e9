//! Overlapping character-window text chunker.
//!
//! Splits extracted document text into bounded segments for embedding.
//! Core windows are consecutive `max_chunk_chars`-character slices; every
//! chunk after the first is extended backwards by `overlap_chars` so that
//! consecutive chunks share context across the boundary. Splitting is
//! deterministic and character-based (UTF-8 safe), so concatenating the
//! non-overlap cores reconstructs the input exactly.

/// Chunks whose trimmed core content is shorter than this are dropped.
const MIN_CHUNK_CHARS: usize = 20;

/// Split `text` into overlapping chunks of at most
/// `max_chunk_chars + overlap_chars` characters.
///
/// Empty input yields an empty sequence. Chunk order follows input order.
pub fn chunk_text(text: &str, max_chunk_chars: usize, overlap_chars: usize) -> Vec<String> {
    assert!(max_chunk_chars > 0, "max_chunk_chars must be > 0");

    if text.is_empty() {
        return Vec::new();
    }

    // Byte offset of every character boundary, including the end of input.
    let boundaries: Vec<usize> = text
        .char_indices()
        .map(|(i, _)| i)
        .chain(std::iter::once(text.len()))
        .collect();
    let total_chars = boundaries.len() - 1;

    let mut chunks = Vec::new();
    let mut core_start = 0usize;

    while core_start < total_chars {
        let core_end = (core_start + max_chunk_chars).min(total_chars);
        let slice_start = if core_start == 0 {
            0
        } else {
            core_start.saturating_sub(overlap_chars)
        };

        let core = &text[boundaries[core_start]..boundaries[core_end]];
        if core.trim().len() >= MIN_CHUNK_CHARS {
            chunks.push(text[boundaries[slice_start]..boundaries[core_end]].to_string());
        }

        core_start = core_end;
    }

    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_text_yields_no_chunks() {
        assert!(chunk_text("", 1000, 200).is_empty());
    }

    #[test]
    fn test_short_text_single_chunk() {
        let text = "A short but sufficiently long paragraph.";
        let chunks = chunk_text(text, 1000, 200);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0], text);
    }

    #[test]
    fn test_whitespace_only_dropped() {
        assert!(chunk_text("   \n\n   \t   ", 1000, 200).is_empty());
    }

    #[test]
    fn test_2500_chars_yields_three_chunks() {
        let text: String = (0..2500).map(|i| ((b'a' + (i % 26) as u8) as char)).collect();
        let chunks = chunk_text(&text, 1000, 200);
        assert_eq!(chunks.len(), 3);
        // First chunk has no overlap prefix; later chunks carry 200 extra chars.
        assert_eq!(chunks[0].chars().count(), 1000);
        assert_eq!(chunks[1].chars().count(), 1200);
        assert_eq!(chunks[2].chars().count(), 700);
    }

    #[test]
    fn test_deterministic() {
        let text: String = "lorem ipsum dolor sit amet ".repeat(200);
        let a = chunk_text(&text, 1000, 200);
        let b = chunk_text(&text, 1000, 200);
        assert_eq!(a, b);
    }

    #[test]
    fn test_cores_reconstruct_input() {
        let text: String = (0..4321).map(|i| ((b'A' + (i % 26) as u8) as char)).collect();
        let chunks = chunk_text(&text, 1000, 200);
        let mut rebuilt = String::new();
        for (i, chunk) in chunks.iter().enumerate() {
            if i == 0 {
                rebuilt.push_str(chunk);
            } else {
                // Strip the 200-char overlap prefix to get back the core.
                let skip: usize = chunk.chars().take(200).map(|c| c.len_utf8()).sum();
                rebuilt.push_str(&chunk[skip..]);
            }
        }
        assert_eq!(rebuilt, text);
    }

    #[test]
    fn test_overlap_repeats_previous_tail() {
        let text: String = (0..2000).map(|i| ((b'a' + (i % 26) as u8) as char)).collect();
        let chunks = chunk_text(&text, 1000, 200);
        assert_eq!(chunks.len(), 2);
        let tail: String = chunks[0].chars().skip(800).collect();
        assert!(chunks[1].starts_with(&tail));
    }

    #[test]
    fn test_multibyte_boundaries() {
        let text: String = "héllo wörld — ünïcode test. ".repeat(100);
        let chunks = chunk_text(&text, 250, 50);
        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(chunk.chars().count() <= 300);
        }
    }

    #[test]
    fn test_tiny_trailing_core_dropped() {
        // 1010 chars: the 10-char tail core is below the content threshold.
        let text: String = (0..1010).map(|i| ((b'a' + (i % 26) as u8) as char)).collect();
        let chunks = chunk_text(&text, 1000, 200);
        assert_eq!(chunks.len(), 1);
    }
}
