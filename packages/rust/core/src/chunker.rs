//! Overlapping character-window chunking.

/// Split `text` into windows of at most `size` characters.
///
/// A window that would cut a word backs up to the last space inside it, and
/// each window after the first starts `overlap` characters before the
/// previous one ended. Text no longer than `size` is a single chunk; blank
/// text yields none. `size == 0` disables chunking.
pub fn chunk_text(text: &str, size: usize, overlap: usize) -> Vec<String> {
    if text.trim().is_empty() {
        return Vec::new();
    }

    let chars: Vec<char> = text.chars().collect();
    let len = chars.len();
    if size == 0 || len <= size {
        return vec![text.trim().to_string()];
    }

    let mut chunks = Vec::new();
    let mut start = 0;

    loop {
        let mut end = (start + size).min(len);

        if end < len {
            if let Some(space) = chars[start..end].iter().rposition(|&c| c == ' ') {
                if space > 0 {
                    end = start + space;
                }
            }
        }

        let chunk: String = chars[start..end].iter().collect();
        let chunk = chunk.trim();
        if !chunk.is_empty() {
            chunks.push(chunk.to_string());
        }

        if end >= len {
            break;
        }

        // Always move forward, even when overlap swallows the whole window.
        let next = end.saturating_sub(overlap);
        start = if next > start { next } else { end };
    }

    chunks
}
