use async_trait::async_trait;

use crate::bus::Platform;

/// Default platform cap on a single message, in Unicode code points.
pub const DEFAULT_CHUNK_LIMIT: usize = 4096;

/// Send surface of a platform adapter. Implementations wrap the platform's
/// native send API; the delivery loop stays platform-agnostic.
#[async_trait]
pub trait PlatformSender: Send + Sync {
    fn platform(&self) -> Platform;

    /// Hard cap on outgoing message size, in code points.
    fn chunk_limit(&self) -> usize {
        DEFAULT_CHUNK_LIMIT
    }

    async fn send_text(&self, chat_id: &str, text: &str) -> anyhow::Result<()>;
}

/// Split `text` into chunks of at most `limit` code points, preferring to
/// break after the last newline inside each window. Chunks concatenate back
/// to the original text exactly; a multi-byte character is never split.
pub fn split_message(text: &str, limit: usize) -> Vec<String> {
    let limit = limit.max(1);
    if text.chars().count() <= limit {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut remaining = text;

    loop {
        if remaining.chars().count() <= limit {
            chunks.push(remaining.to_string());
            break;
        }

        // Byte offset of the boundary after `limit` code points.
        let window_end = remaining
            .char_indices()
            .nth(limit)
            .map_or(remaining.len(), |(idx, _)| idx);
        let window = &remaining[..window_end];

        // Prefer a newline break, keeping the newline in the chunk. A newline
        // at position 0 would produce an empty chunk, so fall through to a
        // hard cut there.
        let cut = match window.rfind('\n') {
            Some(pos) if pos > 0 => pos + 1,
            _ => window_end,
        };

        chunks.push(remaining[..cut].to_string());
        remaining = &remaining[cut..];
    }

    chunks
}

#[cfg(test)]
mod tests;
