//! Streaming rolling buffer (spec §4.D, §9 redesign flag): a fixed
//! capacity tail so secrets split across chunk boundaries are still
//! detected. The buffer never grows unbounded — after each scan it is
//! trimmed back to its tail window.

use crate::{ScanOutcome, SecretFilter};

/// Twice the longest expected secret, per spec §4.D.
pub const TAIL_WINDOW_CHARS: usize = 200;

pub struct ChunkBuffer {
    tail: String,
    window: usize,
}

impl Default for ChunkBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl ChunkBuffer {
    pub fn new() -> Self {
        Self { tail: String::new(), window: TAIL_WINDOW_CHARS }
    }

    /// Append `chunk`, scan the tail window plus the new chunk, and
    /// return the scan outcome for that combined window. The buffer then
    /// resizes itself back down to its tail window.
    pub fn append_and_scan(&mut self, chunk: &str, filter: &SecretFilter) -> ScanOutcome {
        let combined = format!("{}{}", self.tail, chunk);
        let outcome = filter.scan(&combined);
        self.tail = last_n_chars(&combined, self.window);
        outcome
    }
}

fn last_n_chars(s: &str, n: usize) -> String {
    let char_count = s.chars().count();
    if char_count <= n {
        return s.to_string();
    }
    let skip = char_count - n;
    s.chars().skip(skip).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn secret_split_across_two_chunks_is_still_detected() {
        let filter = SecretFilter::outbound();
        let mut buffer = ChunkBuffer::new();

        let secret = "sk-ant-REDACTED";
        let mid = secret.len() / 2;
        let (first, second) = secret.split_at(mid);

        let first_outcome = buffer.append_and_scan(first, &filter);
        assert!(first_outcome.matches.is_empty());

        let second_outcome = buffer.append_and_scan(second, &filter);
        assert!(second_outcome.blocked);
        assert!(second_outcome.matches.iter().any(|m| m.pattern_id == "anthropic_api_key"));
    }

    #[test]
    fn buffer_stays_bounded() {
        let filter = SecretFilter::outbound();
        let mut buffer = ChunkBuffer::new();
        for _ in 0..50 {
            buffer.append_and_scan("x".repeat(100).as_str(), &filter);
        }
        assert!(buffer.tail.chars().count() <= TAIL_WINDOW_CHARS);
    }
}
