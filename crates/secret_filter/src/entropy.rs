//! Shannon entropy scan — supplements pattern matching for secrets that
//! don't fit a known vendor shape (spec §4.D).

pub const MIN_RUN_LEN: usize = 32;
pub const ENTROPY_THRESHOLD: f64 = 4.5;

pub fn shannon_entropy(s: &str) -> f64 {
    if s.is_empty() {
        return 0.0;
    }
    let mut counts = [0u32; 256];
    let mut total = 0u32;
    for b in s.bytes() {
        counts[b as usize] += 1;
        total += 1;
    }
    let total_f = total as f64;
    counts
        .iter()
        .filter(|&&c| c > 0)
        .map(|&c| {
            let p = c as f64 / total_f;
            -p * p.log2()
        })
        .sum()
}

/// Find contiguous printable, non-whitespace runs of at least
/// `MIN_RUN_LEN` characters whose Shannon entropy meets the threshold.
/// Returns byte ranges into `text`.
pub fn find_high_entropy_runs(text: &str) -> Vec<std::ops::Range<usize>> {
    let mut out = Vec::new();
    let mut run_start: Option<usize> = None;

    let push_run = |start: usize, end: usize, out: &mut Vec<std::ops::Range<usize>>| {
        if end - start >= MIN_RUN_LEN {
            let run = &text[start..end];
            if shannon_entropy(run) >= ENTROPY_THRESHOLD {
                out.push(start..end);
            }
        }
    };

    for (idx, ch) in text.char_indices() {
        let is_candidate = !ch.is_whitespace() && !ch.is_control();
        match (is_candidate, run_start) {
            (true, None) => run_start = Some(idx),
            (false, Some(start)) => {
                push_run(start, idx, &mut out);
                run_start = None;
            }
            _ => {}
        }
    }
    if let Some(start) = run_start {
        push_run(start, text.len(), &mut out);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn low_entropy_text_is_not_flagged() {
        let text = "aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa";
        assert!(find_high_entropy_runs(text).is_empty());
    }

    #[test]
    fn random_looking_token_is_flagged() {
        let text = "prefix zQ8v2Nf91kLpWzT4xHs0oYrMuJeVbKdRaGcXn7i suffix";
        assert!(!find_high_entropy_runs(text).is_empty());
    }
}
