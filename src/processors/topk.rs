//! Top-k extraction over classifier logits.

/// Index of the maximum logit. Ties resolve to the first occurrence;
/// returns `None` for an empty or all-non-finite vector.
pub fn argmax(logits: &[f32]) -> Option<usize> {
    let mut best: Option<(usize, f32)> = None;
    for (i, &v) in logits.iter().enumerate() {
        if !v.is_finite() {
            continue;
        }
        match best {
            Some((_, bv)) if v <= bv => {}
            _ => best = Some((i, v)),
        }
    }
    best.map(|(i, _)| i)
}

/// Top-k result for a single logit vector.
#[derive(Debug, Clone, PartialEq)]
pub struct TopkResult {
    /// Class indices ordered by descending score.
    pub indexes: Vec<usize>,
    /// Scores corresponding to `indexes`.
    pub scores: Vec<f32>,
}

/// Returns the `k` highest-scoring class indices with their scores.
///
/// `k` is capped at the number of classes; non-finite entries sort last.
pub fn topk(logits: &[f32], k: usize) -> TopkResult {
    let mut indexed: Vec<(usize, f32)> = logits.iter().copied().enumerate().collect();
    indexed.sort_by(|a, b| {
        b.1.partial_cmp(&a.1).unwrap_or_else(|| {
            // Non-finite scores sort after finite ones.
            b.1.is_finite().cmp(&a.1.is_finite())
        })
    });
    indexed.truncate(k.min(logits.len()));

    TopkResult {
        indexes: indexed.iter().map(|(i, _)| *i).collect(),
        scores: indexed.iter().map(|(_, s)| *s).collect(),
    }
}
