//! Similarity Index
//!
//! Cosine similarity and a linear best-match scan over cached embeddings.
//! Entries whose embedding cannot be compared (dimension mismatch, zero
//! norm, non-finite components) are skipped, never fatal.

/// Cosine similarity of two vectors.
///
/// Returns `None` when the vectors cannot be compared.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> Option<f32> {
    if a.len() != b.len() || a.is_empty() {
        return None;
    }

    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a > 0.0 && norm_b > 0.0 {
        let similarity = dot / (norm_a * norm_b);
        similarity.is_finite().then(|| similarity.clamp(-1.0, 1.0))
    } else {
        None
    }
}

/// Check that every component is finite and the vector is non-empty
pub fn is_valid_embedding(embedding: &[f32]) -> bool {
    !embedding.is_empty() && embedding.iter().all(|x| x.is_finite())
}

/// Result of a similarity scan
#[derive(Debug, Clone, PartialEq)]
pub struct ScanOutcome {
    /// Best candidate at or above the threshold
    pub best: Option<(String, f32)>,
    /// Candidates compared
    pub scanned: usize,
    /// Candidates that could not be compared
    pub skipped: usize,
}

/// Linear cosine-similarity scan with a match threshold
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimilarityIndex {
    threshold: f32,
}

impl SimilarityIndex {
    /// Create an index that accepts matches scoring at least `threshold`
    pub fn new(threshold: f32) -> Self {
        Self { threshold }
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    /// Find the highest-scoring candidate at or above the threshold.
    ///
    /// Equal scores go to the lexicographically smallest key, so the result
    /// does not depend on candidate order.
    pub fn best_match<'a, I>(&self, query: &[f32], candidates: I) -> ScanOutcome
    where
        I: IntoIterator<Item = (&'a str, &'a [f32])>,
    {
        let mut outcome = ScanOutcome {
            best: None,
            scanned: 0,
            skipped: 0,
        };
        if !is_valid_embedding(query) {
            return outcome;
        }

        for (key, embedding) in candidates {
            let Some(similarity) = cosine_similarity(query, embedding) else {
                outcome.skipped += 1;
                continue;
            };
            outcome.scanned += 1;

            if similarity < self.threshold {
                continue;
            }
            let better = match &outcome.best {
                Some((best_key, best)) => {
                    similarity > *best || (similarity == *best && key < best_key.as_str())
                }
                None => true,
            };
            if better {
                outcome.best = Some((key.to_string(), similarity));
            }
        }
        outcome
    }
}

// =============================================================================
// Tests
// =============================================================================
