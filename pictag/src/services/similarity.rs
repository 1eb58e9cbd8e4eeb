//! Embedding-vector similarity

/// Cosine similarity between two embedding vectors
///
/// Returns 0.0 for empty or zero-magnitude input. Mismatched lengths
/// compare over the shorter prefix.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }

    let len = a.len().min(b.len());
    let dot = a
        .iter()
        .zip(b.iter())
        .take(len)
        .map(|(x, y)| x * y)
        .sum::<f32>();
    let norm_a = a.iter().take(len).map(|v| v * v).sum::<f32>().sqrt();
    let norm_b = b.iter().take(len).map(|v| v * v).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot / (norm_a * norm_b)
}
