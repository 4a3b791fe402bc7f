use std::collections::HashMap;

use docchat_core::types::Chunk;

/// Weighted reciprocal-rank fusion.
///
/// Each list contributes `weight / (rank + c)` to every chunk it contains,
/// with 1-based ranks. Chunks are identified by id; a chunk present in several
/// lists accumulates every contribution. Ties keep first-appearance order
/// across the lists in the order given.
pub fn weighted_rrf(lists: &[(&[Chunk], f32)], c: f32) -> Vec<Chunk> {
    let mut order: Vec<&Chunk> = Vec::new();
    let mut scores: HashMap<&str, f32> = HashMap::new();
    for (list, weight) in lists {
        for (i, chunk) in list.iter().enumerate() {
            let contribution = weight / (i as f32 + 1.0 + c);
            match scores.get_mut(chunk.id.as_str()) {
                Some(s) => *s += contribution,
                None => {
                    scores.insert(chunk.id.as_str(), contribution);
                    order.push(chunk);
                }
            }
        }
    }
    let mut fused: Vec<(f32, &Chunk)> = order.into_iter().map(|c| (scores[c.id.as_str()], c)).collect();
    fused.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
    fused.into_iter().map(|(_, c)| c.clone()).collect()
}
