/// Mean over token vectors, counting only tokens whose mask entry is non-zero.
///
/// With no mask every token counts. Returns an empty vector when there are
/// no tokens or no unmasked tokens.
pub fn mean_pool(tokens: &[Vec<f32>], mask: Option<&[u32]>) -> Vec<f32> {
    let Some(dim) = tokens.first().map(Vec::len) else {
        return Vec::new();
    };

    let mut pooled = vec![0.0f32; dim];
    let mut count = 0.0f32;

    for (idx, token) in tokens.iter().enumerate() {
        let included = mask.map_or(true, |m| m.get(idx).copied().unwrap_or(0) > 0);
        if !included || token.len() != dim {
            continue;
        }
        for (acc, v) in pooled.iter_mut().zip(token) {
            *acc += v;
        }
        count += 1.0;
    }

    if count == 0.0 {
        return Vec::new();
    }

    for val in &mut pooled {
        *val /= count;
    }
    pooled
}

/// L2-normalize in place. Returns the norm before normalization.
pub fn l2_normalize(vector: &mut [f32]) -> f32 {
    let norm: f32 = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > 0.0 {
        for val in vector.iter_mut() {
            *val /= norm;
        }
    }
    norm
}
