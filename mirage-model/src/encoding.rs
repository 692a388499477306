//! Sinusoidal positional encoding.

use burn::tensor::Tensor;
use burn::tensor::backend::Backend;

/// Output width of [`positional_encoding`] for a given input width.
pub fn encoded_dim(input_dim: usize, min_deg: usize, max_deg: usize) -> usize {
    input_dim * (1 + 2 * max_deg.saturating_sub(min_deg))
}

/// Encode `(m, d)` coordinates as `(m, d * (1 + 2 * degrees))` features.
///
/// The raw input is kept as the leading block; each degree contributes a
/// sine and cosine of the input scaled by `2^deg`. With an empty degree
/// range the input passes through unchanged.
pub fn positional_encoding<B: Backend>(
    x: Tensor<B, 2>,
    min_deg: usize,
    max_deg: usize,
) -> Tensor<B, 2> {
    if min_deg >= max_deg {
        return x;
    }
    let mut features = vec![x.clone()];
    for deg in min_deg..max_deg {
        let scaled = x.clone().mul_scalar(2.0_f32.powi(deg as i32));
        features.push(scaled.clone().sin());
        features.push(scaled.cos());
    }
    Tensor::cat(features, 1)
}
