//! Sample placement along rays.
//!
//! The coarse level places stratified samples between the per-ray near and
//! far bounds; finer levels resample proportionally to the previous level's
//! compositing weights via the inverse CDF. Sample positions come back
//! sorted along the ray, which the compositor relies on.

use burn::tensor::backend::Backend;
use burn::tensor::{Distribution, Int, Tensor};

/// Inclusive prefix sum along the second dimension.
///
/// Expressed as a matmul against a triangular mask so it stays on-device
/// and differentiates like any other op.
pub(crate) fn cumsum<B: Backend>(x: Tensor<B, 2>) -> Tensor<B, 2> {
    let [_, m] = x.dims();
    let device = x.device();
    let idx = Tensor::<B, 1, Int>::arange(0..m as i64, &device).float();
    let rows = idx.clone().reshape([m, 1]).repeat_dim(1, m);
    let cols = idx.reshape([1, m]).repeat_dim(0, m);
    let mask = rows.lower_equal(cols).float();
    x.matmul(mask)
}

/// Exclusive prefix sum along the second dimension.
pub(crate) fn cumsum_exclusive<B: Backend>(x: Tensor<B, 2>) -> Tensor<B, 2> {
    let [_, m] = x.dims();
    let device = x.device();
    let idx = Tensor::<B, 1, Int>::arange(0..m as i64, &device).float();
    let rows = idx.clone().reshape([m, 1]).repeat_dim(1, m);
    let cols = idx.reshape([1, m]).repeat_dim(0, m);
    let mask = rows.lower(cols).float();
    x.matmul(mask)
}

/// Stratified sample distances for a batch of rays.
///
/// `near`/`far` are `(n, 1)`; the result is `(n, num_samples)`, ascending.
/// When `randomized`, each sample jitters uniformly within its bin;
/// otherwise bins are sampled at their edges. `num_samples` must be at
/// least 2.
pub fn stratified_samples<B: Backend>(
    near: Tensor<B, 2>,
    far: Tensor<B, 2>,
    num_samples: usize,
    randomized: bool,
) -> Tensor<B, 2> {
    let [n, _] = near.dims();
    let s = num_samples;
    let device = near.device();

    let steps = Tensor::<B, 1, Int>::arange(0..s as i64, &device)
        .float()
        .div_scalar((s - 1) as f32)
        .reshape([1, s])
        .repeat_dim(0, n);
    let span = far - near.clone();
    let mut t_vals = near.repeat_dim(1, s) + span.repeat_dim(1, s) * steps;

    if randomized {
        let mids = (t_vals.clone().slice([0..n, 1..s]) + t_vals.clone().slice([0..n, 0..s - 1]))
            .mul_scalar(0.5);
        let upper = Tensor::cat(
            vec![mids.clone(), t_vals.clone().slice([0..n, s - 1..s])],
            1,
        );
        let lower = Tensor::cat(vec![t_vals.clone().slice([0..n, 0..1]), mids], 1);
        let u = Tensor::random([n, s], Distribution::Uniform(0.0, 1.0), &device);
        t_vals = lower.clone() + (upper - lower) * u;
    }
    t_vals
}

/// Importance-resample distances from piecewise-constant weights.
///
/// `t_vals` is `(n, s)` ascending with `s >= 3`, `weights` the matching
/// `(n, s)` compositing weights of the previous level (detach before
/// calling when the resampled positions must not carry gradients).
/// `padding` is added to every weight so empty regions keep nonzero
/// probability. Returns `(n, num_samples)` ascending.
pub fn resample_pdf<B: Backend>(
    t_vals: Tensor<B, 2>,
    weights: Tensor<B, 2>,
    num_samples: usize,
    randomized: bool,
    padding: f64,
) -> Tensor<B, 2> {
    let [n, s] = t_vals.dims();
    let k = num_samples;
    let device = t_vals.device();

    // Bin edges are the midpoints of the previous sample positions; the
    // interior weights describe the mass between them.
    let bins = (t_vals.clone().slice([0..n, 1..s]) + t_vals.clone().slice([0..n, 0..s - 1]))
        .mul_scalar(0.5);
    let m = s - 2;
    let w = weights.slice([0..n, 1..s - 1]).add_scalar(padding);
    let pdf = w.clone() / w.sum_dim(1).repeat_dim(1, m);
    let cdf = Tensor::cat(vec![Tensor::zeros([n, 1], &device), cumsum(pdf)], 1);
    let edges = m + 1; // == bins count

    let u = if randomized {
        let strata = Tensor::<B, 1, Int>::arange(0..k as i64, &device)
            .float()
            .div_scalar(k as f32)
            .reshape([1, k])
            .repeat_dim(0, n);
        strata + Tensor::random([n, k], Distribution::Uniform(0.0, 1.0 / k as f64), &device)
    } else {
        Tensor::<B, 1, Int>::arange(0..k as i64, &device)
            .float()
            .add_scalar(0.5)
            .div_scalar(k as f32)
            .reshape([1, k])
            .repeat_dim(0, n)
    };

    // For each u, count cdf entries at or below it; that count brackets the
    // containing bin.
    let cdf_e = cdf.clone().unsqueeze_dim::<3>(2).repeat_dim(2, k);
    let u_e = u.clone().unsqueeze_dim::<3>(1).repeat_dim(1, edges);
    let counts = cdf_e.lower_equal(u_e).int().sum_dim(1).reshape([n, k]);
    let above = counts.clone().clamp(0, (edges - 1) as i32);
    let below = counts.sub_scalar(1).clamp(0, (edges - 1) as i32);

    let cdf_below = cdf.clone().gather(1, below.clone());
    let cdf_above = cdf.gather(1, above.clone());
    let bins_below = bins.clone().gather(1, below);
    let bins_above = bins.gather(1, above);

    let denom = cdf_above - cdf_below.clone();
    let denom = denom
        .clone()
        .mask_where(denom.lower_elem(1e-5), Tensor::ones([n, k], &device));
    bins_below.clone() + (u - cdf_below) / denom * (bins_above - bins_below)
}
