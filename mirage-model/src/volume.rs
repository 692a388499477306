//! Transmittance-weighted compositing along rays.

use burn::tensor::Tensor;
use burn::tensor::backend::Backend;

use crate::sampling::cumsum_exclusive;

/// Result of compositing one level of samples.
#[derive(Debug, Clone)]
pub struct Composite<B: Backend> {
    /// Composited color per ray, `(n, 3)`.
    pub rgb: Tensor<B, 2>,
    /// Per-sample compositing weight, `(n, s)`; feeds the next level's
    /// importance sampling.
    pub weights: Tensor<B, 2>,
    /// Total opacity per ray, `(n, 1)`.
    pub accumulation: Tensor<B, 2>,
}

/// Integrate per-sample color and density into per-ray color.
///
/// `rgb` is `(n, s, 3)`, `density` and `t_vals` are `(n, s)` with `t_vals`
/// ascending, `directions` the unnormalized ray directions `(n, 3)` whose
/// length scales the sample intervals into world units. The last interval
/// is treated as unbounded. With `white_background`, leftover transmittance
/// is filled with white.
pub fn composite<B: Backend>(
    rgb: Tensor<B, 3>,
    density: Tensor<B, 2>,
    t_vals: Tensor<B, 2>,
    directions: Tensor<B, 2>,
    white_background: bool,
) -> Composite<B> {
    let [n, s] = density.dims();
    let device = density.device();

    let deltas = t_vals.clone().slice([0..n, 1..s]) - t_vals.slice([0..n, 0..s - 1]);
    let deltas = Tensor::cat(vec![deltas, Tensor::full([n, 1], 1e10, &device)], 1);
    let dir_norm = directions.powf_scalar(2.0).sum_dim(1).sqrt();
    let sigma_delta = density * deltas * dir_norm.repeat_dim(1, s);

    let alpha = sigma_delta.clone().neg().exp().neg().add_scalar(1.0);
    let transmittance = cumsum_exclusive(sigma_delta).neg().exp();
    let weights = alpha * transmittance;

    let accumulation = weights.clone().sum_dim(1);
    let comp = (weights.clone().unsqueeze_dim::<3>(2).repeat_dim(2, 3) * rgb)
        .sum_dim(1)
        .reshape([n, 3]);
    let rgb = if white_background {
        comp + accumulation.clone().neg().add_scalar(1.0).repeat_dim(1, 3)
    } else {
        comp
    };

    Composite {
        rgb,
        weights,
        accumulation,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;
    use burn::tensor::TensorData;

    type B = NdArray<f32>;

    fn ray_setup(density: Vec<f32>, s: usize) -> (Tensor<B, 3>, Tensor<B, 2>, Tensor<B, 2>, Tensor<B, 2>) {
        let device = Default::default();
        let rgb = Tensor::<B, 1>::from_floats([1.0, 0.5, 0.25], &device)
            .reshape([1, 1, 3])
            .repeat_dim(1, s);
        let density = Tensor::from_data(TensorData::new(density, [1, s]), &device);
        let t_vals: Vec<f32> = (0..s).map(|i| i as f32).collect();
        let t_vals = Tensor::from_data(TensorData::new(t_vals, [1, s]), &device);
        let directions = Tensor::<B, 1>::from_floats([0.0, 0.0, -1.0], &device).reshape([1, 3]);
        (rgb, density, t_vals, directions)
    }

    #[test]
    fn test_vacuum_is_transparent() {
        let (rgb, density, t_vals, dirs) = ray_setup(vec![0.0; 4], 4);
        let out = composite(rgb, density, t_vals, dirs, false);
        let color = out.rgb.into_data().to_vec::<f32>().unwrap();
        assert!(color.iter().all(|c| c.abs() < 1e-6));
        let acc = out.accumulation.into_data().to_vec::<f32>().unwrap();
        assert!(acc[0].abs() < 1e-6);
    }

    #[test]
    fn test_vacuum_with_white_background_is_white() {
        let (rgb, density, t_vals, dirs) = ray_setup(vec![0.0; 4], 4);
        let out = composite(rgb, density, t_vals, dirs, true);
        let color = out.rgb.into_data().to_vec::<f32>().unwrap();
        for c in color {
            assert!((c - 1.0).abs() < 1e-6);
        }
    }

    #[test]
    fn test_opaque_first_sample_dominates() {
        let mut density = vec![0.0; 5];
        density[0] = 1e4;
        let (rgb, density, t_vals, dirs) = ray_setup(density, 5);
        let out = composite(rgb, density, t_vals, dirs, false);
        let color = out.rgb.into_data().to_vec::<f32>().unwrap();
        assert!((color[0] - 1.0).abs() < 1e-3);
        assert!((color[1] - 0.5).abs() < 1e-3);
        assert!((color[2] - 0.25).abs() < 1e-3);
        let w = out.weights.into_data().to_vec::<f32>().unwrap();
        assert!((w[0] - 1.0).abs() < 1e-3);
        assert!(w[1].abs() < 1e-3);
    }

    #[test]
    fn test_weights_sum_to_accumulation() {
        let (rgb, density, t_vals, dirs) = ray_setup(vec![0.3, 0.1, 0.8, 0.2], 4);
        let out = composite(rgb, density, t_vals, dirs, false);
        let w: f32 = out
            .weights
            .into_data()
            .to_vec::<f32>()
            .unwrap()
            .iter()
            .sum();
        let acc = out.accumulation.into_data().to_vec::<f32>().unwrap()[0];
        assert!((w - acc).abs() < 1e-5);
    }
}
