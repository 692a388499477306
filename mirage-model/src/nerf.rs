//! The hierarchical radiance-field model.

use burn::config::Config;
use burn::module::Module;
use burn::tensor::backend::Backend;
use burn::tensor::{Distribution, Tensor, activation};
use image::RgbImage;
use tracing::debug;

use mirage_data::RayBatch;

use crate::encoding;
use crate::mlp::{NerfMlp, NerfMlpConfig};
use crate::sampling;
use crate::volume;

/// Errors produced while rendering full images.
#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("ray count {rays} does not cover a {width}x{height} image")]
    ShapeMismatch {
        rays: usize,
        height: usize,
        width: usize,
    },
    #[error("model produced no sample levels")]
    NoLevels,
    #[error("tensor readback failed: {0}")]
    Readback(String),
    #[error("pixel buffer does not fit a {width}x{height} image")]
    BufferSize { height: usize, width: usize },
}

/// Model hyperparameters.
#[derive(Config, Debug)]
pub struct NerfModelConfig {
    /// Sampling levels; the first is stratified, the rest importance-sampled.
    #[config(default = 2)]
    pub num_levels: usize,
    /// Samples per ray per level.
    #[config(default = 64)]
    pub num_samples: usize,
    #[config(default = 256)]
    pub hidden: usize,
    #[config(default = 0)]
    pub min_deg: usize,
    #[config(default = 16)]
    pub max_deg: usize,
    #[config(default = true)]
    pub use_viewdirs: bool,
    #[config(default = 0)]
    pub viewdirs_min_deg: usize,
    #[config(default = 4)]
    pub viewdirs_max_deg: usize,
    #[config(default = true)]
    pub white_background: bool,
    /// Stochastic sample jitter and density noise.
    #[config(default = true)]
    pub randomized: bool,
    #[config(default = "0.0")]
    pub density_noise: f64,
    #[config(default = "-1.0")]
    pub density_bias: f64,
    #[config(default = "0.001")]
    pub rgb_padding: f64,
    #[config(default = "0.01")]
    pub resample_padding: f64,
}

impl NerfModelConfig {
    /// Initialize the model on a device.
    pub fn init<B: Backend>(&self, device: &B::Device) -> NerfModel<B> {
        let input_dim = encoding::encoded_dim(3, self.min_deg, self.max_deg);
        let condition_dim = if self.use_viewdirs {
            encoding::encoded_dim(3, self.viewdirs_min_deg, self.viewdirs_max_deg)
        } else {
            0
        };
        let mlp = NerfMlpConfig::new(input_dim, condition_dim)
            .with_hidden(self.hidden)
            .init(device);

        NerfModel {
            mlp,
            num_levels: self.num_levels,
            num_samples: self.num_samples,
            min_deg: self.min_deg,
            max_deg: self.max_deg,
            use_viewdirs: self.use_viewdirs,
            viewdirs_min_deg: self.viewdirs_min_deg,
            viewdirs_max_deg: self.viewdirs_max_deg,
            white_background: self.white_background,
            randomized: self.randomized,
            density_noise: self.density_noise,
            density_bias: self.density_bias,
            rgb_padding: self.rgb_padding,
            resample_padding: self.resample_padding,
        }
    }
}

/// A coordinate-based volumetric scene representation with hierarchical
/// sampling.
#[derive(Module, Debug)]
pub struct NerfModel<B: Backend> {
    mlp: NerfMlp<B>,
    num_levels: usize,
    num_samples: usize,
    min_deg: usize,
    max_deg: usize,
    use_viewdirs: bool,
    viewdirs_min_deg: usize,
    viewdirs_max_deg: usize,
    white_background: bool,
    randomized: bool,
    density_noise: f64,
    density_bias: f64,
    rgb_padding: f64,
    resample_padding: f64,
}

impl<B: Backend> NerfModel<B> {
    /// Render a batch of rays to one composited RGB tensor per level,
    /// coarse first and finest last.
    pub fn forward(&self, rays: &RayBatch<B>) -> Vec<Tensor<B, 2>> {
        let mut outputs = Vec::with_capacity(self.num_levels);
        let mut t_vals = sampling::stratified_samples(
            rays.near.clone(),
            rays.far.clone(),
            self.num_samples,
            self.randomized,
        );
        let mut weights: Option<Tensor<B, 2>> = None;

        for _ in 0..self.num_levels {
            if let Some(w) = weights.take() {
                t_vals = sampling::resample_pdf(
                    t_vals,
                    w.detach(),
                    self.num_samples,
                    self.randomized,
                    self.resample_padding,
                );
            }
            let (rgb, density) = self.query(rays, &t_vals);
            let composited = volume::composite(
                rgb,
                density,
                t_vals.clone(),
                rays.directions.clone(),
                self.white_background,
            );
            weights = Some(composited.weights);
            outputs.push(composited.rgb);
        }
        outputs
    }

    /// Evaluate the network at every sample position of every ray.
    fn query(&self, rays: &RayBatch<B>, t_vals: &Tensor<B, 2>) -> (Tensor<B, 3>, Tensor<B, 2>) {
        let [n, s] = t_vals.dims();

        let origins = rays.origins.clone().unsqueeze_dim::<3>(1).repeat_dim(1, s);
        let dirs = rays
            .directions
            .clone()
            .unsqueeze_dim::<3>(1)
            .repeat_dim(1, s);
        let t = t_vals.clone().unsqueeze_dim::<3>(2).repeat_dim(2, 3);
        let positions = (origins + dirs * t).reshape([n * s, 3]);
        let features = encoding::positional_encoding(positions, self.min_deg, self.max_deg);

        let condition = if self.use_viewdirs {
            let viewdirs = rays
                .viewdirs
                .clone()
                .unsqueeze_dim::<3>(1)
                .repeat_dim(1, s)
                .reshape([n * s, 3]);
            Some(encoding::positional_encoding(
                viewdirs,
                self.viewdirs_min_deg,
                self.viewdirs_max_deg,
            ))
        } else {
            None
        };

        let (mut raw_density, raw_rgb) = self.mlp.forward(features, condition);
        if self.randomized && self.density_noise > 0.0 {
            let noise = Tensor::random(
                raw_density.dims(),
                Distribution::Normal(0.0, 1.0),
                &raw_density.device(),
            )
            .mul_scalar(self.density_noise);
            raw_density = raw_density + noise;
        }

        let density =
            activation::softplus(raw_density.add_scalar(self.density_bias), 1.0).reshape([n, s]);
        let rgb = activation::sigmoid(raw_rgb)
            .mul_scalar(1.0 + 2.0 * self.rgb_padding)
            .sub_scalar(self.rgb_padding)
            .reshape([n, s, 3]);
        (rgb, density)
    }

    /// Render a full image from its per-pixel rays, `chunk_size` rays at a
    /// time, keeping only the finest level.
    ///
    /// The rays must cover the image row-major; run this on an
    /// autodiff-free backend, nothing here needs gradients.
    pub fn render_image(
        &self,
        rays: &RayBatch<B>,
        height: usize,
        width: usize,
        chunk_size: usize,
    ) -> Result<RgbImage, RenderError> {
        let total = rays.len();
        if total != height * width {
            return Err(RenderError::ShapeMismatch {
                rays: total,
                height,
                width,
            });
        }

        let chunk_size = chunk_size.max(1);
        let mut parts = Vec::with_capacity(total.div_ceil(chunk_size));
        let mut start = 0;
        while start < total {
            let end = (start + chunk_size).min(total);
            let chunk = rays.slice_rays(start..end);
            let fine = self
                .forward(&chunk)
                .pop()
                .ok_or(RenderError::NoLevels)?;
            parts.push(fine);
            debug!(start, end, total, "rendered ray chunk");
            start = end;
        }

        let image = Tensor::cat(parts, 0).clamp(0.0, 1.0);
        let data = image
            .into_data()
            .to_vec::<f32>()
            .map_err(|e| RenderError::Readback(format!("{e:?}")))?;
        let bytes: Vec<u8> = data.iter().map(|v| (v * 255.0).round() as u8).collect();
        RgbImage::from_raw(width as u32, height as u32, bytes)
            .ok_or(RenderError::BufferSize { height, width })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;
    use glam::Mat4;
    use mirage_data::camera_rays;

    type B = NdArray<f32>;

    fn tiny_model(device: &<B as Backend>::Device) -> NerfModel<B> {
        NerfModelConfig::new()
            .with_num_samples(8)
            .with_hidden(16)
            .with_max_deg(4)
            .with_randomized(false)
            .init(device)
    }

    #[test]
    fn test_forward_yields_one_output_per_level() {
        let device = Default::default();
        let model = tiny_model(&device);
        let rays = camera_rays(&Mat4::IDENTITY, 2, 3, 10.0, 2.0, 6.0).to_batch::<B>(&device);
        let levels = model.forward(&rays);
        assert_eq!(levels.len(), 2);
        for level in levels {
            assert_eq!(level.dims(), [6, 3]);
        }
    }

    #[test]
    fn test_render_image_dimensions() {
        let device = Default::default();
        let model = tiny_model(&device);
        let rays = camera_rays(&Mat4::IDENTITY, 3, 4, 10.0, 2.0, 6.0).to_batch::<B>(&device);
        let img = model.render_image(&rays, 3, 4, 5).unwrap();
        assert_eq!(img.dimensions(), (4, 3));
    }

    #[test]
    fn test_render_image_rejects_wrong_ray_count() {
        let device = Default::default();
        let model = tiny_model(&device);
        let rays = camera_rays(&Mat4::IDENTITY, 2, 2, 10.0, 2.0, 6.0).to_batch::<B>(&device);
        let err = model.render_image(&rays, 3, 3, 4).unwrap_err();
        assert!(matches!(err, RenderError::ShapeMismatch { .. }));
    }

    #[test]
    fn test_deterministic_forward_is_repeatable() {
        let device = Default::default();
        let model = tiny_model(&device);
        let rays = camera_rays(&Mat4::IDENTITY, 2, 2, 10.0, 2.0, 6.0).to_batch::<B>(&device);
        let a = model.forward(&rays).pop().unwrap();
        let b = model.forward(&rays).pop().unwrap();
        assert_eq!(
            a.into_data().to_vec::<f32>().unwrap(),
            b.into_data().to_vec::<f32>().unwrap()
        );
    }
}
