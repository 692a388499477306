//! Batch loaders over posed-image scenes.
//!
//! [`RayLoader`] is the endless shuffled stream the training loop consumes;
//! [`RenderLoader`] is the finite, ordered sequence of full-image ray batches
//! used for preview videos. Both are single-consumer by construction.

use std::path::Path;

use burn::tensor::backend::Backend;
use burn::tensor::{Tensor, TensorData};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use tracing::debug;

use crate::blender::{self, DataError, SceneData, Split};
use crate::poses;
use crate::rays::{RayBatch, RayBundle, camera_rays};

/// Endlessly repeating, optionally shuffled stream of `(rays, pixels)` batches.
///
/// All rays of the split are generated up front; each epoch visits every ray
/// once, reshuffling the visit order when shuffling is enabled. The stream
/// never ends; the caller bounds consumption by its own step count.
pub struct RayLoader<B: Backend> {
    rays: RayBundle,
    pixels: Vec<f32>,
    batch_size: usize,
    shuffle: bool,
    order: Vec<usize>,
    cursor: usize,
    rng: StdRng,
    device: B::Device,
}

impl<B: Backend> RayLoader<B> {
    /// Build a loader over every ray of a loaded scene.
    pub fn new(
        scene: &SceneData,
        batch_size: usize,
        shuffle: bool,
        seed: u64,
        device: &B::Device,
    ) -> Self {
        let mut rays = RayBundle::new(scene.near, scene.far);
        let mut pixels = Vec::new();
        for (pose, frame) in scene.poses.iter().zip(&scene.pixels) {
            let frame_rays = camera_rays(
                pose,
                scene.height,
                scene.width,
                scene.focal,
                scene.near,
                scene.far,
            );
            rays.extend(&frame_rays);
            pixels.extend_from_slice(frame);
        }

        let mut rng = StdRng::seed_from_u64(seed);
        let mut order: Vec<usize> = (0..rays.len()).collect();
        if shuffle {
            order.shuffle(&mut rng);
        }
        debug!(rays = rays.len(), batch_size, "ray loader ready");

        Self {
            rays,
            pixels,
            batch_size: batch_size.max(1),
            shuffle,
            order,
            cursor: 0,
            rng,
            device: device.clone(),
        }
    }

    /// Total number of rays in one epoch.
    pub fn len(&self) -> usize {
        self.rays.len()
    }

    /// True when the split contributed no rays.
    pub fn is_empty(&self) -> bool {
        self.rays.is_empty()
    }

    /// Pull the next `(rays, pixels)` batch, wrapping across epochs.
    pub fn next_batch(&mut self) -> (RayBatch<B>, Tensor<B, 2>) {
        let mut indices = Vec::with_capacity(self.batch_size);
        while indices.len() < self.batch_size {
            if self.cursor >= self.order.len() {
                self.cursor = 0;
                if self.shuffle {
                    self.order.shuffle(&mut self.rng);
                }
            }
            indices.push(self.order[self.cursor]);
            self.cursor += 1;
        }

        let batch = self.rays.gather_batch::<B>(&indices, &self.device);
        let mut rgb = Vec::with_capacity(indices.len() * 3);
        for &i in &indices {
            rgb.extend_from_slice(&self.pixels[i * 3..i * 3 + 3]);
        }
        let pixels = Tensor::from_data(TensorData::new(rgb, [indices.len(), 3]), &self.device);
        (batch, pixels)
    }
}

/// Finite, ordered sequence of full-image ray batches along an orbit path.
pub struct RenderLoader<B: Backend> {
    poses: Vec<glam::Mat4>,
    height: usize,
    width: usize,
    focal: f32,
    near: f32,
    far: f32,
    device: B::Device,
}

impl<B: Backend> RenderLoader<B> {
    /// Build a loader of `n_poses` orbit views at the given resolution.
    ///
    /// The field of view is taken from the scene; the focal length is
    /// rescaled for the render resolution.
    pub fn new(
        camera_angle_x: f32,
        n_poses: usize,
        height: usize,
        width: usize,
        near: f32,
        far: f32,
        device: &B::Device,
    ) -> Self {
        Self {
            poses: poses::spherical_path(n_poses, poses::DEFAULT_RADIUS, poses::DEFAULT_PHI_DEG),
            height,
            width,
            focal: SceneData::focal_for(camera_angle_x, width),
            near,
            far,
            device: device.clone(),
        }
    }

    /// Number of render poses.
    pub fn len(&self) -> usize {
        self.poses.len()
    }

    /// True when there are no poses to render.
    pub fn is_empty(&self) -> bool {
        self.poses.is_empty()
    }

    /// Render image height in pixels.
    pub fn height(&self) -> usize {
        self.height
    }

    /// Render image width in pixels.
    pub fn width(&self) -> usize {
        self.width
    }

    /// Iterate the full-image ray batches in pose order.
    pub fn batches(&self) -> impl Iterator<Item = RayBatch<B>> + '_ {
        self.poses.iter().map(move |pose| {
            camera_rays(pose, self.height, self.width, self.focal, self.near, self.far)
                .to_batch::<B>(&self.device)
        })
    }
}

/// Load a scene split and wrap it in a cyclic batch loader.
#[allow(clippy::too_many_arguments)]
pub fn ray_loader<B: Backend>(
    dataset_name: &str,
    base_dir: &Path,
    split: Split,
    factor: usize,
    batch_size: usize,
    shuffle: bool,
    seed: u64,
    device: &B::Device,
) -> Result<RayLoader<B>, DataError> {
    let scene = blender::load_scene(dataset_name, base_dir, split, factor)?;
    Ok(RayLoader::new(&scene, batch_size, shuffle, seed, device))
}

/// Build the preview render loader for a scene.
pub fn render_loader<B: Backend>(
    dataset_name: &str,
    base_dir: &Path,
    n_poses: usize,
    height: usize,
    width: usize,
    device: &B::Device,
) -> Result<RenderLoader<B>, DataError> {
    if dataset_name != "blender" {
        return Err(DataError::UnknownDataset(dataset_name.to_string()));
    }
    let camera_angle_x = blender::load_camera_angle(base_dir)?;
    Ok(RenderLoader::new(
        camera_angle_x,
        n_poses,
        height,
        width,
        blender::BLENDER_NEAR,
        blender::BLENDER_FAR,
        device,
    ))
}
