//! Ray batch types and pinhole ray generation.
//!
//! Rays are generated on the CPU with glam and uploaded as flat tensors; the
//! model never sees per-pixel geometry, only `RayBatch` bundles.

use std::ops::Range;

use burn::tensor::backend::{AutodiffBackend, Backend};
use burn::tensor::{Tensor, TensorData};
use glam::{Mat4, Vec3};

/// A batch of rays as device tensors.
///
/// All tensors share the same leading dimension (one row per ray). Directions
/// are unnormalized so interval lengths along the ray scale with them;
/// `viewdirs` carries the unit directions for view-dependent shading.
#[derive(Debug, Clone)]
pub struct RayBatch<B: Backend> {
    /// Ray origins in world space, `(n, 3)`.
    pub origins: Tensor<B, 2>,
    /// Ray directions in world space, unnormalized, `(n, 3)`.
    pub directions: Tensor<B, 2>,
    /// Unit view directions, `(n, 3)`.
    pub viewdirs: Tensor<B, 2>,
    /// Per-ray loss weight, `(n, 1)`.
    pub lossmult: Tensor<B, 2>,
    /// Per-ray near bound, `(n, 1)`.
    pub near: Tensor<B, 2>,
    /// Per-ray far bound, `(n, 1)`.
    pub far: Tensor<B, 2>,
}

impl<B: Backend> RayBatch<B> {
    /// Number of rays in the batch.
    pub fn len(&self) -> usize {
        self.origins.dims()[0]
    }

    /// True when the batch holds no rays.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// A sub-batch covering `range` of the rays, in order.
    pub fn slice_rays(&self, range: Range<usize>) -> Self {
        Self {
            origins: self.origins.clone().slice([range.clone(), 0..3]),
            directions: self.directions.clone().slice([range.clone(), 0..3]),
            viewdirs: self.viewdirs.clone().slice([range.clone(), 0..3]),
            lossmult: self.lossmult.clone().slice([range.clone(), 0..1]),
            near: self.near.clone().slice([range.clone(), 0..1]),
            far: self.far.clone().slice([range, 0..1]),
        }
    }
}

impl<B: AutodiffBackend> RayBatch<B> {
    /// Strip gradient tracking, yielding the same rays on the inner backend.
    pub fn inner(self) -> RayBatch<B::InnerBackend> {
        RayBatch {
            origins: self.origins.inner(),
            directions: self.directions.inner(),
            viewdirs: self.viewdirs.inner(),
            lossmult: self.lossmult.inner(),
            near: self.near.inner(),
            far: self.far.inner(),
        }
    }
}

/// CPU-side ray storage, flat `f32` rows.
///
/// One bundle holds the rays of one or more frames; loaders index into it to
/// assemble device batches.
#[derive(Debug, Clone, Default)]
pub struct RayBundle {
    /// Flattened origins, `len * 3`.
    pub origins: Vec<f32>,
    /// Flattened unnormalized directions, `len * 3`.
    pub directions: Vec<f32>,
    /// Flattened unit view directions, `len * 3`.
    pub viewdirs: Vec<f32>,
    /// Per-ray loss weight.
    pub lossmult: Vec<f32>,
    /// Near bound shared by every ray in the bundle.
    pub near: f32,
    /// Far bound shared by every ray in the bundle.
    pub far: f32,
}

impl RayBundle {
    /// An empty bundle with the given scene bounds.
    pub fn new(near: f32, far: f32) -> Self {
        Self {
            near,
            far,
            ..Self::default()
        }
    }

    /// Number of rays stored.
    pub fn len(&self) -> usize {
        self.lossmult.len()
    }

    /// True when no rays are stored.
    pub fn is_empty(&self) -> bool {
        self.lossmult.is_empty()
    }

    /// Append one ray with unit loss weight.
    pub fn push(&mut self, origin: Vec3, direction: Vec3) {
        self.origins.extend_from_slice(&origin.to_array());
        self.directions.extend_from_slice(&direction.to_array());
        self.viewdirs
            .extend_from_slice(&direction.normalize_or_zero().to_array());
        self.lossmult.push(1.0);
    }

    /// Append every ray of another bundle. Bounds must already agree.
    pub fn extend(&mut self, other: &RayBundle) {
        self.origins.extend_from_slice(&other.origins);
        self.directions.extend_from_slice(&other.directions);
        self.viewdirs.extend_from_slice(&other.viewdirs);
        self.lossmult.extend_from_slice(&other.lossmult);
    }

    /// Upload the whole bundle as one device batch.
    pub fn to_batch<B: Backend>(&self, device: &B::Device) -> RayBatch<B> {
        let n = self.len();
        RayBatch {
            origins: tensor2(self.origins.clone(), n, 3, device),
            directions: tensor2(self.directions.clone(), n, 3, device),
            viewdirs: tensor2(self.viewdirs.clone(), n, 3, device),
            lossmult: tensor2(self.lossmult.clone(), n, 1, device),
            near: tensor2(vec![self.near; n], n, 1, device),
            far: tensor2(vec![self.far; n], n, 1, device),
        }
    }

    /// Upload the rays selected by `indices`, in that order.
    pub fn gather_batch<B: Backend>(&self, indices: &[usize], device: &B::Device) -> RayBatch<B> {
        let n = indices.len();
        let mut origins = Vec::with_capacity(n * 3);
        let mut directions = Vec::with_capacity(n * 3);
        let mut viewdirs = Vec::with_capacity(n * 3);
        let mut lossmult = Vec::with_capacity(n);
        for &i in indices {
            origins.extend_from_slice(&self.origins[i * 3..i * 3 + 3]);
            directions.extend_from_slice(&self.directions[i * 3..i * 3 + 3]);
            viewdirs.extend_from_slice(&self.viewdirs[i * 3..i * 3 + 3]);
            lossmult.push(self.lossmult[i]);
        }
        RayBatch {
            origins: tensor2(origins, n, 3, device),
            directions: tensor2(directions, n, 3, device),
            viewdirs: tensor2(viewdirs, n, 3, device),
            lossmult: tensor2(lossmult, n, 1, device),
            near: tensor2(vec![self.near; n], n, 1, device),
            far: tensor2(vec![self.far; n], n, 1, device),
        }
    }
}

fn tensor2<B: Backend>(data: Vec<f32>, rows: usize, cols: usize, device: &B::Device) -> Tensor<B, 2> {
    Tensor::from_data(TensorData::new(data, [rows, cols]), device)
}

/// Generate one ray per pixel of a pinhole camera.
///
/// Pixel traversal is row-major (`y` outer, `x` inner) so the ray order
/// matches the memory layout of the frame it was rendered from. The camera
/// looks down `-z` in its own frame, `y` up.
pub fn camera_rays(
    pose: &Mat4,
    height: usize,
    width: usize,
    focal: f32,
    near: f32,
    far: f32,
) -> RayBundle {
    let mut bundle = RayBundle::new(near, far);
    bundle.origins.reserve(height * width * 3);
    bundle.directions.reserve(height * width * 3);
    bundle.viewdirs.reserve(height * width * 3);
    bundle.lossmult.reserve(height * width);

    let origin = pose.w_axis.truncate();
    let half_w = width as f32 / 2.0;
    let half_h = height as f32 / 2.0;
    for y in 0..height {
        for x in 0..width {
            let dir_cam = Vec3::new(
                (x as f32 + 0.5 - half_w) / focal,
                -(y as f32 + 0.5 - half_h) / focal,
                -1.0,
            );
            bundle.push(origin, pose.transform_vector3(dir_cam));
        }
    }
    bundle
}
