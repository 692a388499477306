//! Dataset loading and ray batching for mirage.
//!
//! This crate owns the CPU side of the training pipeline: parsing posed-image
//! datasets, generating camera rays, and batching them into device tensors
//! for the model. GPU-facing code lives in mirage-model.
//!
//! ## Modules
//!
//! - [`blender`]: Blender-style synthetic dataset loading (transforms JSON + PNG)
//! - [`rays`]: ray batch types and pinhole ray generation
//! - [`poses`]: synthesized camera paths for preview rendering
//! - [`loader`]: cyclic train/eval loaders and the finite render loader

pub mod blender;
pub mod loader;
pub mod poses;
pub mod rays;

pub use blender::{DataError, SceneData, Split, load_camera_angle, load_scene};
pub use loader::{RayLoader, RenderLoader, ray_loader, render_loader};
pub use rays::{RayBatch, RayBundle, camera_rays};
