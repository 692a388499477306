//! The training configuration record.

use burn::config::Config;
use mirage_model::NerfModelConfig;

/// Process-wide training configuration.
///
/// Built once at startup and never mutated afterwards; every knob of the
/// run lives here, model hyperparameters included.
#[derive(Config, Debug)]
pub struct TrainConfig {
    /// Dataset kind, e.g. `blender`.
    pub dataset_name: String,
    /// Scene directory holding the transforms files and frames.
    pub base_dir: String,
    /// Output directory for checkpoints, scalars, and renders.
    pub log_dir: String,
    /// Integer downsampling factor applied to every frame.
    #[config(default = 1)]
    pub factor: usize,
    /// Rays per training batch.
    #[config(default = 2048)]
    pub batch_size: usize,
    /// Seed for batch shuffling and tensor-level randomness.
    #[config(default = 0)]
    pub seed: u64,
    /// Total optimization steps.
    #[config(default = 200000)]
    pub max_steps: usize,
    /// Checkpoint (and eval) cadence in steps.
    #[config(default = 1000)]
    pub save_every: usize,
    /// Preview render cadence in steps.
    #[config(default = 25000)]
    pub render_every: usize,
    /// Evaluate on the held-out split at every save.
    #[config(default = false)]
    pub do_eval: bool,
    /// Resume from the latest checkpoint under `log_dir`.
    #[config(default = false)]
    pub resume: bool,
    #[config(default = "5e-4")]
    pub lr_init: f64,
    #[config(default = "5e-6")]
    pub lr_final: f64,
    #[config(default = 2500)]
    pub lr_delay_steps: usize,
    #[config(default = "0.01")]
    pub lr_delay_mult: f64,
    /// AdamW weight decay.
    #[config(default = "1e-5")]
    pub weight_decay: f32,
    /// Weight applied to the summed coarse-level losses.
    #[config(default = "0.1")]
    pub coarse_weight_decay: f32,
    /// Rays per chunk when rendering full images.
    #[config(default = 4096)]
    pub chunks: usize,
    /// Number of orbit poses in the preview video.
    #[config(default = 60)]
    pub n_poses: usize,
    #[config(default = 200)]
    pub render_height: usize,
    #[config(default = 200)]
    pub render_width: usize,
    /// Model hyperparameters.
    pub model: NerfModelConfig,
}

impl TrainConfig {
    /// True when a checkpoint (and optional eval) is due at `step`.
    pub fn checkpoint_due(&self, step: usize) -> bool {
        step % self.save_every == 0
    }

    /// True when a preview render is due at `step`.
    pub fn render_due(&self, step: usize) -> bool {
        step % self.render_every == 0
    }
}
