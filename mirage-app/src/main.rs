//! Mirage trainer binary.
//!
//! Parses the run configuration from the command line, initializes logging,
//! and hands off to the training driver. The tensor backend is CPU by
//! default; build with `--features wgpu` for the GPU backend.

use clap::Parser;
use tracing::info;

use mirage_model::NerfModelConfig;
use mirage_train::TrainConfig;

#[cfg(not(feature = "wgpu"))]
type TrainingBackend = burn::backend::Autodiff<burn::backend::NdArray<f32>>;
#[cfg(feature = "wgpu")]
type TrainingBackend = burn::backend::Autodiff<burn::backend::Wgpu>;

/// Mirage - radiance-field training and novel-view rendering
#[derive(Parser, Debug)]
#[command(name = "mirage")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Dataset kind (currently only "blender")
    #[arg(long, default_value = "blender")]
    dataset_name: String,

    /// Scene directory holding the transforms files and frames
    #[arg(long)]
    base_dir: String,

    /// Output directory for checkpoints, scalars, and renders
    #[arg(long, default_value = "logs")]
    log_dir: String,

    /// Integer downsampling factor applied to every frame
    #[arg(long, default_value_t = 1)]
    factor: usize,

    /// Rays per training batch
    #[arg(long, default_value_t = 2048)]
    batch_size: usize,

    /// Seed for shuffling and tensor-level randomness
    #[arg(long, default_value_t = 0)]
    seed: u64,

    /// Total optimization steps
    #[arg(long, default_value_t = 200_000)]
    max_steps: usize,

    /// Checkpoint (and eval) cadence in steps
    #[arg(long, default_value_t = 1000)]
    save_every: usize,

    /// Preview render cadence in steps
    #[arg(long, default_value_t = 25_000)]
    render_every: usize,

    /// Evaluate on the held-out split at every save
    #[arg(long)]
    do_eval: bool,

    /// Resume from the latest checkpoint under the log directory
    #[arg(long)]
    resume: bool,

    #[arg(long, default_value_t = 5e-4)]
    lr_init: f64,

    #[arg(long, default_value_t = 5e-6)]
    lr_final: f64,

    #[arg(long, default_value_t = 2500)]
    lr_delay_steps: usize,

    #[arg(long, default_value_t = 0.01)]
    lr_delay_mult: f64,

    /// AdamW weight decay
    #[arg(long, default_value_t = 1e-5)]
    weight_decay: f32,

    /// Weight applied to the summed coarse-level losses
    #[arg(long, default_value_t = 0.1)]
    coarse_weight_decay: f32,

    /// Rays per chunk when rendering full images
    #[arg(long, default_value_t = 4096)]
    chunks: usize,

    /// Number of orbit poses in the preview video
    #[arg(long, default_value_t = 60)]
    n_poses: usize,

    #[arg(long, default_value_t = 200)]
    render_height: usize,

    #[arg(long, default_value_t = 200)]
    render_width: usize,

    /// Samples per ray per level
    #[arg(long, default_value_t = 128)]
    num_samples: usize,

    /// Hidden width of the model MLP
    #[arg(long, default_value_t = 256)]
    hidden: usize,
}

impl Args {
    fn into_config(self) -> TrainConfig {
        let model = NerfModelConfig::new()
            .with_num_samples(self.num_samples)
            .with_hidden(self.hidden);
        TrainConfig::new(self.dataset_name, self.base_dir, self.log_dir, model)
            .with_factor(self.factor)
            .with_batch_size(self.batch_size)
            .with_seed(self.seed)
            .with_max_steps(self.max_steps)
            .with_save_every(self.save_every)
            .with_render_every(self.render_every)
            .with_do_eval(self.do_eval)
            .with_resume(self.resume)
            .with_lr_init(self.lr_init)
            .with_lr_final(self.lr_final)
            .with_lr_delay_steps(self.lr_delay_steps)
            .with_lr_delay_mult(self.lr_delay_mult)
            .with_weight_decay(self.weight_decay)
            .with_coarse_weight_decay(self.coarse_weight_decay)
            .with_chunks(self.chunks)
            .with_n_poses(self.n_poses)
            .with_render_height(self.render_height)
            .with_render_width(self.render_width)
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = Args::parse().into_config();
    info!(
        dataset = %config.dataset_name,
        scene = %config.base_dir,
        log_dir = %config.log_dir,
        "starting training run"
    );

    let device = Default::default();
    if let Err(e) = mirage_train::train::<TrainingBackend>(&config, &device) {
        eprintln!("Training failed: {e}");
        std::process::exit(1);
    }
}
