//! The training loop driver.
//!
//! One synchronous loop: pull a batch, forward, loss, backward, optimizer
//! step, schedule step, log scalars; checkpoint and render on their own
//! cadences. Any failure aborts the run; the latest checkpoint is the
//! recovery point for a resumed run.

use std::fs;
use std::io::BufWriter;
use std::path::Path;

use burn::module::{AutodiffModule, Module};
use burn::optim::{AdamWConfig, GradientsParams, Optimizer};
use burn::tensor::ElementConversion;
use burn::tensor::backend::{AutodiffBackend, Backend};
use image::codecs::gif::{GifEncoder, Repeat};
use image::{Delay, Frame, RgbImage};
use tracing::{debug, info};

use mirage_data::{DataError, RayLoader, RenderLoader, Split, ray_loader, render_loader};
use mirage_model::{NerfModel, RenderError};

use crate::checkpoint::{self, CheckpointError};
use crate::config::TrainConfig;
use crate::loss::{NerfLoss, aggregate_psnrs, mse_to_psnr};
use crate::metrics::{MetricsError, MetricsLogger, ScalarEvent};
use crate::schedule::LrDecay;

/// Frame rate of the preview animation.
const VIDEO_FPS: u32 = 30;

/// Errors that abort a training run.
#[derive(Debug, thiserror::Error)]
pub enum TrainError {
    #[error("dataset error: {0}")]
    Data(#[from] DataError),
    #[error("checkpoint error: {0}")]
    Checkpoint(#[from] CheckpointError),
    #[error("metrics error: {0}")]
    Metrics(#[from] MetricsError),
    #[error("render error: {0}")]
    Render(#[from] RenderError),
    #[error("image encoding error: {0}")]
    Image(#[from] image::ImageError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// What a completed run hands back to its caller.
#[derive(Debug)]
pub struct TrainReport {
    /// First step past the end of the run (== `max_steps`).
    pub final_step: usize,
    /// Every scalar logged during the run, in order.
    pub events: Vec<ScalarEvent>,
}

/// Train a radiance-field model according to `config`.
///
/// Blocks until `max_steps` is reached; there is no final save beyond the
/// cadenced ones. Fails fatally on a missing checkpoint when resuming.
pub fn train<B: AutodiffBackend>(
    config: &TrainConfig,
    device: &B::Device,
) -> Result<TrainReport, TrainError> {
    B::seed(config.seed);
    let base_dir = Path::new(&config.base_dir);
    let log_dir = Path::new(&config.log_dir);
    fs::create_dir_all(log_dir)?;

    let mut train_data = ray_loader::<B>(
        &config.dataset_name,
        base_dir,
        Split::Train,
        config.factor,
        config.batch_size,
        true,
        config.seed,
        device,
    )?;
    let mut eval_data = match config.do_eval {
        true => Some(ray_loader::<B>(
            &config.dataset_name,
            base_dir,
            Split::Test,
            config.factor,
            config.batch_size,
            true,
            config.seed.wrapping_add(1),
            device,
        )?),
        false => None,
    };
    let render_data = render_loader::<B::InnerBackend>(
        &config.dataset_name,
        base_dir,
        config.n_poses,
        config.render_height,
        config.render_width,
        device,
    )?;

    let mut model = config.model.init::<B>(device);
    let mut optim = AdamWConfig::new()
        .with_weight_decay(config.weight_decay)
        .init();

    let latest = checkpoint::latest_path(log_dir);
    let mut start_step = 0;
    if config.resume {
        let restored = checkpoint::load::<B, _, _>(&latest, device)?;
        let (model_record, optim_record, step) = restored.into_parts();
        model = model.load_record(model_record);
        optim = optim.load_record(optim_record);
        start_step = step;
        info!(step = start_step, "restored model and optimizer from disk");
    }

    let mut schedule = LrDecay::new(config.lr_init, config.lr_final, config.max_steps)
        .with_delay(config.lr_delay_steps, config.lr_delay_mult)
        .advanced_to(start_step);
    let loss_fn = NerfLoss::new(config.coarse_weight_decay);
    let mut logger = MetricsLogger::create(&log_dir.join("train"))?;

    info!(
        start = start_step,
        max_steps = config.max_steps,
        "training"
    );
    for step in start_step..config.max_steps {
        let (rays, pixels) = train_data.next_batch();
        let levels = model.forward(&rays);
        let (loss, psnrs) = loss_fn.forward(&levels, pixels, rays.lossmult.clone());
        let loss_value = loss.clone().into_scalar().elem::<f32>();

        let grads = GradientsParams::from_grads(loss.backward(), &model);
        model = optim.step(schedule.last_lr(), model, grads);
        schedule.step();

        let summary = aggregate_psnrs(&psnrs);
        logger.scalar("train/loss", loss_value, step)?;
        logger.scalar("train/coarse_psnr", summary.coarse, step)?;
        logger.scalar("train/fine_psnr", summary.fine, step)?;
        logger.scalar("train/avg_psnr", summary.mean, step)?;
        logger.scalar("train/lr", schedule.last_lr() as f32, step)?;
        debug!(step, loss = loss_value, psnr = summary.mean, "step");

        if config.checkpoint_due(step) {
            checkpoint::save::<B, _, _>(
                model.clone().into_record(),
                optim.to_record(),
                step,
                &checkpoint::step_path(log_dir, step),
            )?;
            checkpoint::save::<B, _, _>(
                model.clone().into_record(),
                optim.to_record(),
                step,
                &latest,
            )?;
            if let Some(eval) = eval_data.as_mut() {
                let summary = aggregate_psnrs(&evaluate(&model, eval));
                logger.scalar("eval/coarse_psnr", summary.coarse, step)?;
                logger.scalar("eval/fine_psnr", summary.fine, step)?;
                logger.scalar("eval/avg_psnr", summary.mean, step)?;
            }
        }

        if config.render_due(step) {
            render_views(
                &model.valid(),
                &render_data,
                &log_dir.join(format!("step_{step}")),
                config.chunks,
            )?;
        }
    }

    info!(steps = config.max_steps, "training finished");
    Ok(TrainReport {
        final_step: config.max_steps,
        events: logger.into_events(),
    })
}

/// PSNR of one held-out batch, per level, without gradient tracking.
pub fn evaluate<B: AutodiffBackend>(model: &NerfModel<B>, data: &mut RayLoader<B>) -> Vec<f32> {
    let inference = model.valid();
    let (rays, pixels) = data.next_batch();
    let pixels = pixels.inner();
    inference
        .forward(&rays.inner())
        .into_iter()
        .map(|rgb| {
            let mse = (rgb - pixels.clone())
                .powf_scalar(2.0)
                .mean()
                .into_scalar()
                .elem::<f32>();
            mse_to_psnr(mse)
        })
        .collect()
}

/// Render every pose of the preview path into `out_dir`.
///
/// Frames land as `image_<i>.png` in pose order; the animation is written
/// only after every frame succeeded.
fn render_views<B: Backend>(
    model: &NerfModel<B>,
    data: &RenderLoader<B>,
    out_dir: &Path,
    chunk_size: usize,
) -> Result<(), TrainError> {
    info!(poses = data.len(), dir = %out_dir.display(), "rendering preview");
    fs::create_dir_all(out_dir)?;

    let mut frames = Vec::with_capacity(data.len());
    for rays in data.batches() {
        frames.push(model.render_image(&rays, data.height(), data.width(), chunk_size)?);
    }
    for (i, image) in frames.iter().enumerate() {
        image.save(out_dir.join(format!("image_{i}.png")))?;
    }
    write_animation(&out_dir.join("video.gif"), &frames)?;
    Ok(())
}

fn write_animation(path: &Path, frames: &[RgbImage]) -> Result<(), TrainError> {
    let file = fs::File::create(path)?;
    let mut encoder = GifEncoder::new(BufWriter::new(file));
    encoder.set_repeat(Repeat::Infinite)?;
    for image in frames {
        let rgba = image::DynamicImage::ImageRgb8(image.clone()).to_rgba8();
        encoder.encode_frame(Frame::from_parts(
            rgba,
            0,
            0,
            Delay::from_numer_denom_ms(1000, VIDEO_FPS),
        ))?;
    }
    Ok(())
}
