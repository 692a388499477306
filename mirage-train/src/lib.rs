//! Training pipeline for the mirage radiance-field model.
//!
//! The driver in [`trainer`] wires the dataloaders, model, optimizer,
//! learning-rate schedule, loss, checkpointing, scalar logging, and periodic
//! preview rendering into one synchronous loop. Everything else in this
//! crate is a collaborator of that loop.
//!
//! ## Modules
//!
//! - [`config`]: the flat training configuration record
//! - [`schedule`]: exponential learning-rate decay with warm-up delay
//! - [`loss`]: per-level weighted MSE and PSNR
//! - [`checkpoint`]: single-artifact save/restore of model, optimizer, step
//! - [`metrics`]: append-only scalar stream
//! - [`trainer`]: the training loop driver

pub mod checkpoint;
pub mod config;
pub mod loss;
pub mod metrics;
pub mod schedule;
pub mod trainer;

pub use config::TrainConfig;
pub use loss::{NerfLoss, PsnrSummary, aggregate_psnrs, mse_to_psnr};
pub use metrics::{MetricsLogger, ScalarEvent};
pub use schedule::LrDecay;
pub use trainer::{TrainError, TrainReport, train};
