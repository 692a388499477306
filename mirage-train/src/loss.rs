//! Loss and image-quality metrics.

use burn::tensor::backend::Backend;
use burn::tensor::{ElementConversion, Tensor};

/// Convert a mean-squared error into peak signal-to-noise ratio (dB).
pub fn mse_to_psnr(mse: f32) -> f32 {
    -10.0 * mse.log10()
}

/// Per-level PSNRs folded into the three logged values.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PsnrSummary {
    /// Mean over every level but the last.
    pub coarse: f32,
    /// The last (finest) level.
    pub fine: f32,
    /// Mean over all levels.
    pub mean: f32,
}

/// Fold per-level PSNRs, coarse levels first and the finest last.
pub fn aggregate_psnrs(psnrs: &[f32]) -> PsnrSummary {
    let mean_of = |values: &[f32]| values.iter().sum::<f32>() / values.len() as f32;
    PsnrSummary {
        coarse: mean_of(&psnrs[..psnrs.len() - 1]),
        fine: psnrs[psnrs.len() - 1],
        mean: mean_of(psnrs),
    }
}

/// Weighted reconstruction loss over all sampling levels.
///
/// Each level contributes a lossmult-weighted MSE; the coarse levels are
/// summed and scaled down so the finest level dominates.
#[derive(Debug, Clone)]
pub struct NerfLoss {
    coarse_weight_decay: f32,
}

impl NerfLoss {
    pub fn new(coarse_weight_decay: f32) -> Self {
        Self {
            coarse_weight_decay,
        }
    }

    /// Compute the scalar loss and the PSNR of every level.
    ///
    /// `levels` holds one `(n, 3)` prediction per sampling level, finest
    /// last; `target` is `(n, 3)` and `lossmult` `(n, 1)`. At least one
    /// level is required.
    pub fn forward<B: Backend>(
        &self,
        levels: &[Tensor<B, 2>],
        target: Tensor<B, 2>,
        lossmult: Tensor<B, 2>,
    ) -> (Tensor<B, 1>, Vec<f32>) {
        assert!(!levels.is_empty(), "loss requires at least one level");
        let denom = lossmult.clone().sum();

        let mut mses = Vec::with_capacity(levels.len());
        let mut psnrs = Vec::with_capacity(levels.len());
        for rgb in levels {
            let diff = rgb.clone() - target.clone();
            let weighted = lossmult.clone().repeat_dim(1, 3) * diff.powf_scalar(2.0);
            let mse = weighted.sum() / denom.clone();
            psnrs.push(mse_to_psnr(mse.clone().into_scalar().elem::<f32>()));
            mses.push(mse);
        }

        // Scaling each coarse term is the same as scaling their sum.
        let count = mses.len();
        let loss = mses
            .into_iter()
            .enumerate()
            .map(|(i, mse)| {
                if i + 1 < count {
                    mse.mul_scalar(self.coarse_weight_decay)
                } else {
                    mse
                }
            })
            .reduce(|a, b| a + b)
            .expect("at least one level");
        (loss, psnrs)
    }
}
