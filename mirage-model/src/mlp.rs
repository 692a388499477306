//! The density/color network.
//!
//! A plain fully-connected trunk with one skip connection, a density head
//! off the trunk, and a color head that optionally conditions on encoded
//! view directions through a bottleneck.

use burn::config::Config;
use burn::module::Module;
use burn::nn::{Linear, LinearConfig};
use burn::tensor::Tensor;
use burn::tensor::activation::relu;
use burn::tensor::backend::Backend;

/// Network hyperparameters.
#[derive(Config, Debug)]
pub struct NerfMlpConfig {
    /// Width of the encoded position features.
    pub input_dim: usize,
    /// Width of the encoded view-direction features; 0 disables conditioning.
    pub condition_dim: usize,
    #[config(default = 8)]
    pub depth: usize,
    #[config(default = 256)]
    pub hidden: usize,
    /// Trunk layer whose input is concatenated with the raw features again.
    #[config(default = 4)]
    pub skip: usize,
    #[config(default = 128)]
    pub condition_hidden: usize,
}

impl NerfMlpConfig {
    /// Initialize the network on a device.
    pub fn init<B: Backend>(&self, device: &B::Device) -> NerfMlp<B> {
        let mut trunk = Vec::with_capacity(self.depth);
        for i in 0..self.depth {
            let d_in = if i == 0 {
                self.input_dim
            } else if i == self.skip {
                self.hidden + self.input_dim
            } else {
                self.hidden
            };
            trunk.push(LinearConfig::new(d_in, self.hidden).init(device));
        }

        let condition_layer = if self.condition_dim > 0 {
            Some(
                LinearConfig::new(self.hidden + self.condition_dim, self.condition_hidden)
                    .init(device),
            )
        } else {
            None
        };
        let rgb_in = if self.condition_dim > 0 {
            self.condition_hidden
        } else {
            self.hidden
        };

        NerfMlp {
            trunk,
            density_head: LinearConfig::new(self.hidden, 1).init(device),
            bottleneck: LinearConfig::new(self.hidden, self.hidden).init(device),
            condition_layer,
            rgb_head: LinearConfig::new(rgb_in, 3).init(device),
            skip: self.skip,
        }
    }
}

/// The shared radiance-field network.
#[derive(Module, Debug)]
pub struct NerfMlp<B: Backend> {
    trunk: Vec<Linear<B>>,
    density_head: Linear<B>,
    bottleneck: Linear<B>,
    condition_layer: Option<Linear<B>>,
    rgb_head: Linear<B>,
    skip: usize,
}

impl<B: Backend> NerfMlp<B> {
    /// Map `(m, input_dim)` features (and optional `(m, condition_dim)`
    /// conditions) to raw density `(m, 1)` and raw color `(m, 3)`.
    ///
    /// Outputs are pre-activation; the caller applies its own squashing.
    pub fn forward(
        &self,
        features: Tensor<B, 2>,
        condition: Option<Tensor<B, 2>>,
    ) -> (Tensor<B, 2>, Tensor<B, 2>) {
        let mut x = features.clone();
        for (i, layer) in self.trunk.iter().enumerate() {
            if i == self.skip && i > 0 {
                x = Tensor::cat(vec![x, features.clone()], 1);
            }
            x = relu(layer.forward(x));
        }

        let raw_density = self.density_head.forward(x.clone());
        let mut h = self.bottleneck.forward(x);
        if let (Some(layer), Some(cond)) = (&self.condition_layer, condition) {
            h = relu(layer.forward(Tensor::cat(vec![h, cond], 1)));
        }
        let raw_rgb = self.rgb_head.forward(h);
        (raw_density, raw_rgb)
    }
}
