//! Trainable layers for tessera.
//!
//! Provides the `Layer` contract (initialize, forward with a backward
//! closure, optimizer step), the `Embed` lookup layer, and the pieces it is
//! built from: a named dimension registry, a shared parameter store, and
//! table initializers.

pub mod config;
pub mod dims;
pub mod embed;
pub mod init;
pub mod params;

use std::sync::Arc;

use tessera_core::Result;
use tessera_optim::Optimizer;

pub use config::{EmbedConfig, InitializerConfig};
pub use dims::Dims;
pub use embed::{Embed, N_O, N_V, VECTORS};
pub use init::{GlorotUniformInit, Initializer, NormalInit, UniformInit, ZeroInit};
pub use params::ParamStore;

/// Gradient callback returned by `Layer::forward`.
///
/// Maps the gradient of the output to the gradient of the input, adding
/// parameter gradients to the layer's `ParamStore` as a side effect.
pub type Backprop<D, R> = Box<dyn Fn(&D) -> Result<R> + Send + Sync>;

/// A layer with lazily resolved dimensions and externally stored parameters.
pub trait Layer {
    type Input;
    type Output;

    fn name(&self) -> &str;

    /// Resolve dimensions (optionally from example data) and allocate
    /// parameters.
    fn initialize(
        &mut self,
        x: Option<&Self::Input>,
        y: Option<&Self::Output>,
    ) -> Result<()>;

    /// Compute the output and a callback for the backward pass.
    fn forward(
        &self,
        x: &Self::Input,
        is_train: bool,
    ) -> Result<(Self::Output, Backprop<Self::Output, Self::Input>)>;

    fn params(&self) -> &Arc<ParamStore>;

    /// Inference-only forward.
    fn predict(&self, x: &Self::Input) -> Result<Self::Output> {
        self.forward(x, false).map(|(y, _)| y)
    }

    /// Training forward.
    fn begin_update(
        &self,
        x: &Self::Input,
    ) -> Result<(Self::Output, Backprop<Self::Output, Self::Input>)> {
        self.forward(x, true)
    }

    /// Apply `optimizer` to all accumulated gradients and clear them.
    fn finish_update(&self, optimizer: &mut dyn Optimizer) -> Result<usize> {
        self.params().finish_update(optimizer)
    }
}
