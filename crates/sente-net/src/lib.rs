//! Neural network evaluation for Go positions.
//!
//! A [`Network`] loads a residual-tower weight file, picks a backend through
//! the [`selector`], and turns any [`GameState`](sente_core::GameState) into
//! move probabilities and a winrate, caching results by position hash.

pub mod cache;
pub mod config;
pub mod error;
pub mod features;
pub mod heatmap;
pub mod layers;
mod network;
pub mod pipe;
mod result;
pub mod selector;
pub mod selfcheck;
pub mod weights;

#[cfg(test)]
pub(crate) mod test_support;

pub use cache::{CacheStats, ResultCache};
pub use config::{NetworkConfig, Precision};
pub use error::{LoadError, NetworkError, PipeError};
pub use features::{FeatureTensor, INPUT_CHANNELS, gather_features};
pub use network::{BenchmarkReport, Ensemble, Network};
pub use pipe::{CpuPipe, ForwardPipe};
pub use result::NetResult;
pub use selector::{Accelerator, BackendKind, Backends};
pub use weights::WeightSet;
