//! The backend contract: anything that can run the residual tower.
//!
//! A pipe is built once, fed every tensor group in load order, then shared
//! read-only between evaluation threads.

mod cpu;

pub use cpu::CpuPipe;

use sente_core::NUM_INTERSECTIONS;

use crate::error::PipeError;
use crate::features::INPUT_CHANNELS;
use crate::weights::transform::WINOGRAD_ALPHA;
use crate::weights::{ConvBlock, OUTPUTS_POLICY, OUTPUTS_VALUE, ResidualBlock, WeightSet};

/// Raw policy-head output length (head convolution planes).
pub const POLICY_OUTPUT_LEN: usize = OUTPUTS_POLICY * NUM_INTERSECTIONS;
/// Raw value-head output length.
pub const VALUE_OUTPUT_LEN: usize = OUTPUTS_VALUE * NUM_INTERSECTIONS;

/// A compute backend for the convolutional tower and the head convolutions.
///
/// Loading calls [`initialize`](ForwardPipe::initialize) once, then each push
/// exactly once per tensor group in file order: the input convolution, every
/// residual block, the policy head convolution and the value head convolution.
///
/// [`forward`](ForwardPipe::forward) may be called concurrently from many
/// threads and must be deterministic for a given backend and precision.
pub trait ForwardPipe: Send + Sync {
    /// Short backend name for logs and errors.
    fn name(&self) -> &str;

    /// Prepare for a tower of `channels` filters.
    fn initialize(&mut self, channels: usize) -> Result<(), PipeError>;

    /// Input 3x3 convolution with fused batch norm and PReLU.
    /// Weights are Winograd-transformed for tiles of `tile_size`.
    fn push_input_convolution(
        &mut self,
        tile_size: usize,
        inputs: usize,
        outputs: usize,
        conv: &ConvBlock,
    ) -> Result<(), PipeError>;

    /// One residual block of `channels` filters; `se_fc_outputs` is 0 when
    /// the block has no squeeze-excitation.
    fn push_residual(
        &mut self,
        tile_size: usize,
        channels: usize,
        se_fc_outputs: usize,
        block: &ResidualBlock,
    ) -> Result<(), PipeError>;

    /// A head convolution without bias (the bias is folded into batch norm).
    fn push_convolve(
        &mut self,
        kernel_size: usize,
        inputs: usize,
        outputs: usize,
        weights: &[f32],
    ) -> Result<(), PipeError>;

    /// Run the network on `input` (`INPUT_CHANNELS` planes), writing the raw
    /// policy planes (`POLICY_OUTPUT_LEN`) and value plane (`VALUE_OUTPUT_LEN`).
    fn forward(&self, input: &[f32], policy: &mut [f32], value: &mut [f32]);
}

impl std::fmt::Debug for dyn ForwardPipe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ForwardPipe({})", self.name())
    }
}

/// Push every tensor group of `weights` into `pipe`, in load order.
pub fn load(pipe: &mut dyn ForwardPipe, weights: &WeightSet) -> Result<(), PipeError> {
    let channels = weights.channels;
    pipe.initialize(channels)?;
    pipe.push_input_convolution(WINOGRAD_ALPHA, INPUT_CHANNELS, channels, &weights.input)?;
    for block in &weights.residual {
        pipe.push_residual(WINOGRAD_ALPHA, channels, block.se.fc_outputs(), block)?;
    }
    pipe.push_convolve(1, channels, OUTPUTS_POLICY, &weights.policy.conv_weights)?;
    pipe.push_convolve(1, channels, OUTPUTS_VALUE, &weights.value.conv_weights)?;
    Ok(())
}
