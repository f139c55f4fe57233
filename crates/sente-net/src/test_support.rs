//! Synthetic weight files and fake pipes for unit tests.

use std::fmt::Write;
use std::thread;
use std::time::Duration;

use sente_core::NUM_INTERSECTIONS;

use crate::error::PipeError;
use crate::features::INPUT_CHANNELS;
use crate::pipe::{self, CpuPipe, ForwardPipe};
use crate::weights::{ConvBlock, FORMAT_VERSION, ResidualBlock, VALUE_HIDDEN, WeightSet};

/// Deterministic generator of a well-formed weight file.
pub struct WeightFile {
    pub channels: usize,
    pub blocks: usize,
    pub version: u32,
    /// Squeeze-excitation width; 0 writes empty SE lines.
    pub se_outputs: usize,
    pub seed: u32,
}

impl WeightFile {
    pub fn new(channels: usize, blocks: usize) -> WeightFile {
        WeightFile {
            channels,
            blocks,
            version: FORMAT_VERSION,
            se_outputs: 0,
            seed: 12345,
        }
    }

    pub fn render(&self) -> String {
        let c = self.channels;
        let mut rng = self.seed;
        let mut out = format!("{}\n", self.version);
        let mut line = |out: &mut String, n: usize, center: f32, spread: f32| {
            let mut first = true;
            for _ in 0..n {
                rng = rng.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
                let unit = (rng >> 8) as f32 / (1u32 << 24) as f32 * 2.0 - 1.0;
                if !first {
                    out.push(' ');
                }
                first = false;
                let _ = write!(out, "{:.4}", center + spread * unit);
            }
            out.push('\n');
        };
        let bn = |out: &mut String, line: &mut dyn FnMut(&mut String, usize, f32, f32), n: usize| {
            line(out, n, 1.0, 0.1); // gammas
            line(out, n, 0.0, 0.05); // betas
            line(out, n, 0.0, 0.05); // means
            line(out, n, 1.0, 0.4); // variances
        };

        line(&mut out, c * INPUT_CHANNELS * 9, 0.0, 0.2);
        bn(&mut out, &mut line, c);
        line(&mut out, c, 0.25, 0.05);

        for _ in 0..self.blocks {
            line(&mut out, c * c * 9, 0.0, 0.2);
            bn(&mut out, &mut line, c);
            line(&mut out, c, 0.25, 0.05);
            line(&mut out, c * c * 9, 0.0, 0.2);
            bn(&mut out, &mut line, c);
            let k = self.se_outputs;
            line(&mut out, k * c, 0.0, 0.3);
            line(&mut out, k, 0.0, 0.1);
            line(&mut out, k * c, 0.0, 0.3);
            line(&mut out, if k > 0 { c } else { 0 }, 0.0, 0.1);
            line(&mut out, c, 0.25, 0.05);
        }

        // policy head
        line(&mut out, 2 * c, 0.0, 0.5);
        line(&mut out, 2, 0.0, 0.1);
        line(&mut out, 2, 0.0, 0.05);
        line(&mut out, 2, 1.0, 0.4);
        line(&mut out, 2, 0.25, 0.05);
        line(&mut out, 2 * NUM_INTERSECTIONS * (NUM_INTERSECTIONS + 1), 0.0, 0.1);
        line(&mut out, NUM_INTERSECTIONS + 1, 0.0, 0.1);
        // value head
        line(&mut out, c, 0.0, 0.5);
        line(&mut out, 1, 0.0, 0.1);
        line(&mut out, 1, 0.0, 0.05);
        line(&mut out, 1, 1.0, 0.4);
        line(&mut out, 1, 0.25, 0.05);
        line(&mut out, NUM_INTERSECTIONS * VALUE_HIDDEN, 0.0, 0.05);
        line(&mut out, VALUE_HIDDEN, 0.0, 0.05);
        line(&mut out, VALUE_HIDDEN, 0.0, 0.1);
        line(&mut out, 1, 0.0, 0.1);
        out
    }
}

/// Load `weights` into `pipe`, panicking on failure.
pub fn load_pipe(mut pipe: Box<dyn ForwardPipe>, weights: &WeightSet) -> Box<dyn ForwardPipe> {
    pipe::load(pipe.as_mut(), weights).unwrap();
    pipe
}

/// Accepts any weights; every forward pass sleeps, then outputs zeros.
pub struct SlowPipe {
    delay: Duration,
}

impl SlowPipe {
    pub fn new(delay: Duration) -> SlowPipe {
        SlowPipe { delay }
    }
}

impl ForwardPipe for SlowPipe {
    fn name(&self) -> &str {
        "slow"
    }

    fn initialize(&mut self, _channels: usize) -> Result<(), PipeError> {
        Ok(())
    }

    fn push_input_convolution(&mut self, _: usize, _: usize, _: usize, _: &ConvBlock) -> Result<(), PipeError> {
        Ok(())
    }

    fn push_residual(&mut self, _: usize, _: usize, _: usize, _: &ResidualBlock) -> Result<(), PipeError> {
        Ok(())
    }

    fn push_convolve(&mut self, _: usize, _: usize, _: usize, _: &[f32]) -> Result<(), PipeError> {
        Ok(())
    }

    fn forward(&self, _input: &[f32], policy: &mut [f32], value: &mut [f32]) {
        thread::sleep(self.delay);
        policy.fill(0.0);
        value.fill(0.0);
    }
}

/// CPU pipe whose raw outputs are shifted by a constant, imitating a
/// backend that computes wrong results.
pub struct BiasedPipe {
    inner: CpuPipe,
    bias: f32,
}

impl BiasedPipe {
    pub fn new(bias: f32) -> BiasedPipe {
        BiasedPipe {
            inner: CpuPipe::new(),
            bias,
        }
    }
}

impl ForwardPipe for BiasedPipe {
    fn name(&self) -> &str {
        "biased"
    }

    fn initialize(&mut self, channels: usize) -> Result<(), PipeError> {
        self.inner.initialize(channels)
    }

    fn push_input_convolution(
        &mut self,
        tile_size: usize,
        inputs: usize,
        outputs: usize,
        conv: &ConvBlock,
    ) -> Result<(), PipeError> {
        self.inner.push_input_convolution(tile_size, inputs, outputs, conv)
    }

    fn push_residual(
        &mut self,
        tile_size: usize,
        channels: usize,
        se_fc_outputs: usize,
        block: &ResidualBlock,
    ) -> Result<(), PipeError> {
        self.inner.push_residual(tile_size, channels, se_fc_outputs, block)
    }

    fn push_convolve(&mut self, kernel_size: usize, inputs: usize, outputs: usize, weights: &[f32]) -> Result<(), PipeError> {
        self.inner.push_convolve(kernel_size, inputs, outputs, weights)
    }

    fn forward(&self, input: &[f32], policy: &mut [f32], value: &mut [f32]) {
        self.inner.forward(input, policy, value);
        for x in policy.iter_mut().chain(value.iter_mut()) {
            *x += self.bias;
        }
    }
}
