//! Reference CPU backend: Winograd 3x3 convolutions in plain `f32`.

use sente_core::{BOARD_SIZE, NUM_INTERSECTIONS};

use super::ForwardPipe;
use crate::error::PipeError;
use crate::layers;
use crate::weights::transform::{WINOGRAD_ALPHA, WINOGRAD_M, WINOGRAD_TILE};
use crate::weights::{ConvBlock, OUTPUTS_POLICY, OUTPUTS_VALUE, ResidualBlock};

const SQ2: f32 = std::f32::consts::SQRT_2;

/// Tiles per board row.
const WTILES: usize = BOARD_SIZE.div_ceil(WINOGRAD_M);
/// Tiles per board.
const TILES: usize = WTILES * WTILES;

const NAME: &str = "cpu";

/// Where the pipe is in the load sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Uninitialized,
    Input,
    Tower,
    ValueHead,
    Ready,
}

/// Always-available CPU implementation of [`ForwardPipe`].
#[derive(Debug)]
pub struct CpuPipe {
    stage: Stage,
    channels: usize,
    input_planes: usize,
    input: ConvBlock,
    residual: Vec<ResidualBlock>,
    policy_conv: Vec<f32>,
    value_conv: Vec<f32>,
}

impl Default for CpuPipe {
    fn default() -> Self {
        CpuPipe::new()
    }
}

impl CpuPipe {
    pub fn new() -> CpuPipe {
        CpuPipe {
            stage: Stage::Uninitialized,
            channels: 0,
            input_planes: 0,
            input: ConvBlock::default(),
            residual: Vec::new(),
            policy_conv: Vec::new(),
            value_conv: Vec::new(),
        }
    }

    fn out_of_order(&self, layer: &'static str) -> PipeError {
        PipeError::OutOfOrder {
            backend: NAME.to_string(),
            layer,
        }
    }

    fn unsupported(what: String) -> PipeError {
        PipeError::Unsupported {
            backend: NAME.to_string(),
            what,
        }
    }
}

impl ForwardPipe for CpuPipe {
    fn name(&self) -> &str {
        NAME
    }

    fn initialize(&mut self, channels: usize) -> Result<(), PipeError> {
        if self.stage != Stage::Uninitialized {
            return Err(self.out_of_order("initialize"));
        }
        self.channels = channels;
        self.stage = Stage::Input;
        Ok(())
    }

    fn push_input_convolution(
        &mut self,
        tile_size: usize,
        inputs: usize,
        outputs: usize,
        conv: &ConvBlock,
    ) -> Result<(), PipeError> {
        if self.stage != Stage::Input {
            return Err(self.out_of_order("input convolution"));
        }
        if tile_size != WINOGRAD_ALPHA {
            return Err(CpuPipe::unsupported(format!("winograd tile size {tile_size}")));
        }
        if outputs != self.channels {
            return Err(CpuPipe::unsupported(format!(
                "input convolution with {outputs} outputs on a {}-channel tower",
                self.channels
            )));
        }
        self.input_planes = inputs;
        self.input = conv.clone();
        self.stage = Stage::Tower;
        Ok(())
    }

    fn push_residual(
        &mut self,
        tile_size: usize,
        channels: usize,
        se_fc_outputs: usize,
        block: &ResidualBlock,
    ) -> Result<(), PipeError> {
        if self.stage != Stage::Tower {
            return Err(self.out_of_order("residual block"));
        }
        if tile_size != WINOGRAD_ALPHA || channels != self.channels {
            return Err(CpuPipe::unsupported(format!(
                "residual block of {channels} channels, tile {tile_size}"
            )));
        }
        debug_assert_eq!(se_fc_outputs, block.se.fc_outputs());
        self.residual.push(block.clone());
        Ok(())
    }

    fn push_convolve(
        &mut self,
        kernel_size: usize,
        inputs: usize,
        outputs: usize,
        weights: &[f32],
    ) -> Result<(), PipeError> {
        if kernel_size != 1 || inputs != self.channels {
            return Err(CpuPipe::unsupported(format!(
                "{kernel_size}x{kernel_size} convolution from {inputs} channels"
            )));
        }
        match (self.stage, outputs) {
            (Stage::Tower, OUTPUTS_POLICY) => {
                self.policy_conv = weights.to_vec();
                self.stage = Stage::ValueHead;
            }
            (Stage::ValueHead, OUTPUTS_VALUE) => {
                self.value_conv = weights.to_vec();
                self.stage = Stage::Ready;
            }
            _ => return Err(self.out_of_order("head convolution")),
        }
        Ok(())
    }

    fn forward(&self, input: &[f32], policy: &mut [f32], value: &mut [f32]) {
        assert_eq!(self.stage, Stage::Ready, "cpu pipe used before loading finished");
        let channels = self.channels;

        let mut buffers = Scratch::new(self.input_planes.max(channels), channels);
        let mut x = buffers.convolve(input, self.input_planes, channels, &self.input.weights);
        layers::batchnorm_prelu(&mut x, NUM_INTERSECTIONS, &self.input.means, &self.input.stddivs, &self.input.prelu_alphas);

        for block in &self.residual {
            let skip = x;
            let mut y = buffers.convolve(&skip, channels, channels, &block.conv1.weights);
            layers::batchnorm_prelu(&mut y, NUM_INTERSECTIONS, &block.conv1.means, &block.conv1.stddivs, &block.conv1.prelu_alphas);

            let mut z = buffers.convolve(&y, channels, channels, &block.conv2.weights);
            layers::batchnorm(&mut z, NUM_INTERSECTIONS, &block.conv2.means, &block.conv2.stddivs);
            if block.se.fc_outputs() > 0 {
                squeeze_excitation(&mut z, block);
            }
            layers::residual_prelu(&mut z, NUM_INTERSECTIONS, &skip, &block.conv2.prelu_alphas);
            x = z;
        }

        policy.copy_from_slice(&layers::convolve_1x1(&x, NUM_INTERSECTIONS, &self.policy_conv, OUTPUTS_POLICY));
        value.copy_from_slice(&layers::convolve_1x1(&x, NUM_INTERSECTIONS, &self.value_conv, OUTPUTS_VALUE));
    }
}

/// Scale each channel by a gate computed from its global average.
fn squeeze_excitation(data: &mut [f32], block: &ResidualBlock) {
    let se = &block.se;
    let pooled = layers::global_average_pool(data, NUM_INTERSECTIONS);
    let hidden = layers::innerproduct(&pooled, &se.fc1_weights, &se.fc1_biases, true);
    let gates = layers::innerproduct(&hidden, &se.fc2_weights, &se.fc2_biases, false);
    for (plane, gate) in data.chunks_exact_mut(NUM_INTERSECTIONS).zip(gates) {
        let scale = layers::sigmoid(gate);
        for x in plane {
            *x *= scale;
        }
    }
}

/// Per-call working memory for Winograd convolutions.
struct Scratch {
    v: Vec<f32>,
    m: Vec<f32>,
}

impl Scratch {
    fn new(max_inputs: usize, max_outputs: usize) -> Scratch {
        Scratch {
            v: vec![0.0; WINOGRAD_TILE * max_inputs * TILES],
            m: vec![0.0; WINOGRAD_TILE * max_outputs * TILES],
        }
    }

    /// 3x3 same-padded convolution of `inputs` planes with transformed weights
    /// laid out `[tile][c][o]`.
    fn convolve(&mut self, input: &[f32], inputs: usize, outputs: usize, weights: &[f32]) -> Vec<f32> {
        let v = &mut self.v[..WINOGRAD_TILE * inputs * TILES];
        let m = &mut self.m[..WINOGRAD_TILE * outputs * TILES];
        transform_in(input, v, inputs);
        sgemm(weights, v, m, inputs, outputs);
        let mut output = vec![0.0; outputs * NUM_INTERSECTIONS];
        transform_out(m, &mut output, outputs);
        output
    }
}

/// `V[b][c][p] = (B^T d B)[b]` for the 6x6 patch of tile `p` in channel `c`.
fn transform_in(input: &[f32], v: &mut [f32], channels: usize) {
    for c in 0..channels {
        let plane = &input[c * NUM_INTERSECTIONS..][..NUM_INTERSECTIONS];
        for ty in 0..WTILES {
            for tx in 0..WTILES {
                let mut d = [0.0f32; WINOGRAD_TILE];
                for i in 0..WINOGRAD_ALPHA {
                    for j in 0..WINOGRAD_ALPHA {
                        let y = (ty * WINOGRAD_M + i).wrapping_sub(1);
                        let x = (tx * WINOGRAD_M + j).wrapping_sub(1);
                        if y < BOARD_SIZE && x < BOARD_SIZE {
                            d[i * WINOGRAD_ALPHA + j] = plane[y * BOARD_SIZE + x];
                        }
                    }
                }

                // B^T d B = (B^T (B^T d)^T)^T
                let t = transpose(&bt_rows(&d));
                let out = transpose(&bt_rows(&t));

                let p = ty * WTILES + tx;
                for (b, value) in out.iter().enumerate() {
                    v[b * channels * TILES + c * TILES + p] = *value;
                }
            }
        }
    }
}

/// `B^T * d` for a 6x6 matrix `d`, exploiting the sparsity of `B^T`.
fn bt_rows(d: &[f32; WINOGRAD_TILE]) -> [f32; WINOGRAD_TILE] {
    let mut out = [0.0f32; WINOGRAD_TILE];
    for j in 0..WINOGRAD_ALPHA {
        let col = |r: usize| d[r * WINOGRAD_ALPHA + j];
        let (d0, d1, d2, d3, d4, d5) = (col(0), col(1), col(2), col(3), col(4), col(5));
        out[j] = d0 - 2.5 * d2 + d4;
        out[WINOGRAD_ALPHA + j] = -SQ2 * d1 - 2.0 * d2 + SQ2 / 2.0 * d3 + d4;
        out[2 * WINOGRAD_ALPHA + j] = SQ2 * d1 - 2.0 * d2 - SQ2 / 2.0 * d3 + d4;
        out[3 * WINOGRAD_ALPHA + j] = -SQ2 / 2.0 * d1 - 0.5 * d2 + SQ2 * d3 + d4;
        out[4 * WINOGRAD_ALPHA + j] = SQ2 / 2.0 * d1 - 0.5 * d2 - SQ2 * d3 + d4;
        out[5 * WINOGRAD_ALPHA + j] = d1 - 2.5 * d3 + d5;
    }
    out
}

fn transpose<const N: usize>(a: &[f32; N]) -> [f32; N] {
    let side = N.isqrt();
    let mut out = [0.0f32; N];
    for i in 0..side {
        for j in 0..side {
            out[j * side + i] = a[i * side + j];
        }
    }
    out
}

/// `M[b][o][p] = sum_c U[b][c][o] * V[b][c][p]` for each of the 36 coefficients.
fn sgemm(u: &[f32], v: &[f32], m: &mut [f32], channels: usize, outputs: usize) {
    m.fill(0.0);
    for b in 0..WINOGRAD_TILE {
        let ub = &u[b * channels * outputs..][..channels * outputs];
        let vb = &v[b * channels * TILES..][..channels * TILES];
        let mb = &mut m[b * outputs * TILES..][..outputs * TILES];
        for c in 0..channels {
            let vrow = &vb[c * TILES..][..TILES];
            for o in 0..outputs {
                let w = ub[c * outputs + o];
                if w == 0.0 {
                    continue;
                }
                for (acc, x) in mb[o * TILES..][..TILES].iter_mut().zip(vrow) {
                    *acc += w * x;
                }
            }
        }
    }
}

/// `Y = A^T m A` per tile, cropped to the board.
fn transform_out(m: &[f32], output: &mut [f32], outputs: usize) {
    for o in 0..outputs {
        for ty in 0..WTILES {
            for tx in 0..WTILES {
                let p = ty * WTILES + tx;
                let mut tile = [0.0f32; WINOGRAD_TILE];
                for (b, t) in tile.iter_mut().enumerate() {
                    *t = m[b * outputs * TILES + o * TILES + p];
                }
                let y = at_apply(&tile);
                for i in 0..WINOGRAD_M {
                    for j in 0..WINOGRAD_M {
                        let (row, col) = (ty * WINOGRAD_M + i, tx * WINOGRAD_M + j);
                        if row < BOARD_SIZE && col < BOARD_SIZE {
                            output[o * NUM_INTERSECTIONS + row * BOARD_SIZE + col] = y[i * WINOGRAD_M + j];
                        }
                    }
                }
            }
        }
    }
}

#[rustfmt::skip]
const AT: [f32; WINOGRAD_M * WINOGRAD_ALPHA] = [
    1.0, 1.0,       1.0,        1.0,       1.0,        0.0,
    0.0, SQ2 / 2.0, -SQ2 / 2.0, SQ2,       -SQ2,       0.0,
    0.0, 0.5,       0.5,        2.0,       2.0,        0.0,
    0.0, SQ2 / 4.0, -SQ2 / 4.0, 2.0 * SQ2, -2.0 * SQ2, 1.0,
];

/// `A^T m A` for a 6x6 tile, giving a 4x4 output block.
fn at_apply(m: &[f32; WINOGRAD_TILE]) -> [f32; WINOGRAD_M * WINOGRAD_M] {
    let mut tmp = [0.0f32; WINOGRAD_M * WINOGRAD_ALPHA];
    for i in 0..WINOGRAD_M {
        for j in 0..WINOGRAD_ALPHA {
            tmp[i * WINOGRAD_ALPHA + j] = (0..WINOGRAD_ALPHA)
                .map(|k| AT[i * WINOGRAD_ALPHA + k] * m[k * WINOGRAD_ALPHA + j])
                .sum();
        }
    }
    let mut out = [0.0f32; WINOGRAD_M * WINOGRAD_M];
    for i in 0..WINOGRAD_M {
        for j in 0..WINOGRAD_M {
            out[i * WINOGRAD_M + j] = (0..WINOGRAD_ALPHA)
                .map(|k| tmp[i * WINOGRAD_ALPHA + k] * AT[j * WINOGRAD_ALPHA + k])
                .sum();
        }
    }
    out
}
