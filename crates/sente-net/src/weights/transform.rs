//! Load-time reshaping of parsed tensors into the form backends consume.
//!
//! Everything here runs exactly once, between parsing and pushing the
//! weights into a [`ForwardPipe`](crate::pipe::ForwardPipe).

use super::{ConvBlock, WeightSet};

/// Winograd output tile size (F(4x4, 3x3)).
pub const WINOGRAD_M: usize = 4;
/// Input tile size of the transformed domain.
pub const WINOGRAD_ALPHA: usize = WINOGRAD_M + 3 - 1;
/// Transformed coefficients per 3x3 filter.
pub const WINOGRAD_TILE: usize = WINOGRAD_ALPHA * WINOGRAD_ALPHA;

/// Added to batch-norm variances before taking the square root.
pub const BN_EPSILON: f32 = 1e-5;

const SQ2: f32 = std::f32::consts::SQRT_2;

/// Filter transform matrix `G` (6x3).
#[rustfmt::skip]
const G: [f32; WINOGRAD_ALPHA * 3] = [
    1.0,         0.0,         0.0,
    -2.0 / 3.0,  -SQ2 / 3.0,  -1.0 / 3.0,
    -2.0 / 3.0,  SQ2 / 3.0,   -1.0 / 3.0,
    1.0 / 6.0,   SQ2 / 6.0,   1.0 / 3.0,
    1.0 / 6.0,   -SQ2 / 6.0,  1.0 / 3.0,
    0.0,         0.0,         1.0,
];

/// Transform `outputs x channels` 3x3 filters (row-major `[o][c][3][3]`) into
/// the Winograd domain.
///
/// The result is laid out `[xi][nu][c][o]` so that each of the 36 transformed
/// coefficients is a contiguous `channels x outputs` matrix.
pub fn winograd_transform(filters: &[f32], outputs: usize, channels: usize) -> Vec<f32> {
    assert_eq!(filters.len(), outputs * channels * 9, "filter tensor size");
    let mut transformed = vec![0.0f32; WINOGRAD_TILE * outputs * channels];

    for o in 0..outputs {
        for c in 0..channels {
            let filter = &filters[(o * channels + c) * 9..][..9];

            // temp = G * f, 6x3
            let mut temp = [0.0f32; WINOGRAD_ALPHA * 3];
            for i in 0..WINOGRAD_ALPHA {
                for j in 0..3 {
                    let mut acc = 0.0;
                    for k in 0..3 {
                        acc += G[i * 3 + k] * filter[k * 3 + j];
                    }
                    temp[i * 3 + j] = acc;
                }
            }

            // U = temp * G^T, 6x6
            for xi in 0..WINOGRAD_ALPHA {
                for nu in 0..WINOGRAD_ALPHA {
                    let mut acc = 0.0;
                    for k in 0..3 {
                        acc += temp[xi * 3 + k] * G[nu * 3 + k];
                    }
                    let index = xi * (WINOGRAD_ALPHA * outputs * channels)
                        + nu * (outputs * channels)
                        + c * outputs
                        + o;
                    transformed[index] = acc;
                }
            }
        }
    }
    transformed
}

/// Turn raw variances into `1 / sqrt(variance + eps)` in place.
pub fn variances_to_stddivs(values: &mut [f32]) {
    for v in values {
        *v = 1.0 / (*v + BN_EPSILON).sqrt();
    }
}

/// Fold gamma and beta into the block's scale and mean so that inference
/// computes `(x - mean) * stddiv` only. Leaves gamma at 1 and beta at 0.
pub fn fold_batchnorm(block: &mut ConvBlock) {
    for i in 0..block.stddivs.len() {
        block.stddivs[i] *= block.gammas[i];
        block.means[i] -= block.betas[i] / block.stddivs[i];
        block.gammas[i] = 1.0;
        block.betas[i] = 0.0;
    }
}

/// Fold a head convolution's bias into its batch-norm mean, zeroing the bias.
pub fn fold_head_bias(biases: &mut [f32], bn_means: &mut [f32], bn_stddivs: &[f32]) {
    for ((bias, mean), stddiv) in biases.iter_mut().zip(bn_means).zip(bn_stddivs) {
        *mean -= *bias / stddiv;
        *bias = 0.0;
    }
}

fn prepare_conv(block: &mut ConvBlock, inputs: usize, outputs: usize) {
    variances_to_stddivs(&mut block.stddivs);
    fold_batchnorm(block);
    block.weights = winograd_transform(&block.weights, outputs, inputs);
}

/// Apply every load-time transform to a freshly parsed weight set.
pub fn prepare(weights: &mut WeightSet) {
    let channels = weights.channels;
    let input_planes = weights.input.weights.len() / (channels * 9);
    prepare_conv(&mut weights.input, input_planes, channels);

    for block in &mut weights.residual {
        prepare_conv(&mut block.conv1, channels, channels);
        prepare_conv(&mut block.conv2, channels, channels);
    }

    let policy = &mut weights.policy;
    variances_to_stddivs(&mut policy.bn_stddivs);
    fold_head_bias(&mut policy.conv_biases, &mut policy.bn_means, &policy.bn_stddivs);

    let value = &mut weights.value;
    variances_to_stddivs(&mut value.bn_stddivs);
    fold_head_bias(&mut value.conv_biases, &mut value.bn_means, &value.bn_stddivs);
}
