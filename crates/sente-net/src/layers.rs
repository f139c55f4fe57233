//! Scalar reference kernels shared by the CPU pipe and output post-processing.

/// Apply fused batch norm and PReLU to `channels` planes of `spatial` values:
/// `x = (x - mean) * stddiv`, then `x = x` if positive else `alpha * x`.
pub fn batchnorm_prelu(data: &mut [f32], spatial: usize, means: &[f32], stddivs: &[f32], alphas: &[f32]) {
    for (c, plane) in data.chunks_exact_mut(spatial).enumerate() {
        let (mean, scale, alpha) = (means[c], stddivs[c], alphas[c]);
        for x in plane {
            let v = (*x - mean) * scale;
            *x = if v > 0.0 { v } else { alpha * v };
        }
    }
}

/// Fused batch norm without activation.
pub fn batchnorm(data: &mut [f32], spatial: usize, means: &[f32], stddivs: &[f32]) {
    for (c, plane) in data.chunks_exact_mut(spatial).enumerate() {
        let (mean, scale) = (means[c], stddivs[c]);
        for x in plane {
            *x = (*x - mean) * scale;
        }
    }
}

/// Add the skip connection, then apply PReLU.
pub fn residual_prelu(data: &mut [f32], spatial: usize, skip: &[f32], alphas: &[f32]) {
    for (c, plane) in data.chunks_exact_mut(spatial).enumerate() {
        let alpha = alphas[c];
        for (x, s) in plane.iter_mut().zip(&skip[c * spatial..]) {
            let v = *x + s;
            *x = if v > 0.0 { v } else { alpha * v };
        }
    }
}

/// Per-channel mean over `spatial` values.
pub fn global_average_pool(data: &[f32], spatial: usize) -> Vec<f32> {
    data.chunks_exact(spatial)
        .map(|plane| plane.iter().sum::<f32>() / spatial as f32)
        .collect()
}

/// Fully connected layer: `out[o] = bias[o] + sum_i weights[o * inputs + i] * input[i]`,
/// optionally followed by ReLU.
pub fn innerproduct(input: &[f32], weights: &[f32], biases: &[f32], relu: bool) -> Vec<f32> {
    let inputs = input.len();
    debug_assert_eq!(weights.len(), inputs * biases.len());
    biases
        .iter()
        .zip(weights.chunks_exact(inputs))
        .map(|(bias, row)| {
            let v = bias + row.iter().zip(input).map(|(w, x)| w * x).sum::<f32>();
            if relu && v < 0.0 { 0.0 } else { v }
        })
        .collect()
}

/// 1x1 convolution without bias: `out[o][s] = sum_c weights[o * C + c] * input[c][s]`.
pub fn convolve_1x1(input: &[f32], spatial: usize, weights: &[f32], outputs: usize) -> Vec<f32> {
    let channels = input.len() / spatial;
    debug_assert_eq!(weights.len(), outputs * channels);
    let mut out = vec![0.0f32; outputs * spatial];
    for (o, plane) in out.chunks_exact_mut(spatial).enumerate() {
        for (c, in_plane) in input.chunks_exact(spatial).enumerate() {
            let w = weights[o * channels + c];
            for (y, x) in plane.iter_mut().zip(in_plane) {
                *y += w * x;
            }
        }
    }
    out
}

/// Softmax with temperature, stabilized by subtracting the largest input.
pub fn softmax(input: &[f32], temperature: f32) -> Vec<f32> {
    let max = input.iter().copied().fold(f32::NEG_INFINITY, f32::max) / temperature;
    let mut out: Vec<f32> = input.iter().map(|&x| (x / temperature - max).exp()).collect();
    let sum: f32 = out.iter().sum();
    for v in &mut out {
        *v /= sum;
    }
    out
}

/// Logistic function.
#[inline]
pub fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}
