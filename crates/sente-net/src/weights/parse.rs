//! Text parsing of weight files into an untransformed [`WeightSet`].

use sente_core::NUM_INTERSECTIONS;
use tracing::info;

use super::{
    ConvBlock, FORMAT_VERSION, LEGACY_VERSION, OUTPUTS_POLICY, OUTPUTS_VALUE, PolicyHead,
    ResidualBlock, SqueezeExcitation, VALUE_HIDDEN, ValueHead, WeightSet,
};
use crate::error::LoadError;
use crate::features::INPUT_CHANNELS;

/// Tensor lines of the input convolution.
pub(super) const INPUT_LINES: usize = 6;
/// Tensor lines per residual block.
pub(super) const BLOCK_LINES: usize = 16;
/// Tensor lines of the policy and value heads together.
pub(super) const HEAD_LINES: usize = 16;

/// Parse weight-file text. Batch-norm variances are returned as read;
/// [`transform::prepare`](super::transform::prepare) turns them into scales.
pub(super) fn parse(text: &str) -> Result<WeightSet, LoadError> {
    let lines: Vec<&str> = text.lines().collect();
    let version_line = lines.first().ok_or(LoadError::Empty)?.trim();
    let value_head_not_stm = match version_line.parse::<u32>() {
        Ok(FORMAT_VERSION) => false,
        Ok(LEGACY_VERSION) => true,
        _ => {
            return Err(LoadError::UnsupportedVersion {
                found: version_line.to_string(),
            });
        }
    };

    // Shape pass: everything is sized before a single float is parsed.
    let fixed = 1 + INPUT_LINES + HEAD_LINES;
    if lines.len() < fixed || (lines.len() - fixed) % BLOCK_LINES != 0 {
        return Err(LoadError::InconsistentLineCount { lines: lines.len() });
    }
    let blocks = (lines.len() - fixed) / BLOCK_LINES;
    let channels = lines[2].split_whitespace().count();
    if channels == 0 {
        return Err(LoadError::ZeroChannels);
    }
    info!(
        version = version_line,
        channels, blocks, "detected weights file"
    );

    let mut reader = TensorReader { lines: &lines, next: 1 };
    let input = reader.conv_block("input", channels * INPUT_CHANNELS * 9, channels, true)?;

    let mut residual = Vec::with_capacity(blocks);
    for _ in 0..blocks {
        let conv1 = reader.conv_block("residual conv1", channels * channels * 9, channels, true)?;
        let mut conv2 = reader.conv_block("residual conv2", channels * channels * 9, channels, false)?;
        let se = reader.squeeze_excitation(channels)?;
        conv2.prelu_alphas = reader.take("residual prelu", channels)?;
        residual.push(ResidualBlock { conv1, conv2, se });
    }

    let policy_fc_in = OUTPUTS_POLICY * NUM_INTERSECTIONS;
    let policy = PolicyHead {
        conv_weights: reader.take("policy conv weights", OUTPUTS_POLICY * channels)?,
        conv_biases: reader.take("policy conv biases", OUTPUTS_POLICY)?,
        bn_means: reader.take("policy bn means", OUTPUTS_POLICY)?,
        bn_stddivs: reader.take("policy bn variances", OUTPUTS_POLICY)?,
        prelu_alphas: reader.take("policy prelu", OUTPUTS_POLICY)?,
        fc_weights: reader.take("policy fc weights", policy_fc_in * (NUM_INTERSECTIONS + 1))?,
        fc_biases: reader.take("policy fc biases", NUM_INTERSECTIONS + 1)?,
    };
    let value = ValueHead {
        conv_weights: reader.take("value conv weights", OUTPUTS_VALUE * channels)?,
        conv_biases: reader.take("value conv biases", OUTPUTS_VALUE)?,
        bn_means: reader.take("value bn means", OUTPUTS_VALUE)?,
        bn_stddivs: reader.take("value bn variances", OUTPUTS_VALUE)?,
        prelu_alphas: reader.take("value prelu", OUTPUTS_VALUE)?,
        fc1_weights: reader.take("value fc1 weights", OUTPUTS_VALUE * NUM_INTERSECTIONS * VALUE_HIDDEN)?,
        fc1_biases: reader.take("value fc1 biases", VALUE_HIDDEN)?,
        fc2_weights: reader.take("value fc2 weights", VALUE_HIDDEN)?,
        fc2_biases: reader.take("value fc2 biases", 1)?,
    };
    debug_assert_eq!(reader.next, lines.len());

    Ok(WeightSet {
        channels,
        value_head_not_stm,
        input,
        residual,
        policy,
        value,
    })
}

/// Walks the tensor lines in file order.
struct TensorReader<'a> {
    lines: &'a [&'a str],
    /// 0-based index of the next line to consume.
    next: usize,
}

impl TensorReader<'_> {
    /// Parse the next line as floats without checking its length.
    fn floats(&mut self) -> Result<(usize, Vec<f32>), LoadError> {
        let line_number = self.next + 1;
        let line = self.lines[self.next];
        self.next += 1;
        let values = line
            .split_whitespace()
            .map(|token| {
                token.parse::<f32>().map_err(|_| LoadError::MalformedFloat {
                    line: line_number,
                    token: token.to_string(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok((line_number, values))
    }

    /// Parse the next line and require exactly `expected` values.
    fn take(&mut self, tensor: &'static str, expected: usize) -> Result<Vec<f32>, LoadError> {
        let (line, values) = self.floats()?;
        if values.len() != expected {
            return Err(LoadError::TensorSize {
                line,
                tensor,
                expected,
                found: values.len(),
            });
        }
        Ok(values)
    }

    /// Conv weights, gammas, betas, means, variances and optionally PReLU alphas.
    fn conv_block(
        &mut self,
        name: &'static str,
        weights: usize,
        channels: usize,
        with_prelu: bool,
    ) -> Result<ConvBlock, LoadError> {
        let mut block = ConvBlock {
            weights: self.take(name, weights)?,
            gammas: self.take("bn gammas", channels)?,
            betas: self.take("bn betas", channels)?,
            means: self.take("bn means", channels)?,
            stddivs: self.take("bn variances", channels)?,
            prelu_alphas: Vec::new(),
        };
        if with_prelu {
            block.prelu_alphas = self.take("prelu", channels)?;
        }
        Ok(block)
    }

    fn squeeze_excitation(&mut self, channels: usize) -> Result<SqueezeExcitation, LoadError> {
        let (line, fc1_weights) = self.floats()?;
        if fc1_weights.is_empty() {
            // No squeeze-excitation: the remaining three lines must be empty too.
            for tensor in ["se fc1 biases", "se fc2 weights", "se fc2 biases"] {
                self.take(tensor, 0)?;
            }
            return Ok(SqueezeExcitation::default());
        }
        if fc1_weights.len() % channels != 0 {
            return Err(LoadError::RaggedTensor {
                line,
                tensor: "se fc1 weights",
                found: fc1_weights.len(),
                channels,
            });
        }
        let fc_outputs = fc1_weights.len() / channels;
        Ok(SqueezeExcitation {
            fc1_weights,
            fc1_biases: self.take("se fc1 biases", fc_outputs)?,
            fc2_weights: self.take("se fc2 weights", fc_outputs * channels)?,
            fc2_biases: self.take("se fc2 biases", channels)?,
        })
    }
}
