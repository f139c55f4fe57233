//! Network parameters: the weight-file format, its parsed form and the
//! load-time transforms that prepare it for backends.
//!
//! # File format
//!
//! Optionally gzip- or zlib-compressed text. Line 1 is the format version;
//! every following line holds one tensor as whitespace-separated floats:
//!
//! - 6 input lines: conv weights, bn gammas, bn betas, bn means, bn variances, PReLU alphas
//! - 16 lines per residual block: the same six for the first convolution, five
//!   (no PReLU) for the second, four squeeze-excitation lines
//!   (fc1 weights, fc1 biases, fc2 weights, fc2 biases), then the PReLU alphas
//!   applied after the residual addition
//! - 7 policy-head lines: conv weights, conv biases, bn means, bn variances,
//!   PReLU alphas, fc weights, fc biases
//! - 9 value-head lines: conv weights, conv biases, bn means, bn variances,
//!   PReLU alphas, fc1 weights, fc1 biases, fc2 weights, fc2 biases

mod parse;
pub mod transform;

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use flate2::read::{MultiGzDecoder, ZlibDecoder};
use tracing::{debug, info};

use crate::error::LoadError;

/// Current weight-file format version.
pub const FORMAT_VERSION: u32 = 502;

/// Legacy format version. Identical layout, but the value head reports the
/// winrate for Black instead of the side to move.
pub const LEGACY_VERSION: u32 = 2;

/// Output planes of the policy head convolution.
pub const OUTPUTS_POLICY: usize = 2;

/// Output planes of the value head convolution.
pub const OUTPUTS_VALUE: usize = 1;

/// Width of the value head's hidden fully connected layer.
pub const VALUE_HIDDEN: usize = 256;

/// A 3x3 convolution followed by batch normalization and PReLU.
///
/// After loading, `stddivs` holds `1 / sqrt(variance + eps)` scaled by gamma,
/// `means` has beta folded in, and `weights` are Winograd-transformed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConvBlock {
    pub weights: Vec<f32>,
    pub gammas: Vec<f32>,
    pub betas: Vec<f32>,
    pub means: Vec<f32>,
    pub stddivs: Vec<f32>,
    pub prelu_alphas: Vec<f32>,
}

/// Squeeze-excitation fully connected layers of one residual block.
/// All four tensors are empty when the block has no squeeze-excitation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SqueezeExcitation {
    pub fc1_weights: Vec<f32>,
    pub fc1_biases: Vec<f32>,
    pub fc2_weights: Vec<f32>,
    pub fc2_biases: Vec<f32>,
}

impl SqueezeExcitation {
    /// Width of the squeeze layer (0 when absent).
    #[inline]
    pub fn fc_outputs(&self) -> usize {
        self.fc1_biases.len()
    }
}

/// Two convolutions with a skip connection. `conv2.prelu_alphas` apply after
/// the residual addition.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResidualBlock {
    pub conv1: ConvBlock,
    pub conv2: ConvBlock,
    pub se: SqueezeExcitation,
}

/// Policy head: 1x1 convolution, batch norm, PReLU, fully connected layer.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PolicyHead {
    pub conv_weights: Vec<f32>,
    pub conv_biases: Vec<f32>,
    pub bn_means: Vec<f32>,
    pub bn_stddivs: Vec<f32>,
    pub prelu_alphas: Vec<f32>,
    pub fc_weights: Vec<f32>,
    pub fc_biases: Vec<f32>,
}

/// Value head: 1x1 convolution, batch norm, PReLU, two fully connected layers.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValueHead {
    pub conv_weights: Vec<f32>,
    pub conv_biases: Vec<f32>,
    pub bn_means: Vec<f32>,
    pub bn_stddivs: Vec<f32>,
    pub prelu_alphas: Vec<f32>,
    pub fc1_weights: Vec<f32>,
    pub fc1_biases: Vec<f32>,
    pub fc2_weights: Vec<f32>,
    pub fc2_biases: Vec<f32>,
}

/// Every parameter of the network, as loaded from one weight file.
#[derive(Debug, Clone, PartialEq)]
pub struct WeightSet {
    /// Filters per convolution in the residual tower.
    pub channels: usize,
    /// The value head reports Black's winrate (legacy format).
    pub value_head_not_stm: bool,
    pub input: ConvBlock,
    pub residual: Vec<ResidualBlock>,
    pub policy: PolicyHead,
    pub value: ValueHead,
}

impl WeightSet {
    /// Open and load a weight file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<WeightSet, LoadError> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|source| LoadError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        info!(path = %path.display(), "loading weights");
        WeightSet::from_reader(BufReader::new(file))
    }

    /// Load a weight file from any byte stream, decompressing if needed,
    /// then apply the load-time transforms.
    pub fn from_reader(mut reader: impl Read) -> Result<WeightSet, LoadError> {
        let mut raw = Vec::new();
        reader.read_to_end(&mut raw)?;
        let bytes = decompress(raw)?;
        let text = String::from_utf8(bytes).map_err(|_| LoadError::NotText)?;

        let mut weights = parse::parse(&text)?;
        transform::prepare(&mut weights);
        Ok(weights)
    }

    /// Number of residual blocks in the tower.
    #[inline]
    pub fn residual_blocks(&self) -> usize {
        self.residual.len()
    }
}

/// Compression detected from a stream's leading bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Compression {
    Plain,
    Gzip,
    Zlib,
}

fn sniff_magic(bytes: &[u8]) -> Compression {
    match bytes {
        [0x1F, 0x8B, ..] => Compression::Gzip,
        // zlib: CM = 8 (deflate) and the header checksum holds
        [cmf, flg, ..] if cmf & 0x0F == 8 && (u16::from(*cmf) * 256 + u16::from(*flg)) % 31 == 0 => {
            Compression::Zlib
        }
        _ => Compression::Plain,
    }
}

fn decompress(raw: Vec<u8>) -> Result<Vec<u8>, LoadError> {
    let kind = sniff_magic(&raw);
    debug!(?kind, bytes = raw.len(), "detected weights encoding");
    let mut out = Vec::new();
    let inflated = match kind {
        Compression::Plain => return Ok(raw),
        Compression::Gzip => MultiGzDecoder::new(raw.as_slice()).read_to_end(&mut out),
        Compression::Zlib => ZlibDecoder::new(raw.as_slice()).read_to_end(&mut out),
    };
    inflated.map_err(|source| LoadError::Decompress { source })?;
    Ok(out)
}
