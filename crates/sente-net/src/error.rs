//! Error types for weight loading, backend construction and evaluation.

use std::path::PathBuf;

use crate::weights::{FORMAT_VERSION, LEGACY_VERSION};

/// Errors that abort loading a weight file. No partially loaded network is
/// ever used after one of these.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    /// The weight file could not be opened.
    #[error("could not open weights file {path}: {source}")]
    Open {
        /// Path that was requested.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// Reading the byte stream failed.
    #[error("could not read weights: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// The stream looked compressed but could not be inflated.
    #[error("failed to decompress weights: {source}")]
    Decompress {
        /// The underlying decoder error.
        source: std::io::Error,
    },

    /// The (decompressed) contents are not text.
    #[error("weights file is not valid UTF-8 text")]
    NotText,

    /// The file has no version line.
    #[error("weights file is empty")]
    Empty,

    /// The version line is neither the current nor the legacy format.
    #[error(
        "weights file is the wrong version: found \"{found}\", expected {current} or {legacy}",
        current = FORMAT_VERSION,
        legacy = LEGACY_VERSION
    )]
    UnsupportedVersion {
        /// The first line of the file.
        found: String,
    },

    /// The line count does not decompose into whole residual blocks.
    #[error("inconsistent number of weight lines ({lines}) in the file")]
    InconsistentLineCount {
        /// Total line count, version line included.
        lines: usize,
    },

    /// The channel-defining line is empty.
    #[error("weights file declares zero channels (line 3 is empty)")]
    ZeroChannels,

    /// A token on a tensor line is not a float.
    #[error("failed to parse weights file, error on line {line}: \"{token}\" is not a number")]
    MalformedFloat {
        /// 1-indexed line number.
        line: usize,
        /// The offending token.
        token: String,
    },

    /// A tensor line has the wrong number of values.
    #[error("line {line}: {tensor} has {found} values, expected {expected}")]
    TensorSize {
        /// 1-indexed line number.
        line: usize,
        /// Logical tensor name.
        tensor: &'static str,
        /// Length implied by the network shape.
        expected: usize,
        /// Length found in the file.
        found: usize,
    },

    /// A squeeze-excitation weight line is not a whole number of channel rows.
    #[error("line {line}: {tensor} has {found} values, not a multiple of {channels} channels")]
    RaggedTensor {
        /// 1-indexed line number.
        line: usize,
        /// Logical tensor name.
        tensor: &'static str,
        /// Length found in the file.
        found: usize,
        /// Channel count of the tower.
        channels: usize,
    },
}

/// Errors raised by a [`ForwardPipe`](crate::pipe::ForwardPipe) while it is
/// being built.
#[derive(Debug, thiserror::Error)]
pub enum PipeError {
    /// The device or driver behind the backend cannot be used.
    #[error("{backend} backend unavailable: {reason}")]
    Unavailable {
        /// Backend name.
        backend: String,
        /// Human-readable reason.
        reason: String,
    },

    /// The backend cannot represent a requested layer.
    #[error("{backend} backend does not support {what}")]
    Unsupported {
        /// Backend name.
        backend: String,
        /// Description of the unsupported layer or option.
        what: String,
    },

    /// Tensor groups were pushed in the wrong order or before initialization.
    #[error("{backend} backend received {layer} out of order")]
    OutOfOrder {
        /// Backend name.
        backend: String,
        /// The layer that arrived unexpectedly.
        layer: &'static str,
    },
}

/// Top-level errors surfaced by [`Network`](crate::Network).
#[derive(Debug, thiserror::Error)]
pub enum NetworkError {
    /// The weight file could not be loaded.
    #[error(transparent)]
    Load(#[from] LoadError),

    /// No backend could be built.
    #[error(transparent)]
    Backend(#[from] PipeError),

    /// The self-check found the primary backend disagreeing with the
    /// reference backend too often. Results from this network cannot be trusted.
    #[error(
        "backend divergence: {failures} of the last {window} self-checks failed; \
         update GPU drivers or reduce the number of concurrent games"
    )]
    BackendDivergence {
        /// Failed checks in the window.
        failures: usize,
        /// Window length.
        window: usize,
    },
}
