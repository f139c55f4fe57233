//! Evaluator configuration.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Numeric precision for accelerated backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Precision {
    /// Build both precisions, benchmark them and keep the faster one.
    #[default]
    Auto,
    /// 32-bit floats.
    Full,
    /// 16-bit floats.
    Reduced,
}

/// Error returned when parsing a [`Precision`] from text.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown precision \"{0}\" (expected auto, single or half)")]
pub struct ParsePrecisionError(String);

impl FromStr for Precision {
    type Err = ParsePrecisionError;

    fn from_str(s: &str) -> Result<Precision, ParsePrecisionError> {
        match s.to_ascii_lowercase().as_str() {
            "auto" => Ok(Precision::Auto),
            "single" | "full" | "fp32" => Ok(Precision::Full),
            "half" | "reduced" | "fp16" => Ok(Precision::Reduced),
            _ => Err(ParsePrecisionError(s.to_string())),
        }
    }
}

impl fmt::Display for Precision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Precision::Auto => write!(f, "auto"),
            Precision::Full => write!(f, "single"),
            Precision::Reduced => write!(f, "half"),
        }
    }
}

/// Knobs consumed by [`Network`](crate::Network) and the backend selector.
#[derive(Debug, Clone)]
pub struct NetworkConfig {
    /// Worker threads that evaluate concurrently; also sizes benchmarks.
    pub threads: usize,
    /// Never build an accelerated backend.
    pub cpu_only: bool,
    /// Precision for accelerated backends.
    pub precision: Precision,
    /// Softmax temperature applied to the policy logits.
    pub softmax_temperature: f32,
    /// Root noise is enabled (self-play); disables symmetric cache probing.
    pub noise: bool,
    /// Randomized opening moves (self-play); non-zero disables symmetric cache probing.
    pub random_moves: usize,
    /// Moves during which symmetric cache probing is allowed.
    /// `None` uses half of the game state's opening-move count.
    pub symmetry_probe_window: Option<usize>,
    /// Cross-check accelerated results against the CPU backend.
    pub selfcheck: bool,
    /// Self-check one in this many random-symmetry evaluations (0 disables).
    pub selfcheck_one_in: u32,
    /// Expected playouts per search; sizes the result cache.
    pub max_playouts: usize,
    /// Wall-clock time spent timing each precision in [`Precision::Auto`].
    pub benchmark_window: Duration,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            threads: 1,
            cpu_only: false,
            precision: Precision::Auto,
            softmax_temperature: 1.0,
            noise: false,
            random_moves: 0,
            symmetry_probe_window: None,
            selfcheck: true,
            selfcheck_one_in: 2000,
            max_playouts: 0,
            benchmark_window: Duration::from_secs(1),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn precision_parse_aliases() {
        assert_eq!("auto".parse::<Precision>(), Ok(Precision::Auto));
        assert_eq!("SINGLE".parse::<Precision>(), Ok(Precision::Full));
        assert_eq!("half".parse::<Precision>(), Ok(Precision::Reduced));
        assert!("double".parse::<Precision>().is_err());
    }

    #[test]
    fn precision_display_roundtrip() {
        for p in [Precision::Auto, Precision::Full, Precision::Reduced] {
            assert_eq!(p.to_string().parse::<Precision>(), Ok(p));
        }
    }

    #[test]
    fn defaults_match_documented_values() {
        let config = NetworkConfig::default();
        assert_eq!(config.threads, 1);
        assert_eq!(config.selfcheck_one_in, 2000);
        assert_eq!(config.softmax_temperature, 1.0);
        assert_eq!(config.symmetry_probe_window, None);
        assert_eq!(config.benchmark_window, Duration::from_secs(1));
    }
}
