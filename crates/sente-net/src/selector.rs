//! Backend selection: which [`ForwardPipe`] runs the network, at which
//! precision, and whether a CPU reference pipe shadows it.

use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use rand::Rng;
use sente_core::NUM_INTERSECTIONS;
use tracing::{debug, info, warn};

use crate::config::{NetworkConfig, Precision};
use crate::error::PipeError;
use crate::features::INPUT_CHANNELS;
use crate::pipe::{self, CpuPipe, ForwardPipe, POLICY_OUTPUT_LEN, VALUE_OUTPUT_LEN};
use crate::weights::WeightSet;

/// Reduced precision must beat full precision by this factor to be kept.
pub const REDUCED_PRECISION_MARGIN: f64 = 1.05;

/// Provider of accelerated pipes (GPU kernels live outside this crate).
pub trait Accelerator: Send + Sync {
    /// Device or driver name for logs.
    fn name(&self) -> &str;

    /// Whether pipes of `precision` (`Full` or `Reduced`) can be created.
    fn supports(&self, precision: Precision) -> bool;

    /// Create an empty pipe of `precision`, ready for [`pipe::load`].
    fn create(&self, precision: Precision) -> Result<Box<dyn ForwardPipe>, PipeError>;
}

/// Which kind of backend ended up as primary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    Cpu,
    Accelerated(Precision),
}

/// The loaded pipes a [`Network`](crate::Network) evaluates with.
#[derive(Debug)]
pub struct Backends {
    /// Pipe used for every evaluation.
    pub primary: Box<dyn ForwardPipe>,
    /// CPU pipe used to cross-check the primary, if self-check is enabled.
    pub reference: Option<Box<dyn ForwardPipe>>,
    pub kind: BackendKind,
}

/// Build and load the backends for `weights`.
///
/// Accelerator failures fall back to the CPU pipe with a warning; only a
/// failure of the CPU pipe itself is returned.
pub fn select(
    config: &NetworkConfig,
    weights: &WeightSet,
    accelerator: Option<&dyn Accelerator>,
) -> Result<Backends, PipeError> {
    let accelerator = match accelerator {
        Some(acc) if !config.cpu_only => acc,
        _ => {
            info!("using cpu backend");
            return Ok(Backends {
                primary: load_cpu(weights)?,
                reference: None,
                kind: BackendKind::Cpu,
            });
        }
    };

    match build_accelerated(config, weights, accelerator) {
        Ok((primary, precision)) => {
            info!(device = accelerator.name(), %precision, "using accelerated backend");
            let reference = if config.selfcheck {
                Some(load_cpu(weights)?)
            } else {
                None
            };
            Ok(Backends {
                primary,
                reference,
                kind: BackendKind::Accelerated(precision),
            })
        }
        Err(e) => {
            warn!(device = accelerator.name(), error = %e, "accelerator unusable, falling back to cpu");
            Ok(Backends {
                primary: load_cpu(weights)?,
                reference: None,
                kind: BackendKind::Cpu,
            })
        }
    }
}

fn load_cpu(weights: &WeightSet) -> Result<Box<dyn ForwardPipe>, PipeError> {
    let mut cpu: Box<dyn ForwardPipe> = Box::new(CpuPipe::new());
    pipe::load(cpu.as_mut(), weights)?;
    Ok(cpu)
}

fn build_pipe(
    accelerator: &dyn Accelerator,
    precision: Precision,
    weights: &WeightSet,
) -> Result<Box<dyn ForwardPipe>, PipeError> {
    let mut pipe = accelerator.create(precision)?;
    pipe::load(pipe.as_mut(), weights)?;
    Ok(pipe)
}

fn build_accelerated(
    config: &NetworkConfig,
    weights: &WeightSet,
    accelerator: &dyn Accelerator,
) -> Result<(Box<dyn ForwardPipe>, Precision), PipeError> {
    match config.precision {
        Precision::Full => Ok((build_pipe(accelerator, Precision::Full, weights)?, Precision::Full)),
        Precision::Reduced => {
            if !accelerator.supports(Precision::Reduced) {
                return Err(PipeError::Unsupported {
                    backend: accelerator.name().to_string(),
                    what: "half precision".to_string(),
                });
            }
            Ok((build_pipe(accelerator, Precision::Reduced, weights)?, Precision::Reduced))
        }
        Precision::Auto => {
            let full = build_pipe(accelerator, Precision::Full, weights)?;
            if !accelerator.supports(Precision::Reduced) {
                debug!("reduced precision not supported, using single precision");
                return Ok((full, Precision::Full));
            }
            let reduced = match build_pipe(accelerator, Precision::Reduced, weights) {
                Ok(pipe) => pipe,
                Err(e) => {
                    warn!(error = %e, "could not build half precision pipe");
                    return Ok((full, Precision::Full));
                }
            };

            info!(window = ?config.benchmark_window, "benchmarking single precision");
            let full_score = benchmark_pipe(full.as_ref(), config.threads, config.benchmark_window);
            info!(window = ?config.benchmark_window, "benchmarking half precision");
            let reduced_score = benchmark_pipe(reduced.as_ref(), config.threads, config.benchmark_window);
            info!(full_score, reduced_score, "precision benchmark finished");

            if prefers_reduced(full_score, reduced_score) {
                info!("using half precision");
                Ok((reduced, Precision::Reduced))
            } else {
                info!("using single precision");
                Ok((full, Precision::Full))
            }
        }
    }
}

/// Reduced precision wins only if it is at least 5 % faster.
pub fn prefers_reduced(full_score: f64, reduced_score: f64) -> bool {
    reduced_score >= full_score * REDUCED_PRECISION_MARGIN
}

/// Forward passes per second of `pipe` on random 0/1 inputs, measured with
/// `threads` workers over `window`.
pub fn benchmark_pipe(pipe: &dyn ForwardPipe, threads: usize, window: Duration) -> f64 {
    let evaluations = AtomicU64::new(0);
    let start = Instant::now();

    thread::scope(|s| {
        for _ in 0..threads.max(1) {
            s.spawn(|| {
                let mut rng = rand::rng();
                let mut input = vec![0.0f32; INPUT_CHANNELS * NUM_INTERSECTIONS];
                let mut policy = vec![0.0f32; POLICY_OUTPUT_LEN];
                let mut value = vec![0.0f32; VALUE_OUTPUT_LEN];
                while start.elapsed() < window {
                    for x in &mut input {
                        *x = if rng.random::<bool>() { 1.0 } else { 0.0 };
                    }
                    pipe.forward(&input, &mut policy, &mut value);
                    evaluations.fetch_add(1, Ordering::Relaxed);
                }
            });
        }
    });

    let elapsed = start.elapsed().as_secs_f64();
    evaluations.load(Ordering::Relaxed) as f64 / elapsed
}
