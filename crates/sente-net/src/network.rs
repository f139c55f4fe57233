//! The evaluator: weights, backends, cache and self-check behind one handle.

use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use rand::Rng;
use sente_core::{BOARD_SIZE, Color, GameState, NUM_INTERSECTIONS, NUM_SYMMETRIES, Symmetry, SymmetryTable};
use tracing::{error, info, warn};

use crate::cache::ResultCache;
use crate::config::NetworkConfig;
use crate::error::NetworkError;
use crate::features::gather_features;
use crate::layers;
use crate::pipe::{ForwardPipe, POLICY_OUTPUT_LEN, VALUE_OUTPUT_LEN};
use crate::result::NetResult;
use crate::selector::{self, Accelerator, BackendKind, Backends};
use crate::selfcheck::{self, SELFCHECK_WINDOW, SelfCheck, Verdict};
use crate::weights::{OUTPUTS_POLICY, OUTPUTS_VALUE, PolicyHead, ValueHead, WeightSet};

// ── Compile-time assertion: Network is shared by search threads ─────────────
const _: () = {
    fn assert_send_sync<T: Send + Sync>() {}
    fn check() {
        assert_send_sync::<Network>();
    }
    let _ = check;
};

/// How many symmetries to evaluate and how to combine them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ensemble {
    /// Evaluate exactly this symmetry.
    Direct(Symmetry),
    /// Evaluate all eight symmetries and average them.
    Average,
    /// Evaluate one uniformly chosen symmetry. Eligible for self-check.
    RandomSymmetry,
}

/// Throughput measured by [`Network::benchmark`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BenchmarkReport {
    pub evaluations: usize,
    pub elapsed: Duration,
}

impl BenchmarkReport {
    /// Evaluations per second.
    pub fn per_second(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.evaluations as f64 / secs
        } else {
            0.0
        }
    }
}

/// A loaded network ready to evaluate positions from many threads.
pub struct Network {
    config: NetworkConfig,
    channels: usize,
    residual_blocks: usize,
    value_head_not_stm: bool,
    policy: PolicyHead,
    value: ValueHead,
    backends: Backends,
    cache: ResultCache,
    selfcheck: SelfCheck,
    diverged: AtomicBool,
}

impl Network {
    /// Load `path` and build backends for it.
    pub fn initialize(
        config: NetworkConfig,
        path: impl AsRef<Path>,
        accelerator: Option<&dyn Accelerator>,
    ) -> Result<Network, NetworkError> {
        let weights = WeightSet::from_file(path)?;
        Network::from_weights(config, weights, accelerator)
    }

    /// Build backends for already loaded weights.
    pub fn from_weights(
        config: NetworkConfig,
        weights: WeightSet,
        accelerator: Option<&dyn Accelerator>,
    ) -> Result<Network, NetworkError> {
        let backends = selector::select(&config, &weights, accelerator)?;
        Ok(Network::with_backends(config, weights, backends))
    }

    /// Assemble a network around backends that already hold `weights`.
    pub fn with_backends(config: NetworkConfig, weights: WeightSet, backends: Backends) -> Network {
        let cache = ResultCache::for_playouts(config.max_playouts);
        info!(
            channels = weights.channels,
            blocks = weights.residual_blocks(),
            backend = backends.primary.name(),
            selfcheck = backends.reference.is_some(),
            cache_entries = cache.capacity(),
            "network ready"
        );
        Network {
            channels: weights.channels,
            residual_blocks: weights.residual_blocks(),
            value_head_not_stm: weights.value_head_not_stm,
            policy: weights.policy,
            value: weights.value,
            config,
            backends,
            cache,
            selfcheck: SelfCheck::new(),
            diverged: AtomicBool::new(false),
        }
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    pub fn residual_blocks(&self) -> usize {
        self.residual_blocks
    }

    /// The weights report Black's winrate rather than the side to move's.
    pub fn value_head_not_stm(&self) -> bool {
        self.value_head_not_stm
    }

    pub fn backend_kind(&self) -> BackendKind {
        self.backends.kind
    }

    pub fn cache(&self) -> &ResultCache {
        &self.cache
    }

    pub fn config(&self) -> &NetworkConfig {
        &self.config
    }

    /// Evaluate `state`, consulting the cache unless `skip_cache` is set.
    ///
    /// Fails only once the self-check has declared the primary backend
    /// divergent; every later call fails the same way.
    ///
    /// # Panics
    ///
    /// Panics if the state's board is not `BOARD_SIZE` wide.
    pub fn get_output(
        &self,
        state: &impl GameState,
        ensemble: Ensemble,
        skip_cache: bool,
    ) -> Result<NetResult, NetworkError> {
        assert_eq!(state.board_size(), BOARD_SIZE, "board size mismatch");
        self.ensure_healthy()?;

        if !skip_cache {
            if let Some(hit) = self.cache.probe(state, self.symmetric_probe_allowed(state)) {
                self.cache.insert(state.hash(), &hit);
                return Ok(hit);
            }
        }

        let mut result = match ensemble {
            Ensemble::Direct(symmetry) => self.evaluate_symmetry(state, symmetry),
            Ensemble::Average => self.evaluate_average(state),
            Ensemble::RandomSymmetry => {
                let mut rng = rand::rng();
                let symmetry = Symmetry::ALL[rng.random_range(0..NUM_SYMMETRIES)];
                let result = self.evaluate_symmetry(state, symmetry);
                if self.backends.reference.is_some()
                    && self.config.selfcheck_one_in > 0
                    && rng.random_range(0..self.config.selfcheck_one_in) == 0
                {
                    self.check_against_reference(state, symmetry, &result)?;
                }
                result
            }
        };

        if self.value_head_not_stm && state.to_move() == Color::White {
            result.winrate = 1.0 - result.winrate;
        }

        self.cache.insert(state.hash(), &result);
        Ok(result)
    }

    /// Run `state` through the primary pipe in one orientation, returning a
    /// result in canonical orientation.
    pub fn evaluate_symmetry(&self, state: &impl GameState, symmetry: Symmetry) -> NetResult {
        self.evaluate_on(self.backends.primary.as_ref(), state, symmetry)
    }

    fn evaluate_average(&self, state: &impl GameState) -> NetResult {
        let weight = 1.0 / NUM_SYMMETRIES as f32;
        let mut sum = NetResult::default();
        for symmetry in Symmetry::ALL {
            let r = self.evaluate_symmetry(state, symmetry);
            sum.winrate += r.winrate * weight;
            sum.policy_pass += r.policy_pass * weight;
            for (acc, p) in sum.policy.iter_mut().zip(r.policy) {
                *acc += p * weight;
            }
        }
        sum
    }

    fn evaluate_on(&self, pipe: &dyn ForwardPipe, state: &impl GameState, symmetry: Symmetry) -> NetResult {
        let input = gather_features(state, symmetry);
        let mut policy_data = vec![0.0f32; POLICY_OUTPUT_LEN];
        let mut value_data = vec![0.0f32; VALUE_OUTPUT_LEN];
        pipe.forward(input.as_slice(), &mut policy_data, &mut value_data);
        self.post_process(&mut policy_data, &mut value_data, symmetry)
    }

    /// Heads after the pipe: batch norm, PReLU, fully connected layers,
    /// softmax and the tanh value squash.
    fn post_process(&self, policy_data: &mut [f32], value_data: &mut [f32], symmetry: Symmetry) -> NetResult {
        let policy = &self.policy;
        layers::batchnorm_prelu(policy_data, NUM_INTERSECTIONS, &policy.bn_means, &policy.bn_stddivs, &policy.prelu_alphas);
        debug_assert_eq!(policy_data.len(), OUTPUTS_POLICY * NUM_INTERSECTIONS);
        let logits = layers::innerproduct(policy_data, &policy.fc_weights, &policy.fc_biases, false);
        let probabilities = layers::softmax(&logits, self.config.softmax_temperature);

        let value = &self.value;
        layers::batchnorm_prelu(value_data, NUM_INTERSECTIONS, &value.bn_means, &value.bn_stddivs, &value.prelu_alphas);
        debug_assert_eq!(value_data.len(), OUTPUTS_VALUE * NUM_INTERSECTIONS);
        let hidden = layers::innerproduct(value_data, &value.fc1_weights, &value.fc1_biases, true);
        let out = layers::innerproduct(&hidden, &value.fc2_weights, &value.fc2_biases, false);

        let table = SymmetryTable::get();
        let mut result = NetResult::default();
        for (index, p) in probabilities[..NUM_INTERSECTIONS].iter().enumerate() {
            result.policy[table.map_index(symmetry, index)] = *p;
        }
        result.policy_pass = probabilities[NUM_INTERSECTIONS];
        result.winrate = (1.0 + out[0].tanh()) / 2.0;
        result
    }

    /// Whether the cache may answer with a result stored for a symmetric position.
    fn symmetric_probe_allowed(&self, state: &impl GameState) -> bool {
        let window = self
            .config
            .symmetry_probe_window
            .unwrap_or(state.opening_moves() / 2);
        !self.config.noise && self.config.random_moves == 0 && state.move_number() < window
    }

    fn ensure_healthy(&self) -> Result<(), NetworkError> {
        if self.diverged.load(Ordering::Acquire) {
            return Err(NetworkError::BackendDivergence {
                failures: self.selfcheck.failures(),
                window: SELFCHECK_WINDOW,
            });
        }
        Ok(())
    }

    fn check_against_reference(
        &self,
        state: &impl GameState,
        symmetry: Symmetry,
        primary: &NetResult,
    ) -> Result<(), NetworkError> {
        let Some(reference_pipe) = self.backends.reference.as_deref() else {
            return Ok(());
        };
        let reference = self.evaluate_on(reference_pipe, state, symmetry);
        let failed = !selfcheck::results_agree(primary, &reference);
        match self.selfcheck.record(failed) {
            Verdict::Passed => Ok(()),
            Verdict::Failed { failures } => {
                warn!(
                    failures,
                    window = SELFCHECK_WINDOW,
                    primary_winrate = primary.winrate,
                    reference_winrate = reference.winrate,
                    "self-check failed: backend disagrees with cpu reference"
                );
                Ok(())
            }
            Verdict::Diverged { failures } => {
                self.diverged.store(true, Ordering::Release);
                error!(failures, window = SELFCHECK_WINDOW, "backend diverged from cpu reference");
                Err(NetworkError::BackendDivergence {
                    failures,
                    window: SELFCHECK_WINDOW,
                })
            }
        }
    }

    /// Evaluate `state` `iterations` times (random symmetry, no cache) across
    /// the configured number of threads.
    pub fn benchmark(&self, state: &(impl GameState + Sync), iterations: usize) -> Result<BenchmarkReport, NetworkError> {
        let issued = AtomicUsize::new(0);
        let start = Instant::now();
        self.run_workers(|| {
            while issued.fetch_add(1, Ordering::Relaxed) < iterations {
                self.get_output(state, Ensemble::RandomSymmetry, true)?;
            }
            Ok(())
        })?;
        let report = BenchmarkReport {
            evaluations: iterations,
            elapsed: start.elapsed(),
        };
        info!(
            evaluations = report.evaluations,
            seconds = report.elapsed.as_secs_f64(),
            per_second = report.per_second(),
            "benchmark finished"
        );
        Ok(report)
    }

    /// Evaluate `state` repeatedly for `window` across the configured number
    /// of threads and report how many evaluations completed.
    pub fn benchmark_for(&self, state: &(impl GameState + Sync), window: Duration) -> Result<BenchmarkReport, NetworkError> {
        let completed = AtomicUsize::new(0);
        let start = Instant::now();
        self.run_workers(|| {
            while start.elapsed() < window {
                self.get_output(state, Ensemble::RandomSymmetry, true)?;
                completed.fetch_add(1, Ordering::Relaxed);
            }
            Ok(())
        })?;
        let report = BenchmarkReport {
            evaluations: completed.load(Ordering::Relaxed),
            elapsed: start.elapsed(),
        };
        info!(
            evaluations = report.evaluations,
            per_second = report.per_second(),
            "timed benchmark finished"
        );
        Ok(report)
    }

    fn run_workers<F>(&self, work: F) -> Result<(), NetworkError>
    where
        F: Fn() -> Result<(), NetworkError> + Sync,
    {
        thread::scope(|s| {
            let handles: Vec<_> = (0..self.config.threads.max(1)).map(|_| s.spawn(&work)).collect();
            let mut outcome = Ok(());
            for handle in handles {
                match handle.join() {
                    Ok(result) => outcome = outcome.and(result),
                    Err(panic) => std::panic::resume_unwind(panic),
                }
            }
            outcome
        })
    }
}

impl std::fmt::Debug for Network {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Network")
            .field("channels", &self.channels)
            .field("residual_blocks", &self.residual_blocks)
            .field("backend", &self.backends.kind)
            .field("cache", &self.cache)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use sente_core::{Position, Vertex};

    use super::*;
    use crate::test_support::{BiasedPipe, WeightFile, load_pipe};

    fn cpu_network(config: NetworkConfig) -> Network {
        let weights = WeightSet::from_reader(WeightFile::new(4, 1).render().as_bytes()).unwrap();
        Network::from_weights(config, weights, None).unwrap()
    }

    fn opening() -> Position {
        let mut pos = Position::default();
        pos.play(Vertex::from_coordinate("C4").unwrap()).unwrap();
        pos
    }

    #[test]
    fn direct_result_is_a_distribution() {
        let net = cpu_network(NetworkConfig::default());
        let r = net.get_output(&opening(), Ensemble::Direct(Symmetry::IDENTITY), true).unwrap();
        assert!((r.policy_sum() - 1.0).abs() < 1e-4, "policy sums to {}", r.policy_sum());
        assert!((0.0..=1.0).contains(&r.winrate));
    }

    #[test]
    fn average_is_mean_of_all_symmetries() {
        let net = cpu_network(NetworkConfig::default());
        let pos = opening();
        let avg = net.get_output(&pos, Ensemble::Average, true).unwrap();
        let singles: Vec<NetResult> = Symmetry::ALL.iter().map(|&s| net.evaluate_symmetry(&pos, s)).collect();
        let mean_winrate = singles.iter().map(|r| r.winrate).sum::<f32>() / 8.0;
        assert!((avg.winrate - mean_winrate).abs() < 1e-5);
        for i in [0, 60, 180, 360] {
            let mean = singles.iter().map(|r| r.policy[i]).sum::<f32>() / 8.0;
            assert!((avg.policy[i] - mean).abs() < 1e-6, "vertex {i}");
        }
    }

    #[test]
    fn result_is_cached_under_position_hash() {
        let net = cpu_network(NetworkConfig::default());
        let pos = opening();
        let first = net.get_output(&pos, Ensemble::RandomSymmetry, false).unwrap();
        assert_eq!(net.cache().lookup(pos.hash()), Some(first.clone()));
        let second = net.get_output(&pos, Ensemble::Average, false).unwrap();
        assert_eq!(first, second, "second call must be served from the cache");
    }

    #[test]
    fn skip_cache_still_inserts() {
        let net = cpu_network(NetworkConfig::default());
        let pos = opening();
        net.get_output(&pos, Ensemble::Direct(Symmetry::IDENTITY), true).unwrap();
        assert!(net.cache().lookup(pos.hash()).is_some());
    }

    #[test]
    fn symmetric_probe_respects_regime_and_window() {
        let pos = opening();
        let net = cpu_network(NetworkConfig::default());
        assert!(net.symmetric_probe_allowed(&pos));

        let noisy = cpu_network(NetworkConfig {
            noise: true,
            ..NetworkConfig::default()
        });
        assert!(!noisy.symmetric_probe_allowed(&pos));

        let random = cpu_network(NetworkConfig {
            random_moves: 30,
            ..NetworkConfig::default()
        });
        assert!(!random.symmetric_probe_allowed(&pos));

        let closed = cpu_network(NetworkConfig {
            symmetry_probe_window: Some(1),
            ..NetworkConfig::default()
        });
        assert!(!closed.symmetric_probe_allowed(&pos), "move 1 is outside a 1-move window");
    }

    #[test]
    fn legacy_weights_flip_winrate_for_white() {
        let mut file = WeightFile::new(4, 1);
        let current = WeightSet::from_reader(file.render().as_bytes()).unwrap();
        file.version = crate::weights::LEGACY_VERSION;
        let legacy = WeightSet::from_reader(file.render().as_bytes()).unwrap();
        let current = Network::from_weights(NetworkConfig::default(), current, None).unwrap();
        let legacy = Network::from_weights(NetworkConfig::default(), legacy, None).unwrap();

        let white_to_move = opening();
        let a = current.get_output(&white_to_move, Ensemble::Direct(Symmetry::IDENTITY), true).unwrap();
        let b = legacy.get_output(&white_to_move, Ensemble::Direct(Symmetry::IDENTITY), true).unwrap();
        assert!((a.winrate - (1.0 - b.winrate)).abs() < 1e-6);

        let black_to_move = Position::default();
        let a = current.get_output(&black_to_move, Ensemble::Direct(Symmetry::IDENTITY), true).unwrap();
        let b = legacy.get_output(&black_to_move, Ensemble::Direct(Symmetry::IDENTITY), true).unwrap();
        assert_eq!(a.winrate, b.winrate);
    }

    fn selfchecked_network(bias: f32) -> Network {
        let file = WeightFile::new(2, 1);
        let weights = WeightSet::from_reader(file.render().as_bytes()).unwrap();
        let primary = load_pipe(Box::new(BiasedPipe::new(bias)), &weights);
        let reference = load_pipe(Box::new(crate::pipe::CpuPipe::new()), &weights);
        let config = NetworkConfig {
            selfcheck_one_in: 1,
            ..NetworkConfig::default()
        };
        Network::with_backends(
            config,
            weights,
            Backends {
                primary,
                reference: Some(reference),
                kind: BackendKind::Accelerated(crate::config::Precision::Full),
            },
        )
    }

    #[test]
    fn agreeing_backends_never_diverge() {
        let net = selfchecked_network(0.0);
        let pos = opening();
        for _ in 0..20 {
            net.get_output(&pos, Ensemble::RandomSymmetry, true).unwrap();
        }
        assert_eq!(net.selfcheck.failures(), 0);
    }

    #[test]
    fn corrupt_backend_is_fatal_and_stays_fatal() {
        let net = selfchecked_network(50.0);
        let pos = opening();
        assert!(net.get_output(&pos, Ensemble::RandomSymmetry, true).is_ok());
        assert!(net.get_output(&pos, Ensemble::RandomSymmetry, true).is_ok());
        let err = net.get_output(&pos, Ensemble::RandomSymmetry, true).unwrap_err();
        assert!(
            matches!(err, NetworkError::BackendDivergence { failures: 3, window: 10 }),
            "got {err:?}"
        );
        let again = net.get_output(&pos, Ensemble::Direct(Symmetry::IDENTITY), true);
        assert!(matches!(again, Err(NetworkError::BackendDivergence { .. })));
    }

    #[test]
    fn benchmark_runs_requested_iterations() {
        let net = cpu_network(NetworkConfig {
            threads: 2,
            ..NetworkConfig::default()
        });
        let report = net.benchmark(&Position::default(), 6).unwrap();
        assert_eq!(report.evaluations, 6);
        assert!(report.per_second() > 0.0);
    }
}
