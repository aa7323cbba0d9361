use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use rand::prelude::*;
use rand::rngs::StdRng;
use rand::seq::index;
use rayon::prelude::*;
use serde::Serialize;
use tracing::{debug, info, trace, warn};

use crate::config::AnnealingConfig;
use crate::cost::{CostBreakdown, CostModel, Solution};
use crate::error::Result;
use crate::key::Shift;

// A running cost this far from a full recompute means the delta bookkeeping is wrong.
const DRIFT_TOLERANCE: f64 = 1e-6;
const IMPROVEMENT_EPS: f64 = 1e-9;

/// Diagnostics for one annealing attempt.
#[derive(Debug, Clone, Serialize)]
pub struct AttemptStats {
    pub attempt: usize,
    pub cost: CostBreakdown,
    /// Iteration at which the attempt's best was last improved.
    pub last_improvement: usize,
    pub iterations: usize,
    /// Stagnation escapes performed.
    pub escapes: usize,
    pub elapsed_secs: f64,
}

/// Per-track cost (average of its two edges) aggregated over every attempt, indexed by track.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PerTrackStats {
    pub min: Vec<f64>,
    pub max: Vec<f64>,
    pub avg: Vec<f64>,
}

/// Result of a timed annealing run.
#[derive(Debug, Clone, Serialize)]
pub struct AnnealingOutcome {
    pub best: Solution,
    pub attempts: Vec<AttemptStats>,
    pub per_track: PerTrackStats,
    pub elapsed_secs: f64,
}

/// Cooperative stop condition shared by every attempt of a run.
pub struct StopSignal<'a> {
    /// `None` when the budget reaches past what `Instant` can represent.
    deadline: Option<Instant>,
    cancel: Option<&'a AtomicBool>,
}

impl<'a> StopSignal<'a> {
    pub fn new(budget: Duration, cancel: Option<&'a AtomicBool>) -> Self {
        Self {
            deadline: Instant::now().checked_add(budget),
            cancel,
        }
    }

    pub fn should_stop(&self) -> bool {
        self.deadline.is_some_and(|deadline| Instant::now() >= deadline)
            || self.cancel.is_some_and(|flag| flag.load(Ordering::Relaxed))
    }
}

/// Run a single annealing attempt from a fresh random state and return its best solution.
///
/// Requires at least two tracks. `stop` is only consulted when
/// `deadline_check_interval` is non-zero.
pub fn run_attempt(
    model: &CostModel,
    config: &AnnealingConfig,
    rng: &mut impl Rng,
    attempt: usize,
    stop: Option<&StopSignal<'_>>,
) -> (Solution, AttemptStats) {
    anneal(model, config, rng, attempt, stop, |_, _, _| {})
}

/// Attempt body. `visit` sees the current state and its running cost at the
/// end of every iteration.
fn anneal(
    model: &CostModel,
    config: &AnnealingConfig,
    rng: &mut impl Rng,
    attempt: usize,
    stop: Option<&StopSignal<'_>>,
    mut visit: impl FnMut(&[usize], &[Shift], f64),
) -> (Solution, AttemptStats) {
    let n = model.len();
    debug_assert!(n >= 2, "annealing needs at least two tracks");
    let started = Instant::now();

    let mut order: Vec<usize> = (0..n).collect();
    order.shuffle(rng);
    let mut shifts: Vec<Shift> = if config.random_initial_shifts {
        (0..n)
            .map(|_| Shift::from_index(rng.random_range(0..3)))
            .collect()
    } else {
        vec![Shift::Zero; n]
    };

    let mut current = model.total_cost(&order, &shifts).total;
    let mut best_order = order.clone();
    let mut best_shifts = shifts.clone();
    let mut best_cost = current;

    let cooling = config.cooling_factor();
    let mut temp = config.initial_temperature;
    let mut last_improvement = 0;
    let mut since_improvement = 0;
    let mut escapes = 0;
    let mut iterations = 0;

    for iter in 0..config.iterations_per_attempt {
        if config.deadline_check_interval > 0
            && iter > 0
            && iter % config.deadline_check_interval == 0
            && stop.is_some_and(StopSignal::should_stop)
        {
            break;
        }
        iterations = iter + 1;
        since_improvement += 1;

        let a = rng.random_range(0..n);
        let mut b = rng.random_range(0..n - 1);
        if b >= a {
            b += 1;
        }

        let mv = model.propose_swap(&mut order, &mut shifts, a, b);
        let accept = mv.delta <= 0.0 || rng.random::<f64>() < (-mv.delta / temp).exp();

        if accept {
            current += mv.delta;
            if current < best_cost - IMPROVEMENT_EPS {
                let full = model.total_cost(&order, &shifts).total;
                if (full - current).abs() > DRIFT_TOLERANCE {
                    warn!(attempt, iter, running = current, full, "delta cost drifted from full recompute");
                }
                current = full;
                best_cost = full;
                best_order.copy_from_slice(&order);
                best_shifts.copy_from_slice(&shifts);
                last_improvement = iter;
                since_improvement = 0;
                trace!(attempt, iter, cost = best_cost, temp, "new best");
            }
        } else {
            model.undo(&mut order, &mut shifts, &mv);
        }

        if since_improvement >= config.stagnation_limit {
            perturb(&mut order, &mut shifts, config.perturbation_fraction, rng);
            current = model.total_cost(&order, &shifts).total;
            since_improvement = 0;
            escapes += 1;
            if current < best_cost - IMPROVEMENT_EPS {
                best_cost = current;
                best_order.copy_from_slice(&order);
                best_shifts.copy_from_slice(&shifts);
                last_improvement = iter;
                trace!(attempt, iter, cost = best_cost, "new best from escape");
            }
        }

        visit(&order, &shifts, current);
        temp *= cooling;
    }

    let best = Solution::evaluate(model, best_order, best_shifts);
    let stats = AttemptStats {
        attempt,
        cost: best.cost,
        last_improvement,
        iterations,
        escapes,
        elapsed_secs: started.elapsed().as_secs_f64(),
    };
    debug!(
        attempt,
        cost = stats.cost.total,
        harmonic = stats.cost.harmonic,
        tempo = stats.cost.tempo,
        shift = stats.cost.shift,
        last_improvement,
        escapes,
        "attempt finished"
    );
    (best, stats)
}

/// Escape a local basin: reverse a random subsequence, then shuffle the tracks
/// at a random subset of positions and re-roll their shifts.
pub fn perturb(order: &mut [usize], shifts: &mut [Shift], fraction: f64, rng: &mut impl Rng) {
    let n = order.len();
    if n < 2 {
        return;
    }
    let i = rng.random_range(0..n - 1);
    let j = rng.random_range(i + 1..n);
    order[i..=j].reverse();

    let count = ((n as f64 * fraction).round() as usize).clamp(2, n);
    let positions = index::sample(rng, n, count).into_vec();
    let mut tracks: Vec<usize> = positions.iter().map(|&p| order[p]).collect();
    tracks.shuffle(rng);
    for (&p, &track) in positions.iter().zip(&tracks) {
        order[p] = track;
        shifts[track] = Shift::from_index(rng.random_range(0..3));
    }
}

/// Run attempts until the time budget elapses (at least one attempt), the
/// attempt cap is reached, or `cancel` is raised.
///
/// Attempts run in parallel batches; each gets its own RNG seeded from the
/// run seed and its attempt index, so a seeded run with `max_attempts` is
/// reproducible regardless of thread count.
pub fn run_timed(
    model: &CostModel,
    config: &AnnealingConfig,
    cancel: Option<&AtomicBool>,
) -> Result<AnnealingOutcome> {
    let n = model.len();
    let started = Instant::now();
    if n < 2 {
        return Ok(AnnealingOutcome {
            best: Solution::trivial(n),
            attempts: Vec::new(),
            per_track: PerTrackStats {
                min: vec![0.0; n],
                max: vec![0.0; n],
                avg: vec![0.0; n],
            },
            elapsed_secs: 0.0,
        });
    }

    let stop = StopSignal::new(config.time_budget(), cancel);
    let base_seed = config.seed.unwrap_or_else(|| rand::rng().random());
    let pool = match config.threads {
        0 => None,
        threads => Some(rayon::ThreadPoolBuilder::new().num_threads(threads).build()?),
    };
    let workers = pool
        .as_ref()
        .map_or_else(rayon::current_num_threads, |p| p.current_num_threads());

    info!(
        tracks = n,
        budget_secs = config.time_budget_seconds,
        iterations = config.iterations_per_attempt,
        workers,
        seed = base_seed,
        "starting annealing"
    );

    let mut acc = BestOf::new(n);
    loop {
        if acc.count() > 0 && stop.should_stop() {
            break;
        }
        let batch = config
            .max_attempts
            .map_or(workers, |max| max.saturating_sub(acc.count()).min(workers));
        if batch == 0 {
            break;
        }

        let first = acc.count();
        let run_batch = || {
            (first..first + batch)
                .into_par_iter()
                .map(|k| {
                    let mut rng = StdRng::seed_from_u64(attempt_seed(base_seed, k));
                    run_attempt(model, config, &mut rng, k, Some(&stop))
                })
                .collect::<Vec<_>>()
        };
        let results = match &pool {
            Some(pool) => pool.install(run_batch),
            None => run_batch(),
        };
        for (solution, stats) in results {
            acc.merge(model, solution, stats);
        }
    }

    let outcome = acc.finish(started.elapsed().as_secs_f64());
    info!(
        attempts = outcome.attempts.len(),
        cost = outcome.best.cost.total,
        elapsed_secs = outcome.elapsed_secs,
        "annealing finished"
    );
    Ok(outcome)
}

fn attempt_seed(base: u64, attempt: usize) -> u64 {
    base ^ (attempt as u64).wrapping_add(1).wrapping_mul(0x9E37_79B9_7F4A_7C15)
}

/// Merges attempt results; the only place the cross-attempt best lives.
struct BestOf {
    best: Option<Solution>,
    attempts: Vec<AttemptStats>,
    track_min: Vec<f64>,
    track_max: Vec<f64>,
    track_sum: Vec<f64>,
}

impl BestOf {
    fn new(n: usize) -> Self {
        Self {
            best: None,
            attempts: Vec::new(),
            track_min: vec![f64::INFINITY; n],
            track_max: vec![f64::NEG_INFINITY; n],
            track_sum: vec![0.0; n],
        }
    }

    fn count(&self) -> usize {
        self.attempts.len()
    }

    fn merge(&mut self, model: &CostModel, solution: Solution, stats: AttemptStats) {
        let per_track = model.per_track_costs(&solution.order, &solution.shifts);
        for (i, &c) in per_track.iter().enumerate() {
            self.track_min[i] = self.track_min[i].min(c);
            self.track_max[i] = self.track_max[i].max(c);
            self.track_sum[i] += c;
        }
        self.attempts.push(stats);

        // Strict comparison: on ties the earlier attempt wins.
        if self
            .best
            .as_ref()
            .map_or(true, |best| solution.cost.total < best.cost.total)
        {
            self.best = Some(solution);
        }
    }

    fn finish(self, elapsed_secs: f64) -> AnnealingOutcome {
        let n_attempts = self.attempts.len().max(1) as f64;
        let n = self.track_sum.len();
        AnnealingOutcome {
            best: self.best.unwrap_or_else(|| Solution::trivial(n)),
            attempts: self.attempts,
            per_track: PerTrackStats {
                min: self.track_min,
                max: self.track_max,
                avg: self.track_sum.into_iter().map(|s| s / n_attempts).collect(),
            },
            elapsed_secs,
        }
    }
}
