//! Python extension module.

use std::collections::HashMap;

use pyo3::exceptions::PyValueError;
use pyo3::prelude::*;

use crate::config::{MixConfig, SolverStrategy};
use crate::error::MixError;
use crate::planner::plan_mix;
use crate::report::MixPlan;
use crate::track::tracks_from_raw;

impl From<MixError> for PyErr {
    fn from(err: MixError) -> PyErr {
        PyValueError::new_err(err.to_string())
    }
}

type Breakdown = (f64, f64, f64);

fn apply_params(
    params: Option<HashMap<String, f64>>,
    mut set: impl FnMut(&str, f64) -> crate::Result<()>,
) -> PyResult<()> {
    for (name, value) in params.unwrap_or_default() {
        set(&name, value)?;
    }
    Ok(())
}

fn breakdown(plan: &MixPlan) -> Breakdown {
    (plan.cost.harmonic, plan.cost.tempo, plan.cost.shift)
}

fn shifts(plan: &MixPlan) -> Vec<i8> {
    plan.shifts.iter().map(|s| s.semitones()).collect()
}

/// optimize_mix(bpms, key_ids, cost_params=None, annealing_params=None, time_limit_secs=300.0)
///
/// Simulated annealing for `time_limit_secs` seconds (at least one attempt).
/// `key_ids` are Camelot indices 0-23; params override the defaults by name.
///
/// Returns (order, shifts, cost, (h, t, s), attempt_costs, n_attempts,
/// per_track_min, per_track_max, per_track_avg).
#[pyfunction]
#[pyo3(signature = (bpms, key_ids, cost_params=None, annealing_params=None, time_limit_secs=300.0))]
#[allow(clippy::type_complexity)]
fn optimize_mix(
    py: Python<'_>,
    bpms: Vec<i64>,
    key_ids: Vec<i64>,
    cost_params: Option<HashMap<String, f64>>,
    annealing_params: Option<HashMap<String, f64>>,
    time_limit_secs: f64,
) -> PyResult<(
    Vec<usize>,
    Vec<i8>,
    f64,
    Breakdown,
    Vec<(f64, f64, f64, f64)>,
    usize,
    Vec<f64>,
    Vec<f64>,
    Vec<f64>,
)> {
    let tracks = tracks_from_raw(&bpms, &key_ids)?;
    let mut config = MixConfig::default();
    config.solver.strategy = SolverStrategy::Annealing;
    config.annealing.time_budget_seconds = time_limit_secs;
    apply_params(cost_params, |name, value| config.cost.set(name, value))?;
    apply_params(annealing_params, |name, value| config.annealing.set(name, value))?;

    let plan = py.allow_threads(|| plan_mix(&tracks, &config))?;

    let attempt_costs: Vec<_> = plan
        .attempts
        .iter()
        .map(|a| (a.cost.total, a.cost.harmonic, a.cost.tempo, a.cost.shift))
        .collect();
    let per_track = plan.per_track.clone().unwrap_or_default();
    Ok((
        plan.order.clone(),
        shifts(&plan),
        plan.cost.total,
        breakdown(&plan),
        attempt_costs,
        plan.attempts.len(),
        per_track.min,
        per_track.max,
        per_track.avg,
    ))
}

/// optimize_mix_exact(bpms, key_ids, cost_params=None, max_tracks=20)
///
/// Held-Karp global optimum. Raises ValueError above `max_tracks`.
///
/// Returns (order, shifts, cost, (h, t, s)).
#[pyfunction]
#[pyo3(signature = (bpms, key_ids, cost_params=None, max_tracks=20))]
fn optimize_mix_exact(
    py: Python<'_>,
    bpms: Vec<i64>,
    key_ids: Vec<i64>,
    cost_params: Option<HashMap<String, f64>>,
    max_tracks: usize,
) -> PyResult<(Vec<usize>, Vec<i8>, f64, Breakdown)> {
    let tracks = tracks_from_raw(&bpms, &key_ids)?;
    let mut config = MixConfig::default();
    config.solver.strategy = SolverStrategy::Exact;
    config.solver.exact_max_tracks = max_tracks;
    apply_params(cost_params, |name, value| config.cost.set(name, value))?;

    let plan = py.allow_threads(|| plan_mix(&tracks, &config))?;
    Ok((
        plan.order.clone(),
        shifts(&plan),
        plan.cost.total,
        breakdown(&plan),
    ))
}

#[pymodule]
fn ydj_mix_sequencer(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_function(wrap_pyfunction!(optimize_mix, m)?)?;
    m.add_function(wrap_pyfunction!(optimize_mix_exact, m)?)?;
    Ok(())
}
