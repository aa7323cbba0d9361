//! Entry point tying validation, solver choice and reporting together.

use std::sync::atomic::AtomicBool;

use tracing::info;

use crate::annealing;
use crate::config::{MixConfig, SolverConfig, SolverStrategy};
use crate::cost::{CostModel, Solution};
use crate::error::{MixError, Result};
use crate::held_karp;
use crate::report::{MixPlan, SolverKind};
use crate::track::{validate_tracks, Track};

/// Order `tracks` and choose a shift for each.
///
/// ```
/// use ydj_mix_sequencer::{plan_mix, MixConfig, Track};
///
/// let tracks = vec![
///     Track::new("intro", 100, "8A".parse().unwrap()),
///     Track::new("peak", 120, "3A".parse().unwrap()),
/// ];
/// let plan = plan_mix(&tracks, &MixConfig::default()).unwrap();
/// assert_eq!(plan.cost.total, 6.0);
/// ```
pub fn plan_mix(tracks: &[Track], config: &MixConfig) -> Result<MixPlan> {
    plan_mix_with_cancel(tracks, config, None)
}

/// Like [`plan_mix`], but the annealer also stops early once `cancel` is set.
/// The exact solver ignores it.
pub fn plan_mix_with_cancel(
    tracks: &[Track],
    config: &MixConfig,
    cancel: Option<&AtomicBool>,
) -> Result<MixPlan> {
    config.validate()?;
    validate_tracks(tracks)?;

    let model = CostModel::new(tracks, &config.cost);
    let kind = choose_solver(tracks.len(), &config.solver)?;
    info!(tracks = tracks.len(), solver = %kind, "planning mix");

    let plan = match kind {
        SolverKind::Trivial => MixPlan::new(
            &model,
            kind,
            Solution::trivial(tracks.len()),
            Vec::new(),
            None,
        ),
        SolverKind::Exact => {
            let solution = held_karp::solve(&model, config.solver.exact_max_tracks)?;
            MixPlan::new(&model, kind, solution, Vec::new(), None)
        }
        SolverKind::Annealing => {
            let outcome = annealing::run_timed(&model, &config.annealing, cancel)?;
            MixPlan::new(
                &model,
                kind,
                outcome.best,
                outcome.attempts,
                Some(outcome.per_track),
            )
        }
    };

    info!(
        cost = plan.cost.total,
        harmonic = plan.cost.harmonic,
        tempo = plan.cost.tempo,
        shift = plan.cost.shift,
        "mix planned"
    );
    Ok(plan)
}

/// Which solver handles a playlist of `tracks` entries.
pub fn choose_solver(tracks: usize, solver: &SolverConfig) -> Result<SolverKind> {
    if tracks < 2 {
        return Ok(SolverKind::Trivial);
    }
    let fits = tracks <= solver.exact_max_tracks;
    match solver.strategy {
        SolverStrategy::Auto if fits => Ok(SolverKind::Exact),
        SolverStrategy::Auto | SolverStrategy::Annealing => Ok(SolverKind::Annealing),
        SolverStrategy::Exact if fits => Ok(SolverKind::Exact),
        SolverStrategy::Exact => Err(MixError::ExactSolverUnavailable {
            tracks,
            max: solver.exact_max_tracks,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solver(strategy: SolverStrategy, exact_max_tracks: usize) -> SolverConfig {
        SolverConfig {
            strategy,
            exact_max_tracks,
        }
    }

    #[test]
    fn routing() {
        let auto = solver(SolverStrategy::Auto, 4);
        assert_eq!(choose_solver(0, &auto).unwrap(), SolverKind::Trivial);
        assert_eq!(choose_solver(1, &auto).unwrap(), SolverKind::Trivial);
        assert_eq!(choose_solver(4, &auto).unwrap(), SolverKind::Exact);
        assert_eq!(choose_solver(5, &auto).unwrap(), SolverKind::Annealing);

        let annealing = solver(SolverStrategy::Annealing, 4);
        assert_eq!(choose_solver(2, &annealing).unwrap(), SolverKind::Annealing);

        let exact = solver(SolverStrategy::Exact, 4);
        assert_eq!(choose_solver(4, &exact).unwrap(), SolverKind::Exact);
        assert!(matches!(
            choose_solver(5, &exact),
            Err(MixError::ExactSolverUnavailable { tracks: 5, max: 4 })
        ));
    }

    #[test]
    fn single_track_plan() {
        let tracks = vec![Track::new("only", 128, "5B".parse().unwrap())];
        let plan = plan_mix(&tracks, &MixConfig::default()).unwrap();
        assert_eq!(plan.solver, SolverKind::Trivial);
        assert_eq!(plan.order, vec![0]);
        assert_eq!(plan.shifts, vec![crate::key::Shift::Zero]);
        assert_eq!(plan.cost.total, 0.0);
        assert!(plan.transitions.is_empty());
    }

    #[test]
    fn invalid_input_is_rejected_before_solving() {
        let tracks = vec![
            Track::new("a", 128, "5B".parse().unwrap()),
            Track::new("b", 0, "5B".parse().unwrap()),
        ];
        assert!(matches!(
            plan_mix(&tracks, &MixConfig::default()),
            Err(MixError::InvalidTrack { index: 1, .. })
        ));

        let mut config = MixConfig::default();
        config.cost.non_harmonic_cost = -1.0;
        assert!(matches!(
            plan_mix(&[], &config),
            Err(MixError::Configuration { .. })
        ));
    }
}
