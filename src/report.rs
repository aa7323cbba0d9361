//! Human-facing diagnostics derived from a solved order.

use std::fmt;

use serde::Serialize;

use crate::annealing::{AttemptStats, PerTrackStats};
use crate::cost::{CostBreakdown, CostModel, Solution};
use crate::key::{Key, Shift};
use crate::track::Track;

const MAX_INSERTION_CANDIDATES: usize = 10;

/// Which solver produced a plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SolverKind {
    /// Fewer than two tracks; nothing to search.
    Trivial,
    Exact,
    Annealing,
}

impl fmt::Display for SolverKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SolverKind::Trivial => "trivial",
            SolverKind::Exact => "exact",
            SolverKind::Annealing => "annealing",
        })
    }
}

/// Keys that would cheapen a costly transition if a track in one of them
/// were played in between.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BridgeSuggestion {
    /// Effective keys achieving the indirect cost.
    pub keys: Vec<Key>,
    /// Harmonic cost of going through any of `keys`.
    pub cost: f64,
    /// Base keys and the shift that turns each into one of `keys`.
    pub sources: Vec<(Key, Shift)>,
}

/// One consecutive pair of the final order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Transition {
    /// Position of the second track in the order.
    pub position: usize,
    pub from: usize,
    pub to: usize,
    pub from_key: Key,
    pub to_key: Key,
    pub harmonic: f64,
    pub tempo: f64,
    pub bpm_gap: u32,
    pub tempo_break: bool,
    pub bridge: Option<BridgeSuggestion>,
}

/// Final answer of [`plan_mix`](crate::plan_mix).
#[derive(Debug, Clone, Serialize)]
pub struct MixPlan {
    pub solver: SolverKind,
    /// Track indices in play order.
    pub order: Vec<usize>,
    /// Shift per track index.
    pub shifts: Vec<Shift>,
    pub cost: CostBreakdown,
    pub transitions: Vec<Transition>,
    /// Empty unless the annealer ran.
    pub attempts: Vec<AttemptStats>,
    pub per_track: Option<PerTrackStats>,
}

impl MixPlan {
    pub fn new(
        model: &CostModel,
        solver: SolverKind,
        solution: Solution,
        attempts: Vec<AttemptStats>,
        per_track: Option<PerTrackStats>,
    ) -> Self {
        let transitions = transitions(model, &solution);
        Self {
            solver,
            order: solution.order,
            shifts: solution.shifts,
            cost: solution.cost,
            transitions,
            attempts,
            per_track,
        }
    }

    /// Transitions that received a bridge suggestion.
    pub fn bridges(&self) -> impl Iterator<Item = &Transition> {
        self.transitions.iter().filter(|t| t.bridge.is_some())
    }

    /// Transitions whose BPM gap exceeds the tempo-break threshold.
    pub fn tempo_breaks(&self) -> impl Iterator<Item = &Transition> {
        self.transitions.iter().filter(|t| t.tempo_break)
    }

    /// Render as a text table using the tracks the plan was computed for.
    /// Indices missing from `tracks` render as placeholder rows.
    pub fn table<'a>(&'a self, tracks: &'a [Track]) -> PlanTable<'a> {
        PlanTable { plan: self, tracks }
    }
}

/// Every transition of `solution`, with bridge suggestions for the costly ones.
pub fn transitions(model: &CostModel, solution: &Solution) -> Vec<Transition> {
    let threshold = model.config().bridge_threshold;
    solution
        .order
        .windows(2)
        .enumerate()
        .map(|(i, pair)| {
            let (a, b) = (pair[0], pair[1]);
            let (sa, sb) = (solution.shifts[a], solution.shifts[b]);
            let cost = model.transition(a, b, sa, sb);
            let from_key = model.effective_key(a, sa);
            let to_key = model.effective_key(b, sb);
            let bridge = if cost.harmonic >= threshold {
                bridge_keys(model, from_key, to_key)
            } else {
                None
            };
            Transition {
                position: i + 1,
                from: a,
                to: b,
                from_key,
                to_key,
                harmonic: cost.harmonic,
                tempo: cost.tempo,
                bpm_gap: cost.bpm_gap,
                tempo_break: cost.tempo_break,
                bridge,
            }
        })
        .collect()
}

/// Bridge keys between two effective keys, read from the indirect table.
///
/// `None` when no single intervening key brings the transition below the
/// non-harmonic cost.
pub fn bridge_keys(model: &CostModel, from: Key, to: Key) -> Option<BridgeSuggestion> {
    let tables = model.tables();
    let cost = tables.indirect(from, to);
    if cost >= model.config().non_harmonic_cost {
        return None;
    }
    let keys: Vec<Key> = Key::ALL
        .into_iter()
        .filter(|&k| k != from && k != to)
        .filter(|&k| (tables.direct(from, k) + tables.direct(k, to) - cost).abs() < 1e-9)
        .collect();
    if keys.is_empty() {
        return None;
    }
    let sources = keys.iter().flat_map(|k| k.shift_sources()).collect();
    Some(BridgeSuggestion {
        keys,
        cost,
        sources,
    })
}

/// A library track that could be inserted between two tracks.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InsertionCandidate {
    /// Index into the library.
    pub index: usize,
    pub shift: Shift,
    pub effective_key: Key,
}

/// Up to ten library tracks that fit between `from` and `to`: BPM within the
/// tempo threshold of both, and some shift landing on either end's effective
/// key. Closest to the mean BPM first.
pub fn insertion_candidates(
    model: &CostModel,
    from: (&Track, Shift),
    to: (&Track, Shift),
    library: &[Track],
) -> Vec<InsertionCandidate> {
    let threshold = model.config().tempo_threshold_bpm;
    let (a, sa) = from;
    let (b, sb) = to;
    let low = (a.bpm as f64 - threshold).max(b.bpm as f64 - threshold);
    let high = (a.bpm as f64 + threshold).min(b.bpm as f64 + threshold);
    if low > high {
        return Vec::new();
    }
    let targets = [a.key.shifted(sa), b.key.shifted(sb)];
    let mean = (a.bpm as f64 + b.bpm as f64) / 2.0;

    let mut candidates: Vec<(f64, InsertionCandidate)> = library
        .iter()
        .enumerate()
        .filter(|(_, t)| (low..=high).contains(&(t.bpm as f64)))
        .filter_map(|(index, t)| {
            Shift::ALL.into_iter().find_map(|shift| {
                let effective_key = t.key.shifted(shift);
                targets.contains(&effective_key).then(|| {
                    (
                        (t.bpm as f64 - mean).abs(),
                        InsertionCandidate {
                            index,
                            shift,
                            effective_key,
                        },
                    )
                })
            })
        })
        .collect();
    candidates.sort_by(|x, y| x.0.total_cmp(&y.0));
    candidates
        .into_iter()
        .take(MAX_INSERTION_CANDIDATES)
        .map(|(_, c)| c)
        .collect()
}

/// Text rendering of a [`MixPlan`].
pub struct PlanTable<'a> {
    plan: &'a MixPlan,
    tracks: &'a [Track],
}

impl fmt::Display for PlanTable<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let plan = self.plan;
        let c = &plan.cost;
        writeln!(
            f,
            "Solver: {}  Cost: {:5.1} (H={:5.1}, T={:5.1}, S={:5.1})",
            plan.solver, c.total, c.harmonic, c.tempo, c.shift
        )?;
        for a in &plan.attempts {
            writeln!(
                f,
                "  Attempt {:3}: Overall={:5.1}  H={:5.1}  T={:5.1}  S={:5.1}  last improvement at {}",
                a.attempt + 1,
                a.cost.total,
                a.cost.harmonic,
                a.cost.tempo,
                a.cost.shift,
                a.last_improvement
            )?;
        }
        writeln!(f)?;

        for (pos, &idx) in plan.order.iter().enumerate() {
            let Some(track) = self.tracks.get(idx) else {
                writeln!(f, "{:2}. <no track #{idx} in the given list>", pos + 1)?;
                continue;
            };
            let shift = plan.shifts[idx];
            let key_str = format!("{:>3} [{}]", track.key.to_string(), shift);
            let eff = track.key.shifted(shift).to_string();
            let (info, hint) = match pos.checked_sub(1).map(|p| &plan.transitions[p]) {
                None => ("(Start)".to_string(), String::new()),
                Some(t) => {
                    let brk = if t.tempo_break { " !" } else { "" };
                    let hint = t
                        .bridge
                        .as_ref()
                        .map(|b| {
                            let keys: Vec<String> = b
                                .sources
                                .iter()
                                .map(|(k, s)| format!("{k}({s})"))
                                .collect();
                            format!("  << {}", keys.join(" / "))
                        })
                        .unwrap_or_default();
                    (format!("(H={:4.1}  T={:4.1}){brk}", t.harmonic, t.tempo), hint)
                }
            };
            writeln!(
                f,
                "{:2}. BPM {:3}  {:<10} -> {:>5}  {:<20}  {}{}",
                pos + 1,
                track.bpm,
                key_str,
                eff,
                info,
                track.id,
                hint
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CostConfig;

    fn track(id: &str, bpm: u32, key: &str) -> Track {
        Track::new(id, bpm, key.parse().unwrap())
    }

    fn key(s: &str) -> Key {
        s.parse().unwrap()
    }

    #[test]
    fn bridge_between_two_steps_apart() {
        let model = CostModel::new(&[], &CostConfig::default());
        let bridge = bridge_keys(&model, key("8A"), key("10A")).unwrap();
        assert_eq!(bridge.keys, vec![key("9A")]);
        assert_eq!(bridge.cost, 1.0);
        assert_eq!(bridge.sources.len(), 3);
        for (base, shift) in &bridge.sources {
            assert_eq!(base.shifted(*shift), key("9A"));
        }
    }

    #[test]
    fn diagonal_neighbour_has_two_bridges() {
        let model = CostModel::new(&[], &CostConfig::default());
        let bridge = bridge_keys(&model, key("8A"), key("9B")).unwrap();
        assert_eq!(bridge.keys, vec![key("8B"), key("9A")]);
    }

    #[test]
    fn unreachable_pair_has_no_bridge() {
        let model = CostModel::new(&[], &CostConfig::default());
        assert!(bridge_keys(&model, key("8A"), key("3A")).is_none());
    }

    #[test]
    fn transitions_flag_costly_pairs() {
        let tracks = vec![
            track("a", 120, "8A"),
            track("b", 122, "10A"),
            track("c", 140, "10A"),
        ];
        let model = CostModel::new(&tracks, &CostConfig::default());
        let solution = Solution::evaluate(&model, vec![0, 1, 2], vec![Shift::Zero; 3]);
        let plan = MixPlan::new(&model, SolverKind::Exact, solution, Vec::new(), None);

        assert_eq!(plan.transitions.len(), 2);
        let first = &plan.transitions[0];
        assert_eq!(first.position, 1);
        assert_eq!(first.harmonic, 5.0);
        assert!(first.bridge.is_some());
        assert!(!first.tempo_break);

        let second = &plan.transitions[1];
        assert_eq!(second.harmonic, 0.0);
        assert!(second.bridge.is_none());
        assert!(second.tempo_break);

        assert_eq!(plan.bridges().count(), 1);
        assert_eq!(plan.tempo_breaks().count(), 1);
    }

    #[test]
    fn insertion_candidates_match_bpm_and_key() {
        let a = track("a", 120, "8A");
        let b = track("b", 126, "10A");
        let library = vec![
            track("too slow", 110, "8A"),
            track("exact key", 123, "10A"),
            track("needs shift", 124, "3A"),
            track("wrong key", 123, "5B"),
            track("unshifted", 122, "8A"),
        ];
        let model = CostModel::new(&[], &CostConfig::default());
        let found =
            insertion_candidates(&model, (&a, Shift::Zero), (&b, Shift::Zero), &library);
        let indices: Vec<usize> = found.iter().map(|c| c.index).collect();
        // Equal distances keep library order.
        assert_eq!(indices, vec![1, 2, 4]);
        assert_eq!(found[1].shift, Shift::Down);
        assert_eq!(found[1].effective_key, key("8A"));
        assert_eq!(found[2].shift, Shift::Zero);
    }

    #[test]
    fn insertion_needs_overlapping_tempo_window() {
        let a = track("a", 100, "8A");
        let b = track("b", 120, "8A");
        let model = CostModel::new(&[], &CostConfig::default());
        let library = vec![track("mid", 110, "8A")];
        let found = insertion_candidates(&model, (&a, Shift::Zero), (&b, Shift::Zero), &library);
        assert!(found.is_empty());
    }

    #[test]
    fn table_lists_every_track() {
        let tracks = vec![track("first", 100, "8A"), track("second", 120, "3A")];
        let model = CostModel::new(&tracks, &CostConfig::default());
        let solution = Solution::evaluate(&model, vec![0, 1], vec![Shift::Zero, Shift::Down]);
        let plan = MixPlan::new(&model, SolverKind::Exact, solution, Vec::new(), None);
        let text = plan.table(&tracks).to_string();
        assert!(text.contains("Solver: exact"), "got:\n{text}");
        assert!(text.contains("(Start)"), "got:\n{text}");
        assert!(text.contains("3A [-1]"), "got:\n{text}");
        assert!(text.contains("second"), "got:\n{text}");
    }

    #[test]
    fn table_tolerates_a_short_track_list() {
        let tracks = vec![track("first", 100, "8A"), track("second", 120, "3A")];
        let model = CostModel::new(&tracks, &CostConfig::default());
        let solution = Solution::evaluate(&model, vec![1, 0], vec![Shift::Zero; 2]);
        let plan = MixPlan::new(&model, SolverKind::Exact, solution, Vec::new(), None);
        let text = plan.table(&tracks[..1]).to_string();
        assert!(text.contains("<no track #1 in the given list>"), "got:\n{text}");
        assert!(text.contains("first"), "got:\n{text}");
    }
}
