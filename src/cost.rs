use serde::Serialize;

use crate::config::CostConfig;
use crate::key::{Key, Relation, Shift, NUM_KEYS, SHIFT_TABLE};
use crate::track::Track;

/// Flat 24×24 harmonic cost tables indexed `a * 24 + b` by effective key.
///
/// - `direct`: cost of going straight from `a` to `b`.
/// - `indirect`: cheapest `direct(a, k) + direct(k, b)` over every key `k`.
/// - `harmonic`: what the solvers charge; `direct`, raised to
///   `unreachable_multiplier * non_harmonic_cost` when neither table offers
///   anything better than a non-harmonic change.
#[derive(Debug, Clone)]
pub struct CostTables {
    direct: [f64; NUM_KEYS * NUM_KEYS],
    indirect: [f64; NUM_KEYS * NUM_KEYS],
    harmonic: [f64; NUM_KEYS * NUM_KEYS],
    non_harmonic_cost: f64,
}

impl CostTables {
    pub fn build(config: &CostConfig) -> Self {
        let mut direct = [0.0; NUM_KEYS * NUM_KEYS];
        for a in Key::ALL {
            for b in Key::ALL {
                direct[a.index() * NUM_KEYS + b.index()] = match a.relation(b) {
                    Relation::Same => 0.0,
                    Relation::AdjacentSameMode | Relation::SamePositionOtherMode => {
                        config.compatible_cost
                    }
                    Relation::Other => config.non_harmonic_cost,
                };
            }
        }

        let mut indirect = [0.0; NUM_KEYS * NUM_KEYS];
        for a in 0..NUM_KEYS {
            for b in 0..NUM_KEYS {
                indirect[a * NUM_KEYS + b] = (0..NUM_KEYS)
                    .map(|k| direct[a * NUM_KEYS + k] + direct[k * NUM_KEYS + b])
                    .fold(f64::INFINITY, f64::min);
            }
        }

        let unreachable_cost = config.unreachable_multiplier * config.non_harmonic_cost;
        let mut harmonic = direct;
        for idx in 0..NUM_KEYS * NUM_KEYS {
            if direct[idx] >= config.non_harmonic_cost && indirect[idx] >= config.non_harmonic_cost {
                harmonic[idx] = unreachable_cost;
            }
        }

        Self {
            direct,
            indirect,
            harmonic,
            non_harmonic_cost: config.non_harmonic_cost,
        }
    }

    pub fn direct(&self, a: Key, b: Key) -> f64 {
        self.direct[a.index() * NUM_KEYS + b.index()]
    }

    pub fn indirect(&self, a: Key, b: Key) -> f64 {
        self.indirect[a.index() * NUM_KEYS + b.index()]
    }

    /// Harmonic cost charged by the solvers.
    pub fn harmonic(&self, a: Key, b: Key) -> f64 {
        self.harmonic[a.index() * NUM_KEYS + b.index()]
    }

    /// Whether no single intervening key makes the transition cheaper than non-harmonic.
    pub fn is_unreachable(&self, a: Key, b: Key) -> bool {
        self.indirect(a, b) >= self.non_harmonic_cost && self.direct(a, b) >= self.non_harmonic_cost
    }

    #[inline(always)]
    fn harmonic_by_index(&self, a: usize, b: usize) -> f64 {
        self.harmonic[a * NUM_KEYS + b]
    }
}

/// Total cost of a candidate and its decomposition; `total = harmonic + tempo + shift`.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct CostBreakdown {
    pub total: f64,
    pub harmonic: f64,
    /// Weighted tempo penalties.
    pub tempo: f64,
    pub shift: f64,
}

impl CostBreakdown {
    pub fn new(harmonic: f64, tempo: f64, shift: f64) -> Self {
        Self {
            total: harmonic + tempo + shift,
            harmonic,
            tempo,
            shift,
        }
    }
}

/// An order (permutation of track indices) with one shift per track index.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Solution {
    pub order: Vec<usize>,
    pub shifts: Vec<Shift>,
    pub cost: CostBreakdown,
}

impl Solution {
    /// Identity order, no shifts, zero cost. The answer for fewer than two tracks.
    pub fn trivial(n: usize) -> Self {
        Self {
            order: (0..n).collect(),
            shifts: vec![Shift::Zero; n],
            cost: CostBreakdown::default(),
        }
    }

    /// Score `order` and `shifts` from scratch.
    pub fn evaluate(model: &CostModel, order: Vec<usize>, shifts: Vec<Shift>) -> Self {
        let cost = model.total_cost(&order, &shifts);
        Self { order, shifts, cost }
    }
}

/// Cost of a single transition.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransitionCost {
    pub harmonic: f64,
    pub tempo: f64,
    pub bpm_gap: u32,
    /// BPM gap above the tempo-break threshold; scored like any other tempo penalty.
    pub tempo_break: bool,
}

/// A swap applied by [`CostModel::propose_swap`], with what is needed to undo it.
#[derive(Debug, Clone, Copy)]
pub struct SwapMove {
    pub a: usize,
    pub b: usize,
    /// Exact change of the total cost, shift penalties included.
    pub delta: f64,
    track_a: usize,
    track_b: usize,
    old_shift_a: Shift,
    old_shift_b: Shift,
}

/// Cost model bound to one playlist. Read-only after construction and shared
/// across annealing attempts.
#[derive(Debug, Clone)]
pub struct CostModel {
    tables: CostTables,
    config: CostConfig,
    bpms: Vec<u32>,
    key_ids: Vec<u8>,
    tempo_cost: f64,
}

impl CostModel {
    pub fn new(tracks: &[Track], config: &CostConfig) -> Self {
        Self {
            tables: CostTables::build(config),
            config: config.clone(),
            bpms: tracks.iter().map(|t| t.bpm).collect(),
            key_ids: tracks.iter().map(|t| t.key.index() as u8).collect(),
            tempo_cost: config.tempo_weight * config.tempo_penalty,
        }
    }

    pub fn len(&self) -> usize {
        self.bpms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bpms.is_empty()
    }

    pub fn tables(&self) -> &CostTables {
        &self.tables
    }

    pub fn config(&self) -> &CostConfig {
        &self.config
    }

    pub fn bpm(&self, track: usize) -> u32 {
        self.bpms[track]
    }

    /// Effective key of `track` under `shift`.
    pub fn effective_key(&self, track: usize, shift: Shift) -> Key {
        Key::ALL[self.effective_index(track, shift)]
    }

    #[inline(always)]
    fn effective_index(&self, track: usize, shift: Shift) -> usize {
        SHIFT_TABLE[self.key_ids[track] as usize * 3 + shift.index()] as usize
    }

    #[inline(always)]
    pub fn tempo_cost(&self, a: usize, b: usize) -> f64 {
        let gap = self.bpms[a].abs_diff(self.bpms[b]) as f64;
        if gap > self.config.tempo_threshold_bpm {
            self.tempo_cost
        } else {
            0.0
        }
    }

    #[inline(always)]
    pub fn shift_cost(&self, shift: Shift) -> f64 {
        if shift.is_shifted() {
            self.config.shift_penalty
        } else {
            0.0
        }
    }

    /// Harmonic plus tempo cost of playing track `b` right after track `a`.
    #[inline(always)]
    pub fn edge_cost(&self, a: usize, b: usize, sa: Shift, sb: Shift) -> f64 {
        self.tables
            .harmonic_by_index(self.effective_index(a, sa), self.effective_index(b, sb))
            + self.tempo_cost(a, b)
    }

    pub fn transition(&self, a: usize, b: usize, sa: Shift, sb: Shift) -> TransitionCost {
        let bpm_gap = self.bpms[a].abs_diff(self.bpms[b]);
        TransitionCost {
            harmonic: self
                .tables
                .harmonic_by_index(self.effective_index(a, sa), self.effective_index(b, sb)),
            tempo: self.tempo_cost(a, b),
            bpm_gap,
            tempo_break: bpm_gap as f64 > self.config.tempo_break_threshold(),
        }
    }

    /// Full cost of `order` with `shifts` indexed by track.
    pub fn total_cost(&self, order: &[usize], shifts: &[Shift]) -> CostBreakdown {
        let mut harmonic = 0.0;
        let mut tempo = 0.0;
        for pair in order.windows(2) {
            let (a, b) = (pair[0], pair[1]);
            harmonic += self
                .tables
                .harmonic_by_index(self.effective_index(a, shifts[a]), self.effective_index(b, shifts[b]));
            tempo += self.tempo_cost(a, b);
        }
        let shift = order.iter().map(|&t| self.shift_cost(shifts[t])).sum();
        CostBreakdown::new(harmonic, tempo, shift)
    }

    /// Change in total cost from swapping positions `i` and `j`, shifts unchanged.
    ///
    /// Only the (at most four) edges touching the two positions are evaluated.
    pub fn delta_cost(&self, order: &[usize], shifts: &[Shift], i: usize, j: usize) -> f64 {
        if i == j {
            return 0.0;
        }
        let mut buf = [0usize; 4];
        let count = affected_edges(i, j, order.len(), &mut buf);
        let edges = &buf[..count];

        let swapped = |p: usize| {
            if p == i {
                order[j]
            } else if p == j {
                order[i]
            } else {
                order[p]
            }
        };
        let before: f64 = edges
            .iter()
            .map(|&e| self.edge_cost(order[e], order[e + 1], shifts[order[e]], shifts[order[e + 1]]))
            .sum();
        let after: f64 = edges
            .iter()
            .map(|&e| {
                let (a, b) = (swapped(e), swapped(e + 1));
                self.edge_cost(a, b, shifts[a], shifts[b])
            })
            .sum();
        after - before
    }

    /// Swap positions `a` and `b`, re-pick the shift of both moved tracks, and
    /// return the exact cost change.
    pub fn propose_swap(
        &self,
        order: &mut [usize],
        shifts: &mut [Shift],
        a: usize,
        b: usize,
    ) -> SwapMove {
        let mut buf = [0usize; 4];
        let count = affected_edges(a, b, order.len(), &mut buf);
        let edges = &buf[..count];

        let (track_a, track_b) = (order[a], order[b]);
        let (old_shift_a, old_shift_b) = (shifts[track_a], shifts[track_b]);
        let before = self.sum_edge_costs(edges, order, shifts)
            + self.shift_cost(old_shift_a)
            + self.shift_cost(old_shift_b);

        order.swap(a, b);
        self.optimize_shift_at(order, shifts, a);
        self.optimize_shift_at(order, shifts, b);

        let after = self.sum_edge_costs(edges, order, shifts)
            + self.shift_cost(shifts[track_a])
            + self.shift_cost(shifts[track_b]);

        SwapMove {
            a,
            b,
            delta: after - before,
            track_a,
            track_b,
            old_shift_a,
            old_shift_b,
        }
    }

    /// Revert a move returned by [`propose_swap`](Self::propose_swap).
    pub fn undo(&self, order: &mut [usize], shifts: &mut [Shift], mv: &SwapMove) {
        order.swap(mv.a, mv.b);
        shifts[mv.track_a] = mv.old_shift_a;
        shifts[mv.track_b] = mv.old_shift_b;
    }

    /// Pick the shift for the track at `pos` that minimizes its two edges plus
    /// its own shift penalty, neighbours fixed. Keeps the current shift on ties.
    pub fn optimize_shift_at(&self, order: &[usize], shifts: &mut [Shift], pos: usize) {
        let n = order.len();
        let track = order[pos];
        let local_cost = |s: Shift| -> f64 {
            let mut c = self.shift_cost(s);
            if pos > 0 {
                let prev = order[pos - 1];
                c += self.edge_cost(prev, track, shifts[prev], s);
            }
            if pos < n - 1 {
                let next = order[pos + 1];
                c += self.edge_cost(track, next, s, shifts[next]);
            }
            c
        };

        let mut best_shift = shifts[track];
        let mut best_cost = local_cost(best_shift);
        for s in Shift::ALL {
            let c = local_cost(s);
            if c < best_cost {
                best_cost = c;
                best_shift = s;
            }
        }
        shifts[track] = best_shift;
    }

    /// Average of each track's incoming and outgoing edge costs, indexed by track.
    pub fn per_track_costs(&self, order: &[usize], shifts: &[Shift]) -> Vec<f64> {
        let n = order.len();
        let mut costs = vec![0.0; n];
        for pos in 0..n {
            let track = order[pos];
            let mut sum = 0.0;
            let mut count = 0usize;
            if pos > 0 {
                let prev = order[pos - 1];
                sum += self.edge_cost(prev, track, shifts[prev], shifts[track]);
                count += 1;
            }
            if pos < n - 1 {
                let next = order[pos + 1];
                sum += self.edge_cost(track, next, shifts[track], shifts[next]);
                count += 1;
            }
            if count > 0 {
                costs[track] = sum / count as f64;
            }
        }
        costs
    }

    fn sum_edge_costs(&self, edges: &[usize], order: &[usize], shifts: &[Shift]) -> f64 {
        edges
            .iter()
            .map(|&e| {
                let (a, b) = (order[e], order[e + 1]);
                self.edge_cost(a, b, shifts[a], shifts[b])
            })
            .sum()
    }
}

/// Edge start positions (edge `j` joins positions `j` and `j + 1`) touched by
/// swapping positions `a` and `b`. Writes them to `out` and returns how many.
pub fn affected_edges(a: usize, b: usize, n: usize, out: &mut [usize; 4]) -> usize {
    let mut count = 0;
    for &p in &[a, b] {
        if p > 0 && !out[..count].contains(&(p - 1)) {
            out[count] = p - 1;
            count += 1;
        }
        if p + 1 < n && !out[..count].contains(&p) {
            out[count] = p;
            count += 1;
        }
    }
    count
}

#[cfg(test)]
mod tests {
    use super::*;

    fn track(bpm: u32, key: &str) -> Track {
        Track::new(key, bpm, key.parse().unwrap())
    }

    fn key(s: &str) -> Key {
        s.parse().unwrap()
    }

    #[test]
    fn direct_costs_follow_relations() {
        let tables = CostTables::build(&CostConfig::default());
        assert_eq!(tables.direct(key("8A"), key("8A")), 0.0);
        assert_eq!(tables.direct(key("8A"), key("9A")), 0.5);
        assert_eq!(tables.direct(key("8A"), key("8B")), 0.5);
        assert_eq!(tables.direct(key("8A"), key("9B")), 5.0);
        assert_eq!(tables.direct(key("8A"), key("3A")), 5.0);
    }

    #[test]
    fn unreachable_pairs_pay_the_multiplier() {
        let tables = CostTables::build(&CostConfig::default());
        // Two steps apart: bridged by 9A, so plain non-harmonic.
        assert_eq!(tables.indirect(key("8A"), key("10A")), 1.0);
        assert_eq!(tables.harmonic(key("8A"), key("10A")), 5.0);
        // Diagonal neighbour: bridged by 8B or 9A.
        assert_eq!(tables.harmonic(key("8A"), key("9B")), 5.0);
        // Far apart: nothing helps.
        assert!(tables.is_unreachable(key("8A"), key("3A")));
        assert_eq!(tables.harmonic(key("8A"), key("3A")), 15.0);
        // Compatible pairs are never unreachable.
        assert_eq!(tables.harmonic(key("8A"), key("9A")), 0.5);
    }

    #[test]
    fn tables_are_symmetric() {
        let tables = CostTables::build(&CostConfig::default());
        for a in Key::ALL {
            for b in Key::ALL {
                assert_eq!(tables.harmonic(a, b), tables.harmonic(b, a));
                assert!(tables.indirect(a, b) <= tables.direct(a, b));
            }
        }
    }

    #[test]
    fn same_key_close_tempo_costs_nothing() {
        let model = CostModel::new(&[track(120, "8A"), track(121, "8A")], &CostConfig::default());
        let cost = model.total_cost(&[0, 1], &[Shift::Zero, Shift::Zero]);
        assert_eq!(cost, CostBreakdown::new(0.0, 0.0, 0.0));
        assert_eq!(cost.total, 0.0);
    }

    #[test]
    fn tempo_gap_above_break_is_flagged() {
        let model = CostModel::new(&[track(100, "8A"), track(120, "3A")], &CostConfig::default());
        let t = model.transition(0, 1, Shift::Zero, Shift::Zero);
        assert_eq!(t.harmonic, 15.0);
        assert_eq!(t.tempo, 5.0);
        assert_eq!(t.bpm_gap, 20);
        assert!(t.tempo_break);

        // Lowering 3A by a semitone lands on 8A.
        let t = model.transition(0, 1, Shift::Zero, Shift::Down);
        assert_eq!(t.harmonic, 0.0);
        let cost = model.total_cost(&[0, 1], &[Shift::Zero, Shift::Down]);
        assert_eq!(cost, CostBreakdown::new(0.0, 5.0, 1.0));
    }

    #[test]
    fn tempo_gap_between_threshold_and_break_is_not_flagged() {
        let model = CostModel::new(&[track(120, "8A"), track(127, "8A")], &CostConfig::default());
        let t = model.transition(0, 1, Shift::Zero, Shift::Zero);
        assert_eq!(t.tempo, 5.0);
        assert!(!t.tempo_break);
    }

    #[test]
    fn tempo_weight_scales_tempo_component() {
        let config = CostConfig {
            tempo_weight: 3.0,
            ..CostConfig::default()
        };
        let model = CostModel::new(&[track(120, "8A"), track(130, "8A")], &config);
        assert_eq!(model.total_cost(&[0, 1], &[Shift::Zero; 2]).tempo, 15.0);
    }

    #[test]
    fn affected_edges_dedups_neighbours() {
        let mut buf = [0; 4];
        let n = affected_edges(2, 3, 6, &mut buf);
        let mut got = buf[..n].to_vec();
        got.sort_unstable();
        assert_eq!(got, vec![1, 2, 3]);

        let n = affected_edges(0, 5, 6, &mut buf);
        let mut got = buf[..n].to_vec();
        got.sort_unstable();
        assert_eq!(got, vec![0, 4]);

        assert_eq!(affected_edges(0, 1, 2, &mut buf), 1);
    }

    #[test]
    fn swap_delta_matches_full_recompute() {
        let tracks = vec![
            track(120, "8A"),
            track(124, "9A"),
            track(128, "3B"),
            track(100, "12A"),
            track(121, "8B"),
        ];
        let model = CostModel::new(&tracks, &CostConfig::default());
        let order = vec![3, 0, 4, 2, 1];
        let shifts = vec![Shift::Up, Shift::Zero, Shift::Down, Shift::Zero, Shift::Up];
        let before = model.total_cost(&order, &shifts).total;
        for i in 0..5 {
            for j in 0..5 {
                let mut swapped = order.clone();
                swapped.swap(i, j);
                let after = model.total_cost(&swapped, &shifts).total;
                let delta = model.delta_cost(&order, &shifts, i, j);
                assert!((after - before - delta).abs() < 1e-9, "swap {i},{j}");
            }
        }
    }

    #[test]
    fn propose_then_undo_restores_state() {
        let tracks = vec![
            track(100, "8A"),
            track(120, "3A"),
            track(101, "9A"),
            track(119, "2A"),
        ];
        let model = CostModel::new(&tracks, &CostConfig::default());
        let mut order = vec![0, 1, 2, 3];
        let mut shifts = vec![Shift::Zero; 4];
        let before = model.total_cost(&order, &shifts).total;

        let mv = model.propose_swap(&mut order, &mut shifts, 1, 2);
        let after = model.total_cost(&order, &shifts).total;
        assert!((after - before - mv.delta).abs() < 1e-9);

        model.undo(&mut order, &mut shifts, &mv);
        assert_eq!(order, vec![0, 1, 2, 3]);
        assert_eq!(shifts, vec![Shift::Zero; 4]);
    }

    #[test]
    fn greedy_shift_finds_the_rescuing_semitone() {
        let model = CostModel::new(&[track(100, "8A"), track(120, "3A")], &CostConfig::default());
        let order = [0, 1];
        let mut shifts = [Shift::Zero, Shift::Zero];
        model.optimize_shift_at(&order, &mut shifts, 1);
        assert_eq!(shifts[1], Shift::Down);
    }

    #[test]
    fn per_track_costs_average_neighbours() {
        let tracks = vec![track(120, "8A"), track(120, "9A"), track(130, "9A")];
        let model = CostModel::new(&tracks, &CostConfig::default());
        let costs = model.per_track_costs(&[0, 1, 2], &[Shift::Zero; 3]);
        assert_eq!(costs[0], 0.5);
        assert_eq!(costs[1], (0.5 + 5.0) / 2.0);
        assert_eq!(costs[2], 5.0);
    }
}
