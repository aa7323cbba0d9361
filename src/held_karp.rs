//! Held-Karp exact dynamic-programming solver for the shortest Hamiltonian path
//! over (track, shift) pairs.
//!
//! Minimises
//!
//!   Σ edge_cost(π[i], π[i+1], s[π[i]], s[π[i+1]])   for i in 0..n-1
//!   + shift_penalty * |{ i : s[i] ≠ 0 }|
//!
//! DP state:
//!   dp[(mask * n + last) * 3 + s_idx]  =  minimum cost to
//!       • visit exactly the tracks whose bits are set in `mask`
//!       • end at track `last`
//!       • with shift `s_idx - 1` for that last track
//!
//! Time  O(2ⁿ · n² · 9), space O(2ⁿ · n · 3) f64s:
//!   n = 17 : ~53 MB
//!   n = 20 : ~503 MB
//!   beyond : route to annealing

use std::time::Instant;

use tracing::{debug, info};

use crate::config::EXACT_HARD_LIMIT;
use crate::cost::{CostModel, Solution};
use crate::error::{MixError, Result};
use crate::key::Shift;

/// Exact optimum for the tracks in `model`. Deterministic: ties resolve to
/// the lowest track index, then the lowest shift.
///
/// Errors with [`MixError::ExactSolverUnavailable`] above `max_tracks`; the
/// caller is expected to route larger playlists elsewhere.
pub fn solve(model: &CostModel, max_tracks: usize) -> Result<Solution> {
    let n = model.len();
    let max = max_tracks.min(EXACT_HARD_LIMIT);
    if n > max {
        return Err(MixError::ExactSolverUnavailable { tracks: n, max });
    }
    if n < 2 {
        return Ok(Solution::trivial(n));
    }

    let started = Instant::now();
    let num_masks = 1usize << n;
    info!(tracks = n, states = num_masks * n * 3, "running exact solver");

    let table = Table::new(model);
    let idx = |mask: usize, last: usize, s_idx: usize| (mask * n + last) * 3 + s_idx;
    let mut dp = vec![f64::INFINITY; num_masks * n * 3];

    // Single-track paths.
    for i in 0..n {
        for s_idx in 0..3 {
            dp[idx(1 << i, i, s_idx)] = table.penalty[s_idx];
        }
    }

    // new_mask = mask | (1 << j) is always larger than mask, so ascending
    // order finishes every subset before any superset reads it.
    for mask in 1..num_masks {
        for last in 0..n {
            if mask & (1 << last) == 0 {
                continue;
            }
            for s_idx in 0..3 {
                let current = dp[idx(mask, last, s_idx)];
                if current == f64::INFINITY {
                    continue;
                }
                for j in 0..n {
                    if mask & (1 << j) != 0 {
                        continue;
                    }
                    let new_mask = mask | (1 << j);
                    for sj_idx in 0..3 {
                        let cost = table.step(current, last, s_idx, j, sj_idx);
                        let target = idx(new_mask, j, sj_idx);
                        if cost < dp[target] {
                            dp[target] = cost;
                        }
                    }
                }
            }
        }
    }

    let full_mask = num_masks - 1;
    let mut best_cost = f64::INFINITY;
    let mut best_last = 0;
    let mut best_s_idx = 1;
    for last in 0..n {
        for s_idx in 0..3 {
            let c = dp[idx(full_mask, last, s_idx)];
            if c < best_cost {
                best_cost = c;
                best_last = last;
                best_s_idx = s_idx;
            }
        }
    }

    let (order, shifts) = reconstruct(&dp, &table, n, best_last, best_s_idx)?;
    let solution = Solution::evaluate(model, order, shifts);
    debug!(
        cost = best_cost,
        recomputed = solution.cost.total,
        elapsed_secs = started.elapsed().as_secs_f64(),
        "exact solver finished"
    );
    Ok(solution)
}

/// Walk back from the optimal final state without a parent table: at each
/// step take the first predecessor (lowest track, then lowest shift) whose
/// recorded value plus the transition reproduces the current value.
fn reconstruct(
    dp: &[f64],
    table: &Table,
    n: usize,
    last: usize,
    s_idx: usize,
) -> Result<(Vec<usize>, Vec<Shift>)> {
    let idx = |mask: usize, last: usize, s_idx: usize| (mask * n + last) * 3 + s_idx;
    let mut order = Vec::with_capacity(n);
    let mut shifts = vec![Shift::Zero; n];

    let mut cur_mask = (1usize << n) - 1;
    let mut cur_last = last;
    let mut cur_s_idx = s_idx;

    loop {
        order.push(cur_last);
        shifts[cur_last] = Shift::from_index(cur_s_idx);
        if cur_mask.count_ones() == 1 {
            break;
        }

        let cur_cost = dp[idx(cur_mask, cur_last, cur_s_idx)];
        let tolerance = 1e-9 * cur_cost.abs().max(1.0);
        let prev_mask = cur_mask ^ (1 << cur_last);

        let prev = (0..n)
            .filter(|&p| prev_mask & (1 << p) != 0)
            .flat_map(|p| (0..3).map(move |ps| (p, ps)))
            .find(|&(p, ps)| {
                let prev_cost = dp[idx(prev_mask, p, ps)];
                prev_cost.is_finite()
                    && (table.step(prev_cost, p, ps, cur_last, cur_s_idx) - cur_cost).abs()
                        <= tolerance
            })
            .ok_or(MixError::Reconstruction { mask: cur_mask })?;

        cur_mask = prev_mask;
        (cur_last, cur_s_idx) = prev;
    }

    // Built from the end backwards.
    order.reverse();
    Ok((order, shifts))
}

/// Every (track, shift) → (track, shift) edge cost, precomputed.
struct Table {
    n: usize,
    edges: Vec<f64>,
    penalty: [f64; 3],
}

impl Table {
    fn new(model: &CostModel) -> Self {
        let n = model.len();
        let mut edges = vec![0.0; n * 3 * n * 3];
        for a in 0..n {
            for sa in Shift::ALL {
                for b in 0..n {
                    for sb in Shift::ALL {
                        let row = a * 3 + sa.index();
                        let col = b * 3 + sb.index();
                        edges[row * n * 3 + col] = model.edge_cost(a, b, sa, sb);
                    }
                }
            }
        }
        Self {
            n,
            edges,
            penalty: Shift::ALL.map(|s| model.shift_cost(s)),
        }
    }

    /// Cost of extending a path worth `from_cost` ending at (a, sa) with (b, sb).
    /// Shared by the forward pass and reconstruction so both do identical arithmetic.
    #[inline(always)]
    fn step(&self, from_cost: f64, a: usize, sa: usize, b: usize, sb: usize) -> f64 {
        from_cost + self.edges[(a * 3 + sa) * self.n * 3 + b * 3 + sb] + self.penalty[sb]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CostConfig;
    use crate::track::Track;

    fn model(specs: &[(u32, &str)]) -> CostModel {
        let tracks: Vec<Track> = specs
            .iter()
            .enumerate()
            .map(|(i, &(bpm, key))| Track::new(i.to_string(), bpm, key.parse().unwrap()))
            .collect();
        CostModel::new(&tracks, &CostConfig::default())
    }

    /// Brute force over every permutation and shift assignment.
    fn brute_force(model: &CostModel) -> f64 {
        fn permutations(items: &mut Vec<usize>, k: usize, out: &mut Vec<Vec<usize>>) {
            if k == items.len() {
                out.push(items.clone());
                return;
            }
            for i in k..items.len() {
                items.swap(k, i);
                permutations(items, k + 1, out);
                items.swap(k, i);
            }
        }
        let n = model.len();
        let mut perms = Vec::new();
        permutations(&mut (0..n).collect(), 0, &mut perms);
        let mut best = f64::INFINITY;
        for code in 0..3usize.pow(n as u32) {
            let shifts: Vec<Shift> = (0..n)
                .map(|i| Shift::from_index(code / 3usize.pow(i as u32) % 3))
                .collect();
            for order in &perms {
                best = best.min(model.total_cost(order, &shifts).total);
            }
        }
        best
    }

    #[test]
    fn matches_brute_force_on_small_instances() {
        let instances: [&[(u32, &str)]; 3] = [
            &[(100, "8A"), (120, "3A"), (101, "9B")],
            &[(120, "1A"), (124, "5B"), (128, "9A"), (122, "12B")],
            &[(90, "2A"), (128, "2B"), (127, "7A"), (91, "11B"), (129, "6A")],
        ];
        for specs in instances {
            let m = model(specs);
            let solution = solve(&m, 20).unwrap();
            assert!(
                (solution.cost.total - brute_force(&m)).abs() < 1e-9,
                "instance {specs:?}"
            );
        }
    }

    #[test]
    fn two_tracks_semitone_apart() {
        let m = model(&[(100, "8A"), (120, "3A")]);
        let solution = solve(&m, 20).unwrap();
        assert_eq!(solution.cost.total, 6.0);
        assert_eq!(solution.cost.harmonic, 0.0);
        assert_eq!(solution.cost.tempo, 5.0);
        assert_eq!(solution.cost.shift, 1.0);
        assert_eq!(solution.shifts.iter().filter(|s| s.is_shifted()).count(), 1);
    }

    #[test]
    fn ties_resolve_deterministically() {
        let m = model(&[(120, "8A"), (120, "8A"), (120, "8A")]);
        let solution = solve(&m, 20).unwrap();
        assert_eq!(solution.cost.total, 0.0);
        // Lowest final track and lowest predecessors give the reversed identity.
        assert_eq!(solution.order, vec![2, 1, 0]);
        assert_eq!(solution.shifts, vec![Shift::Zero; 3]);
    }

    #[test]
    fn rejects_more_tracks_than_the_bound() {
        let m = model(&[(120, "8A"), (121, "8A"), (122, "8A")]);
        assert!(matches!(
            solve(&m, 2),
            Err(MixError::ExactSolverUnavailable { tracks: 3, max: 2 })
        ));
    }

    #[test]
    fn trivial_sizes() {
        let m = model(&[]);
        assert!(solve(&m, 20).unwrap().order.is_empty());
        let m = model(&[(120, "8A")]);
        let solution = solve(&m, 20).unwrap();
        assert_eq!(solution.order, vec![0]);
        assert_eq!(solution.cost.total, 0.0);
    }
}
