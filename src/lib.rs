//! Harmonic and tempo-aware ordering of DJ playlists.
//!
//! Given tracks with a BPM and a Camelot key, [`plan_mix`] finds a play order
//! and a per-track pitch shift of -1, 0 or +1 semitones minimising
//!
//! * harmonic cost between consecutive effective keys,
//! * tempo cost for BPM jumps above the threshold,
//! * a penalty for every shifted track.
//!
//! Small playlists are solved exactly with Held-Karp dynamic programming,
//! larger ones with parallel simulated annealing under a wall-clock budget.
//! The result carries per-transition diagnostics: bridge-key suggestions for
//! costly key changes and tempo-break flags.

pub mod annealing;
pub mod config;
pub mod cost;
pub mod error;
pub mod held_karp;
pub mod key;
pub mod planner;
#[cfg(feature = "python")]
mod python;
pub mod report;
pub mod track;

pub use config::{AnnealingConfig, CostConfig, MixConfig, SolverConfig, SolverStrategy};
pub use cost::{CostBreakdown, CostModel, CostTables, Solution};
pub use error::{MixError, Result};
pub use key::{Key, Mode, Relation, Shift};
pub use planner::{plan_mix, plan_mix_with_cancel};
pub use report::{
    insertion_candidates, BridgeSuggestion, InsertionCandidate, MixPlan, SolverKind, Transition,
};
pub use track::Track;
