//! Configuration for the cost model, the annealer and solver routing.
//!
//! Every field has a default, so a TOML file only needs the values it
//! overrides:
//!
//! ```rust
//! use ydj_mix_sequencer::MixConfig;
//!
//! let config = MixConfig::from_toml_str(
//!     r#"
//!     [annealing]
//!     time_budget_seconds = 10.0
//!     "#,
//! )
//! .expect("valid config");
//! assert_eq!(config.cost.tempo_threshold_bpm, 4.5);
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{MixError, Result};

/// Largest playlist the exact solver can be configured for.
pub const EXACT_HARD_LIMIT: usize = 24;

/// Constants of the transition cost model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CostConfig {
    /// BPM gap up to which a transition costs nothing.
    pub tempo_threshold_bpm: f64,
    /// Cost of a transition whose BPM gap exceeds the threshold.
    pub tempo_penalty: f64,
    /// Gaps above `tempo_break_multiplier * tempo_threshold_bpm` are reported as tempo breaks.
    pub tempo_break_multiplier: f64,
    /// Weight applied to the tempo penalty.
    pub tempo_weight: f64,
    /// Cost of a compatible neighbour on the wheel (adjacent position or relative mode).
    pub compatible_cost: f64,
    /// Cost of any other key change.
    pub non_harmonic_cost: f64,
    /// Multiple of `non_harmonic_cost` charged when no single bridge key could rescue the pair.
    pub unreachable_multiplier: f64,
    /// Charged once per track played with a non-zero shift.
    pub shift_penalty: f64,
    /// Harmonic cost at or above which a transition gets a bridge-key suggestion.
    pub bridge_threshold: f64,
}

impl Default for CostConfig {
    fn default() -> Self {
        Self {
            tempo_threshold_bpm: 4.5,
            tempo_penalty: 5.0,
            tempo_break_multiplier: 2.0,
            tempo_weight: 1.0,
            compatible_cost: 0.5,
            non_harmonic_cost: 5.0,
            unreachable_multiplier: 3.0,
            shift_penalty: 1.0,
            bridge_threshold: 5.0,
        }
    }
}

impl CostConfig {
    /// Override one field by name, as the bindings receive them.
    pub fn set(&mut self, name: &str, value: f64) -> Result<()> {
        let field = match name {
            "tempo_threshold_bpm" => &mut self.tempo_threshold_bpm,
            "tempo_penalty" => &mut self.tempo_penalty,
            "tempo_break_multiplier" => &mut self.tempo_break_multiplier,
            "tempo_weight" => &mut self.tempo_weight,
            "compatible_cost" => &mut self.compatible_cost,
            "non_harmonic_cost" => &mut self.non_harmonic_cost,
            "unreachable_multiplier" => &mut self.unreachable_multiplier,
            "shift_penalty" => &mut self.shift_penalty,
            "bridge_threshold" => &mut self.bridge_threshold,
            other => {
                return Err(MixError::config(
                    "cost",
                    format!("unknown parameter '{other}'"),
                ))
            }
        };
        *field = value;
        Ok(())
    }

    /// BPM gap above which a transition is flagged as a tempo break.
    pub fn tempo_break_threshold(&self) -> f64 {
        self.tempo_break_multiplier * self.tempo_threshold_bpm
    }

    pub fn validate(&self) -> Result<()> {
        positive("cost.tempo_threshold_bpm", self.tempo_threshold_bpm)?;
        non_negative("cost.tempo_penalty", self.tempo_penalty)?;
        positive("cost.tempo_break_multiplier", self.tempo_break_multiplier)?;
        non_negative("cost.tempo_weight", self.tempo_weight)?;
        non_negative("cost.compatible_cost", self.compatible_cost)?;
        positive("cost.non_harmonic_cost", self.non_harmonic_cost)?;
        non_negative("cost.shift_penalty", self.shift_penalty)?;
        positive("cost.bridge_threshold", self.bridge_threshold)?;
        if self.compatible_cost > self.non_harmonic_cost {
            return Err(MixError::config(
                "cost.compatible_cost",
                "must not exceed non_harmonic_cost",
            ));
        }
        if !self.unreachable_multiplier.is_finite() || self.unreachable_multiplier < 1.0 {
            return Err(MixError::config(
                "cost.unreachable_multiplier",
                format!("must be at least 1, got {}", self.unreachable_multiplier),
            ));
        }
        Ok(())
    }
}

/// Simulated annealing schedule and outer-loop budget.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnnealingConfig {
    pub initial_temperature: f64,
    pub final_temperature: f64,
    /// Iterations per attempt; the schedule reaches `final_temperature` on the last one.
    pub iterations_per_attempt: usize,
    /// Wall-clock budget for the whole run. At least one attempt always completes.
    pub time_budget_seconds: f64,
    /// Iterations without a new attempt-best before an escape perturbation.
    pub stagnation_limit: usize,
    /// Share of positions re-randomized by an escape perturbation.
    pub perturbation_fraction: f64,
    /// Start attempts from random shifts instead of all-zero shifts.
    pub random_initial_shifts: bool,
    /// Worker threads for parallel attempts; 0 uses every core.
    pub threads: usize,
    /// Also check the deadline every this many iterations inside an attempt; 0 disables.
    pub deadline_check_interval: usize,
    /// Stop after this many attempts even if budget remains.
    pub max_attempts: Option<usize>,
    /// Seed for reproducible runs.
    pub seed: Option<u64>,
}

impl Default for AnnealingConfig {
    fn default() -> Self {
        Self {
            initial_temperature: 500.0,
            final_temperature: 0.1,
            iterations_per_attempt: 410_000,
            time_budget_seconds: 300.0,
            stagnation_limit: 20_000,
            perturbation_fraction: 0.2,
            random_initial_shifts: true,
            threads: 0,
            deadline_check_interval: 0,
            max_attempts: None,
            seed: None,
        }
    }
}

impl AnnealingConfig {
    /// Override one field by name. Counts are truncated; a non-zero value
    /// enables `random_initial_shifts`.
    pub fn set(&mut self, name: &str, value: f64) -> Result<()> {
        match name {
            "initial_temperature" => self.initial_temperature = value,
            "final_temperature" => self.final_temperature = value,
            "iterations_per_attempt" => self.iterations_per_attempt = value as usize,
            "time_budget_seconds" => self.time_budget_seconds = value,
            "stagnation_limit" => self.stagnation_limit = value as usize,
            "perturbation_fraction" => self.perturbation_fraction = value,
            "random_initial_shifts" => self.random_initial_shifts = value != 0.0,
            "threads" => self.threads = value as usize,
            "deadline_check_interval" => self.deadline_check_interval = value as usize,
            "max_attempts" => self.max_attempts = Some(value as usize),
            "seed" => self.seed = Some(value as u64),
            other => {
                return Err(MixError::config(
                    "annealing",
                    format!("unknown parameter '{other}'"),
                ))
            }
        }
        Ok(())
    }

    /// Per-iteration multiplier taking the temperature from initial to final
    /// in exactly `iterations_per_attempt` steps.
    pub fn cooling_factor(&self) -> f64 {
        ((self.final_temperature / self.initial_temperature).ln()
            / self.iterations_per_attempt as f64)
            .exp()
    }

    /// Saturates at [`Duration::MAX`]; `validate` rejects budgets that large.
    pub fn time_budget(&self) -> Duration {
        Duration::try_from_secs_f64(self.time_budget_seconds).unwrap_or(Duration::MAX)
    }

    pub fn validate(&self) -> Result<()> {
        positive("annealing.initial_temperature", self.initial_temperature)?;
        positive("annealing.final_temperature", self.final_temperature)?;
        positive("annealing.time_budget_seconds", self.time_budget_seconds)?;
        if Duration::try_from_secs_f64(self.time_budget_seconds).is_err() {
            return Err(MixError::config(
                "annealing.time_budget_seconds",
                format!("{} seconds is out of range", self.time_budget_seconds),
            ));
        }
        if self.final_temperature >= self.initial_temperature {
            return Err(MixError::config(
                "annealing.final_temperature",
                "must be below initial_temperature",
            ));
        }
        if self.iterations_per_attempt == 0 {
            return Err(MixError::config(
                "annealing.iterations_per_attempt",
                "must be positive",
            ));
        }
        if self.stagnation_limit == 0 {
            return Err(MixError::config(
                "annealing.stagnation_limit",
                "must be positive",
            ));
        }
        if !(self.perturbation_fraction > 0.0 && self.perturbation_fraction <= 1.0) {
            return Err(MixError::config(
                "annealing.perturbation_fraction",
                format!("must be in (0, 1], got {}", self.perturbation_fraction),
            ));
        }
        if self.max_attempts == Some(0) {
            return Err(MixError::config(
                "annealing.max_attempts",
                "must be positive when set",
            ));
        }
        Ok(())
    }
}

/// Which solver the planner may use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SolverStrategy {
    /// Exact when the playlist is small enough, annealing otherwise.
    #[default]
    Auto,
    /// Exact only; larger playlists are an error.
    Exact,
    /// Annealing regardless of size.
    Annealing,
}

/// Solver routing options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverConfig {
    pub strategy: SolverStrategy,
    /// Largest playlist routed to the exact solver.
    pub exact_max_tracks: usize,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            strategy: SolverStrategy::Auto,
            exact_max_tracks: 20,
        }
    }
}

impl SolverConfig {
    pub fn validate(&self) -> Result<()> {
        if self.exact_max_tracks > EXACT_HARD_LIMIT {
            return Err(MixError::config(
                "solver.exact_max_tracks",
                format!(
                    "{} exceeds the supported maximum of {EXACT_HARD_LIMIT}",
                    self.exact_max_tracks
                ),
            ));
        }
        Ok(())
    }
}

/// Complete configuration for [`plan_mix`](crate::plan_mix).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MixConfig {
    pub cost: CostConfig,
    pub annealing: AnnealingConfig,
    pub solver: SolverConfig,
}

impl MixConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: MixConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| MixError::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    pub fn validate(&self) -> Result<()> {
        self.cost.validate()?;
        self.annealing.validate()?;
        self.solver.validate()
    }
}

fn positive(field: &'static str, value: f64) -> Result<()> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(MixError::config(field, format!("must be positive, got {value}")))
    }
}

fn non_negative(field: &'static str, value: f64) -> Result<()> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(MixError::config(
            field,
            format!("must be non-negative, got {value}"),
        ))
    }
}
