use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::solver::SolveOptions;
use crate::storage::{EngineMetrics, Goal, Reduction, ReductionPolicy};
use crate::types::Result;

/// Configuration options supplied when building a [`super::Network`].
#[derive(Clone)]
pub struct NetworkOptions {
    /// How constituent biases combine into an arnode bias.
    pub bias_reduction: Reduction,
    /// Replaces the goal-derived reduction policy entirely.
    pub policy: Option<ReductionPolicy>,
    /// Whether full activation re-checks that incoming sources are ready.
    pub check_activation_validity: bool,
    /// Exclusive upper bound on abstract solver variable ids.
    pub variable_limit: Option<u64>,
    /// Optional metrics collection implementation.
    pub metrics: Option<Arc<dyn EngineMetrics>>,
}

impl NetworkOptions {
    /// Creates options with default settings.
    pub fn new() -> Self {
        Self {
            bias_reduction: Reduction::Sum,
            policy: None,
            check_activation_validity: true,
            variable_limit: None,
            metrics: None,
        }
    }

    /// Sets the bias reduction. Defaults to [`Reduction::Sum`].
    ///
    /// Summed biases are exact for zero-bias networks and over-approximate
    /// positive biases. Negative biases summed across merged neurons push
    /// the merged neuron below every member, which under-approximates the
    /// output; `Reduction::Max` keeps a maximizing abstraction sound on
    /// increasing tables.
    pub fn bias_reduction(mut self, reduction: Reduction) -> Self {
        self.bias_reduction = reduction;
        self
    }

    /// Uses `policy` regardless of the property direction.
    pub fn policy(mut self, policy: ReductionPolicy) -> Self {
        self.policy = Some(policy);
        self
    }

    /// Enables or disables the readiness check during full activation.
    pub fn check_activation_validity(mut self, enabled: bool) -> Self {
        self.check_activation_validity = enabled;
        self
    }

    /// Bounds the number of abstract solver variables.
    pub fn variable_limit(mut self, limit: u64) -> Self {
        self.variable_limit = Some(limit);
        self
    }

    /// Sets the metrics sink.
    pub fn metrics(mut self, metrics: Arc<dyn EngineMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Reduction policy for a property pursuing `goal`.
    pub fn reduction_policy(&self, goal: Goal) -> ReductionPolicy {
        self.policy
            .clone()
            .unwrap_or_else(|| ReductionPolicy::for_goal(goal).with_bias(self.bias_reduction))
    }
}

impl Default for NetworkOptions {
    fn default() -> Self {
        Self::new()
    }
}

/// `[solver]` table.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SolverSection {
    /// Per-call budget in milliseconds.
    pub timeout_ms: Option<u64>,
    /// JSON-lines file receiving solver statistics.
    pub log_path: Option<PathBuf>,
}

/// `[abstraction]` table.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AbstractionSection {
    /// `"sum"`, `"max"` or `"min"`.
    pub bias_reduction: Reduction,
    /// See [`NetworkOptions::check_activation_validity`].
    pub check_activation_validity: bool,
    /// See [`NetworkOptions::variable_limit`].
    pub variable_limit: Option<u64>,
}

impl Default for AbstractionSection {
    fn default() -> Self {
        Self {
            bias_reduction: Reduction::Sum,
            check_activation_validity: true,
            variable_limit: None,
        }
    }
}

/// `[refinement]` table.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RefinementSection {
    /// Stop coarsening after this many merges.
    pub merge_budget: Option<usize>,
    /// Give up after this many splits.
    pub max_refinements: Option<usize>,
}

/// CEGAR run configuration, usually read from a TOML file:
///
/// ```toml
/// [solver]
/// timeout_ms = 5000
///
/// [abstraction]
/// bias_reduction = "sum"
///
/// [refinement]
/// max_refinements = 32
/// ```
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CegarConfig {
    /// Solver settings.
    pub solver: SolverSection,
    /// Abstraction settings.
    pub abstraction: AbstractionSection,
    /// Merge and split budgets.
    pub refinement: RefinementSection,
}

impl CegarConfig {
    /// Parses a TOML document. Unknown keys are rejected.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Reads and parses a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// Network options carrying the `[abstraction]` settings.
    pub fn network_options(&self) -> NetworkOptions {
        let mut options = NetworkOptions::new()
            .bias_reduction(self.abstraction.bias_reduction)
            .check_activation_validity(self.abstraction.check_activation_validity);
        if let Some(limit) = self.abstraction.variable_limit {
            options = options.variable_limit(limit);
        }
        options
    }

    /// Solver options carrying the `[solver]` settings.
    pub fn solve_options(&self) -> SolveOptions {
        SolveOptions {
            timeout: self.solver.timeout_ms.map(Duration::from_millis),
            log_path: self.solver.log_path.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::Category;
    use crate::types::CegarError;

    #[test]
    fn empty_document_yields_defaults() {
        let config = CegarConfig::from_toml_str("").unwrap();
        assert_eq!(config, CegarConfig::default());
        assert!(config.solve_options().timeout.is_none());
        let options = config.network_options();
        assert_eq!(options.bias_reduction, Reduction::Sum);
        assert!(options.check_activation_validity);
    }

    #[test]
    fn sections_map_onto_options() {
        let config = CegarConfig::from_toml_str(
            r#"
            [solver]
            timeout_ms = 250
            log_path = "solver.jsonl"

            [abstraction]
            bias_reduction = "max"
            variable_limit = 64

            [refinement]
            merge_budget = 3
            "#,
        )
        .unwrap();
        let solve = config.solve_options();
        assert_eq!(solve.timeout, Some(Duration::from_millis(250)));
        assert_eq!(solve.log_path, Some(PathBuf::from("solver.jsonl")));
        let options = config.network_options();
        assert_eq!(options.variable_limit, Some(64));
        let policy = options.reduction_policy(Goal::Maximize);
        assert_eq!(policy.bias(Category::PositiveIncreasing), Reduction::Max);
        assert_eq!(config.refinement.merge_budget, Some(3));
        assert_eq!(config.refinement.max_refinements, None);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let err = CegarConfig::from_toml_str("[solver]\ntimeout = 3\n").unwrap_err();
        assert!(matches!(err, CegarError::Config(_)));
    }

    #[test]
    fn explicit_policy_wins_over_goal() {
        let fixed = ReductionPolicy::uniform(Reduction::Sum, Reduction::Sum, Reduction::Max);
        let options = NetworkOptions::new().policy(fixed.clone());
        assert_eq!(options.reduction_policy(Goal::Minimize), fixed);
    }
}
