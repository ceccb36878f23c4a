//! Solver configuration.
use serde::Deserialize;

/// Restart policies.
///
/// The policies are mutually exclusive; see the `restart_policy` field of [`SolverConfig`].
#[derive(Copy, Clone, Eq, PartialEq, Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RestartPolicy {
    /// Restart when the conflicts since the last restart exceed a geometrically growing threshold.
    Geometric,
    /// Restart when the short term glue average exceeds the long term average (Glucose style).
    Glue,
    /// Restart when the polarity flip rate (agility) stays below a limit.
    Agility,
    /// Restart only when both the glue and the agility conditions hold.
    GlueAgility,
}

/// Metric used to rank redundant long clauses during database cleaning.
///
/// Lower ranked clauses are deleted first.
#[derive(Copy, Clone, Eq, PartialEq, Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CleanMetric {
    Glue,
    Size,
    Activity,
    /// Combined propagation and conflict participation count.
    Uses,
    /// Propagation count relative to the trail depth at which the clause was used.
    UsesPerDepth,
}

/// Strategy for accounting resolvents during bounded variable elimination.
#[derive(Copy, Clone, Eq, PartialEq, Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ElimStrategy {
    /// Estimate using the product of the occurrence counts and abort early.
    Heuristic,
    /// Count the exact number of non-tautological resolvents.
    Calculate,
}

/// Configurable parameters used during solving.
///
/// Every field documents its default value.
#[derive(Clone)]
pub struct SolverConfig {
    /// Multiplicative decay for the VSIDS decision heuristic. (Default: 0.95)
    pub vsids_decay: f32,

    /// Multiplicative decay for clause activities. (Default: 0.999)
    pub clause_activity_decay: f32,

    /// Learnt clauses with a glue below this get an extra activity bump for their variables.
    /// (Default: 3)
    pub glue_bump_limit: usize,

    /// Frequency of random decisions instead of the top activity pick. (Default: 0.0)
    pub random_decision_freq: f64,

    /// Number of top activity variables a random decision chooses from. (Default: 16)
    pub random_decision_top: usize,

    /// Derive initial phases from literal occurrence counts. (Default: true)
    pub init_phases_by_occurrence: bool,

    /// Invert all saved phases every this many restarts, 0 to disable. (Default: 1024)
    pub phase_flip_interval: u64,

    /// Selected restart policy. (Default: Glue)
    pub restart_policy: RestartPolicy,

    /// Conflicts before the first geometric restart. (Default: 100)
    pub restart_first: u64,

    /// Growth factor of the geometric restart threshold. (Default: 1.5)
    pub restart_inc: f64,

    /// Length of the short term glue average window. (Default: 50)
    pub glue_window: usize,

    /// A restart triggers when short term glue average times this exceeds the long term average.
    /// (Default: 0.8)
    pub glue_trigger_factor: f64,

    /// Suppress a triggered restart while the trail is much longer than its long term average.
    /// (Default: true)
    pub blocking_restart: bool,

    /// Length of the trail size window used for restart blocking. (Default: 5000)
    pub blocking_window: usize,

    /// Trail length factor above which a restart is blocked. (Default: 1.4)
    pub blocking_factor: f64,

    /// Decay of the polarity flip (agility) moving average. (Default: 0.9999)
    pub agility_decay: f64,

    /// Agility below this may trigger a restart. (Default: 0.20)
    pub agility_limit: f64,

    /// Conflicts between two database cleanings, grows by `increase_clean` after each. (Default:
    /// 10000)
    pub start_clean: u64,

    /// Growth factor for the cleaning interval. (Default: 1.1)
    pub increase_clean: f64,

    /// Metric ranking redundant clauses for cleaning. (Default: Glue)
    pub clean_metric: CleanMetric,

    /// Fraction of ranked redundant clauses preserved by a cleaning pass. (Default: 0.5)
    pub clean_keep_ratio: f64,

    /// Database cleanings between two inprocessing phases. (Default: 2)
    pub cleans_between_simplify: u32,

    /// Base bogo-props budget of a single inprocessing step. (Default: 4_000_000)
    pub inprocess_budget: u64,

    /// Growth of the global inprocessing budget multiplier per round. (Default: 1.4)
    pub inprocess_growth: f64,

    /// Run equivalent literal substitution when the new binary clauses since the last run exceed
    /// this percentage of the free variables. (Default: 1.0)
    pub scc_find_percent: f64,

    /// Attach lazy hyper-binary resolvents during propagation at decision level 1. (Default: true)
    pub lazy_hyper_binary: bool,

    /// Enable failed literal probing. (Default: true)
    pub probing: bool,

    /// Enable clause vivification. (Default: true)
    pub vivify: bool,

    /// Enable subsumption and self-subsuming resolution. (Default: true)
    pub subsume: bool,

    /// Enable bounded variable elimination. (Default: true)
    pub var_elim: bool,

    /// Extra resolvents allowed over the replaced clause count during variable elimination.
    /// (Default: 0)
    pub elim_growth: usize,

    /// Resolvent accounting strategy for variable elimination. (Default: Heuristic)
    pub elim_strategy: ElimStrategy,

    /// Skip elimination of variables whose occurrence product exceeds this. (Default: 800)
    pub elim_occ_limit: usize,

    /// Enable blocked clause elimination. (Default: true)
    pub blocked_clause_elim: bool,

    /// Enable XOR extraction from CNF clauses. (Default: true)
    pub xor_extract: bool,

    /// Largest clause size considered for XOR extraction. (Default: 6)
    pub xor_extract_max_size: usize,

    /// Decision level interval between Gauss matrix snapshots. (Default: 32)
    pub gauss_snapshot_interval: usize,

    /// Upper bound on the columns of a Gauss matrix that still takes snapshots; larger matrices
    /// are always refreshed from their level 0 state after backtracking. (Default: 4096)
    pub gauss_max_cols: usize,
}

impl Default for SolverConfig {
    fn default() -> SolverConfig {
        SolverConfig {
            vsids_decay: 0.95,
            clause_activity_decay: 0.999,
            glue_bump_limit: 3,
            random_decision_freq: 0.0,
            random_decision_top: 16,
            init_phases_by_occurrence: true,
            phase_flip_interval: 1024,
            restart_policy: RestartPolicy::Glue,
            restart_first: 100,
            restart_inc: 1.5,
            glue_window: 50,
            glue_trigger_factor: 0.8,
            blocking_restart: true,
            blocking_window: 5000,
            blocking_factor: 1.4,
            agility_decay: 0.9999,
            agility_limit: 0.20,
            start_clean: 10000,
            increase_clean: 1.1,
            clean_metric: CleanMetric::Glue,
            clean_keep_ratio: 0.5,
            cleans_between_simplify: 2,
            inprocess_budget: 4_000_000,
            inprocess_growth: 1.4,
            scc_find_percent: 1.0,
            lazy_hyper_binary: true,
            probing: true,
            vivify: true,
            subsume: true,
            var_elim: true,
            elim_growth: 0,
            elim_strategy: ElimStrategy::Heuristic,
            elim_occ_limit: 800,
            blocked_clause_elim: true,
            xor_extract: true,
            xor_extract_max_size: 6,
            gauss_snapshot_interval: 32,
            gauss_max_cols: 4096,
        }
    }
}

/// A partial configuration, used to change selected parameters of a running solver.
///
/// Deserializable from TOML, e.g. for the command line `-C` options.
#[derive(Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SolverConfigUpdate {
    pub vsids_decay: Option<f32>,
    pub clause_activity_decay: Option<f32>,
    pub random_decision_freq: Option<f64>,
    pub phase_flip_interval: Option<u64>,
    pub restart_policy: Option<RestartPolicy>,
    pub restart_first: Option<u64>,
    pub restart_inc: Option<f64>,
    pub blocking_restart: Option<bool>,
    pub start_clean: Option<u64>,
    pub increase_clean: Option<f64>,
    pub clean_metric: Option<CleanMetric>,
    pub clean_keep_ratio: Option<f64>,
    pub cleans_between_simplify: Option<u32>,
    pub inprocess_budget: Option<u64>,
    pub inprocess_growth: Option<f64>,
    pub lazy_hyper_binary: Option<bool>,
    pub probing: Option<bool>,
    pub vivify: Option<bool>,
    pub subsume: Option<bool>,
    pub var_elim: Option<bool>,
    pub elim_strategy: Option<ElimStrategy>,
    pub blocked_clause_elim: Option<bool>,
    pub xor_extract: Option<bool>,
    pub gauss_snapshot_interval: Option<usize>,
}

macro_rules! merge_fields {
    ($from:expr, $into:expr, $( $field:ident ),* $(,)?) => {
        $(
            if let Some(value) = $from.$field {
                $into.$field = Some(value);
            }
        )*
    };
}

macro_rules! apply_fields {
    ($from:expr, $into:expr, $( $field:ident ),* $(,)?) => {
        $(
            if let Some(value) = $from.$field {
                $into.$field = value;
            }
        )*
    };
}

impl SolverConfigUpdate {
    pub fn new() -> SolverConfigUpdate {
        SolverConfigUpdate::default()
    }

    /// Overlay another update on top of this one.
    pub fn merge(&mut self, other: SolverConfigUpdate) {
        merge_fields!(
            other,
            self,
            vsids_decay,
            clause_activity_decay,
            random_decision_freq,
            phase_flip_interval,
            restart_policy,
            restart_first,
            restart_inc,
            blocking_restart,
            start_clean,
            increase_clean,
            clean_metric,
            clean_keep_ratio,
            cleans_between_simplify,
            inprocess_budget,
            inprocess_growth,
            lazy_hyper_binary,
            probing,
            vivify,
            subsume,
            var_elim,
            elim_strategy,
            blocked_clause_elim,
            xor_extract,
            gauss_snapshot_interval,
        );
    }

    /// Apply the update to a full configuration.
    pub fn apply(&self, config: &mut SolverConfig) {
        apply_fields!(
            self,
            config,
            vsids_decay,
            clause_activity_decay,
            random_decision_freq,
            phase_flip_interval,
            restart_policy,
            restart_first,
            restart_inc,
            blocking_restart,
            start_clean,
            increase_clean,
            clean_metric,
            clean_keep_ratio,
            cleans_between_simplify,
            inprocess_budget,
            inprocess_growth,
            lazy_hyper_binary,
            probing,
            vivify,
            subsume,
            var_elim,
            elim_strategy,
            blocked_clause_elim,
            xor_extract,
            gauss_snapshot_interval,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn update_merge_and_apply() {
        let mut base = SolverConfig::default();

        let mut update = SolverConfigUpdate::new();
        update.restart_first = Some(32);

        let mut overlay = SolverConfigUpdate::new();
        overlay.restart_first = Some(64);
        overlay.probing = Some(false);

        update.merge(overlay);
        update.apply(&mut base);

        assert_eq!(base.restart_first, 64);
        assert_eq!(base.probing, false);
        assert_eq!(base.vivify, true);
    }
}
