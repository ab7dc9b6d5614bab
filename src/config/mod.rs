/*!
Configuration of a group context.

A strategy is chosen once per query by the caller --- the rewriting layer knows the shape of the query, the engine does not.
Everything else is a knob with a reasonable default.
*/

/// The strategy a group's finalize call computes with.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Strategy {
    /// Exact computation by independent-component decomposition and variable elimination.
    ///
    /// No internal bound on running time: on a pathological clause set the caller is expected to guard externally, or route to an approximate strategy.
    Exact,

    /// Decomposition-tree approximation with a provable error bound.
    ///
    /// With `epsilon` zero this routes to the exact engine --- an approximate pass with zero tolerance never terminates by its own stopping rule.
    Decomposition {
        epsilon: f64,
        mode: ApproximationMode,
    },

    /// Monte-Carlo estimation with an (ε, δ) guarantee.
    MonteCarlo { epsilon: f64, delta: f64 },

    /// The one-scan pass over sorted lineage, for hierarchical self-join-free queries.
    ///
    /// Requires a [signature](crate::signature) supplied to the group, and input rows sorted by the signature's [variable order](crate::signature::Signature::variable_order).
    OneScan,
}

/// How the error bound of the decomposition-tree engine is read.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ApproximationMode {
    /// The bound gap is measured relative to the lower bound.
    Relative,

    /// The bound gap is measured absolutely.
    Absolute,
}

/// Which heuristic the elimination engines choose their next variable with.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum VariableSelection {
    /// The variable occurring most often in the column of the previously eliminated variable, falling back to the most frequent variable overall.
    ///
    /// Keeps recursion shallow on chain-like joins, where one column carries the shared variables.
    #[default]
    SameColumn,

    /// The variable minimizing a logarithmic proxy for the partition sizes its elimination produces.
    ///
    /// Useful when no column locality exists.
    MinLog,
}

/// The primary configuration structure.
#[derive(Clone, Debug)]
pub struct Config {
    /// The strategy finalize computes with.
    pub strategy: Strategy,

    /// The variable-selection heuristic of the elimination engines.
    pub variable_selection: VariableSelection,

    /// The seed of the group's randomness source.
    ///
    /// Fixed seed, fixed estimate --- reproducibility of the Monte-Carlo strategy is a tested property.
    pub seed: u64,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            strategy: Strategy::Exact,
            variable_selection: VariableSelection::default(),
            seed: 0,
        }
    }
}
