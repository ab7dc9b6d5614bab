/*!
The group context --- to which lineage is accumulated and within which one probability is computed.

Strictly, a [GenericGroup] and a [Group].

A group context holds everything belonging to one duplicate-elimination group: the configuration, the world table, the clause bag or tuple lineage, the working signature, and the source of randomness.
The surrounding query-rewriting layer drives it with one [accumulate](GenericGroup::accumulate) (or [accumulate_row](GenericGroup::accumulate_row)) call per input row and a single [finalize](GenericGroup::finalize) call per group, which runs the configured strategy, releases the group's working memory, and returns a probability in [0, 1].

Nothing outlives a group: finalize resets every per-group structure, and the signature --- rewritten destructively by the pre-aggregation scheduler --- is restored from the caller's pristine copy for the next group.
There is no sharing and no locking; parallelism, if wanted, is one group context per concurrently processed group.

The generic context is parameterised to the source of randomness, which the Monte-Carlo strategy draws from.
[from_config](Group::from_config) is implemented for a context with the default [SplitMix64](crate::generic::random::SplitMix64) source, seeded from the configuration so estimates reproduce.

# Example

```rust
# use uconf::config::Config;
# use uconf::context::Group;
# use uconf::structures::Literal;
let mut group = Group::from_config(Config::default());

group.accumulate(&[Literal::new(1, 1, 0.3)]).unwrap();
group.accumulate(&[Literal::new(2, 1, 0.5)]).unwrap();

let probability = group.finalize().unwrap();
assert!((probability - (0.3 + 0.5 - 0.3 * 0.5)).abs() < 1e-9);
```
*/

use rand::SeedableRng;

use crate::{
    config::{ApproximationMode, Config, Strategy},
    db::{lineage::ClauseBag, lineage::TupleLineage, world::WorldTable},
    generic::random::SplitMix64,
    procedures::{
        approximate::{approximate_probability, Approximation},
        estimation::Estimator,
        exact::exact_probability,
        one_scan::{one_scan, ScanState},
        schedule::schedule,
    },
    signature::Signature,
    structures::{Literal, Var},
    types::err::{self},
};

/// A generic group context, parameterised to a source of randomness.
pub struct GenericGroup<R: rand::Rng> {
    /// The configuration of the group.
    pub config: Config,

    /// The world table of the group.
    world: WorldTable,

    /// The clause bag of the group, for the clause strategies.
    bag: ClauseBag,

    /// The raw tuple lineage of the group, for one-scan with pre-aggregation.
    lineage: TupleLineage,

    /// The caller's pristine signature, reused across groups.
    template: Option<Signature>,

    /// The group's working signature, consumed by scheduling and scanning.
    working: Option<Signature>,

    /// The streaming state, when the signature admits a direct scan.
    scan: Option<ScanState>,

    /// The source of rng.
    rng: R,

    /// Whether the group has seen any input.
    started: bool,
}

/// A group context which uses [SplitMix64] as a source of randomness.
pub type Group = GenericGroup<SplitMix64>;

impl Group {
    /// Creates a group context from some given configuration.
    pub fn from_config(config: Config) -> Self {
        let rng = SplitMix64::from_seed(config.seed.to_le_bytes());
        Self {
            config,
            world: WorldTable::default(),
            bag: ClauseBag::default(),
            lineage: TupleLineage::default(),
            template: None,
            working: None,
            scan: None,
            rng,
            started: false,
        }
    }
}

impl<R: rand::Rng> GenericGroup<R> {
    /// Supplies the signature the one-scan strategy drives its scans with.
    ///
    /// The signature is kept pristine; every group works on its own copy.
    pub fn set_signature(&mut self, signature: Signature) {
        self.template = Some(signature);
    }

    /// Appends one clause of condition-column literals to the group.
    ///
    /// The group scope is allocated lazily on the first call.
    pub fn accumulate(&mut self, literals: &[Literal]) -> Result<(), err::ErrorKind> {
        if matches!(self.config.strategy, Strategy::OneScan) {
            return Err(err::FinalizeError::MixedInput.into());
        }

        self.started = true;
        self.bag.advance(literals.to_vec(), &mut self.world)
    }

    /// Appends one sorted lineage row to the group, for the one-scan strategy.
    ///
    /// Rows must arrive sorted by the signature's [variable order](crate::signature::Signature::variable_order).
    /// When the signature already has the one-scan property the row is folded into the running probability immediately; otherwise it is stored for the pre-aggregation passes of finalize.
    pub fn accumulate_row(&mut self, vars: &[Var], probs: &[f64]) -> Result<(), err::ErrorKind> {
        if !matches!(self.config.strategy, Strategy::OneScan) {
            return Err(err::FinalizeError::MixedInput.into());
        }

        let Some(template) = &self.template else {
            return Err(err::FinalizeError::MissingSignature.into());
        };

        if vars.len() != probs.len() || vars.len() < template.width() {
            return Err(err::LineageError::ArityMismatch {
                expected: template.width(),
                found: vars.len(),
            }
            .into());
        }

        for (var, probability) in vars.iter().zip(probs) {
            if !(*probability > 0.0 && *probability <= 1.0) {
                return Err(err::WorldTableError::InvalidProbability {
                    var: *var,
                    probability: *probability,
                }
                .into());
            }
        }

        if self.working.is_none() {
            let working = template.clone();
            if working.is_one_scan() {
                self.scan = Some(ScanState::new(&working));
            }
            self.working = Some(working);
        }

        self.started = true;

        match (&mut self.scan, &mut self.working) {
            (Some(state), Some(signature)) => {
                state.advance(signature, vars, probs);
                Ok(())
            }
            _ => self.lineage.store(vars, probs),
        }
    }

    /// Drains the group through the configured strategy and releases its working memory.
    ///
    /// A group that accumulated nothing has probability zero.
    pub fn finalize(&mut self) -> Result<f64, err::ErrorKind> {
        let result = self.run();
        self.reset();
        result
    }

    /// Like [finalize](GenericGroup::finalize), but returns the full bound certificate of the decomposition strategy.
    pub fn finalize_approximation(&mut self) -> Result<Approximation, err::ErrorKind> {
        let result = match self.config.strategy {
            Strategy::Decomposition { epsilon, mode } => match self.started {
                false => Ok(Approximation {
                    lower: 0.0,
                    upper: 0.0,
                    estimate: 0.0,
                }),
                true => self.run_decomposition(epsilon, mode),
            },
            _ => Err(err::FinalizeError::StrategyMismatch.into()),
        };
        self.reset();
        result
    }

    fn run(&mut self) -> Result<f64, err::ErrorKind> {
        if !self.started {
            return Ok(0.0);
        }

        match self.config.strategy {
            Strategy::Exact => {
                self.prepare_clauses()?;
                Ok(exact_probability(
                    self.bag.clauses(),
                    &self.world,
                    self.config.variable_selection,
                ))
            }

            Strategy::Decomposition { epsilon, mode } => {
                Ok(self.run_decomposition(epsilon, mode)?.estimate)
            }

            Strategy::MonteCarlo { epsilon, delta } => {
                if !(epsilon > 0.0) || !(delta > 0.0 && delta < 1.0) {
                    return Err(err::FinalizeError::InvalidApproximationTarget.into());
                }

                self.prepare_clauses()?;
                let mut estimator =
                    Estimator::new(self.bag.clauses(), &self.world, &mut self.rng);
                Ok(estimator.estimate(epsilon, delta))
            }

            Strategy::OneScan => match (self.scan.take(), self.working.as_mut()) {
                // The signature had the one-scan property: close the last partition.
                (Some(mut state), Some(signature)) => Ok(state.finish(signature)),

                // Otherwise: gain the property by pre-aggregation, then scan.
                (None, Some(signature)) => {
                    schedule(signature, &self.lineage);
                    Ok(one_scan(signature, &self.lineage))
                }

                _ => Err(err::FinalizeError::MissingSignature.into()),
            },
        }
    }

    fn run_decomposition(
        &mut self,
        epsilon: f64,
        mode: ApproximationMode,
    ) -> Result<Approximation, err::ErrorKind> {
        if epsilon < 0.0 {
            return Err(err::FinalizeError::InvalidApproximationTarget.into());
        }

        // Zero tolerance: the approximate stopping rule would never fire.
        if epsilon == 0.0 {
            self.prepare_clauses()?;
            let exact = exact_probability(
                self.bag.clauses(),
                &self.world,
                self.config.variable_selection,
            );
            return Ok(Approximation {
                lower: exact,
                upper: exact,
                estimate: exact,
            });
        }

        self.bag.sort_descending();
        self.prepare_clauses()?;
        Ok(approximate_probability(
            self.bag.clauses(),
            &self.world,
            self.config.variable_selection,
            epsilon,
            mode,
        ))
    }

    /// Completes the world table and resolves literal entries, once per finalize.
    fn prepare_clauses(&mut self) -> Result<(), err::ErrorKind> {
        self.world.complete_distributions()?;
        self.bag.resolve_entries(&self.world);
        Ok(())
    }

    /// Releases everything belonging to the finished group.
    fn reset(&mut self) {
        self.world = WorldTable::default();
        self.bag.reset();
        self.lineage.reset();
        self.working = None;
        self.scan = None;
        self.started = false;
    }
}
