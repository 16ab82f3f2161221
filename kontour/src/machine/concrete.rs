use super::{MachineConfig, Output};
use crate::machine::aam::Aam;
use crate::semantics::{DomainValue, Semantics};
use crate::value::ValueDomain;
use tracing::warn;

/// Default step bound: concrete execution may not terminate, so the
/// machine always runs under one.
pub const DEFAULT_STEP_LIMIT: u64 = 1_000_000;

/// Concrete execution as a degenerate AAM: compose the per-state-store
/// machine with a globally fresh timestamp policy and a counting domain
/// and every address is unique, every cell a singleton, and every update
/// strong. This machine runs the program rather than analyzing it, and it
/// may not terminate; a step bound caps the run.
pub struct ConcreteMachine<S: Semantics> {
    inner: Aam<S>,
}

impl<S: Semantics> ConcreteMachine<S> {
    pub fn new(sem: S, mut config: MachineConfig) -> Self {
        if !sem.domain().counting() {
            warn!("concrete machine over a non-counting domain cannot do strong updates");
        }
        config.step_limit = config.step_limit.or(Some(DEFAULT_STEP_LIMIT));
        ConcreteMachine {
            inner: Aam::new(sem, config),
        }
    }

    pub fn run(&self, program: S::Exp) -> Output<DomainValue<S>> {
        self.inner.run(program)
    }
}
