//! The abstract machine variants.
//!
//! All variants share one reachability skeleton: a work list seeded with
//! the initial state, a visited set keyed by state identity, and a step
//! function that asks the semantics for actions and folds them into
//! successor states. The variants differ only in state layout — where the
//! value store and the continuation store live — and in how store growth
//! re-enqueues work.

pub mod aam;
pub mod actors;
pub mod concrete;
pub mod concurrent;
pub mod free;
pub mod global;

pub use aam::Aam;
pub use actors::ActorsAam;
pub use concrete::ConcreteMachine;
pub use concurrent::ConcurrentAam;
pub use free::Free;
pub use global::AamGlobalStore;

use crate::address::Address;
use crate::environment::Env;
use crate::error::SemanticError;
use crate::exp::Expression;
use crate::lattice::JoinSemiLattice;
use crate::value::LatticeValue;
use serde::Serialize;
use std::collections::{BTreeSet, VecDeque};
use std::fmt::{self, Display, Formatter};
use std::time::{Duration, Instant};

/// Where the machine is looking: about to evaluate an expression, about to
/// return a value to the topmost frame, or stuck on a semantic error.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub enum Control<E: Expression, A: Address, V: LatticeValue> {
    Eval { exp: E, env: Env<A> },
    Kont { value: V },
    Error { error: SemanticError },
}

impl<E: Expression, A: Address, V: LatticeValue> Display for Control<E, A, V> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Control::Eval { exp, .. } => write!(f, "ev({exp})"),
            Control::Kont { value } => write!(f, "ko({value})"),
            Control::Error { error } => write!(f, "err({error})"),
        }
    }
}

/// Work-queue discipline. The set of reachable states is independent of
/// the choice; only the discovery order changes.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub enum ExplorationStrategy {
    #[default]
    Fifo,
    Lifo,
}

#[derive(Clone, Debug)]
pub struct MachineConfig {
    pub strategy: ExplorationStrategy,
    pub timeout: Option<Duration>,
    /// Parallel frontier workers; 1 = fully sequential driver.
    pub workers: usize,
    /// Step bound for machines that may not terminate.
    pub step_limit: Option<u64>,
    /// Record the transition graph for DOT export.
    pub build_graph: bool,
    /// Force abstract counting even when the domain does not count.
    pub counting: bool,
}

impl Default for MachineConfig {
    fn default() -> Self {
        MachineConfig {
            strategy: ExplorationStrategy::Fifo,
            timeout: None,
            workers: 1,
            step_limit: None,
            build_graph: false,
            counting: false,
        }
    }
}

/// The work list, FIFO or LIFO.
#[derive(Debug)]
pub(crate) struct Worklist<St> {
    queue: VecDeque<St>,
    strategy: ExplorationStrategy,
}

impl<St> Worklist<St> {
    pub(crate) fn new(strategy: ExplorationStrategy) -> Self {
        Worklist {
            queue: VecDeque::new(),
            strategy,
        }
    }

    pub(crate) fn push(&mut self, state: St) {
        self.queue.push_back(state);
    }

    pub(crate) fn pop(&mut self) -> Option<St> {
        match self.strategy {
            ExplorationStrategy::Fifo => self.queue.pop_front(),
            ExplorationStrategy::Lifo => self.queue.pop_back(),
        }
    }

    pub(crate) fn drain(&mut self) -> Vec<St> {
        self.queue.drain(..).collect()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub(crate) fn len(&self) -> usize {
        self.queue.len()
    }
}

/// External wall-clock deadline, checked at work-item pickup only.
#[derive(Clone, Copy, Debug)]
pub(crate) struct Deadline {
    at: Option<Instant>,
}

impl Deadline {
    pub(crate) fn start(timeout: Option<Duration>) -> Self {
        Deadline {
            at: timeout.map(|d| Instant::now() + d),
        }
    }

    pub(crate) fn expired(&self) -> bool {
        self.at.is_some_and(|at| Instant::now() >= at)
    }
}

/// The result of an exploration.
#[derive(Clone, Debug)]
pub struct Output<V: LatticeValue> {
    /// Join-set of every value that reached the final continuation.
    pub final_values: BTreeSet<V>,
    /// Reachable semantic errors.
    pub errors: BTreeSet<SemanticError>,
    pub num_states: usize,
    pub time: Duration,
    pub timed_out: bool,
    /// GraphViz rendering of the state graph, when requested.
    pub dot: Option<String>,
    /// Actor machines: the join-set of every delivered message payload.
    pub delivered: BTreeSet<V>,
    /// Actor machines: how many distinct actors terminated.
    pub terminated_actors: usize,
}

impl<V: LatticeValue> Output<V> {
    pub(crate) fn new() -> Self {
        Output {
            final_values: BTreeSet::new(),
            errors: BTreeSet::new(),
            num_states: 0,
            time: Duration::ZERO,
            timed_out: false,
            dot: None,
            delivered: BTreeSet::new(),
            terminated_actors: 0,
        }
    }

    /// True iff some final value subsumes `v`.
    pub fn contains_final_value(&self, v: &V) -> bool {
        self.final_values.iter().any(|fv| fv.subsumes(v))
    }

    /// The join of all final values.
    pub fn joined_final_value(&self) -> V {
        self.final_values
            .iter()
            .fold(V::bottom(), |acc, v| acc.joined(v))
    }

    pub fn summary(&self) -> Summary {
        Summary {
            num_states: self.num_states,
            time_ms: self.time.as_millis() as u64,
            timed_out: self.timed_out,
            final_values: self.final_values.iter().map(|v| v.to_string()).collect(),
            errors: self.errors.iter().map(|e| e.to_string()).collect(),
        }
    }
}

/// Serializable run summary for tooling.
#[derive(Clone, Debug, Serialize)]
pub struct Summary {
    pub num_states: usize,
    pub time_ms: u64,
    pub timed_out: bool,
    pub final_values: Vec<String>,
    pub errors: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn worklist_disciplines() {
        let mut fifo = Worklist::new(ExplorationStrategy::Fifo);
        let mut lifo = Worklist::new(ExplorationStrategy::Lifo);
        for n in [1, 2, 3] {
            fifo.push(n);
            lifo.push(n);
        }
        assert_eq!(fifo.pop(), Some(1));
        assert_eq!(lifo.pop(), Some(3));
        assert_eq!(fifo.len(), 2);
    }

    #[test]
    fn deadline_none_never_expires() {
        assert!(!Deadline::start(None).expired());
        assert!(Deadline::start(Some(Duration::ZERO)).expired());
    }
}
