use super::{Control, Deadline, MachineConfig, Output, Worklist};
use crate::action::Action;
use crate::address::{Address, KontAddr};
use crate::effect::EffectKind;
use crate::exp::{Expression, Position};
use crate::graph::{NodeClass, StateGraph};
use crate::semantics::{DomainValue, Frame, SemAction, Semantics};
use crate::store::{KontStore, Store};
use crate::time::Timestamp;
use crate::value::{LatticeValue, ValueDomain};
use std::collections::{BTreeSet, HashMap};
use std::fmt::{self, Display, Formatter};
use std::time::Instant;
use tracing::{debug, info, warn};

/// A state of the "free" machine: both the value store and the
/// continuation store are global, so a state is only control, kont
/// address, and timestamp. Continuations at one kont address join into a
/// single cell, over-approximating the call graph; with finite addresses
/// and values the exploration always terminates.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct FreeState<E: Expression, A: Address, V: LatticeValue, T: Timestamp> {
    pub control: Control<E, A, V>,
    pub kont: KontAddr,
    pub time: T,
}

impl<E: Expression, A: Address, V: LatticeValue, T: Timestamp> Display
    for FreeState<E, A, V, T>
{
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{} | {} | {}", self.control, self.kont, self.time)
    }
}

impl<E: Expression, A: Address, V: LatticeValue, T: Timestamp> FreeState<E, A, V, T> {
    pub fn halted(&self) -> Option<&V> {
        match &self.control {
            Control::Kont { value } if self.kont.is_halt() => Some(value),
            _ => None,
        }
    }

    fn node_class(&self) -> NodeClass {
        match &self.control {
            Control::Eval { .. } => NodeClass::Eval,
            Control::Kont { .. } => NodeClass::Value,
            Control::Error { .. } => NodeClass::Error,
        }
    }

    fn position(&self) -> Position {
        match &self.control {
            Control::Eval { exp, .. } => exp.position(),
            _ => Position::none(),
        }
    }
}

pub type StateOf<S> = FreeState<
    <S as Semantics>::Exp,
    <S as Semantics>::Addr,
    DomainValue<S>,
    <S as Semantics>::Time,
>;

/// The free machine: global value store, global continuation store.
pub struct Free<S: Semantics> {
    pub sem: S,
    pub config: MachineConfig,
}

impl<S: Semantics> Free<S> {
    pub fn new(sem: S, config: MachineConfig) -> Self {
        Free { sem, config }
    }

    fn initial(&self, program: S::Exp) -> (StateOf<S>, Store<S::Addr, DomainValue<S>>) {
        let mut env = crate::environment::Env::empty();
        let mut store = if self.config.counting || self.sem.domain().counting() {
            Store::with_counting()
        } else {
            Store::empty()
        };
        for (name, addr, value) in self.sem.initial_bindings() {
            env = env.extend(name, addr.clone());
            store = store.extend(addr, value);
        }
        let state = FreeState {
            control: Control::Eval { exp: program, env },
            kont: KontAddr::Halt,
            time: S::Time::zero(),
        };
        (state, store)
    }

    fn actions(
        &self,
        state: &StateOf<S>,
        global: &Store<S::Addr, DomainValue<S>>,
        kstore: &KontStore<S::Frame>,
    ) -> Vec<(SemAction<S>, KontAddr)> {
        match &state.control {
            Control::Error { .. } => vec![],
            Control::Eval { exp, env } => self
                .sem
                .step_eval(exp, env, global, &state.time)
                .into_iter()
                .map(|a| (a, state.kont))
                .collect(),
            Control::Kont { value } => {
                if state.halted().is_some() {
                    return vec![];
                }
                let mut out = Vec::new();
                for kont in kstore.lookup(state.kont) {
                    for a in self
                        .sem
                        .step_kont(value, &kont.frame, global, &state.time)
                    {
                        out.push((a, kont.next));
                    }
                }
                out
            }
        }
    }

    /// Fold one action: returns the successor and, for pushes, the kont
    /// cell that grew.
    fn apply(
        &self,
        state: &StateOf<S>,
        action: SemAction<S>,
        tail: KontAddr,
        kstore: &mut KontStore<S::Frame>,
    ) -> (StateOf<S>, Option<KontAddr>) {
        let pos = state.position();
        match action {
            Action::Value { value, .. } => (
                FreeState {
                    control: Control::Kont { value },
                    kont: tail,
                    time: state.time.tick(pos),
                },
                None,
            ),
            Action::Push {
                frame, exp, env, ..
            } => {
                let ak = KontAddr::at(exp.position(), state.time.digest());
                let grew = kstore.insert(ak, frame, tail);
                (
                    FreeState {
                        control: Control::Eval { exp, env },
                        kont: ak,
                        time: state.time.tick(pos),
                    },
                    grew.then_some(ak),
                )
            }
            Action::Eval { exp, env, .. } => (
                FreeState {
                    control: Control::Eval { exp, env },
                    kont: tail,
                    time: state.time.tick(pos),
                },
                None,
            ),
            Action::StepIn {
                fexp, body, env, ..
            } => (
                FreeState {
                    control: Control::Eval { exp: body, env },
                    kont: tail,
                    time: state.time.tick_call(fexp.position()),
                },
                None,
            ),
            Action::Error { error } => (
                FreeState {
                    control: Control::Error { error },
                    kont: tail,
                    time: state.time.clone(),
                },
                None,
            ),
            other => (
                FreeState {
                    control: Control::Error {
                        error: crate::error::SemanticError::NotSupported(format!(
                            "action {} requires a concurrent machine",
                            other.name()
                        )),
                    },
                    kont: tail,
                    time: state.time.clone(),
                },
                None,
            ),
        }
    }

    pub fn run(&self, program: S::Exp) -> Output<DomainValue<S>> {
        let start = Instant::now();
        let deadline = Deadline::start(self.config.timeout);
        let mut output = Output::new();
        let mut graph: Option<StateGraph<StateOf<S>>> =
            self.config.build_graph.then(StateGraph::new);
        let mut work = Worklist::new(self.config.strategy);

        let (initial, mut global) = self.initial(program);
        let mut kstore: KontStore<S::Frame> = KontStore::empty();
        // visited state → store addresses its expansion read
        let mut visited: HashMap<StateOf<S>, BTreeSet<S::Addr>> = HashMap::new();
        work.push(initial);

        loop {
            if deadline.expired() {
                warn!("deadline expired, returning partial result");
                output.timed_out = true;
                break;
            }
            let state = match work.pop() {
                Some(s) => s,
                None => break,
            };
            if visited.contains_key(&state) {
                continue;
            }
            if let Some(value) = state.halted() {
                if self.sem.domain().is_error(value) {
                    output.errors.extend(self.sem.domain().errors(value));
                }
                output.final_values.insert(value.clone());
                visited.insert(state.clone(), BTreeSet::new());
                if let Some(g) = &mut graph {
                    g.add_node(state);
                }
                continue;
            }
            if let Control::Error { error } = &state.control {
                output.errors.insert(error.clone());
                visited.insert(state.clone(), BTreeSet::new());
                if let Some(g) = &mut graph {
                    g.add_node(state);
                }
                continue;
            }

            let pairs = self.actions(&state, &global, &kstore);
            let mut reads = BTreeSet::new();
            let mut grown = BTreeSet::new();
            let mut grown_konts: BTreeSet<KontAddr> = BTreeSet::new();
            let mut succs = Vec::with_capacity(pairs.len());
            for (action, tail) in pairs {
                if let Some(effects) = action.effects() {
                    // acquire counts as a read here: whether it is
                    // enabled depends on the lock cell's current value
                    reads.extend(
                        effects
                            .iter()
                            .filter(|e| e.kind.is_read() || e.kind == EffectKind::Acquire)
                            .map(|e| e.addr.clone()),
                    );
                }
                if let Some(store) = action.store() {
                    grown.extend(global.join_with(store));
                }
                let (succ, grew) = self.apply(&state, action, tail, &mut kstore);
                grown_konts.extend(grew);
                succs.push(succ);
            }
            visited.insert(state.clone(), reads);
            for succ in succs {
                if let Some(g) = &mut graph {
                    g.add_edge(state.clone(), succ.clone());
                }
                if !visited.contains_key(&succ) {
                    work.push(succ);
                }
            }
            if !grown.is_empty() || !grown_konts.is_empty() {
                // value cells feed the states that read them; kont cells
                // feed the return states parked at that address
                let affected: Vec<StateOf<S>> = visited
                    .iter()
                    .filter(|(s, reads)| {
                        reads.iter().any(|a| grown.contains(a))
                            || (grown_konts.contains(&s.kont)
                                && matches!(s.control, Control::Kont { .. }))
                    })
                    .map(|(s, _)| s.clone())
                    .collect();
                debug!(
                    grown = grown.len(),
                    grown_konts = grown_konts.len(),
                    reenqueued = affected.len(),
                    "global stores widened"
                );
                for s in affected {
                    visited.remove(&s);
                    work.push(s);
                }
            }
        }

        output.num_states = visited.len() + work.len();
        output.time = start.elapsed();
        output.dot = graph.map(|g| g.to_dot(|s| (s.to_string(), s.node_class())));
        info!(
            states = output.num_states,
            finals = output.final_values.len(),
            konts = kstore.len(),
            "free-machine exploration finished"
        );
        output
    }
}
