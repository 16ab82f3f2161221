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

/// A state of the widened-store AAM: the value store is lifted out of the
/// state and shared, so states are small and coalesce aggressively; the
/// price is one joint store approximating all of them.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct GlobalState<E: Expression, A: Address, V: LatticeValue, F: Frame, T: Timestamp> {
    pub control: Control<E, A, V>,
    pub kstore: KontStore<F>,
    pub kont: KontAddr,
    pub time: T,
}

impl<E: Expression, A: Address, V: LatticeValue, F: Frame, T: Timestamp> Display
    for GlobalState<E, A, V, F, T>
{
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{} | {} | {}", self.control, self.kont, self.time)
    }
}

impl<E: Expression, A: Address, V: LatticeValue, F: Frame, T: Timestamp>
    GlobalState<E, A, V, F, T>
{
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

pub type StateOf<S> = GlobalState<
    <S as Semantics>::Exp,
    <S as Semantics>::Addr,
    DomainValue<S>,
    <S as Semantics>::Frame,
    <S as Semantics>::Time,
>;

/// AAM with a single widened store shared across states.
///
/// Each expansion records the addresses its transitions read; when a later
/// join makes some cell grow, exactly the visited states that read one of
/// the grown cells are re-enqueued, because only their outgoing
/// transitions can change.
pub struct AamGlobalStore<S: Semantics> {
    pub sem: S,
    pub config: MachineConfig,
}

impl<S: Semantics> AamGlobalStore<S> {
    pub fn new(sem: S, config: MachineConfig) -> Self {
        AamGlobalStore { sem, config }
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
        let state = GlobalState {
            control: Control::Eval { exp: program, env },
            kstore: KontStore::empty(),
            kont: KontAddr::Halt,
            time: S::Time::zero(),
        };
        (state, store)
    }

    /// All (action, tail) pairs of one state, produced against a frozen
    /// view of the global store. Action production is pure; the caller
    /// folds the carried stores afterwards.
    fn actions(
        &self,
        state: &StateOf<S>,
        global: &Store<S::Addr, DomainValue<S>>,
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
                for kont in state.kstore.lookup(state.kont) {
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

    fn apply(&self, state: &StateOf<S>, action: SemAction<S>, tail: KontAddr) -> StateOf<S> {
        let pos = state.position();
        match action {
            Action::Value { value, .. } => GlobalState {
                control: Control::Kont { value },
                kstore: state.kstore.clone(),
                kont: tail,
                time: state.time.tick(pos),
            },
            Action::Push {
                frame, exp, env, ..
            } => {
                let ak = KontAddr::at(exp.position(), state.time.digest());
                GlobalState {
                    control: Control::Eval { exp, env },
                    kstore: state.kstore.clone().extend(ak, frame, tail),
                    kont: ak,
                    time: state.time.tick(pos),
                }
            }
            Action::Eval { exp, env, .. } => GlobalState {
                control: Control::Eval { exp, env },
                kstore: state.kstore.clone(),
                kont: tail,
                time: state.time.tick(pos),
            },
            Action::StepIn {
                fexp, body, env, ..
            } => GlobalState {
                control: Control::Eval { exp: body, env },
                kstore: state.kstore.clone(),
                kont: tail,
                time: state.time.tick_call(fexp.position()),
            },
            Action::Error { error } => GlobalState {
                control: Control::Error { error },
                kstore: state.kstore.clone(),
                kont: tail,
                time: state.time.clone(),
            },
            other => GlobalState {
                control: Control::Error {
                    error: crate::error::SemanticError::NotSupported(format!(
                        "action {} requires a concurrent machine",
                        other.name()
                    )),
                },
                kstore: state.kstore.clone(),
                kont: tail,
                time: state.time.clone(),
            },
        }
    }

    pub fn run(&self, program: S::Exp) -> Output<DomainValue<S>> {
        let start = Instant::now();
        let deadline = Deadline::start(self.config.timeout);
        let mut output = Output::new();
        let mut graph: Option<StateGraph<StateOf<S>>> =
            self.config.build_graph.then(StateGraph::new);
        let mut work = Worklist::new(self.config.strategy);
        if self.config.workers > 1 {
            debug!("global-store exploration runs the driver sequentially");
        }

        let (initial, mut global) = self.initial(program);
        // visited state → the store addresses its expansion read
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

            let pairs = self.actions(&state, &global);
            let mut reads = BTreeSet::new();
            let mut grown = BTreeSet::new();
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
                succs.push(self.apply(&state, action, tail));
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
            if !grown.is_empty() {
                // the widened store properly grew: re-enqueue every state
                // whose transitions read one of the grown cells
                let affected: Vec<StateOf<S>> = visited
                    .iter()
                    .filter(|(_, reads)| reads.iter().any(|a| grown.contains(a)))
                    .map(|(s, _)| s.clone())
                    .collect();
                debug!(
                    grown = grown.len(),
                    reenqueued = affected.len(),
                    "store widened"
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
            "global-store exploration finished"
        );
        output
    }
}
