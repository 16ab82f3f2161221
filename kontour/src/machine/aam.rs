use super::{Control, Deadline, MachineConfig, Output, Worklist};
use crate::action::Action;
use crate::address::{Address, KontAddr};
use crate::environment::Env;
use crate::exp::{Expression, Position};
use crate::graph::{NodeClass, StateGraph};
use crate::semantics::{DomainValue, Frame, SemAction, Semantics};
use crate::store::{KontStore, Store};
use crate::time::Timestamp;
use crate::value::{LatticeValue, ValueDomain};
use rayon::prelude::*;
use std::collections::HashSet;
use std::fmt::{self, Display, Formatter};
use std::time::Instant;
use tracing::{debug, info, warn};

/// A state of the classical AAM: control, per-state value store, per-state
/// continuation store, current kont address, timestamp. The stores
/// participate in state identity, which is what buys this variant its
/// precision — and its state count.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct AamState<E: Expression, A: Address, V: LatticeValue, F: Frame, T: Timestamp> {
    pub control: Control<E, A, V>,
    pub store: Store<A, V>,
    pub kstore: KontStore<F>,
    pub kont: KontAddr,
    pub time: T,
}

impl<E: Expression, A: Address, V: LatticeValue, F: Frame, T: Timestamp> Display
    for AamState<E, A, V, F, T>
{
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{} | {} | {}", self.control, self.kont, self.time)
    }
}

impl<E: Expression, A: Address, V: LatticeValue, F: Frame, T: Timestamp>
    AamState<E, A, V, F, T>
{
    /// The final value, when this state has returned to the halt
    /// continuation.
    pub fn halted(&self) -> Option<&V> {
        match &self.control {
            Control::Kont { value } if self.kont.is_halt() => Some(value),
            _ => None,
        }
    }

    pub(crate) fn node_class(&self) -> NodeClass {
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

pub type StateOf<S> = AamState<
    <S as Semantics>::Exp,
    <S as Semantics>::Addr,
    DomainValue<S>,
    <S as Semantics>::Frame,
    <S as Semantics>::Time,
>;

/// What expanding one state yields.
pub(crate) enum Expansion<St, V> {
    Halted(V),
    Errored(crate::error::SemanticError),
    Next(Vec<St>),
}

/// The classical CESK-with-per-state-store machine.
pub struct Aam<S: Semantics> {
    pub sem: S,
    pub config: MachineConfig,
}

impl<S: Semantics> Aam<S> {
    pub fn new(sem: S, config: MachineConfig) -> Self {
        Aam { sem, config }
    }

    /// Initial environment and store: the semantics' primitive prelude.
    pub(crate) fn initial_bindings(
        &self,
    ) -> (Env<S::Addr>, Store<S::Addr, DomainValue<S>>) {
        let mut env = Env::empty();
        let mut store = if self.config.counting || self.sem.domain().counting() {
            Store::with_counting()
        } else {
            Store::empty()
        };
        for (name, addr, value) in self.sem.initial_bindings() {
            env = env.extend(name, addr.clone());
            store = store.extend(addr, value);
        }
        (env, store)
    }

    pub fn initial_state(&self, program: S::Exp) -> StateOf<S> {
        let (env, store) = self.initial_bindings();
        AamState {
            control: Control::Eval { exp: program, env },
            store,
            kstore: KontStore::empty(),
            kont: KontAddr::Halt,
            time: S::Time::zero(),
        }
    }

    /// Fold one action into a successor state. `tail` is the continuation
    /// the successor runs under: the current kont address for eval steps,
    /// the popped frame's tail for kont steps.
    fn apply(&self, state: &StateOf<S>, action: SemAction<S>, tail: KontAddr) -> StateOf<S> {
        let pos = state.position();
        match action {
            Action::Value { value, store, .. } => AamState {
                control: Control::Kont { value },
                store,
                kstore: state.kstore.clone(),
                kont: tail,
                time: state.time.tick(pos),
            },
            Action::Push {
                frame,
                exp,
                env,
                store,
                ..
            } => {
                let ak = KontAddr::at(exp.position(), state.time.digest());
                AamState {
                    control: Control::Eval { exp, env },
                    store,
                    kstore: state.kstore.clone().extend(ak, frame, tail),
                    kont: ak,
                    time: state.time.tick(pos),
                }
            }
            Action::Eval { exp, env, store, .. } => AamState {
                control: Control::Eval { exp, env },
                store,
                kstore: state.kstore.clone(),
                kont: tail,
                time: state.time.tick(pos),
            },
            Action::StepIn {
                fexp,
                body,
                env,
                store,
                ..
            } => AamState {
                control: Control::Eval { exp: body, env },
                store,
                kstore: state.kstore.clone(),
                kont: tail,
                time: state.time.tick_call(fexp.position()),
            },
            Action::Error { error } => AamState {
                control: Control::Error { error },
                store: state.store.clone(),
                kstore: state.kstore.clone(),
                kont: tail,
                time: state.time.clone(),
            },
            // concurrency and actor actions have no meaning in the
            // sequential machines
            other => AamState {
                control: Control::Error {
                    error: crate::error::SemanticError::NotSupported(format!(
                        "action {} requires a concurrent machine",
                        other.name()
                    )),
                },
                store: state.store.clone(),
                kstore: state.kstore.clone(),
                kont: tail,
                time: state.time.clone(),
            },
        }
    }

    pub(crate) fn expand(&self, state: &StateOf<S>) -> Expansion<StateOf<S>, DomainValue<S>> {
        if let Some(value) = state.halted() {
            return Expansion::Halted(value.clone());
        }
        match &state.control {
            Control::Error { error } => Expansion::Errored(error.clone()),
            Control::Eval { exp, env } => {
                let actions = self.sem.step_eval(exp, env, &state.store, &state.time);
                Expansion::Next(
                    actions
                        .into_iter()
                        .map(|a| self.apply(state, a, state.kont))
                        .collect(),
                )
            }
            Control::Kont { value } => {
                let mut next = Vec::new();
                for kont in state.kstore.lookup(state.kont) {
                    let actions =
                        self.sem
                            .step_kont(value, &kont.frame, &state.store, &state.time);
                    for a in actions {
                        next.push(self.apply(state, a, kont.next));
                    }
                }
                Expansion::Next(next)
            }
        }
    }

    pub fn run(&self, program: S::Exp) -> Output<DomainValue<S>> {
        let start = Instant::now();
        let deadline = Deadline::start(self.config.timeout);
        let mut output = Output::new();
        let mut visited: HashSet<StateOf<S>> = HashSet::new();
        let mut graph: Option<StateGraph<StateOf<S>>> =
            self.config.build_graph.then(StateGraph::new);
        let mut work = Worklist::new(self.config.strategy);
        let mut steps: u64 = 0;
        work.push(self.initial_state(program));

        while !work.is_empty() {
            if deadline.expired() {
                warn!("deadline expired, returning partial result");
                output.timed_out = true;
                break;
            }
            if self
                .config
                .step_limit
                .is_some_and(|limit| steps >= limit)
            {
                warn!(steps, "step bound hit, returning partial result");
                output.timed_out = true;
                break;
            }
            if self.config.workers > 1 {
                // partition the frontier: successor computation is pure,
                // so distinct pending states expand in parallel and the
                // results fold back sequentially
                let batch: Vec<StateOf<S>> = work
                    .drain()
                    .into_iter()
                    .filter(|s| visited.insert(s.clone()))
                    .collect();
                steps += batch.len() as u64;
                let expanded: Vec<(StateOf<S>, Expansion<StateOf<S>, DomainValue<S>>)> =
                    batch
                        .into_par_iter()
                        .map(|s| {
                            let e = self.expand(&s);
                            (s, e)
                        })
                        .collect();
                for (state, expansion) in expanded {
                    self.fold(state, expansion, &mut output, &visited, &mut work, &mut graph);
                }
            } else {
                let state = match work.pop() {
                    Some(s) => s,
                    None => break,
                };
                if !visited.insert(state.clone()) {
                    continue;
                }
                steps += 1;
                let expansion = self.expand(&state);
                self.fold(state, expansion, &mut output, &visited, &mut work, &mut graph);
            }
        }

        output.num_states = visited.len();
        output.time = start.elapsed();
        output.dot = graph.map(|g| g.to_dot(|s| (s.to_string(), s.node_class())));
        info!(
            states = output.num_states,
            finals = output.final_values.len(),
            errors = output.errors.len(),
            "exploration finished"
        );
        output
    }

    fn fold(
        &self,
        state: StateOf<S>,
        expansion: Expansion<StateOf<S>, DomainValue<S>>,
        output: &mut Output<DomainValue<S>>,
        visited: &HashSet<StateOf<S>>,
        work: &mut Worklist<StateOf<S>>,
        graph: &mut Option<StateGraph<StateOf<S>>>,
    ) {
        match expansion {
            Expansion::Halted(value) => {
                debug!(%value, "halted state");
                if self.sem.domain().is_error(&value) {
                    output.errors.extend(self.sem.domain().errors(&value));
                }
                output.final_values.insert(value);
                if let Some(g) = graph {
                    g.add_node(state);
                }
            }
            Expansion::Errored(error) => {
                output.errors.insert(error);
                if let Some(g) = graph {
                    g.add_node(state);
                }
            }
            Expansion::Next(succs) => {
                for succ in succs {
                    if let Some(g) = graph {
                        g.add_edge(state.clone(), succ.clone());
                    }
                    if !visited.contains(&succ) {
                        work.push(succ);
                    }
                }
            }
        }
    }
}

