use super::{Control, Deadline, MachineConfig, Output, Worklist};
use crate::action::Action;
use crate::address::{Address, KontAddr};
use crate::exp::{Expression, Position};
use crate::graph::{NodeClass, StateGraph};
use crate::lattice::JoinSemiLattice;
use crate::semantics::{DomainValue, Frame, SemAction, Semantics};
use crate::store::{KontStore, Store};
use crate::time::Timestamp;
use crate::value::{LatticeValue, Tid, ValueDomain};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fmt::{self, Display, Formatter};
use std::time::Instant;
use tracing::{debug, info, warn};

/// The thread-local part of a concurrent state: everything an AAM state
/// has except the value store, which all threads of a state share.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct ThreadCtx<E: Expression, A: Address, V: LatticeValue, F: Frame, T: Timestamp> {
    pub control: Control<E, A, V>,
    pub kstore: KontStore<F>,
    pub kont: KontAddr,
    pub time: T,
}

impl<E: Expression, A: Address, V: LatticeValue, F: Frame, T: Timestamp>
    ThreadCtx<E, A, V, F, T>
{
    fn halted(&self) -> Option<&V> {
        match &self.control {
            Control::Kont { value } if self.kont.is_halt() => Some(value),
            _ => None,
        }
    }

    /// Halted or stuck on an error: nothing left to step.
    fn settled(&self) -> bool {
        self.halted().is_some() || matches!(self.control, Control::Error { .. })
    }

    fn position(&self) -> Position {
        match &self.control {
            Control::Eval { exp, .. } => exp.position(),
            _ => Position::none(),
        }
    }
}

/// A vertex of the concurrent state graph: a pool of threads over one
/// shared store. Stepping picks one runnable thread context; exploring
/// every pick at every state enumerates every interleaving, so any two
/// transitions with conflicting effects appear in both orders.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct ConcurrentState<E: Expression, A: Address, V: LatticeValue, F: Frame, T: Timestamp>
{
    pub threads: BTreeMap<Tid, BTreeSet<ThreadCtx<E, A, V, F, T>>>,
    pub store: Store<A, V>,
}

impl<E: Expression, A: Address, V: LatticeValue, F: Frame, T: Timestamp> Display
    for ConcurrentState<E, A, V, F, T>
{
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        for (i, (tid, ctxs)) in self.threads.iter().enumerate() {
            if i > 0 {
                write!(f, " ∥ ")?;
            }
            write!(f, "{tid}:")?;
            for ctx in ctxs {
                write!(f, " {}", ctx.control)?;
            }
        }
        Ok(())
    }
}

pub type StateOf<S> = ConcurrentState<
    <S as Semantics>::Exp,
    <S as Semantics>::Addr,
    DomainValue<S>,
    <S as Semantics>::Frame,
    <S as Semantics>::Time,
>;

type CtxOf<S> = ThreadCtx<
    <S as Semantics>::Exp,
    <S as Semantics>::Addr,
    DomainValue<S>,
    <S as Semantics>::Frame,
    <S as Semantics>::Time,
>;

/// AAM over a pool of threads: `spawn` installs new threads, `join` waits
/// for a thread's halt and yields its final value.
pub struct ConcurrentAam<S: Semantics> {
    pub sem: S,
    pub config: MachineConfig,
}

impl<S: Semantics> ConcurrentAam<S> {
    pub fn new(sem: S, config: MachineConfig) -> Self {
        ConcurrentAam { sem, config }
    }

    fn initial(&self, program: S::Exp) -> StateOf<S> {
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
        let main = ThreadCtx {
            control: Control::Eval { exp: program, env },
            kstore: KontStore::empty(),
            kont: KontAddr::Halt,
            time: S::Time::zero(),
        };
        ConcurrentState {
            threads: BTreeMap::from([(Tid::main(), BTreeSet::from([main]))]),
            store,
        }
    }

    /// The joined final value of `tid`, available only when every context
    /// of that thread has halted.
    fn thread_final(&self, state: &StateOf<S>, tid: Tid) -> Option<DomainValue<S>> {
        let ctxs = state.threads.get(&tid)?;
        if ctxs.is_empty() {
            return None;
        }
        let mut out = DomainValue::<S>::bottom();
        for ctx in ctxs {
            out.join(ctx.halted()?);
        }
        Some(out)
    }

    /// Replace one context of `tid` and install the new store.
    fn with_ctx(
        &self,
        state: &StateOf<S>,
        tid: Tid,
        old: &CtxOf<S>,
        new: CtxOf<S>,
        store: Store<S::Addr, DomainValue<S>>,
    ) -> StateOf<S> {
        let mut threads = state.threads.clone();
        let set = threads.entry(tid).or_default();
        set.remove(old);
        set.insert(new);
        ConcurrentState { threads, store }
    }

    /// Fold a sequential action into a thread context.
    fn apply_ctx(
        &self,
        ctx: &CtxOf<S>,
        action: SemAction<S>,
        tail: KontAddr,
        fallback_store: &Store<S::Addr, DomainValue<S>>,
    ) -> (CtxOf<S>, Store<S::Addr, DomainValue<S>>) {
        let pos = ctx.position();
        match action {
            Action::Value { value, store, .. } => (
                ThreadCtx {
                    control: Control::Kont { value },
                    kstore: ctx.kstore.clone(),
                    kont: tail,
                    time: ctx.time.tick(pos),
                },
                store,
            ),
            Action::Push {
                frame,
                exp,
                env,
                store,
                ..
            } => {
                let ak = KontAddr::at(exp.position(), ctx.time.digest());
                (
                    ThreadCtx {
                        control: Control::Eval { exp, env },
                        kstore: ctx.kstore.clone().extend(ak, frame, tail),
                        kont: ak,
                        time: ctx.time.tick(pos),
                    },
                    store,
                )
            }
            Action::Eval { exp, env, store, .. } => (
                ThreadCtx {
                    control: Control::Eval { exp, env },
                    kstore: ctx.kstore.clone(),
                    kont: tail,
                    time: ctx.time.tick(pos),
                },
                store,
            ),
            Action::StepIn {
                fexp,
                body,
                env,
                store,
                ..
            } => (
                ThreadCtx {
                    control: Control::Eval { exp: body, env },
                    kstore: ctx.kstore.clone(),
                    kont: tail,
                    time: ctx.time.tick_call(fexp.position()),
                },
                store,
            ),
            Action::Error { error } => (
                ThreadCtx {
                    control: Control::Error { error },
                    kstore: ctx.kstore.clone(),
                    kont: tail,
                    time: ctx.time.clone(),
                },
                fallback_store.clone(),
            ),
            other => (
                ThreadCtx {
                    control: Control::Error {
                        error: crate::error::SemanticError::NotSupported(format!(
                            "action {} is not a thread action",
                            other.name()
                        )),
                    },
                    kstore: ctx.kstore.clone(),
                    kont: tail,
                    time: ctx.time.clone(),
                },
                fallback_store.clone(),
            ),
        }
    }

    /// Fold one action of thread `tid` into successor states.
    fn fold_action(
        &self,
        state: &StateOf<S>,
        tid: Tid,
        ctx: &CtxOf<S>,
        action: SemAction<S>,
        tail: KontAddr,
    ) -> Vec<StateOf<S>> {
        match action {
            Action::Spawn {
                tid: new_tid,
                exp,
                env,
                store,
                cont,
                ..
            } => {
                let (parent, store) = self.apply_ctx(ctx, *cont, tail, &store);
                let mut next = self.with_ctx(state, tid, ctx, parent, store);
                let child = ThreadCtx {
                    control: Control::Eval { exp, env },
                    kstore: KontStore::empty(),
                    kont: KontAddr::Halt,
                    time: ctx.time.clone(),
                };
                next.threads.entry(new_tid).or_default().insert(child);
                vec![next]
            }
            Action::Join { threads, store, .. } => {
                let mut out = Vec::new();
                let targets = self.sem.domain().tids(&threads);
                if targets.is_empty() {
                    let stuck = ThreadCtx {
                        control: Control::Error {
                            error: crate::error::SemanticError::TypeError {
                                expected: "thread id",
                                got: threads.to_string(),
                            },
                        },
                        kstore: ctx.kstore.clone(),
                        kont: tail,
                        time: ctx.time.clone(),
                    };
                    return vec![self.with_ctx(state, tid, ctx, stuck, store)];
                }
                for target in targets {
                    if target == tid {
                        continue;
                    }
                    if let Some(value) = self.thread_final(state, target) {
                        let joined = ThreadCtx {
                            control: Control::Kont { value },
                            kstore: ctx.kstore.clone(),
                            kont: tail,
                            time: ctx.time.tick(ctx.position()),
                        };
                        out.push(self.with_ctx(state, tid, ctx, joined, store.clone()));
                    }
                    // a not-yet-halted target blocks this branch; the
                    // join is retried from a later interleaving
                }
                out
            }
            other => {
                let (ctx2, store) = self.apply_ctx(ctx, other, tail, &state.store);
                vec![self.with_ctx(state, tid, ctx, ctx2, store)]
            }
        }
    }

    fn successors(&self, state: &StateOf<S>) -> Vec<StateOf<S>> {
        let mut out = Vec::new();
        for (tid, ctxs) in &state.threads {
            for ctx in ctxs {
                if ctx.settled() {
                    continue;
                }
                let pairs: Vec<(SemAction<S>, KontAddr)> = match &ctx.control {
                    Control::Eval { exp, env } => self
                        .sem
                        .step_eval(exp, env, &state.store, &ctx.time)
                        .into_iter()
                        .map(|a| (a, ctx.kont))
                        .collect(),
                    Control::Kont { value } => {
                        let mut pairs = Vec::new();
                        for kont in ctx.kstore.lookup(ctx.kont) {
                            for a in
                                self.sem.step_kont(value, &kont.frame, &state.store, &ctx.time)
                            {
                                pairs.push((a, kont.next));
                            }
                        }
                        pairs
                    }
                    Control::Error { .. } => vec![],
                };
                for (action, tail) in pairs {
                    out.extend(self.fold_action(state, *tid, ctx, action, tail));
                }
            }
        }
        out
    }

    pub fn run(&self, program: S::Exp) -> Output<DomainValue<S>> {
        let start = Instant::now();
        let deadline = Deadline::start(self.config.timeout);
        let mut output = Output::new();
        let mut visited: HashSet<StateOf<S>> = HashSet::new();
        let mut graph: Option<StateGraph<StateOf<S>>> =
            self.config.build_graph.then(StateGraph::new);
        let mut work = Worklist::new(self.config.strategy);
        work.push(self.initial(program));

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
            if !visited.insert(state.clone()) {
                continue;
            }
            // report what this state settled
            if let Some(value) = self.thread_final(&state, Tid::main()) {
                output.final_values.insert(value);
            }
            for ctxs in state.threads.values() {
                for ctx in ctxs {
                    if let Control::Error { error } = &ctx.control {
                        output.errors.insert(error.clone());
                    }
                }
            }
            let succs = self.successors(&state);
            if succs.is_empty() {
                debug!("state has no successors (all threads settled or blocked)");
            }
            for succ in succs {
                if let Some(g) = &mut graph {
                    g.add_edge(state.clone(), succ.clone());
                }
                if !visited.contains(&succ) {
                    work.push(succ);
                }
            }
        }

        output.num_states = visited.len();
        output.time = start.elapsed();
        output.dot = graph.map(|g| {
            g.to_dot(|s| {
                let class = if s.threads.values().flatten().any(|c| c.settled()) {
                    NodeClass::Value
                } else {
                    NodeClass::Eval
                };
                (s.to_string(), class)
            })
        });
        info!(
            states = output.num_states,
            finals = output.final_values.len(),
            "concurrent exploration finished"
        );
        output
    }
}
