use super::{Control, Deadline, MachineConfig, Output, Worklist};
use crate::action::Action;
use crate::address::{Address, KontAddr};
use crate::exp::{Expression, Identifier, Position};
use crate::graph::{NodeClass, StateGraph};
use crate::semantics::{DomainValue, Frame, SemAction, Semantics};
use crate::store::{KontStore, Store};
use crate::time::Timestamp;
use crate::value::{Behavior, LatticeValue, Pid, ValueDomain};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fmt::{self, Display, Formatter};
use std::time::Instant;
use tracing::{debug, info, warn};

/// An abstract message: tag plus payload values. Mailboxes are set-like
/// lattice cells, so delivery is unordered and at-least-once: receiving a
/// message does not remove it.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct Msg<V> {
    pub tag: Identifier,
    pub args: Vec<V>,
}

/// What an actor is doing: evaluating a turn, or waiting for a message.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub enum ActorRun<E: Expression, A: Address, V: LatticeValue, F: Frame, T: Timestamp> {
    Busy {
        control: Control<E, A, V>,
        kstore: KontStore<F>,
        kont: KontAddr,
        time: T,
    },
    Idle {
        time: T,
    },
}

/// One abstract actor context: its current behavior (`None` for the root
/// program) and what it is running.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct ActorCtx<E: Expression, A: Address, V: LatticeValue, F: Frame, T: Timestamp> {
    pub beh: Option<Behavior<E, A>>,
    pub run: ActorRun<E, A, V, F, T>,
}

impl<E: Expression, A: Address, V: LatticeValue, F: Frame, T: Timestamp>
    ActorCtx<E, A, V, F, T>
{
    /// The root actor's final value, once its program has returned.
    fn root_halted(&self) -> Option<&V> {
        match (&self.beh, &self.run) {
            (
                None,
                ActorRun::Busy {
                    control: Control::Kont { value },
                    kont: KontAddr::Halt,
                    ..
                },
            ) => Some(value),
            _ => None,
        }
    }

    /// A behavior-carrying actor whose turn just finished goes idle.
    fn turn_over(&self) -> bool {
        matches!(
            (&self.beh, &self.run),
            (
                Some(_),
                ActorRun::Busy {
                    control: Control::Kont { .. },
                    kont: KontAddr::Halt,
                    ..
                },
            )
        )
    }

    fn settled(&self) -> bool {
        self.root_halted().is_some()
            || matches!(
                &self.run,
                ActorRun::Busy {
                    control: Control::Error { .. },
                    ..
                }
            )
    }
}

/// A vertex of the actor state graph: the actor set, the mailboxes, and
/// the shared store.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct ActorsState<E: Expression, A: Address, V: LatticeValue, F: Frame, T: Timestamp> {
    pub actors: BTreeMap<Pid, BTreeSet<ActorCtx<E, A, V, F, T>>>,
    pub mailboxes: BTreeMap<Pid, BTreeSet<Msg<V>>>,
    pub store: Store<A, V>,
}

impl<E: Expression, A: Address, V: LatticeValue, F: Frame, T: Timestamp> Display
    for ActorsState<E, A, V, F, T>
{
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        for (i, (pid, ctxs)) in self.actors.iter().enumerate() {
            if i > 0 {
                write!(f, " ∥ ")?;
            }
            write!(f, "{pid}")?;
            for ctx in ctxs {
                match &ctx.run {
                    ActorRun::Busy { control, .. } => write!(f, " {control}")?,
                    ActorRun::Idle { .. } => write!(f, " idle")?,
                }
            }
        }
        Ok(())
    }
}

pub type StateOf<S> = ActorsState<
    <S as Semantics>::Exp,
    <S as Semantics>::Addr,
    DomainValue<S>,
    <S as Semantics>::Frame,
    <S as Semantics>::Time,
>;

type CtxOf<S> = ActorCtx<
    <S as Semantics>::Exp,
    <S as Semantics>::Addr,
    DomainValue<S>,
    <S as Semantics>::Frame,
    <S as Semantics>::Time,
>;

/// What folding one actor action produced, beyond successor states.
struct FoldNotes {
    terminated: Vec<Pid>,
}

/// AAM over a set of actors with set-like mailboxes.
pub struct ActorsAam<S: Semantics> {
    pub sem: S,
    pub config: MachineConfig,
}

impl<S: Semantics> ActorsAam<S> {
    pub fn new(sem: S, config: MachineConfig) -> Self {
        ActorsAam { sem, config }
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
        let root = ActorCtx {
            beh: None,
            run: ActorRun::Busy {
                control: Control::Eval { exp: program, env },
                kstore: KontStore::empty(),
                kont: KontAddr::Halt,
                time: S::Time::zero(),
            },
        };
        ActorsState {
            actors: BTreeMap::from([(Pid::main(), BTreeSet::from([root]))]),
            mailboxes: BTreeMap::new(),
            store,
        }
    }

    fn with_ctx(
        &self,
        state: &StateOf<S>,
        pid: Pid,
        old: &CtxOf<S>,
        new: Option<CtxOf<S>>,
        store: Store<S::Addr, DomainValue<S>>,
    ) -> StateOf<S> {
        let mut actors = state.actors.clone();
        let set = actors.entry(pid).or_default();
        set.remove(old);
        match new {
            Some(ctx) => {
                set.insert(ctx);
            }
            None => {
                if set.is_empty() {
                    actors.remove(&pid);
                }
            }
        }
        ActorsState {
            actors,
            mailboxes: state.mailboxes.clone(),
            store,
        }
    }

    /// Fold a sequential action into a busy actor context.
    fn apply_run(
        &self,
        ctx: &CtxOf<S>,
        action: SemAction<S>,
        tail: KontAddr,
        fallback: &Store<S::Addr, DomainValue<S>>,
    ) -> (CtxOf<S>, Store<S::Addr, DomainValue<S>>) {
        let (kstore, time, pos) = match &ctx.run {
            ActorRun::Busy {
                kstore,
                time,
                control,
                ..
            } => (
                kstore.clone(),
                time.clone(),
                match control {
                    Control::Eval { exp, .. } => exp.position(),
                    _ => Position::none(),
                },
            ),
            ActorRun::Idle { time } => (KontStore::empty(), time.clone(), Position::none()),
        };
        let busy = |control, kstore, kont, time| ActorCtx {
            beh: ctx.beh.clone(),
            run: ActorRun::Busy {
                control,
                kstore,
                kont,
                time,
            },
        };
        match action {
            Action::Value { value, store, .. } => (
                busy(Control::Kont { value }, kstore, tail, time.tick(pos)),
                store,
            ),
            Action::Push {
                frame,
                exp,
                env,
                store,
                ..
            } => {
                let ak = KontAddr::at(exp.position(), time.digest());
                (
                    busy(
                        Control::Eval { exp, env },
                        kstore.extend(ak, frame, tail),
                        ak,
                        time.tick(pos),
                    ),
                    store,
                )
            }
            Action::Eval { exp, env, store, .. } => (
                busy(Control::Eval { exp, env }, kstore, tail, time.tick(pos)),
                store,
            ),
            Action::StepIn {
                fexp,
                body,
                env,
                store,
                ..
            } => (
                busy(
                    Control::Eval { exp: body, env },
                    kstore,
                    tail,
                    time.tick_call(fexp.position()),
                ),
                store,
            ),
            Action::Error { error } => (
                busy(Control::Error { error }, kstore, tail, time),
                fallback.clone(),
            ),
            other => (
                busy(
                    Control::Error {
                        error: crate::error::SemanticError::NotSupported(format!(
                            "unhandled actor action {}",
                            other.name()
                        )),
                    },
                    kstore,
                    tail,
                    time,
                ),
                fallback.clone(),
            ),
        }
    }

    fn fold_action(
        &self,
        state: &StateOf<S>,
        pid: Pid,
        ctx: &CtxOf<S>,
        action: SemAction<S>,
        tail: KontAddr,
        notes: &mut FoldNotes,
    ) -> Vec<StateOf<S>> {
        let domain = self.sem.domain();
        let time = match &ctx.run {
            ActorRun::Busy { time, .. } | ActorRun::Idle { time } => time.clone(),
        };
        match action {
            Action::Send {
                target,
                tag,
                args,
                cont,
                ..
            } => {
                let pids = domain.pids(&target);
                if pids.is_empty() {
                    let (stuck, store) = self.apply_run(
                        ctx,
                        Action::error(crate::error::SemanticError::TypeError {
                            expected: "actor pid",
                            got: target.to_string(),
                        }),
                        tail,
                        &state.store,
                    );
                    return vec![self.with_ctx(state, pid, ctx, Some(stuck), store)];
                }
                let (sender, store) = self.apply_run(ctx, *cont, tail, &state.store);
                let mut next = self.with_ctx(state, pid, ctx, Some(sender), store);
                for target_pid in pids {
                    next.mailboxes.entry(target_pid).or_default().insert(Msg {
                        tag,
                        args: args.clone(),
                    });
                }
                vec![next]
            }
            Action::Create {
                behavior,
                site,
                store,
                ..
            } => {
                let mut out = Vec::new();
                for beh in domain.behaviors(&behavior) {
                    let new_pid = Pid::from_site(site, &time);
                    let creator = self.apply_run(
                        ctx,
                        Action::value(domain.pid(new_pid), store.clone()),
                        tail,
                        &state.store,
                    );
                    let mut next = self.with_ctx(state, pid, ctx, Some(creator.0), creator.1);
                    let spawned = ActorCtx {
                        beh: Some(beh),
                        run: ActorRun::Idle { time: time.clone() },
                    };
                    next.actors.entry(new_pid).or_default().insert(spawned);
                    next.mailboxes.entry(new_pid).or_default();
                    out.push(next);
                }
                if out.is_empty() {
                    let (stuck, store) = self.apply_run(
                        ctx,
                        Action::error(crate::error::SemanticError::TypeError {
                            expected: "behavior",
                            got: behavior.to_string(),
                        }),
                        tail,
                        &state.store,
                    );
                    out.push(self.with_ctx(state, pid, ctx, Some(stuck), store));
                }
                out
            }
            Action::Become { behavior, store, .. } => {
                let mut out = Vec::new();
                for beh in domain.behaviors(&behavior) {
                    let (mut next_ctx, store2) = self.apply_run(
                        ctx,
                        Action::value(domain.nil(), store.clone()),
                        tail,
                        &state.store,
                    );
                    next_ctx.beh = Some(beh);
                    out.push(self.with_ctx(state, pid, ctx, Some(next_ctx), store2));
                }
                if out.is_empty() {
                    let (stuck, store) = self.apply_run(
                        ctx,
                        Action::error(crate::error::SemanticError::TypeError {
                            expected: "behavior",
                            got: behavior.to_string(),
                        }),
                        tail,
                        &state.store,
                    );
                    out.push(self.with_ctx(state, pid, ctx, Some(stuck), store));
                }
                out
            }
            Action::Terminate => {
                notes.terminated.push(pid);
                let mut next = self.with_ctx(state, pid, ctx, None, state.store.clone());
                if !next.actors.contains_key(&pid) {
                    next.mailboxes.remove(&pid);
                }
                vec![next]
            }
            other => {
                let (ctx2, store) = self.apply_run(ctx, other, tail, &state.store);
                vec![self.with_ctx(state, pid, ctx, Some(ctx2), store)]
            }
        }
    }

    /// Successors of one state, plus delivery and termination notes.
    fn successors(
        &self,
        state: &StateOf<S>,
        delivered: &mut BTreeSet<DomainValue<S>>,
        terminated: &mut BTreeSet<Pid>,
    ) -> Vec<StateOf<S>> {
        let mut out = Vec::new();
        let mut notes = FoldNotes { terminated: vec![] };
        for (pid, ctxs) in &state.actors {
            for ctx in ctxs {
                if ctx.settled() {
                    continue;
                }
                if ctx.turn_over() {
                    let time = match &ctx.run {
                        ActorRun::Busy { time, .. } | ActorRun::Idle { time } => time.clone(),
                    };
                    let idle = ActorCtx {
                        beh: ctx.beh.clone(),
                        run: ActorRun::Idle {
                            time: time.tick(Position::none()),
                        },
                    };
                    out.push(self.with_ctx(state, *pid, ctx, Some(idle), state.store.clone()));
                    continue;
                }
                match &ctx.run {
                    ActorRun::Busy {
                        control: Control::Eval { exp, env },
                        kont,
                        time,
                        ..
                    } => {
                        for a in self.sem.step_eval(exp, env, &state.store, time) {
                            out.extend(self.fold_action(state, *pid, ctx, a, *kont, &mut notes));
                        }
                    }
                    ActorRun::Busy {
                        control: Control::Kont { value },
                        kstore,
                        kont,
                        time,
                    } => {
                        for kont_entry in kstore.lookup(*kont) {
                            for a in
                                self.sem.step_kont(value, &kont_entry.frame, &state.store, time)
                            {
                                out.extend(self.fold_action(
                                    state,
                                    *pid,
                                    ctx,
                                    a,
                                    kont_entry.next,
                                    &mut notes,
                                ));
                            }
                        }
                    }
                    ActorRun::Busy {
                        control: Control::Error { .. },
                        ..
                    } => {}
                    ActorRun::Idle { time } => {
                        let Some(beh) = &ctx.beh else { continue };
                        for msg in state.mailboxes.get(pid).into_iter().flatten() {
                            for v in &msg.args {
                                delivered.insert(v.clone());
                            }
                            for a in self.sem.step_receive(
                                *pid,
                                beh,
                                msg.tag,
                                &msg.args,
                                &state.store,
                                time,
                            ) {
                                out.extend(self.fold_action(
                                    state,
                                    *pid,
                                    ctx,
                                    a,
                                    KontAddr::Halt,
                                    &mut notes,
                                ));
                            }
                        }
                    }
                }
            }
        }
        terminated.extend(notes.terminated);
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
        let mut delivered: BTreeSet<DomainValue<S>> = BTreeSet::new();
        let mut terminated: BTreeSet<Pid> = BTreeSet::new();
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
            for ctxs in state.actors.values() {
                for ctx in ctxs {
                    if let Some(value) = ctx.root_halted() {
                        output.final_values.insert(value.clone());
                    }
                    if let ActorRun::Busy {
                        control: Control::Error { error },
                        ..
                    } = &ctx.run
                    {
                        output.errors.insert(error.clone());
                    }
                }
            }
            let succs = self.successors(&state, &mut delivered, &mut terminated);
            if succs.is_empty() {
                debug!("actor state quiescent");
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
        output.delivered = delivered;
        output.terminated_actors = terminated.len();
        output.dot = graph.map(|g| g.to_dot(|s| (s.to_string(), NodeClass::Eval)));
        info!(
            states = output.num_states,
            actors_terminated = output.terminated_actors,
            "actor exploration finished"
        );
        output
    }
}
