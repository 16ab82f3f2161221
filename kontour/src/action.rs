use crate::address::Address;
use crate::effect::Effects;
use crate::environment::Env;
use crate::error::SemanticError;
use crate::exp::{Expression, Identifier, Position};
use crate::semantics::Frame;
use crate::store::Store;
use crate::value::{LatticeValue, Tid};

/// The effect a single step requests of the driver.
///
/// Actions are a closed sum: exhaustive matching in the machine variants
/// is the contract that every possible step is handled. Store changes
/// travel inside the action (`σ'`); the driver alone decides how they meet
/// the per-state or global store. Every variant carries the effect
/// fingerprints of the step for interference analysis.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub enum Action<E: Expression, A: Address, V: LatticeValue, F: Frame> {
    /// `e` was fully reduced: hand `value` to the topmost frame.
    Value {
        value: V,
        store: Store<A, V>,
        effects: Effects<A>,
    },
    /// Evaluating `e` needs `exp` first; suspend `frame` above it.
    Push {
        frame: F,
        exp: E,
        env: Env<A>,
        store: Store<A, V>,
        effects: Effects<A>,
    },
    /// Continue evaluating `exp` without a new frame.
    Eval {
        exp: E,
        env: Env<A>,
        store: Store<A, V>,
        effects: Effects<A>,
    },
    /// Enter a closure body: `fexp` is the call expression, so
    /// call-site-sensitive timestamps tick on it. Argument bindings are
    /// already in `store`/`env`.
    StepIn {
        fexp: E,
        body: E,
        env: Env<A>,
        store: Store<A, V>,
        effects: Effects<A>,
    },
    /// The step failed; the successor is an error state with no
    /// successors of its own.
    Error { error: SemanticError },
    /// Install a new thread running `exp` and continue the parent with
    /// `cont`.
    Spawn {
        tid: Tid,
        exp: E,
        env: Env<A>,
        store: Store<A, V>,
        cont: Box<Action<E, A, V, F>>,
        effects: Effects<A>,
    },
    /// Wait for every thread denoted by `threads` to halt, then continue
    /// with its final value.
    Join {
        threads: V,
        store: Store<A, V>,
        effects: Effects<A>,
    },
    /// Join `tag(args…)` into the mailbox of every actor denoted by
    /// `target`, then continue with `cont`.
    Send {
        target: V,
        tag: Identifier,
        args: Vec<V>,
        cont: Box<Action<E, A, V, F>>,
        effects: Effects<A>,
    },
    /// Allocate a fresh actor for `behavior` (fields already bound in the
    /// carried store) at creation site `site`; the creator continues with
    /// the new pid as its value.
    Create {
        behavior: V,
        site: Position,
        store: Store<A, V>,
        effects: Effects<A>,
    },
    /// Replace the current actor's behavior; the next receive uses it.
    Become {
        behavior: V,
        store: Store<A, V>,
        effects: Effects<A>,
    },
    /// Remove the current actor; its mailbox is discarded.
    Terminate,
}

impl<E: Expression, A: Address, V: LatticeValue, F: Frame> Action<E, A, V, F> {
    pub fn value(value: V, store: Store<A, V>) -> Self {
        Action::Value {
            value,
            store,
            effects: Effects::new(),
        }
    }

    pub fn push(frame: F, exp: E, env: Env<A>, store: Store<A, V>) -> Self {
        Action::Push {
            frame,
            exp,
            env,
            store,
            effects: Effects::new(),
        }
    }

    pub fn eval(exp: E, env: Env<A>, store: Store<A, V>) -> Self {
        Action::Eval {
            exp,
            env,
            store,
            effects: Effects::new(),
        }
    }

    pub fn step_in(fexp: E, body: E, env: Env<A>, store: Store<A, V>) -> Self {
        Action::StepIn {
            fexp,
            body,
            env,
            store,
            effects: Effects::new(),
        }
    }

    pub fn error(error: SemanticError) -> Self {
        Action::Error { error }
    }

    /// Attach effect fingerprints to this action.
    pub fn with_effects(mut self, extra: Effects<A>) -> Self {
        match &mut self {
            Action::Value { effects, .. }
            | Action::Push { effects, .. }
            | Action::Eval { effects, .. }
            | Action::StepIn { effects, .. }
            | Action::Spawn { effects, .. }
            | Action::Join { effects, .. }
            | Action::Send { effects, .. }
            | Action::Create { effects, .. }
            | Action::Become { effects, .. } => effects.extend(extra),
            Action::Error { .. } | Action::Terminate => {}
        }
        self
    }

    pub fn effects(&self) -> Option<&Effects<A>> {
        match self {
            Action::Value { effects, .. }
            | Action::Push { effects, .. }
            | Action::Eval { effects, .. }
            | Action::StepIn { effects, .. }
            | Action::Spawn { effects, .. }
            | Action::Join { effects, .. }
            | Action::Send { effects, .. }
            | Action::Create { effects, .. }
            | Action::Become { effects, .. } => Some(effects),
            Action::Error { .. } | Action::Terminate => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Action::Value { .. } => "value",
            Action::Push { .. } => "push",
            Action::Eval { .. } => "eval",
            Action::StepIn { .. } => "step-in",
            Action::Error { .. } => "error",
            Action::Spawn { .. } => "spawn",
            Action::Join { .. } => "join",
            Action::Send { .. } => "send",
            Action::Create { .. } => "create",
            Action::Become { .. } => "become",
            Action::Terminate => "terminate",
        }
    }

    /// The store this action carries, if any.
    pub fn store(&self) -> Option<&Store<A, V>> {
        match self {
            Action::Value { store, .. }
            | Action::Push { store, .. }
            | Action::Eval { store, .. }
            | Action::StepIn { store, .. }
            | Action::Spawn { store, .. }
            | Action::Join { store, .. }
            | Action::Create { store, .. }
            | Action::Become { store, .. } => Some(store),
            Action::Send { cont, .. } => cont.store(),
            Action::Error { .. } | Action::Terminate => None,
        }
    }
}
