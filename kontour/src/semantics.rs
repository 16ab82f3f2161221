use crate::action::Action;
use crate::address::Address;
use crate::environment::Env;
use crate::error::{KontourError, SemanticError};
use crate::exp::{Expression, Identifier};
use crate::store::Store;
use crate::time::Timestamp;
use crate::value::{Behavior, Pid, ValueDomain};
use std::fmt::Debug;
use std::hash::Hash;

/// One suspended continuation frame. Opaque to the machines: a language's
/// semantics defines the frame shapes and is the only code that looks
/// inside them. The kernel just needs cheap identity so frames can live in
/// kont-store cells.
pub trait Frame: Clone + Eq + Ord + Hash + Debug + Send + Sync + 'static {}

/// The value type of a semantics' domain.
pub type DomainValue<S> = <<S as Semantics>::Domain as ValueDomain<
    <S as Semantics>::Exp,
    <S as Semantics>::Addr,
>>::Value;

/// The action type produced by a semantics.
pub type SemAction<S> = Action<
    <S as Semantics>::Exp,
    <S as Semantics>::Addr,
    DomainValue<S>,
    <S as Semantics>::Frame,
>;

/// A language plug-in. Given a machine configuration point
/// `(e, ρ, σ, t)`, a semantics produces the *set* of actions the machine
/// may take next; non-determinism is first-class, and the driver is the
/// single agent that turns the set into graph fan-out.
///
/// Semantics never mutate shared state: store changes travel inside the
/// returned actions, and the driver is the unique authority that folds
/// them into thread pools, global stores, and continuation stores.
pub trait Semantics: Send + Sync {
    type Exp: Expression;
    type Addr: Address;
    type Time: Timestamp;
    type Frame: Frame;
    type Domain: ValueDomain<Self::Exp, Self::Addr>;

    fn domain(&self) -> &Self::Domain;

    /// Front-end entry point: source text to program expression.
    fn parse(&self, source: &str) -> Result<Self::Exp, KontourError>;

    /// The primitive prelude: (name, address, value) triples preloaded
    /// into the initial environment and store.
    fn initial_bindings(&self) -> Vec<(Identifier, Self::Addr, DomainValue<Self>)>;

    /// "About to evaluate `e`."
    fn step_eval(
        &self,
        e: &Self::Exp,
        env: &Env<Self::Addr>,
        store: &Store<Self::Addr, DomainValue<Self>>,
        t: &Self::Time,
    ) -> Vec<SemAction<Self>>;

    /// "Value `value` surfaced and `frame` is the topmost frame."
    fn step_kont(
        &self,
        value: &DomainValue<Self>,
        frame: &Self::Frame,
        store: &Store<Self::Addr, DomainValue<Self>>,
        t: &Self::Time,
    ) -> Vec<SemAction<Self>>;

    /// Actor message dispatch: deliver `tag(args…)` to `behavior`. The
    /// default refuses every message.
    fn step_receive(
        &self,
        self_pid: Pid,
        behavior: &Behavior<Self::Exp, Self::Addr>,
        tag: Identifier,
        args: &[DomainValue<Self>],
        store: &Store<Self::Addr, DomainValue<Self>>,
        t: &Self::Time,
    ) -> Vec<SemAction<Self>> {
        let _ = (self_pid, args, store, t);
        vec![Action::Error {
            error: SemanticError::MessageNotSupported {
                behavior: behavior.name,
                tag,
            },
        }]
    }
}
