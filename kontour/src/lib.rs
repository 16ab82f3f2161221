//! Abstracting-abstract-machine kernel.
//!
//! The kernel is a parameterized small-step interpreter that explores a
//! finite over-approximation of the reachable states of a higher-order,
//! possibly concurrent program. It is generic over four axes: the
//! expression type of the analyzed language, the abstract value lattice,
//! the address allocation policy, and the timestamp (context) policy.
//! A language plugs in through the [`Semantics`](semantics::Semantics)
//! trait, which turns single states into sets of [`Action`](action::Action)s;
//! the machine variants in [`machine`] fold those actions back into a
//! reachability graph.

pub mod action;
pub mod address;
pub mod effect;
pub mod environment;
pub mod error;
pub mod exp;
pub mod graph;
pub mod lattice;
pub mod machine;
pub mod mayfail;
pub mod semantics;
pub mod store;
pub mod time;
pub mod value;

pub use action::Action;
pub use address::{
    Addr, Address, Allocator, CellRole, ClassicalAllocator, KontAddr, ValueSensitiveAllocator,
};
pub use effect::{Effect, EffectKind, Effects};
pub use environment::Env;
pub use error::{KontourError, SemanticError};
pub use exp::{Expression, Identifier, Position};
pub use lattice::JoinSemiLattice;
pub use machine::{Control, ExplorationStrategy, MachineConfig, Output};
pub use mayfail::MayFail;
pub use semantics::Semantics;
pub use store::{Count, KontStore, Store};
pub use time::{ConcreteTimestamp, KCfa, Timestamp, ZeroCfa};
pub use value::{
    Behavior, BinaryOperator, BoundedIntDomain, Closure, ConcreteDomain, Flonum, LatticeValue,
    Pid, Tid, TypeSetDomain, UnaryOperator, ValueDomain, VectorRef,
};
