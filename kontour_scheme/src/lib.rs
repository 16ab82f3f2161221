//! Scheme front-end for the kontour abstract-machine kernel.
//!
//! Provides the s-expression reader, the Scheme expression type, the
//! [`SchemeSemantics`] plug-in (sequential, thread, and actor forms), and
//! the primitive prelude. The `kontour` binary and the end-to-end
//! analysis scenarios live in this crate; the kernel stays
//! language-agnostic.

pub mod exp;
mod primitives;
pub mod semantics;
pub mod sexp;

pub use exp::{compile_program, ExpKind, Handler, Literal, SchemeExp};
pub use semantics::{SchemeFrame, SchemeSemantics};
pub use sexp::{parse_program, SExp, SExpKind};

use kontour::value::{BoundedIntDomain, ConcreteDomain, TypeSetDomain};
use kontour::{Addr, ClassicalAllocator, ConcreteTimestamp, ValueSensitiveAllocator, ZeroCfa};

/// The stock analysis configurations, named the way the CLI names them.
pub type TypeSetSemantics =
    SchemeSemantics<Addr<ZeroCfa>, TypeSetDomain, ClassicalAllocator, ZeroCfa>;
pub type TypeSetValueSensitiveSemantics =
    SchemeSemantics<Addr<ZeroCfa>, TypeSetDomain, ValueSensitiveAllocator, ZeroCfa>;
pub type BoundedIntSemantics =
    SchemeSemantics<Addr<ZeroCfa>, BoundedIntDomain, ClassicalAllocator, ZeroCfa>;
pub type AbstractConcreteSemantics =
    SchemeSemantics<Addr<ZeroCfa>, ConcreteDomain, ClassicalAllocator, ZeroCfa>;
pub type ConcreteSemantics =
    SchemeSemantics<Addr<ConcreteTimestamp>, ConcreteDomain, ClassicalAllocator, ConcreteTimestamp>;

impl TypeSetSemantics {
    pub fn type_set() -> Self {
        SchemeSemantics::new(TypeSetDomain::type_set(), ClassicalAllocator)
    }
}

impl BoundedIntSemantics {
    pub fn bounded(bound: i64) -> Self {
        SchemeSemantics::new(BoundedIntDomain::bounded(bound), ClassicalAllocator)
    }
}

impl ConcreteSemantics {
    pub fn concrete() -> Self {
        SchemeSemantics::new(ConcreteDomain::concrete(), ClassicalAllocator)
    }
}
