//! The abstract value model.
//!
//! A value is a product of a *scalar* component (numbers, booleans,
//! characters, strings, symbols, nil — abstracted by a pluggable
//! [`ScalarDomain`]) and set components for everything that carries
//! structure: closures, primitives, pairs and vectors (by address), locks,
//! thread and actor identifiers, behaviors, and error markers. Join is
//! component-wise, so one carrier type [`Val`] serves every lattice
//! instance; precision lives entirely in the scalar domain.

mod bounded;
mod concrete;
mod generic;
mod product;
mod type_set;

pub use bounded::{BoundedConst, BoundedIntDomain, BoundedScalar, BoundedScalarDomain};
pub use concrete::{ConcreteDomain, ConcreteScalar, ConcreteScalarDomain, ScalarConst};
pub use generic::ScalarValueDomain;
pub use product::{ProductScalar, ProductScalarDomain};
pub use type_set::{TypeScalar, TypeScalarDomain, TypeSetDomain, TypeTag};

use crate::address::Address;
use crate::environment::Env;
use crate::error::SemanticError;
use crate::exp::{Expression, Identifier, Position};
use crate::lattice::JoinSemiLattice;
use crate::mayfail::MayFail;
use crate::time::Timestamp;
use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::fmt::{self, Debug, Display, Formatter};
use std::hash::{Hash, Hasher};

/// A float with total equality, ordering, and hashing, so it can sit in
/// lattice cells and BTree keys.
#[derive(Clone, Copy, Debug)]
pub struct Flonum(pub f64);

impl PartialEq for Flonum {
    fn eq(&self, other: &Self) -> bool {
        self.0.to_bits() == other.0.to_bits()
    }
}

impl Eq for Flonum {}

impl PartialOrd for Flonum {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Flonum {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

impl Hash for Flonum {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.to_bits().hash(state);
    }
}

impl Display for Flonum {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<f64> for Flonum {
    fn from(x: f64) -> Self {
        Flonum(x)
    }
}

/// Thread identifier: creation site plus a context fingerprint. With a
/// finite timestamp policy the set of identifiers is finite, so one
/// abstract thread may stand for several concrete ones.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct Tid {
    site: Position,
    ctx: u64,
}

impl Tid {
    /// The program's initial thread.
    pub fn main() -> Self {
        Tid {
            site: Position::none(),
            ctx: 0,
        }
    }

    pub fn from_site<T: Timestamp>(site: Position, t: &T) -> Self {
        Tid {
            site,
            ctx: t.digest(),
        }
    }
}

impl Display for Tid {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        if *self == Tid::main() {
            f.write_str("tid:main")
        } else {
            write!(f, "tid:{}#{:x}", self.site, self.ctx)
        }
    }
}

/// Actor identifier. Same bounded-allocation scheme as [`Tid`]: at most
/// one identifier per (creation site, context) pair.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct Pid {
    site: Position,
    ctx: u64,
}

impl Pid {
    /// The main program, viewed as the root actor.
    pub fn main() -> Self {
        Pid {
            site: Position::none(),
            ctx: 0,
        }
    }

    pub fn from_site<T: Timestamp>(site: Position, t: &T) -> Self {
        Pid {
            site,
            ctx: t.digest(),
        }
    }
}

impl Display for Pid {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        if *self == Pid::main() {
            f.write_str("pid:main")
        } else {
            write!(f, "pid:{}#{:x}", self.site, self.ctx)
        }
    }
}

/// `(λ, ρ)`.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct Closure<E, A: Address> {
    pub lambda: E,
    pub env: Env<A>,
}

/// An actor behavior: the defining expression closed over an environment
/// in which the behavior's state fields are already bound. The kernel
/// treats the expression as opaque; only the semantics knows how to
/// dispatch a message against it.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct Behavior<E, A: Address> {
    pub name: Identifier,
    pub exp: E,
    pub env: Env<A>,
}

/// A vector value: the address of its (summarized) payload cell, and the
/// exact length when it is statically known.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct VectorRef<A: Address> {
    pub addr: A,
    pub length: Option<u64>,
}

/// Bounds every machine needs from a value: lattice structure plus cheap,
/// deterministic identity.
pub trait LatticeValue:
    JoinSemiLattice + Ord + Hash + Debug + Display + Send + Sync + 'static
{
}

impl<T> LatticeValue for T where
    T: JoinSemiLattice + Ord + Hash + Debug + Display + Send + Sync + 'static
{
}

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub enum UnaryOperator {
    IsNull,
    IsPair,
    IsChar,
    IsSymbol,
    IsString,
    IsInteger,
    IsFloat,
    IsBoolean,
    IsVector,
    IsLock,
    IsProcedure,
    Not,
    Ceiling,
    Round,
    Random,
    VectorLength,
    StringLength,
    NumberToString,
    StringToSymbol,
    SymbolToString,
}

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub enum BinaryOperator {
    Plus,
    Minus,
    Times,
    Div,
    Quotient,
    Modulo,
    Remainder,
    Lt,
    NumEq,
    Eq,
    StringAppend,
}

/// Abstraction of the scalar (unstructured) part of a value. The three
/// built-in instances are exact constants, type tags, and bounded
/// integers; [`ProductScalar`] combines two of them component-wise.
pub trait ScalarDomain: Clone + Debug + Send + Sync {
    type Scalar: LatticeValue;

    fn int(&self, n: i64) -> Self::Scalar;
    fn float(&self, x: Flonum) -> Self::Scalar;
    fn boolean(&self, b: bool) -> Self::Scalar;
    fn character(&self, c: char) -> Self::Scalar;
    fn string(&self, s: &str) -> Self::Scalar;
    fn symbol(&self, name: Identifier) -> Self::Scalar;
    fn nil(&self) -> Self::Scalar;

    /// An integer of statically unknown magnitude (summarized vector
    /// lengths, `random`). Exact domains cannot produce one.
    fn any_int(&self) -> MayFail<Self::Scalar>;

    /// May this scalar be anything other than `#f`?
    fn may_be_true(&self, s: &Self::Scalar) -> bool;

    /// May this scalar be `#f`?
    fn may_be_false(&self, s: &Self::Scalar) -> bool;

    /// The single exact integer this scalar denotes, when the domain can
    /// prove it. Type-level domains never can.
    fn as_int(&self, s: &Self::Scalar) -> Option<i64> {
        let _ = s;
        None
    }

    fn unary(&self, op: UnaryOperator, s: &Self::Scalar) -> MayFail<Self::Scalar>;
    fn binary(&self, op: BinaryOperator, a: &Self::Scalar, b: &Self::Scalar)
        -> MayFail<Self::Scalar>;

    /// Abstract counting: does this domain distinguish one allocation
    /// from many? Strong update is licensed only when it does.
    fn counting(&self) -> bool;
}

/// The value carrier shared by every lattice instance.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct Val<E: Expression, A: Address, S: LatticeValue> {
    pub(crate) scalar: S,
    pub(crate) closures: BTreeSet<Closure<E, A>>,
    pub(crate) primitives: BTreeSet<Identifier>,
    pub(crate) conses: BTreeSet<(A, A)>,
    pub(crate) vectors: BTreeSet<VectorRef<A>>,
    pub(crate) locks: BTreeSet<A>,
    pub(crate) tids: BTreeSet<Tid>,
    pub(crate) pids: BTreeSet<Pid>,
    pub(crate) behaviors: BTreeSet<Behavior<E, A>>,
    pub(crate) errors: BTreeSet<SemanticError>,
}

impl<E: Expression, A: Address, S: LatticeValue> Val<E, A, S> {
    pub(crate) fn from_scalar(scalar: S) -> Self {
        Val {
            scalar,
            ..Self::bottom()
        }
    }

    /// True when the value has any non-scalar, non-error component.
    pub(crate) fn has_structure(&self) -> bool {
        !self.closures.is_empty()
            || !self.primitives.is_empty()
            || !self.conses.is_empty()
            || !self.vectors.is_empty()
            || !self.locks.is_empty()
            || !self.tids.is_empty()
            || !self.pids.is_empty()
            || !self.behaviors.is_empty()
    }
}

impl<E: Expression, A: Address, S: LatticeValue> JoinSemiLattice for Val<E, A, S> {
    fn bottom() -> Self {
        Val {
            scalar: S::bottom(),
            closures: BTreeSet::new(),
            primitives: BTreeSet::new(),
            conses: BTreeSet::new(),
            vectors: BTreeSet::new(),
            locks: BTreeSet::new(),
            tids: BTreeSet::new(),
            pids: BTreeSet::new(),
            behaviors: BTreeSet::new(),
            errors: BTreeSet::new(),
        }
    }

    fn join(&mut self, other: &Self) {
        self.scalar.join(&other.scalar);
        self.closures.extend(other.closures.iter().cloned());
        self.primitives.extend(other.primitives.iter().cloned());
        self.conses.extend(other.conses.iter().cloned());
        self.vectors.extend(other.vectors.iter().cloned());
        self.locks.extend(other.locks.iter().cloned());
        self.tids.extend(other.tids.iter().cloned());
        self.pids.extend(other.pids.iter().cloned());
        self.behaviors.extend(other.behaviors.iter().cloned());
        self.errors.extend(other.errors.iter().cloned());
    }

    fn subsumes(&self, other: &Self) -> bool {
        self.scalar.subsumes(&other.scalar)
            && other.closures.is_subset(&self.closures)
            && other.primitives.is_subset(&self.primitives)
            && other.conses.is_subset(&self.conses)
            && other.vectors.is_subset(&self.vectors)
            && other.locks.is_subset(&self.locks)
            && other.tids.is_subset(&self.tids)
            && other.pids.is_subset(&self.pids)
            && other.behaviors.is_subset(&self.behaviors)
            && other.errors.is_subset(&self.errors)
    }
}

impl<E: Expression, A: Address, S: LatticeValue> Display for Val<E, A, S> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        if self.is_bottom() {
            return f.write_str("⊥");
        }
        let mut sep = Separated::new(f);
        if !self.scalar.is_bottom() {
            sep.item(format_args!("{}", self.scalar))?;
        }
        for c in &self.closures {
            sep.item(format_args!("clo(λ@{})", c.lambda.position()))?;
        }
        for p in &self.primitives {
            sep.item(format_args!("#{p}"))?;
        }
        for (car, cdr) in &self.conses {
            sep.item(format_args!("cons({car}, {cdr})"))?;
        }
        for v in &self.vectors {
            match v.length {
                Some(n) => sep.item(format_args!("vec[{n}]({})", v.addr))?,
                None => sep.item(format_args!("vec({})", v.addr))?,
            }
        }
        for l in &self.locks {
            sep.item(format_args!("lock({l})"))?;
        }
        for t in &self.tids {
            sep.item(format_args!("{t}"))?;
        }
        for p in &self.pids {
            sep.item(format_args!("{p}"))?;
        }
        for b in &self.behaviors {
            sep.item(format_args!("beh({})", b.name))?;
        }
        for e in &self.errors {
            sep.item(format_args!("error({e})"))?;
        }
        Ok(())
    }
}

/// Comma-separates the pieces of a joined value's rendering.
struct Separated<'a, 'f> {
    f: &'a mut Formatter<'f>,
    first: bool,
}

impl<'a, 'f> Separated<'a, 'f> {
    fn new(f: &'a mut Formatter<'f>) -> Self {
        Separated { f, first: true }
    }

    fn item(&mut self, args: fmt::Arguments<'_>) -> fmt::Result {
        if !self.first {
            self.f.write_str(" ∨ ")?;
        }
        self.first = false;
        self.f.write_fmt(args)
    }
}

/// The lattice interface the machines and semantics program against. A
/// domain object carries run parameters (the integer bound, the counting
/// flag), so injections and operators are instance methods; the value type
/// itself only needs parameter-free lattice structure.
pub trait ValueDomain<E: Expression, A: Address>: Clone + Debug + Send + Sync {
    type Value: LatticeValue;

    fn counting(&self) -> bool;

    fn int(&self, n: i64) -> Self::Value;
    fn float(&self, x: Flonum) -> Self::Value;
    fn boolean(&self, b: bool) -> Self::Value;
    fn character(&self, c: char) -> Self::Value;
    fn string(&self, s: &str) -> Self::Value;
    fn symbol(&self, name: Identifier) -> Self::Value;
    fn nil(&self) -> Self::Value;
    fn closure(&self, lambda: &E, env: &Env<A>) -> Self::Value;
    fn primitive(&self, name: Identifier) -> Self::Value;
    fn cons(&self, car: A, cdr: A) -> Self::Value;
    fn vector(&self, vec: VectorRef<A>) -> Self::Value;
    fn lock(&self, addr: A) -> Self::Value;
    fn tid(&self, tid: Tid) -> Self::Value;
    fn pid(&self, pid: Pid) -> Self::Value;
    fn behavior(&self, behavior: Behavior<E, A>) -> Self::Value;
    fn error(&self, error: SemanticError) -> Self::Value;

    /// May the value be anything but `#f`? Both truth projections may
    /// hold at once; that encodes "may be true, may be false".
    fn is_true(&self, v: &Self::Value) -> bool;
    fn is_false(&self, v: &Self::Value) -> bool;
    fn is_error(&self, v: &Self::Value) -> bool;

    /// The single exact integer this value denotes, if provable.
    fn as_int(&self, v: &Self::Value) -> Option<i64>;

    /// Operators never panic and never throw: inapplicable arguments
    /// surface as error components of the result.
    fn unary(&self, op: UnaryOperator, v: &Self::Value) -> MayFail<Self::Value>;
    fn binary(&self, op: BinaryOperator, a: &Self::Value, b: &Self::Value)
        -> MayFail<Self::Value>;

    fn closures(&self, v: &Self::Value) -> Vec<Closure<E, A>>;
    fn primitives(&self, v: &Self::Value) -> Vec<Identifier>;
    fn tids(&self, v: &Self::Value) -> Vec<Tid>;
    fn pids(&self, v: &Self::Value) -> Vec<Pid>;
    fn behaviors(&self, v: &Self::Value) -> Vec<Behavior<E, A>>;
    fn locks(&self, v: &Self::Value) -> Vec<A>;
    fn car(&self, v: &Self::Value) -> Vec<A>;
    fn cdr(&self, v: &Self::Value) -> Vec<A>;
    fn vectors(&self, v: &Self::Value) -> Vec<VectorRef<A>>;
    fn errors(&self, v: &Self::Value) -> Vec<SemanticError>;
}
