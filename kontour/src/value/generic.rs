use super::{
    Behavior, BinaryOperator, Closure, Flonum, LatticeValue, Pid, ScalarDomain, Tid,
    UnaryOperator, Val, ValueDomain, VectorRef,
};
use crate::address::Address;
use crate::environment::Env;
use crate::error::SemanticError;
use crate::exp::{Expression, Identifier};
use crate::lattice::JoinSemiLattice;
use crate::mayfail::MayFail;

/// Lifts a [`ScalarDomain`] to a full [`ValueDomain`] over the shared
/// [`Val`] carrier. All structural reasoning (pairs, vectors, closures,
/// identity comparison, truthiness of non-scalar values) lives here once;
/// the scalar domain only abstracts constants.
#[derive(Clone, Debug)]
pub struct ScalarValueDomain<D> {
    pub scalar: D,
}

impl<D> ScalarValueDomain<D> {
    pub fn new(scalar: D) -> Self {
        ScalarValueDomain { scalar }
    }
}

/// One element of a value's identity components, for `eq?`.
#[derive(PartialEq, Eq)]
enum IdAtom<'a, E, A: Address> {
    Cons(&'a (A, A)),
    Vector(&'a A),
    Lock(&'a A),
    Tid(&'a Tid),
    Pid(&'a Pid),
    Closure(&'a Closure<E, A>),
    Primitive(&'a Identifier),
    Behavior(&'a Behavior<E, A>),
}

fn identity_atoms<E: Expression, A: Address, S: LatticeValue>(
    v: &Val<E, A, S>,
) -> Vec<IdAtom<'_, E, A>> {
    let mut atoms: Vec<IdAtom<'_, E, A>> = Vec::new();
    atoms.extend(v.conses.iter().map(IdAtom::Cons));
    atoms.extend(v.vectors.iter().map(|r| IdAtom::Vector(&r.addr)));
    atoms.extend(v.locks.iter().map(IdAtom::Lock));
    atoms.extend(v.tids.iter().map(IdAtom::Tid));
    atoms.extend(v.pids.iter().map(IdAtom::Pid));
    atoms.extend(v.closures.iter().map(IdAtom::Closure));
    atoms.extend(v.primitives.iter().map(IdAtom::Primitive));
    atoms.extend(v.behaviors.iter().map(IdAtom::Behavior));
    atoms
}

impl<D: ScalarDomain> ScalarValueDomain<D> {
    fn wrap<E: Expression, A: Address>(
        m: MayFail<D::Scalar>,
    ) -> MayFail<Val<E, A, D::Scalar>> {
        m.map(Val::from_scalar)
    }

    fn truth<E: Expression, A: Address>(&self, b: bool) -> Val<E, A, D::Scalar> {
        Val::from_scalar(self.scalar.boolean(b))
    }

    /// Type predicates and `not`: the structural components answer
    /// directly, the scalar component is delegated.
    fn predicate<E: Expression, A: Address>(
        &self,
        op: UnaryOperator,
        v: &Val<E, A, D::Scalar>,
    ) -> MayFail<Val<E, A, D::Scalar>> {
        use UnaryOperator::*;
        let holds = match op {
            IsPair => !v.conses.is_empty(),
            IsVector => !v.vectors.is_empty(),
            IsLock => !v.locks.is_empty(),
            IsProcedure => !v.closures.is_empty() || !v.primitives.is_empty(),
            // null?, char?, …, not: no structural component qualifies
            _ => false,
        };
        let misses = match op {
            IsPair => v.has_structure() && v.conses.len() < structure_len(v),
            IsVector => v.has_structure() && v.vectors.len() < structure_len(v),
            IsLock => v.has_structure() && v.locks.len() < structure_len(v),
            IsProcedure => {
                v.has_structure()
                    && v.closures.len() + v.primitives.len() < structure_len(v)
            }
            _ => v.has_structure(),
        };
        let mut out = MayFail::empty();
        if holds {
            out.join(MayFail::success(self.truth(true)));
        }
        if misses {
            out.join(MayFail::success(self.truth(false)));
        }
        if !v.scalar.is_bottom() {
            out.join(Self::wrap(self.scalar.unary(op, &v.scalar)));
        }
        out
    }

    fn scalar_unary<E: Expression, A: Address>(
        &self,
        op: UnaryOperator,
        expected: &'static str,
        v: &Val<E, A, D::Scalar>,
    ) -> MayFail<Val<E, A, D::Scalar>> {
        let mut out = MayFail::empty();
        if !v.scalar.is_bottom() {
            out.join(Self::wrap(self.scalar.unary(op, &v.scalar)));
        }
        if v.has_structure() {
            out.join(MayFail::failure(SemanticError::TypeError {
                expected,
                got: v.to_string(),
            }));
        }
        out
    }

    fn vector_length<E: Expression, A: Address>(
        &self,
        v: &Val<E, A, D::Scalar>,
    ) -> MayFail<Val<E, A, D::Scalar>> {
        let mut out = MayFail::empty();
        for vec in &v.vectors {
            match vec.length {
                Some(n) => out.join(MayFail::success(Val::from_scalar(
                    self.scalar.int(n as i64),
                ))),
                None => out.join(Self::wrap(self.scalar.any_int())),
            }
        }
        if !v.scalar.is_bottom() || (v.has_structure() && v.vectors.len() < structure_len(v)) {
            out.join(MayFail::failure(SemanticError::TypeError {
                expected: "vector",
                got: v.to_string(),
            }));
        }
        out
    }

    fn eq_values<E: Expression, A: Address>(
        &self,
        a: &Val<E, A, D::Scalar>,
        b: &Val<E, A, D::Scalar>,
    ) -> MayFail<Val<E, A, D::Scalar>> {
        let mut out = MayFail::empty();
        if !a.scalar.is_bottom() && !b.scalar.is_bottom() {
            out.join(Self::wrap(self.scalar.binary(
                BinaryOperator::Eq,
                &a.scalar,
                &b.scalar,
            )));
        }
        let a_ids = identity_atoms(a);
        let b_ids = identity_atoms(b);
        if !a_ids.is_empty() && !b_ids.is_empty() {
            let shared = a_ids.iter().any(|x| b_ids.contains(x));
            if shared {
                out.join(MayFail::success(self.truth(true)));
            }
            // identity is certain only for a single shared atom under
            // abstract counting; otherwise one abstract cell may stand
            // for several concrete ones
            let certain =
                shared && a_ids.len() == 1 && b_ids.len() == 1 && self.scalar.counting();
            if !certain {
                out.join(MayFail::success(self.truth(false)));
            }
        }
        if (!a.scalar.is_bottom() && b.has_structure())
            || (!b.scalar.is_bottom() && a.has_structure())
        {
            out.join(MayFail::success(self.truth(false)));
        }
        out
    }

    fn scalar_binary<E: Expression, A: Address>(
        &self,
        op: BinaryOperator,
        expected: &'static str,
        a: &Val<E, A, D::Scalar>,
        b: &Val<E, A, D::Scalar>,
    ) -> MayFail<Val<E, A, D::Scalar>> {
        let mut out = MayFail::empty();
        if !a.scalar.is_bottom() && !b.scalar.is_bottom() {
            out.join(Self::wrap(self.scalar.binary(op, &a.scalar, &b.scalar)));
        }
        if a.has_structure() || b.has_structure() {
            out.join(MayFail::failure(SemanticError::TypeError {
                expected,
                got: format!("{a}, {b}"),
            }));
        }
        out
    }
}

fn structure_len<E: Expression, A: Address, S: LatticeValue>(v: &Val<E, A, S>) -> usize {
    v.closures.len()
        + v.primitives.len()
        + v.conses.len()
        + v.vectors.len()
        + v.locks.len()
        + v.tids.len()
        + v.pids.len()
        + v.behaviors.len()
}

impl<E, A, D> ValueDomain<E, A> for ScalarValueDomain<D>
where
    E: Expression,
    A: Address,
    D: ScalarDomain,
{
    type Value = Val<E, A, D::Scalar>;

    fn counting(&self) -> bool {
        self.scalar.counting()
    }

    fn int(&self, n: i64) -> Self::Value {
        Val::from_scalar(self.scalar.int(n))
    }

    fn float(&self, x: Flonum) -> Self::Value {
        Val::from_scalar(self.scalar.float(x))
    }

    fn boolean(&self, b: bool) -> Self::Value {
        Val::from_scalar(self.scalar.boolean(b))
    }

    fn character(&self, c: char) -> Self::Value {
        Val::from_scalar(self.scalar.character(c))
    }

    fn string(&self, s: &str) -> Self::Value {
        Val::from_scalar(self.scalar.string(s))
    }

    fn symbol(&self, name: Identifier) -> Self::Value {
        Val::from_scalar(self.scalar.symbol(name))
    }

    fn nil(&self) -> Self::Value {
        Val::from_scalar(self.scalar.nil())
    }

    fn closure(&self, lambda: &E, env: &Env<A>) -> Self::Value {
        let mut v = Val::bottom();
        v.closures.insert(Closure {
            lambda: lambda.clone(),
            env: env.clone(),
        });
        v
    }

    fn primitive(&self, name: Identifier) -> Self::Value {
        let mut v = Val::bottom();
        v.primitives.insert(name);
        v
    }

    fn cons(&self, car: A, cdr: A) -> Self::Value {
        let mut v = Val::bottom();
        v.conses.insert((car, cdr));
        v
    }

    fn vector(&self, vec: VectorRef<A>) -> Self::Value {
        let mut v = Val::bottom();
        v.vectors.insert(vec);
        v
    }

    fn lock(&self, addr: A) -> Self::Value {
        let mut v = Val::bottom();
        v.locks.insert(addr);
        v
    }

    fn tid(&self, tid: Tid) -> Self::Value {
        let mut v = Val::bottom();
        v.tids.insert(tid);
        v
    }

    fn pid(&self, pid: Pid) -> Self::Value {
        let mut v = Val::bottom();
        v.pids.insert(pid);
        v
    }

    fn behavior(&self, behavior: Behavior<E, A>) -> Self::Value {
        let mut v = Val::bottom();
        v.behaviors.insert(behavior);
        v
    }

    fn error(&self, error: SemanticError) -> Self::Value {
        let mut v: Self::Value = Val::bottom();
        v.errors.insert(error);
        v
    }

    fn is_true(&self, v: &Self::Value) -> bool {
        self.scalar.may_be_true(&v.scalar) || v.has_structure()
    }

    fn is_false(&self, v: &Self::Value) -> bool {
        self.scalar.may_be_false(&v.scalar)
    }

    fn is_error(&self, v: &Self::Value) -> bool {
        !v.errors.is_empty()
    }

    fn as_int(&self, v: &Self::Value) -> Option<i64> {
        if v.has_structure() {
            return None;
        }
        self.scalar.as_int(&v.scalar)
    }

    fn unary(&self, op: UnaryOperator, v: &Self::Value) -> MayFail<Self::Value> {
        use UnaryOperator::*;
        match op {
            IsNull | IsPair | IsChar | IsSymbol | IsString | IsInteger | IsFloat
            | IsBoolean | IsVector | IsLock | IsProcedure | Not => self.predicate(op, v),
            VectorLength => self.vector_length(v),
            Ceiling | Round | Random => self.scalar_unary(op, "number", v),
            StringLength | StringToSymbol => self.scalar_unary(op, "string", v),
            NumberToString => self.scalar_unary(op, "number", v),
            SymbolToString => self.scalar_unary(op, "symbol", v),
        }
    }

    fn binary(&self, op: BinaryOperator, a: &Self::Value, b: &Self::Value)
        -> MayFail<Self::Value> {
        use BinaryOperator::*;
        match op {
            Eq => self.eq_values(a, b),
            StringAppend => self.scalar_binary(op, "string", a, b),
            Plus | Minus | Times | Div | Quotient | Modulo | Remainder | Lt | NumEq => {
                self.scalar_binary(op, "number", a, b)
            }
        }
    }

    fn closures(&self, v: &Self::Value) -> Vec<Closure<E, A>> {
        v.closures.iter().cloned().collect()
    }

    fn primitives(&self, v: &Self::Value) -> Vec<Identifier> {
        v.primitives.iter().cloned().collect()
    }

    fn tids(&self, v: &Self::Value) -> Vec<Tid> {
        v.tids.iter().cloned().collect()
    }

    fn pids(&self, v: &Self::Value) -> Vec<Pid> {
        v.pids.iter().cloned().collect()
    }

    fn behaviors(&self, v: &Self::Value) -> Vec<Behavior<E, A>> {
        v.behaviors.iter().cloned().collect()
    }

    fn locks(&self, v: &Self::Value) -> Vec<A> {
        v.locks.iter().cloned().collect()
    }

    fn car(&self, v: &Self::Value) -> Vec<A> {
        v.conses.iter().map(|(car, _)| car.clone()).collect()
    }

    fn cdr(&self, v: &Self::Value) -> Vec<A> {
        v.conses.iter().map(|(_, cdr)| cdr.clone()).collect()
    }

    fn vectors(&self, v: &Self::Value) -> Vec<VectorRef<A>> {
        v.vectors.iter().cloned().collect()
    }

    fn errors(&self, v: &Self::Value) -> Vec<SemanticError> {
        v.errors.iter().cloned().collect()
    }
}
