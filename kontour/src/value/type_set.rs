use super::{BinaryOperator, Flonum, ScalarDomain, ScalarValueDomain, UnaryOperator};
use crate::error::SemanticError;
use crate::exp::Identifier;
use crate::lattice::JoinSemiLattice;
use crate::mayfail::MayFail;
use itertools::Itertools;
use std::collections::BTreeSet;
use std::fmt::{self, Display, Formatter};

/// The primitive kinds a type-level scalar distinguishes. Booleans are a
/// single tag: a type-level boolean may be `#t` and may be `#f`, which is
/// exactly what drives both branches of a conditional.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub enum TypeTag {
    Int,
    Float,
    Bool,
    Char,
    Str,
    Sym,
    Nil,
}

impl TypeTag {
    fn name(&self) -> &'static str {
        match self {
            TypeTag::Int => "Int",
            TypeTag::Float => "Float",
            TypeTag::Bool => "Bool",
            TypeTag::Char => "Char",
            TypeTag::Str => "Str",
            TypeTag::Sym => "Sym",
            TypeTag::Nil => "Nil",
        }
    }

    fn numeric(&self) -> bool {
        matches!(self, TypeTag::Int | TypeTag::Float)
    }
}

/// A set of type tags.
#[derive(Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct TypeScalar(BTreeSet<TypeTag>);

impl TypeScalar {
    fn of(tag: TypeTag) -> Self {
        TypeScalar(BTreeSet::from([tag]))
    }

    pub fn tags(&self) -> impl Iterator<Item = TypeTag> + '_ {
        self.0.iter().copied()
    }
}

impl JoinSemiLattice for TypeScalar {
    fn bottom() -> Self {
        TypeScalar(BTreeSet::new())
    }

    fn join(&mut self, other: &Self) {
        self.0.extend(other.0.iter().copied());
    }

    fn subsumes(&self, other: &Self) -> bool {
        other.0.is_subset(&self.0)
    }
}

impl Display for TypeScalar {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.iter().map(TypeTag::name).format("|"))
    }
}

/// Scalar domain that abstracts every constant to its type.
#[derive(Clone, Copy, Default, Debug)]
pub struct TypeScalarDomain;

/// The TypeSet lattice instance.
pub type TypeSetDomain = ScalarValueDomain<TypeScalarDomain>;

impl TypeSetDomain {
    pub fn type_set() -> Self {
        ScalarValueDomain::new(TypeScalarDomain)
    }
}

fn type_error(expected: &'static str, got: &TypeScalar) -> MayFail<TypeScalar> {
    MayFail::failure(SemanticError::TypeError {
        expected,
        got: got.to_string(),
    })
}

impl ScalarDomain for TypeScalarDomain {
    type Scalar = TypeScalar;

    fn int(&self, _n: i64) -> TypeScalar {
        TypeScalar::of(TypeTag::Int)
    }

    fn float(&self, _x: Flonum) -> TypeScalar {
        TypeScalar::of(TypeTag::Float)
    }

    fn boolean(&self, _b: bool) -> TypeScalar {
        TypeScalar::of(TypeTag::Bool)
    }

    fn character(&self, _c: char) -> TypeScalar {
        TypeScalar::of(TypeTag::Char)
    }

    fn string(&self, _s: &str) -> TypeScalar {
        TypeScalar::of(TypeTag::Str)
    }

    fn symbol(&self, _name: Identifier) -> TypeScalar {
        TypeScalar::of(TypeTag::Sym)
    }

    fn nil(&self) -> TypeScalar {
        TypeScalar::of(TypeTag::Nil)
    }

    fn any_int(&self) -> MayFail<TypeScalar> {
        MayFail::success(TypeScalar::of(TypeTag::Int))
    }

    fn may_be_true(&self, s: &TypeScalar) -> bool {
        // every tag covers at least one non-#f constant, Bool included
        !s.0.is_empty()
    }

    fn may_be_false(&self, s: &TypeScalar) -> bool {
        s.0.contains(&TypeTag::Bool)
    }

    fn unary(&self, op: UnaryOperator, s: &TypeScalar) -> MayFail<TypeScalar> {
        use UnaryOperator::*;
        s.tags()
            .map(|tag| match op {
                IsNull => MayFail::success(TypeScalar::of(TypeTag::Bool)),
                IsChar | IsSymbol | IsString | IsInteger | IsFloat | IsBoolean | Not => {
                    MayFail::success(TypeScalar::of(TypeTag::Bool))
                }
                // scalar tags are never pairs, vectors, locks, or callables
                IsPair | IsVector | IsLock | IsProcedure => {
                    MayFail::success(TypeScalar::of(TypeTag::Bool))
                }
                Ceiling | Round => match tag {
                    TypeTag::Int => MayFail::success(TypeScalar::of(TypeTag::Int)),
                    TypeTag::Float => MayFail::success(TypeScalar::of(TypeTag::Float)),
                    _ => type_error("number", s),
                },
                Random => match tag {
                    TypeTag::Int => MayFail::success(TypeScalar::of(TypeTag::Int)),
                    _ => type_error("integer", s),
                },
                StringLength => match tag {
                    TypeTag::Str => MayFail::success(TypeScalar::of(TypeTag::Int)),
                    _ => type_error("string", s),
                },
                NumberToString => match tag {
                    t if t.numeric() => MayFail::success(TypeScalar::of(TypeTag::Str)),
                    _ => type_error("number", s),
                },
                StringToSymbol => match tag {
                    TypeTag::Str => MayFail::success(TypeScalar::of(TypeTag::Sym)),
                    _ => type_error("string", s),
                },
                SymbolToString => match tag {
                    TypeTag::Sym => MayFail::success(TypeScalar::of(TypeTag::Str)),
                    _ => type_error("symbol", s),
                },
                VectorLength => type_error("vector", s),
            })
            .collect()
    }

    fn binary(
        &self,
        op: BinaryOperator,
        a: &TypeScalar,
        b: &TypeScalar,
    ) -> MayFail<TypeScalar> {
        use BinaryOperator::*;
        a.tags()
            .cartesian_product(b.tags().collect::<Vec<_>>())
            .map(|(ta, tb)| match op {
                Plus | Minus | Times => match (ta, tb) {
                    (TypeTag::Int, TypeTag::Int) => {
                        MayFail::success(TypeScalar::of(TypeTag::Int))
                    }
                    (x, y) if x.numeric() && y.numeric() => {
                        MayFail::success(TypeScalar::of(TypeTag::Float))
                    }
                    _ => type_error("number", if ta.numeric() { b } else { a }),
                },
                Div => {
                    if ta.numeric() && tb.numeric() {
                        MayFail::success(TypeScalar::of(TypeTag::Float))
                    } else {
                        type_error("number", if ta.numeric() { b } else { a })
                    }
                }
                Quotient | Modulo | Remainder => match (ta, tb) {
                    (TypeTag::Int, TypeTag::Int) => {
                        MayFail::success(TypeScalar::of(TypeTag::Int))
                    }
                    _ => type_error("integer", if ta == TypeTag::Int { b } else { a }),
                },
                Lt | NumEq => {
                    if ta.numeric() && tb.numeric() {
                        MayFail::success(TypeScalar::of(TypeTag::Bool))
                    } else {
                        type_error("number", if ta.numeric() { b } else { a })
                    }
                }
                Eq => MayFail::success(TypeScalar::of(TypeTag::Bool)),
                StringAppend => match (ta, tb) {
                    (TypeTag::Str, TypeTag::Str) => {
                        MayFail::success(TypeScalar::of(TypeTag::Str))
                    }
                    _ => type_error("string", if ta == TypeTag::Str { b } else { a }),
                },
            })
            .collect()
    }

    fn counting(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lattice::check_lattice_laws;

    fn dom() -> TypeScalarDomain {
        TypeScalarDomain
    }

    #[test]
    fn lattice_laws() {
        let d = dom();
        let samples = vec![
            TypeScalar::bottom(),
            d.int(1),
            d.boolean(true),
            d.int(2).joined(&d.float(Flonum(1.0))),
            d.string("s").joined(&d.nil()),
        ];
        check_lattice_laws(&samples);
    }

    #[test]
    fn ints_collapse_and_add() {
        let d = dom();
        assert_eq!(d.int(1), d.int(100));
        let sum = d.binary(BinaryOperator::Plus, &d.int(1), &d.int(2));
        assert_eq!(sum.successes(), &[d.int(0)]);
        assert!(sum.errors().is_empty());
    }

    #[test]
    fn mixed_arithmetic_widens_to_float() {
        let d = dom();
        let r = d.binary(BinaryOperator::Times, &d.int(2), &d.float(Flonum(2.0)));
        assert_eq!(r.successes(), &[d.float(Flonum(0.0))]);
    }

    #[test]
    fn adding_a_string_is_a_type_error() {
        let d = dom();
        let r = d.binary(BinaryOperator::Plus, &d.int(1), &d.string("x"));
        assert!(r.successes().is_empty());
        assert_eq!(r.errors().len(), 1);
    }

    #[test]
    fn booleans_may_be_both() {
        let d = dom();
        let b = d.boolean(true);
        assert!(d.may_be_true(&b));
        assert!(d.may_be_false(&b));
        assert!(d.may_be_true(&d.nil()));
        assert!(!d.may_be_false(&d.int(0)));
    }
}
