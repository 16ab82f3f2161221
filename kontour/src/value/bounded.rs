use super::{BinaryOperator, Flonum, ScalarDomain, ScalarValueDomain, UnaryOperator};
use crate::error::SemanticError;
use crate::exp::Identifier;
use crate::lattice::JoinSemiLattice;
use crate::mayfail::MayFail;
use itertools::Itertools;
use std::collections::BTreeSet;
use std::fmt::{self, Display, Formatter};

/// A constant whose integer component saturates: integers of magnitude
/// beyond the domain's bound collapse to `IntTop`. Every other kind stays
/// exact.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub enum BoundedConst {
    Int(i64),
    IntTop,
    Float(Flonum),
    Bool(bool),
    Char(char),
    Str(Identifier),
    Sym(Identifier),
    Nil,
}

impl Display for BoundedConst {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            BoundedConst::Int(n) => write!(f, "{n}"),
            BoundedConst::IntTop => f.write_str("Int⊤"),
            BoundedConst::Float(x) => write!(f, "{x}"),
            BoundedConst::Bool(true) => f.write_str("#t"),
            BoundedConst::Bool(false) => f.write_str("#f"),
            BoundedConst::Char(c) => write!(f, "#\\{c}"),
            BoundedConst::Str(s) => write!(f, "\"{s}\""),
            BoundedConst::Sym(s) => write!(f, "'{s}"),
            BoundedConst::Nil => f.write_str("()"),
        }
    }
}

/// Set of bounded constants.
#[derive(Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct BoundedScalar(BTreeSet<BoundedConst>);

impl BoundedScalar {
    fn of(c: BoundedConst) -> Self {
        BoundedScalar(BTreeSet::from([c]))
    }

    fn two(a: BoundedConst, b: BoundedConst) -> Self {
        BoundedScalar(BTreeSet::from([a, b]))
    }
}

impl JoinSemiLattice for BoundedScalar {
    fn bottom() -> Self {
        BoundedScalar(BTreeSet::new())
    }

    fn join(&mut self, other: &Self) {
        self.0.extend(other.0.iter().cloned());
    }

    fn subsumes(&self, other: &Self) -> bool {
        other.0.iter().all(|c| {
            self.0.contains(c)
                || (matches!(c, BoundedConst::Int(_)) && self.0.contains(&BoundedConst::IntTop))
        })
    }
}

impl Display for BoundedScalar {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.iter().format("|"))
    }
}

/// Exact constants with integers saturated at `bound`.
#[derive(Clone, Copy, Debug)]
pub struct BoundedScalarDomain {
    pub bound: i64,
}

/// The BoundedInt lattice instance.
pub type BoundedIntDomain = ScalarValueDomain<BoundedScalarDomain>;

impl BoundedIntDomain {
    pub fn bounded(bound: i64) -> Self {
        ScalarValueDomain::new(BoundedScalarDomain { bound })
    }
}

impl BoundedScalarDomain {
    fn clamp(&self, n: i64) -> BoundedConst {
        if n.unsigned_abs() <= self.bound.unsigned_abs() {
            BoundedConst::Int(n)
        } else {
            BoundedConst::IntTop
        }
    }

    fn int_result(&self, n: i64) -> MayFail<BoundedScalar> {
        MayFail::success(BoundedScalar::of(self.clamp(n)))
    }

    fn unary_const(&self, op: UnaryOperator, c: &BoundedConst) -> MayFail<BoundedScalar> {
        use BoundedConst::*;
        use UnaryOperator::*;
        let boolean = |b: bool| MayFail::success(BoundedScalar::of(Bool(b)));
        let bad = |expected: &'static str| {
            MayFail::failure(SemanticError::TypeError {
                expected,
                got: c.to_string(),
            })
        };
        match op {
            IsNull => boolean(matches!(c, Nil)),
            IsChar => boolean(matches!(c, Char(_))),
            IsSymbol => boolean(matches!(c, Sym(_))),
            IsString => boolean(matches!(c, Str(_))),
            IsInteger => boolean(matches!(c, Int(_) | IntTop)),
            IsFloat => boolean(matches!(c, Float(_))),
            IsBoolean => boolean(matches!(c, Bool(_))),
            IsPair | IsVector | IsLock | IsProcedure => boolean(false),
            Not => boolean(matches!(c, Bool(false))),
            Ceiling | Round => match c {
                Int(n) => self.int_result(*n),
                IntTop => MayFail::success(BoundedScalar::of(IntTop)),
                Float(x) => MayFail::success(BoundedScalar::of(Float(Flonum(if op == Ceiling
                {
                    x.0.ceil()
                } else {
                    x.0.round()
                })))),
                _ => bad("number"),
            },
            Random => match c {
                Int(_) | IntTop => MayFail::success(BoundedScalar::of(IntTop)),
                _ => bad("integer"),
            },
            StringLength => match c {
                Str(s) => self.int_result(s.as_str().chars().count() as i64),
                _ => bad("string"),
            },
            NumberToString => match c {
                Int(_) | IntTop | Float(_) => MayFail::success(BoundedScalar::of(Str(
                    Identifier::new(&c.to_string()),
                ))),
                _ => bad("number"),
            },
            StringToSymbol => match c {
                Str(s) => MayFail::success(BoundedScalar::of(Sym(*s))),
                _ => bad("string"),
            },
            SymbolToString => match c {
                Sym(s) => MayFail::success(BoundedScalar::of(Str(*s))),
                _ => bad("symbol"),
            },
            VectorLength => bad("vector"),
        }
    }

    fn binary_const(
        &self,
        op: BinaryOperator,
        a: &BoundedConst,
        b: &BoundedConst,
    ) -> MayFail<BoundedScalar> {
        use BinaryOperator::*;
        use BoundedConst::*;
        let boolean = |x: bool| MayFail::success(BoundedScalar::of(Bool(x)));
        let both_bools = || MayFail::success(BoundedScalar::two(Bool(true), Bool(false)));
        let top = || MayFail::success(BoundedScalar::of(IntTop));
        let bad = |expected: &'static str, c: &BoundedConst| {
            MayFail::failure(SemanticError::TypeError {
                expected,
                got: c.to_string(),
            })
        };
        let ints = |x: &BoundedConst| matches!(x, Int(_) | IntTop);
        match op {
            Plus | Minus | Times => match (a, b) {
                (Int(x), Int(y)) => self.int_result(match op {
                    Plus => x.wrapping_add(*y),
                    Minus => x.wrapping_sub(*y),
                    _ => x.wrapping_mul(*y),
                }),
                (IntTop, y) if ints(y) => top(),
                (x, IntTop) if ints(x) => top(),
                _ => bad("integer", if ints(a) { b } else { a }),
            },
            Div | Quotient | Modulo | Remainder => match (a, b) {
                (_, Int(0)) => MayFail::failure(SemanticError::OperatorNotApplicable {
                    operator: Identifier::new("div"),
                    operands: format!("{a} 0"),
                }),
                (Int(x), Int(y)) => self.int_result(match op {
                    Div | Quotient => x.wrapping_div(*y),
                    Modulo => ((x % y) + y) % y,
                    _ => x % y,
                }),
                (x, y) if ints(x) && ints(y) => top(),
                _ => bad("integer", if ints(a) { b } else { a }),
            },
            Lt | NumEq => match (a, b) {
                (Int(x), Int(y)) => boolean(if op == Lt { x < y } else { x == y }),
                (x, y) if ints(x) && ints(y) => both_bools(),
                _ => bad("integer", if ints(a) { b } else { a }),
            },
            Eq => match (a, b) {
                (IntTop, y) | (y, IntTop) if ints(y) => both_bools(),
                _ => boolean(a == b),
            },
            StringAppend => match (a, b) {
                (Str(x), Str(y)) => MayFail::success(BoundedScalar::of(Str(Identifier::new(
                    &format!("{}{}", x.as_str(), y.as_str()),
                )))),
                _ => bad("string", if matches!(a, Str(_)) { b } else { a }),
            },
        }
    }
}

impl ScalarDomain for BoundedScalarDomain {
    type Scalar = BoundedScalar;

    fn int(&self, n: i64) -> BoundedScalar {
        BoundedScalar::of(self.clamp(n))
    }

    fn float(&self, x: Flonum) -> BoundedScalar {
        BoundedScalar::of(BoundedConst::Float(x))
    }

    fn boolean(&self, b: bool) -> BoundedScalar {
        BoundedScalar::of(BoundedConst::Bool(b))
    }

    fn character(&self, c: char) -> BoundedScalar {
        BoundedScalar::of(BoundedConst::Char(c))
    }

    fn string(&self, s: &str) -> BoundedScalar {
        BoundedScalar::of(BoundedConst::Str(Identifier::new(s)))
    }

    fn symbol(&self, name: Identifier) -> BoundedScalar {
        BoundedScalar::of(BoundedConst::Sym(name))
    }

    fn nil(&self) -> BoundedScalar {
        BoundedScalar::of(BoundedConst::Nil)
    }

    fn any_int(&self) -> MayFail<BoundedScalar> {
        MayFail::success(BoundedScalar::of(BoundedConst::IntTop))
    }

    fn may_be_true(&self, s: &BoundedScalar) -> bool {
        s.0.iter().any(|c| !matches!(c, BoundedConst::Bool(false)))
    }

    fn may_be_false(&self, s: &BoundedScalar) -> bool {
        s.0.contains(&BoundedConst::Bool(false))
    }

    fn as_int(&self, s: &BoundedScalar) -> Option<i64> {
        match s.0.iter().collect::<Vec<_>>().as_slice() {
            [BoundedConst::Int(n)] => Some(*n),
            _ => None,
        }
    }

    fn unary(&self, op: UnaryOperator, s: &BoundedScalar) -> MayFail<BoundedScalar> {
        s.0.iter().map(|c| self.unary_const(op, c)).collect()
    }

    fn binary(
        &self,
        op: BinaryOperator,
        a: &BoundedScalar,
        b: &BoundedScalar,
    ) -> MayFail<BoundedScalar> {
        a.0.iter()
            .cartesian_product(b.0.iter().collect::<Vec<_>>())
            .map(|(x, y)| self.binary_const(op, x, y))
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
    use BinaryOperator::*;

    fn d() -> BoundedScalarDomain {
        BoundedScalarDomain { bound: 100 }
    }

    #[test]
    fn lattice_laws() {
        let d = d();
        let samples = vec![
            BoundedScalar::bottom(),
            d.int(1),
            d.int(1000),
            d.int(3).joined(&d.int(1000)),
            d.boolean(false).joined(&d.nil()),
        ];
        check_lattice_laws(&samples);
    }

    #[test]
    fn integers_saturate_at_the_bound() {
        let d = d();
        assert_eq!(d.int(100), BoundedScalar::of(BoundedConst::Int(100)));
        assert_eq!(d.int(101), BoundedScalar::of(BoundedConst::IntTop));
        let r = d.binary(Times, &d.int(50), &d.int(3));
        assert_eq!(r.successes(), &[BoundedScalar::of(BoundedConst::IntTop)]);
        let r = d.binary(Plus, &d.int(50), &d.int(3));
        assert_eq!(r.successes(), &[d.int(53)]);
    }

    #[test]
    fn top_subsumes_every_integer() {
        let d = d();
        assert!(d.int(101).subsumes(&d.int(7)));
        assert!(!d.int(7).subsumes(&d.int(8)));
    }

    #[test]
    fn comparisons_with_top_take_both_branches() {
        let d = d();
        let r = d.binary(Lt, &d.int(101), &d.int(5));
        assert_eq!(
            r.successes(),
            &[BoundedScalar::two(
                BoundedConst::Bool(true),
                BoundedConst::Bool(false)
            )]
        );
    }
}
