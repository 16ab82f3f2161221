use super::{BinaryOperator, Flonum, ScalarDomain, ScalarValueDomain, UnaryOperator};
use crate::error::SemanticError;
use crate::exp::Identifier;
use crate::lattice::JoinSemiLattice;
use crate::mayfail::MayFail;
use itertools::Itertools;
use std::collections::BTreeSet;
use std::fmt::{self, Display, Formatter};

/// One exact constant.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub enum ScalarConst {
    Int(i64),
    Float(Flonum),
    Bool(bool),
    Char(char),
    Str(Identifier),
    Sym(Identifier),
    Nil,
}

impl ScalarConst {
    fn kind(&self) -> &'static str {
        match self {
            ScalarConst::Int(_) => "integer",
            ScalarConst::Float(_) => "float",
            ScalarConst::Bool(_) => "boolean",
            ScalarConst::Char(_) => "char",
            ScalarConst::Str(_) => "string",
            ScalarConst::Sym(_) => "symbol",
            ScalarConst::Nil => "()",
        }
    }

    fn as_f64(&self) -> Option<f64> {
        match self {
            ScalarConst::Int(n) => Some(*n as f64),
            ScalarConst::Float(x) => Some(x.0),
            _ => None,
        }
    }
}

impl Display for ScalarConst {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            ScalarConst::Int(n) => write!(f, "{n}"),
            ScalarConst::Float(x) => write!(f, "{x}"),
            ScalarConst::Bool(true) => f.write_str("#t"),
            ScalarConst::Bool(false) => f.write_str("#f"),
            ScalarConst::Char(c) => write!(f, "#\\{c}"),
            ScalarConst::Str(s) => write!(f, "\"{s}\""),
            ScalarConst::Sym(s) => write!(f, "'{s}"),
            ScalarConst::Nil => f.write_str("()"),
        }
    }
}

/// A finite set of exact constants. Joins union; nothing is ever
/// approximated, which is why the concrete machine may not terminate.
#[derive(Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct ConcreteScalar(BTreeSet<ScalarConst>);

impl ConcreteScalar {
    fn of(c: ScalarConst) -> Self {
        ConcreteScalar(BTreeSet::from([c]))
    }

    pub fn constants(&self) -> impl Iterator<Item = &ScalarConst> {
        self.0.iter()
    }

    /// The single integer in this scalar, if it is exactly that.
    pub fn as_int(&self) -> Option<i64> {
        match self.0.iter().exactly_one() {
            Ok(ScalarConst::Int(n)) => Some(*n),
            _ => None,
        }
    }
}

impl JoinSemiLattice for ConcreteScalar {
    fn bottom() -> Self {
        ConcreteScalar(BTreeSet::new())
    }

    fn join(&mut self, other: &Self) {
        self.0.extend(other.0.iter().cloned());
    }

    fn subsumes(&self, other: &Self) -> bool {
        other.0.is_subset(&self.0)
    }
}

impl Display for ConcreteScalar {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.iter().format("|"))
    }
}

/// The exact-constants scalar domain.
#[derive(Clone, Copy, Default, Debug)]
pub struct ConcreteScalarDomain;

/// The Concrete lattice instance.
pub type ConcreteDomain = ScalarValueDomain<ConcreteScalarDomain>;

impl ConcreteDomain {
    pub fn concrete() -> Self {
        ScalarValueDomain::new(ConcreteScalarDomain)
    }
}

fn expected(kind: &'static str, got: &ScalarConst) -> MayFail<ConcreteScalar> {
    MayFail::failure(SemanticError::TypeError {
        expected: kind,
        got: got.to_string(),
    })
}

fn int(n: i64) -> MayFail<ConcreteScalar> {
    MayFail::success(ConcreteScalar::of(ScalarConst::Int(n)))
}

fn float(x: f64) -> MayFail<ConcreteScalar> {
    MayFail::success(ConcreteScalar::of(ScalarConst::Float(Flonum(x))))
}

fn boolean(b: bool) -> MayFail<ConcreteScalar> {
    MayFail::success(ConcreteScalar::of(ScalarConst::Bool(b)))
}

fn div_by_zero(op: &'static str, a: &ScalarConst) -> MayFail<ConcreteScalar> {
    MayFail::failure(SemanticError::OperatorNotApplicable {
        operator: Identifier::new(op),
        operands: format!("{a} 0"),
    })
}

fn unary_const(op: UnaryOperator, c: &ScalarConst) -> MayFail<ConcreteScalar> {
    use ScalarConst::*;
    use UnaryOperator::*;
    match op {
        IsNull => boolean(matches!(c, Nil)),
        IsChar => boolean(matches!(c, Char(_))),
        IsSymbol => boolean(matches!(c, Sym(_))),
        IsString => boolean(matches!(c, Str(_))),
        IsInteger => boolean(matches!(c, Int(_))),
        IsFloat => boolean(matches!(c, Float(_))),
        IsBoolean => boolean(matches!(c, Bool(_))),
        IsPair | IsVector | IsLock | IsProcedure => boolean(false),
        Not => boolean(matches!(c, Bool(false))),
        Ceiling => match c {
            Int(n) => int(*n),
            Float(x) => float(x.0.ceil()),
            _ => expected("number", c),
        },
        Round => match c {
            Int(n) => int(*n),
            Float(x) => float(x.0.round()),
            _ => expected("number", c),
        },
        Random => MayFail::failure(SemanticError::NotSupported(
            "random is not modeled by the concrete lattice".into(),
        )),
        StringLength => match c {
            Str(s) => int(s.as_str().chars().count() as i64),
            _ => expected("string", c),
        },
        NumberToString => match c {
            Int(_) | Float(_) => MayFail::success(ConcreteScalar::of(ScalarConst::Str(
                Identifier::new(&c.to_string()),
            ))),
            _ => expected("number", c),
        },
        StringToSymbol => match c {
            Str(s) => MayFail::success(ConcreteScalar::of(ScalarConst::Sym(*s))),
            _ => expected("string", c),
        },
        SymbolToString => match c {
            Sym(s) => MayFail::success(ConcreteScalar::of(ScalarConst::Str(*s))),
            _ => expected("symbol", c),
        },
        VectorLength => expected("vector", c),
    }
}

fn binary_const(
    op: BinaryOperator,
    a: &ScalarConst,
    b: &ScalarConst,
) -> MayFail<ConcreteScalar> {
    use BinaryOperator::*;
    use ScalarConst::*;
    match op {
        Plus | Minus | Times => match (a, b) {
            (Int(x), Int(y)) => int(match op {
                Plus => x.wrapping_add(*y),
                Minus => x.wrapping_sub(*y),
                _ => x.wrapping_mul(*y),
            }),
            _ => match (a.as_f64(), b.as_f64()) {
                (Some(x), Some(y)) => float(match op {
                    Plus => x + y,
                    Minus => x - y,
                    _ => x * y,
                }),
                _ => expected("number", if a.as_f64().is_some() { b } else { a }),
            },
        },
        Div => match (a, b) {
            (Int(_), Int(0)) => div_by_zero("/", a),
            (Int(x), Int(y)) if x % y == 0 => int(x / y),
            _ => match (a.as_f64(), b.as_f64()) {
                (Some(x), Some(y)) => float(x / y),
                _ => expected("number", if a.as_f64().is_some() { b } else { a }),
            },
        },
        Quotient => match (a, b) {
            (Int(_), Int(0)) => div_by_zero("quotient", a),
            (Int(x), Int(y)) => int(x.wrapping_div(*y)),
            _ => expected("integer", if matches!(a, Int(_)) { b } else { a }),
        },
        Modulo => match (a, b) {
            (Int(_), Int(0)) => div_by_zero("modulo", a),
            // sign follows the divisor, per R5RS modulo
            (Int(x), Int(y)) => int(((x % y) + y) % y),
            _ => expected("integer", if matches!(a, Int(_)) { b } else { a }),
        },
        Remainder => match (a, b) {
            (Int(_), Int(0)) => div_by_zero("remainder", a),
            (Int(x), Int(y)) => int(x % y),
            _ => expected("integer", if matches!(a, Int(_)) { b } else { a }),
        },
        Lt => match (a.as_f64(), b.as_f64()) {
            (Some(x), Some(y)) => boolean(x < y),
            _ => expected("number", if a.as_f64().is_some() { b } else { a }),
        },
        NumEq => match (a.as_f64(), b.as_f64()) {
            (Some(x), Some(y)) => boolean(x == y),
            _ => expected("number", if a.as_f64().is_some() { b } else { a }),
        },
        Eq => boolean(a == b),
        StringAppend => match (a, b) {
            (Str(x), Str(y)) => {
                let s = format!("{}{}", x.as_str(), y.as_str());
                MayFail::success(ConcreteScalar::of(ScalarConst::Str(Identifier::new(&s))))
            }
            _ => expected("string", if matches!(a, Str(_)) { b } else { a }),
        },
    }
}

impl ScalarDomain for ConcreteScalarDomain {
    type Scalar = ConcreteScalar;

    fn int(&self, n: i64) -> ConcreteScalar {
        ConcreteScalar::of(ScalarConst::Int(n))
    }

    fn float(&self, x: Flonum) -> ConcreteScalar {
        ConcreteScalar::of(ScalarConst::Float(x))
    }

    fn boolean(&self, b: bool) -> ConcreteScalar {
        ConcreteScalar::of(ScalarConst::Bool(b))
    }

    fn character(&self, c: char) -> ConcreteScalar {
        ConcreteScalar::of(ScalarConst::Char(c))
    }

    fn string(&self, s: &str) -> ConcreteScalar {
        ConcreteScalar::of(ScalarConst::Str(Identifier::new(s)))
    }

    fn symbol(&self, name: Identifier) -> ConcreteScalar {
        ConcreteScalar::of(ScalarConst::Sym(name))
    }

    fn nil(&self) -> ConcreteScalar {
        ConcreteScalar::of(ScalarConst::Nil)
    }

    fn any_int(&self) -> MayFail<ConcreteScalar> {
        MayFail::failure(SemanticError::NotSupported(
            "the concrete lattice has no integer summary".into(),
        ))
    }

    fn may_be_true(&self, s: &ConcreteScalar) -> bool {
        s.0.iter().any(|c| !matches!(c, ScalarConst::Bool(false)))
    }

    fn may_be_false(&self, s: &ConcreteScalar) -> bool {
        s.0.contains(&ScalarConst::Bool(false))
    }

    fn as_int(&self, s: &ConcreteScalar) -> Option<i64> {
        s.as_int()
    }

    fn unary(&self, op: UnaryOperator, s: &ConcreteScalar) -> MayFail<ConcreteScalar> {
        s.0.iter().map(|c| unary_const(op, c)).collect()
    }

    fn binary(
        &self,
        op: BinaryOperator,
        a: &ConcreteScalar,
        b: &ConcreteScalar,
    ) -> MayFail<ConcreteScalar> {
        a.0.iter()
            .cartesian_product(b.0.iter().collect::<Vec<_>>())
            .map(|(x, y)| binary_const(op, x, y))
            .collect()
    }

    fn counting(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lattice::check_lattice_laws;
    use BinaryOperator::*;

    fn d() -> ConcreteScalarDomain {
        ConcreteScalarDomain
    }

    #[test]
    fn lattice_laws() {
        let d = d();
        let samples = vec![
            ConcreteScalar::bottom(),
            d.int(1),
            d.int(1).joined(&d.int(2)),
            d.boolean(false),
            d.string("abc").joined(&d.nil()),
        ];
        check_lattice_laws(&samples);
    }

    #[test]
    fn exact_arithmetic() {
        let d = d();
        let r = d.binary(Times, &d.int(6), &d.int(20));
        assert_eq!(r.successes(), &[d.int(120)]);
        let r = d.binary(Minus, &d.int(5), &d.int(1));
        assert_eq!(r.successes(), &[d.int(4)]);
        let r = d.binary(Modulo, &d.int(-7), &d.int(3));
        assert_eq!(r.successes(), &[d.int(2)]);
        let r = d.binary(Remainder, &d.int(-7), &d.int(3));
        assert_eq!(r.successes(), &[d.int(-1)]);
    }

    #[test]
    fn division_by_zero_is_an_error_value() {
        let d = d();
        let r = d.binary(Div, &d.int(1), &d.int(0));
        assert!(r.successes().is_empty());
        assert_eq!(r.errors().len(), 1);
    }

    #[test]
    fn joined_operands_branch_pairwise() {
        let d = d();
        let lhs = d.int(1).joined(&d.int(2));
        let r = d.binary(Plus, &lhs, &d.int(10));
        let mut sums: Vec<_> = r.successes().to_vec();
        sums.sort();
        assert_eq!(sums, vec![d.int(11), d.int(12)]);
    }

    #[test]
    fn truthiness_is_exact() {
        let d = d();
        assert!(!d.may_be_true(&d.boolean(false)));
        assert!(d.may_be_false(&d.boolean(false)));
        assert!(d.may_be_true(&d.int(0)));
        assert!(!d.may_be_false(&d.int(0)));
    }
}
