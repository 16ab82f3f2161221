use super::{BinaryOperator, Flonum, ScalarDomain, UnaryOperator};
use crate::exp::Identifier;
use crate::lattice::JoinSemiLattice;
use crate::mayfail::MayFail;
use std::fmt::{self, Display, Formatter};

/// Component-wise pairing of two scalar lattices.
#[derive(Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct ProductScalar<S1, S2>(pub S1, pub S2);

impl<S1: JoinSemiLattice, S2: JoinSemiLattice> JoinSemiLattice for ProductScalar<S1, S2> {
    fn bottom() -> Self {
        ProductScalar(S1::bottom(), S2::bottom())
    }

    fn join(&mut self, other: &Self) {
        self.0.join(&other.0);
        self.1.join(&other.1);
    }

    fn subsumes(&self, other: &Self) -> bool {
        self.0.subsumes(&other.0) && self.1.subsumes(&other.1)
    }
}

impl<S1: Display, S2: Display> Display for ProductScalar<S1, S2> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "⟨{}, {}⟩", self.0, self.1)
    }
}

/// Builds a scalar domain from two scalar domains component-wise. Both
/// components observe every injection and operator; counting holds only
/// when both components count.
#[derive(Clone, Debug)]
pub struct ProductScalarDomain<D1, D2> {
    pub left: D1,
    pub right: D2,
}

impl<D1, D2> ProductScalarDomain<D1, D2> {
    pub fn new(left: D1, right: D2) -> Self {
        ProductScalarDomain { left, right }
    }
}

fn zip<S1, S2>(a: MayFail<S1>, b: MayFail<S2>) -> MayFail<ProductScalar<S1, S2>>
where
    S1: Clone,
    S2: Clone,
{
    let (oks_a, mut errs) = a.into_parts();
    let (oks_b, errs_b) = b.into_parts();
    errs.extend(errs_b);
    let mut out = MayFail::empty();
    for ea in &oks_a {
        for eb in &oks_b {
            out.join(MayFail::success(ProductScalar(ea.clone(), eb.clone())));
        }
    }
    for e in errs {
        out.join(MayFail::failure(e));
    }
    out
}

impl<D1: ScalarDomain, D2: ScalarDomain> ScalarDomain for ProductScalarDomain<D1, D2> {
    type Scalar = ProductScalar<D1::Scalar, D2::Scalar>;

    fn int(&self, n: i64) -> Self::Scalar {
        ProductScalar(self.left.int(n), self.right.int(n))
    }

    fn float(&self, x: Flonum) -> Self::Scalar {
        ProductScalar(self.left.float(x), self.right.float(x))
    }

    fn boolean(&self, b: bool) -> Self::Scalar {
        ProductScalar(self.left.boolean(b), self.right.boolean(b))
    }

    fn character(&self, c: char) -> Self::Scalar {
        ProductScalar(self.left.character(c), self.right.character(c))
    }

    fn string(&self, s: &str) -> Self::Scalar {
        ProductScalar(self.left.string(s), self.right.string(s))
    }

    fn symbol(&self, name: Identifier) -> Self::Scalar {
        ProductScalar(self.left.symbol(name), self.right.symbol(name))
    }

    fn nil(&self) -> Self::Scalar {
        ProductScalar(self.left.nil(), self.right.nil())
    }

    fn any_int(&self) -> MayFail<Self::Scalar> {
        zip(self.left.any_int(), self.right.any_int())
    }

    fn may_be_true(&self, s: &Self::Scalar) -> bool {
        self.left.may_be_true(&s.0) && self.right.may_be_true(&s.1)
    }

    fn may_be_false(&self, s: &Self::Scalar) -> bool {
        self.left.may_be_false(&s.0) && self.right.may_be_false(&s.1)
    }

    fn as_int(&self, s: &Self::Scalar) -> Option<i64> {
        self.left.as_int(&s.0).or_else(|| self.right.as_int(&s.1))
    }

    fn unary(&self, op: UnaryOperator, s: &Self::Scalar) -> MayFail<Self::Scalar> {
        zip(self.left.unary(op, &s.0), self.right.unary(op, &s.1))
    }

    fn binary(
        &self,
        op: BinaryOperator,
        a: &Self::Scalar,
        b: &Self::Scalar,
    ) -> MayFail<Self::Scalar> {
        zip(
            self.left.binary(op, &a.0, &b.0),
            self.right.binary(op, &a.1, &b.1),
        )
    }

    fn counting(&self) -> bool {
        self.left.counting() && self.right.counting()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lattice::check_lattice_laws;
    use crate::value::{BoundedScalarDomain, TypeScalarDomain};

    fn d() -> ProductScalarDomain<TypeScalarDomain, BoundedScalarDomain> {
        ProductScalarDomain::new(TypeScalarDomain, BoundedScalarDomain { bound: 10 })
    }

    #[test]
    fn lattice_laws() {
        let d = d();
        let samples = vec![
            ProductScalar::bottom(),
            d.int(1),
            d.int(100),
            d.boolean(false),
            d.int(2).joined(&d.string("x")),
        ];
        check_lattice_laws(&samples);
    }

    #[test]
    fn both_components_track_operations() {
        let d = d();
        let r = d.binary(BinaryOperator::Plus, &d.int(2), &d.int(3));
        assert_eq!(r.successes(), &[d.int(5)]);
        // truth requires both components to agree it is possible
        assert!(!d.may_be_false(&d.int(5)));
        assert!(d.may_be_false(&d.boolean(false)));
    }

    #[test]
    fn counting_needs_both() {
        use crate::value::ConcreteScalarDomain;
        assert!(!d().counting());
        let both = ProductScalarDomain::new(ConcreteScalarDomain, ConcreteScalarDomain);
        assert!(both.counting());
    }
}
