/// A join-semilattice with a least element.
///
/// `join` mutates in place and must be an upper bound of both operands;
/// `subsumes` is the partial order read as `other ⊑ self`. The analysis
/// terminates because every chain produced by `join` over a finite carrier
/// stabilizes.
pub trait JoinSemiLattice: Clone + Eq {
    fn bottom() -> Self;

    fn join(&mut self, other: &Self);

    /// `other ⊑ self`.
    fn subsumes(&self, other: &Self) -> bool;

    fn is_bottom(&self) -> bool {
        *self == Self::bottom()
    }

    fn joined(mut self, other: &Self) -> Self {
        self.join(other);
        self
    }
}

impl<S1, S2> JoinSemiLattice for (S1, S2)
where
    S1: JoinSemiLattice,
    S2: JoinSemiLattice,
{
    fn bottom() -> Self {
        (S1::bottom(), S2::bottom())
    }

    fn join(&mut self, other: &Self) {
        self.0.join(&other.0);
        self.1.join(&other.1);
    }

    fn subsumes(&self, other: &Self) -> bool {
        self.0.subsumes(&other.0) && self.1.subsumes(&other.1)
    }
}

/// Check the semilattice laws on a sample of elements. Every lattice
/// instance's unit tests run their representative values through this.
pub fn check_lattice_laws<L: JoinSemiLattice + std::fmt::Debug>(samples: &[L]) {
    let bot = L::bottom();
    for a in samples {
        assert!(a.subsumes(a), "reflexivity failed for {a:?}");
        assert!(a.subsumes(&bot), "bottom is not least under {a:?}");
        assert_eq!(&a.clone().joined(&bot), a, "join with bottom changed {a:?}");
        assert_eq!(&a.clone().joined(a), a, "join is not idempotent at {a:?}");
    }
    for a in samples {
        for b in samples {
            let ab = a.clone().joined(b);
            let ba = b.clone().joined(a);
            assert_eq!(ab, ba, "join is not commutative at {a:?}, {b:?}");
            assert!(ab.subsumes(a), "join not an upper bound of {a:?}");
            assert!(ab.subsumes(b), "join not an upper bound of {b:?}");
            for c in samples {
                let left = a.clone().joined(b).joined(c);
                let right = a.clone().joined(&b.clone().joined(c));
                assert_eq!(left, right, "join is not associative at {a:?}, {b:?}, {c:?}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    impl JoinSemiLattice for BTreeSet<u32> {
        fn bottom() -> Self {
            BTreeSet::new()
        }

        fn join(&mut self, other: &Self) {
            self.extend(other.iter().copied());
        }

        fn subsumes(&self, other: &Self) -> bool {
            other.is_subset(self)
        }
    }

    #[test]
    fn powerset_laws() {
        let samples: Vec<BTreeSet<u32>> = vec![
            BTreeSet::new(),
            BTreeSet::from([1]),
            BTreeSet::from([2, 3]),
            BTreeSet::from([1, 2, 3]),
        ];
        check_lattice_laws(&samples);
    }

    #[test]
    fn pairs_join_componentwise() {
        let mut p = (BTreeSet::from([1]), BTreeSet::from([4]));
        p.join(&(BTreeSet::from([2]), BTreeSet::new()));
        assert_eq!(p.0, BTreeSet::from([1, 2]));
        assert_eq!(p.1, BTreeSet::from([4]));
        assert!(p.subsumes(&<(BTreeSet<u32>, BTreeSet<u32>)>::bottom()));
    }
}
