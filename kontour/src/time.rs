use crate::exp::Position;
use std::fmt::{self, Debug, Display, Formatter};
use std::hash::Hash;

/// The context-sensitivity coordinate of a state.
///
/// `tick` advances on each control step; `tick_call` is the overload used
/// when stepping into a closure body, so call-site-sensitive policies can
/// record calling context. Two states reachable through different retained
/// histories must stay distinguishable, and two with the same history must
/// collapse; nothing else is required.
pub trait Timestamp: Clone + Eq + Ord + Hash + Debug + Display + Send + Sync + 'static {
    /// Timestamp at program entry.
    fn zero() -> Self;

    /// Advance on a control step at `pos`.
    fn tick(&self, pos: Position) -> Self;

    /// Advance when entering a closure body called from `callsite`.
    fn tick_call(&self, callsite: Position) -> Self {
        self.tick(callsite)
    }

    /// Deterministic fingerprint, used to mint thread and actor
    /// identifiers from (creation site, context).
    fn digest(&self) -> u64;
}

const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

fn fnv_fold(acc: u64, word: u64) -> u64 {
    let mut acc = acc;
    for byte in word.to_le_bytes() {
        acc = (acc ^ byte as u64).wrapping_mul(FNV_PRIME);
    }
    acc
}

/// Context-insensitive policy: every state shares the one timestamp.
#[derive(Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct ZeroCfa;

impl Timestamp for ZeroCfa {
    fn zero() -> Self {
        ZeroCfa
    }

    fn tick(&self, _pos: Position) -> Self {
        ZeroCfa
    }

    fn digest(&self) -> u64 {
        0
    }
}

impl Display for ZeroCfa {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str("ε")
    }
}

/// k-CFA: the last `K` call sites. Ordinary control steps leave the
/// history alone; only closure entry records context.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct KCfa<const K: usize> {
    sites: Vec<Position>,
}

impl<const K: usize> Timestamp for KCfa<K> {
    fn zero() -> Self {
        KCfa { sites: vec![] }
    }

    fn tick(&self, _pos: Position) -> Self {
        self.clone()
    }

    fn tick_call(&self, callsite: Position) -> Self {
        let mut sites = Vec::with_capacity(K + 1);
        sites.push(callsite);
        sites.extend(self.sites.iter().copied());
        sites.truncate(K);
        KCfa { sites }
    }

    fn digest(&self) -> u64 {
        self.sites.iter().fold(FNV_OFFSET, |acc, p| {
            fnv_fold(acc, ((p.line as u64) << 32) | p.column as u64)
        })
    }
}

impl<const K: usize> Display for KCfa<K> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, site) in self.sites.iter().enumerate() {
            if i > 0 {
                write!(f, ",")?;
            }
            write!(f, "{site}")?;
        }
        write!(f, "]")
    }
}

/// Unbounded timestamp for the concrete machine: globally fresh on every
/// step, so no two allocations ever share an address.
#[derive(Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct ConcreteTimestamp(u64);

impl Timestamp for ConcreteTimestamp {
    fn zero() -> Self {
        ConcreteTimestamp(0)
    }

    fn tick(&self, _pos: Position) -> Self {
        ConcreteTimestamp(self.0 + 1)
    }

    fn digest(&self) -> u64 {
        self.0
    }
}

impl Display for ConcreteTimestamp {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "t{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kcfa_truncates_to_k() {
        let p1 = Position::new(1, 1);
        let p2 = Position::new(2, 1);
        let p3 = Position::new(3, 1);
        let t = KCfa::<2>::zero()
            .tick_call(p1)
            .tick_call(p2)
            .tick_call(p3);
        assert_eq!(t.sites, vec![p3, p2]);
        // plain ticks do not disturb the history
        assert_eq!(t.tick(Position::new(9, 9)), t);
    }

    #[test]
    fn kcfa_histories_distinguish_and_collapse() {
        let p1 = Position::new(1, 1);
        let p2 = Position::new(2, 1);
        let a = KCfa::<1>::zero().tick_call(p1);
        let b = KCfa::<1>::zero().tick_call(p2);
        assert_ne!(a, b);
        // same final history collapses regardless of how it was reached
        assert_eq!(a.tick_call(p2), b.clone().tick_call(p2));
        assert_ne!(a.digest(), b.digest());
    }

    #[test]
    fn concrete_timestamps_are_fresh() {
        let t0 = ConcreteTimestamp::zero();
        let t1 = t0.tick(Position::none());
        let t2 = t1.tick(Position::none());
        assert!(t0 < t1 && t1 < t2);
    }
}
