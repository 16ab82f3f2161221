use crate::address::Address;
use std::collections::BTreeSet;
use std::fmt::{self, Display, Formatter};

/// What a transition touched. Effects never change machine behavior within
/// a thread; they exist so the driver can decide when two transitions of
/// *different* threads interfere and both orders must be explored.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub enum EffectKind {
    ReadVar,
    WriteVar,
    ReadCar,
    WriteCar,
    ReadCdr,
    WriteCdr,
    ReadVec,
    WriteVec,
    Acquire,
    Release,
}

impl EffectKind {
    /// Write-like effects dominate reads on the same address.
    pub fn is_write(&self) -> bool {
        matches!(
            self,
            EffectKind::WriteVar
                | EffectKind::WriteCar
                | EffectKind::WriteCdr
                | EffectKind::WriteVec
                | EffectKind::Acquire
                | EffectKind::Release
        )
    }

    pub fn is_read(&self) -> bool {
        !self.is_write()
    }
}

/// A read or write fingerprint on one address.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct Effect<A: Address> {
    pub kind: EffectKind,
    pub addr: A,
}

impl<A: Address> Effect<A> {
    pub fn new(kind: EffectKind, addr: A) -> Self {
        Effect { kind, addr }
    }

    /// Two effects conflict when they touch the same address and at least
    /// one of them writes.
    pub fn conflicts(&self, other: &Self) -> bool {
        self.addr == other.addr && (self.kind.is_write() || other.kind.is_write())
    }
}

impl<A: Address> Display for Effect<A> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}({})", self.kind, self.addr)
    }
}

/// The effect set carried by each action.
pub type Effects<A> = BTreeSet<Effect<A>>;

/// `Ex ⋈ Ey`: does any pairing of the two sets conflict?
pub fn conflict<A: Address>(xs: &Effects<A>, ys: &Effects<A>) -> bool {
    xs.iter().any(|x| ys.iter().any(|y| x.conflicts(y)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::tests::TestAddr;

    #[test]
    fn reads_commute_writes_do_not() {
        let r = Effect::new(EffectKind::ReadVar, TestAddr(1));
        let w = Effect::new(EffectKind::WriteVar, TestAddr(1));
        let w2 = Effect::new(EffectKind::WriteVec, TestAddr(2));
        assert!(!r.conflicts(&r.clone()));
        assert!(r.conflicts(&w));
        assert!(w.conflicts(&w.clone()));
        assert!(!w.conflicts(&w2));
    }

    #[test]
    fn set_level_conflict() {
        let xs: Effects<TestAddr> = [Effect::new(EffectKind::ReadCar, TestAddr(1))].into();
        let ys: Effects<TestAddr> = [Effect::new(EffectKind::WriteCar, TestAddr(1))].into();
        let zs: Effects<TestAddr> = [Effect::new(EffectKind::ReadCar, TestAddr(1))].into();
        assert!(conflict(&xs, &ys));
        assert!(!conflict(&xs, &zs));
    }
}
