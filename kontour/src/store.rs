use crate::address::{Address, KontAddr};
use crate::lattice::JoinSemiLattice;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::{self, Debug, Display, Formatter};
use std::hash::Hash;

/// Abstract allocation count for one cell: has this address been allocated
/// once, or possibly more than once? `One` licenses a strong update.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub enum Count {
    One,
    Many,
}

impl Count {
    fn bump(self) -> Count {
        Count::Many
    }
}

#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
struct Cell<V> {
    value: V,
    count: Count,
}

/// Address → lattice cell. `lookup` of an absent address is `⊥` (reported
/// as `None` so callers can distinguish the intended unbound-variable
/// signal); `extend` always joins. Strong update happens only through
/// `update`, and only when abstract counting proves the address was
/// allocated exactly once. A non-concrete machine therefore never shrinks
/// a cell.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct Store<A: Address, V> {
    map: BTreeMap<A, Cell<V>>,
    counting: bool,
}

impl<A: Address, V: JoinSemiLattice> Store<A, V> {
    pub fn empty() -> Self {
        Store {
            map: BTreeMap::new(),
            counting: false,
        }
    }

    /// A store that tracks allocation counts, enabling strong updates on
    /// one-shot cells.
    pub fn with_counting() -> Self {
        Store {
            map: BTreeMap::new(),
            counting: true,
        }
    }

    pub fn counting(&self) -> bool {
        self.counting
    }

    pub fn lookup(&self, addr: &A) -> Option<&V> {
        self.map.get(addr).map(|cell| &cell.value)
    }

    pub fn contains(&self, addr: &A) -> bool {
        self.map.contains_key(addr)
    }

    /// `σ[a ↦ σ(a) ⊔ v]`, bumping the allocation count.
    pub fn extend(mut self, addr: A, value: V) -> Self {
        match self.map.get_mut(&addr) {
            Some(cell) => {
                cell.value.join(&value);
                cell.count = cell.count.bump();
            }
            None => {
                self.map.insert(
                    addr,
                    Cell {
                        value,
                        count: Count::One,
                    },
                );
            }
        }
        self
    }

    /// Mutation of an existing cell (`set!`, `set-car!`, `vector-set!`,
    /// lock transitions). Strong when counting proves a single allocation,
    /// a join otherwise. Extends when the address is absent.
    pub fn update(mut self, addr: A, value: V) -> Self {
        match self.map.get_mut(&addr) {
            Some(cell) if self.counting && cell.count == Count::One => {
                cell.value = value;
                self
            }
            Some(cell) => {
                cell.value.join(&value);
                self
            }
            None => self.extend(addr, value),
        }
    }

    /// Pointwise join. Returns the addresses whose cells actually grew,
    /// which is what global-store drivers use to decide re-enqueues.
    pub fn join_with(&mut self, other: &Self) -> BTreeSet<A> {
        let mut grown = BTreeSet::new();
        for (addr, cell) in &other.map {
            match self.map.get_mut(addr) {
                Some(mine) => {
                    if !mine.value.subsumes(&cell.value) {
                        mine.value.join(&cell.value);
                        grown.insert(addr.clone());
                    }
                    if cell.count > mine.count {
                        mine.count = cell.count;
                    }
                }
                None => {
                    self.map.insert(addr.clone(), cell.clone());
                    grown.insert(addr.clone());
                }
            }
        }
        grown
    }

    /// `other ⊑ self`, pointwise.
    pub fn subsumes(&self, other: &Self) -> bool {
        other.map.iter().all(|(addr, cell)| {
            self.map
                .get(addr)
                .is_some_and(|mine| mine.value.subsumes(&cell.value))
        })
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn addresses(&self) -> impl Iterator<Item = &A> {
        self.map.keys()
    }
}

impl<A: Address, V: JoinSemiLattice + Display> Display for Store<A, V> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "σ{{")?;
        for (i, (addr, cell)) in self.map.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{addr} ↦ {}", cell.value)?;
        }
        write!(f, "}}")
    }
}

/// One suspended frame plus the address of the rest of the continuation.
/// Tails are addresses, never owned pointers, so recursive continuations
/// collapse into cycles in the kont store.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct Kont<F> {
    pub frame: F,
    pub next: KontAddr,
}

/// Continuation store: kont address → set of (frame, tail) pairs. Cells
/// are only ever joined into, never deleted.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct KontStore<F: Ord> {
    map: BTreeMap<KontAddr, BTreeSet<Kont<F>>>,
}

impl<F: Clone + Ord> KontStore<F> {
    pub fn empty() -> Self {
        KontStore {
            map: BTreeMap::new(),
        }
    }

    pub fn lookup(&self, addr: KontAddr) -> impl Iterator<Item = &Kont<F>> {
        self.map.get(&addr).into_iter().flatten()
    }

    pub fn extend(mut self, addr: KontAddr, frame: F, next: KontAddr) -> Self {
        self.insert(addr, frame, next);
        self
    }

    /// In-place variant for globally shared kont stores; true when the
    /// cell actually grew.
    pub fn insert(&mut self, addr: KontAddr, frame: F, next: KontAddr) -> bool {
        self.map
            .entry(addr)
            .or_default()
            .insert(Kont { frame, next })
    }

    /// Pointwise union; true when anything was new.
    pub fn join_with(&mut self, other: &Self) -> bool {
        let mut grew = false;
        for (addr, konts) in &other.map {
            let cell = self.map.entry(*addr).or_default();
            for k in konts {
                grew |= cell.insert(k.clone());
            }
        }
        grew
    }

    pub fn len(&self) -> usize {
        self.map.values().map(|s| s.len()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::tests::TestAddr;
    use std::collections::BTreeSet;

    type SetVal = BTreeSet<u32>;

    fn v(xs: &[u32]) -> SetVal {
        xs.iter().copied().collect()
    }

    #[test]
    fn absent_is_bottom_and_extend_joins() {
        let store: Store<TestAddr, SetVal> = Store::empty();
        assert!(store.lookup(&TestAddr(0)).is_none());
        let store = store.extend(TestAddr(0), v(&[1])).extend(TestAddr(0), v(&[2]));
        assert_eq!(store.lookup(&TestAddr(0)), Some(&v(&[1, 2])));
    }

    #[test]
    fn update_is_strong_only_for_one_shot_counting_cells() {
        let store: Store<TestAddr, SetVal> = Store::with_counting();
        let store = store.extend(TestAddr(0), v(&[1]));
        // one allocation: strong update replaces
        let store = store.update(TestAddr(0), v(&[9]));
        assert_eq!(store.lookup(&TestAddr(0)), Some(&v(&[9])));
        // second allocation: further updates join
        let store = store.extend(TestAddr(0), v(&[1]));
        let store = store.update(TestAddr(0), v(&[5]));
        assert_eq!(store.lookup(&TestAddr(0)), Some(&v(&[1, 5, 9])));
    }

    #[test]
    fn update_without_counting_joins() {
        let store: Store<TestAddr, SetVal> = Store::empty();
        let store = store.extend(TestAddr(0), v(&[1]));
        let store = store.update(TestAddr(0), v(&[2]));
        assert_eq!(store.lookup(&TestAddr(0)), Some(&v(&[1, 2])));
    }

    #[test]
    fn join_with_reports_grown_addresses_and_is_monotone() {
        let mut a: Store<TestAddr, SetVal> = Store::empty();
        a = a.extend(TestAddr(0), v(&[1]));
        let mut b: Store<TestAddr, SetVal> = Store::empty();
        b = b.extend(TestAddr(0), v(&[1])).extend(TestAddr(1), v(&[7]));
        let before = a.clone();
        let grown = a.join_with(&b);
        assert_eq!(grown, BTreeSet::from([TestAddr(1)]));
        assert!(a.subsumes(&before));
        assert!(a.subsumes(&b));
        // joining again changes nothing
        assert!(a.clone().join_with(&b).is_empty());
    }

    #[test]
    fn kont_store_cells_accumulate() {
        let ka = KontAddr::at(crate::exp::Position::new(1, 1), 0);
        let ks: KontStore<u8> = KontStore::empty()
            .extend(ka, 1, KontAddr::Halt)
            .extend(ka, 2, KontAddr::Halt)
            .extend(ka, 1, KontAddr::Halt);
        assert_eq!(ks.lookup(ka).count(), 2);
        assert_eq!(ks.lookup(KontAddr::Halt).count(), 0);
    }
}
