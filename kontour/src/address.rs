use crate::exp::{Expression, Identifier, Position};
use crate::time::Timestamp;
use std::fmt::{self, Debug, Display, Formatter};
use std::hash::Hash;

/// The address axis: an abstract allocation handle. The kernel only needs
/// cheap identity; which coordinates an address retains is the allocation
/// policy's business.
pub trait Address: Clone + Eq + Ord + Hash + Debug + Display + Send + Sync + 'static {}

/// Continuation addresses: the expression under evaluation plus the
/// timestamp fingerprint of the push. Under a finite timestamp policy,
/// frames pushed at the same expression in the same context share a cell,
/// which is what folds recursive call stacks into a finite graph; under
/// concrete timestamps every push gets its own cell and the chain is a
/// true stack. `Halt` is the terminal marker.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub enum KontAddr {
    Halt,
    At { site: Position, ctx: u64 },
}

impl KontAddr {
    pub fn at(site: Position, ctx: u64) -> Self {
        KontAddr::At { site, ctx }
    }

    pub fn is_halt(&self) -> bool {
        matches!(self, KontAddr::Halt)
    }
}

impl Display for KontAddr {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            KontAddr::Halt => f.write_str("halt"),
            KontAddr::At { site, ctx: 0 } => write!(f, "κ@{site}"),
            KontAddr::At { site, ctx } => write!(f, "κ@{site}#{ctx:x}"),
        }
    }
}

/// Which slot of a heap object a cell address denotes. One allocation
/// site may mint several cells in a single step (both halves of a pair),
/// so the role is an address coordinate of its own.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub enum CellRole {
    Car,
    Cdr,
    Content,
    Lock,
}

impl Display for CellRole {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            CellRole::Car => f.write_str("car"),
            CellRole::Cdr => f.write_str("cdr"),
            CellRole::Content => f.write_str("content"),
            CellRole::Lock => f.write_str("lock"),
        }
    }
}

/// Addresses minted by the two built-in policies. The value snapshot is
/// present only under value-sensitive allocation; it is the interned
/// rendering of the bound value, so equal coordinates give equal addresses
/// and distinct coordinates give distinct ones.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum Addr<T: Timestamp> {
    Variable {
        name: Identifier,
        snapshot: Option<Identifier>,
        time: T,
    },
    Primitive {
        name: Identifier,
    },
    Cell {
        site: Position,
        role: CellRole,
        time: T,
    },
}

impl<T: Timestamp> PartialOrd for Addr<T> {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl<T: Timestamp> Ord for Addr<T> {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        use Addr::*;
        match (self, other) {
            (
                Variable {
                    name: a,
                    snapshot: sa,
                    time: ta,
                },
                Variable {
                    name: b,
                    snapshot: sb,
                    time: tb,
                },
            ) => (a, ta, sa).cmp(&(b, tb, sb)),
            (Variable { .. }, _) => std::cmp::Ordering::Less,
            (_, Variable { .. }) => std::cmp::Ordering::Greater,
            (Primitive { name: a }, Primitive { name: b }) => a.cmp(b),
            (Primitive { .. }, _) => std::cmp::Ordering::Less,
            (_, Primitive { .. }) => std::cmp::Ordering::Greater,
            (
                Cell {
                    site: a,
                    role: ra,
                    time: ta,
                },
                Cell {
                    site: b,
                    role: rb,
                    time: tb,
                },
            ) => (a, ra, ta).cmp(&(b, rb, tb)),
        }
    }
}

impl<T: Timestamp> Display for Addr<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Addr::Variable {
                name,
                snapshot: None,
                time,
            } => write!(f, "{name}@{time}"),
            Addr::Variable {
                name,
                snapshot: Some(v),
                time,
            } => write!(f, "{name}={v}@{time}"),
            Addr::Primitive { name } => write!(f, "prim:{name}"),
            Addr::Cell { site, role, time } => write!(f, "{role}@{site}@{time}"),
        }
    }
}

impl<T: Timestamp> Address for Addr<T> {}

/// An address allocation policy: how many coordinates of
/// (name, value, timestamp, expression) an address retains.
pub trait Allocator<E: Expression, V, T: Timestamp>: Clone + Send + Sync {
    type Addr: Address;

    /// Address for a variable binding.
    fn variable(&self, name: Identifier, value: &V, t: &T) -> Self::Addr;

    /// Address for a preloaded primitive.
    fn primitive(&self, name: Identifier) -> Self::Addr;

    /// Address for a heap cell (pair slot, vector payload, lock) allocated
    /// at `exp`.
    fn cell(&self, exp: &E, role: CellRole, t: &T) -> Self::Addr {
        self.cell_at(exp.position(), role, t)
    }

    /// Cell address at a raw site, for allocations driven by quoted data
    /// rather than expressions.
    fn cell_at(&self, site: Position, role: CellRole, t: &T) -> Self::Addr;

    /// Address for the continuation frames pushed while evaluating `exp`.
    /// The drivers mint kont addresses with this policy.
    fn kont(&self, exp: &E, t: &T) -> KontAddr {
        KontAddr::at(exp.position(), t.digest())
    }
}

/// name ⊗ timestamp.
#[derive(Clone, Copy, Default, Debug)]
pub struct ClassicalAllocator;

impl<E: Expression, V, T: Timestamp> Allocator<E, V, T> for ClassicalAllocator {
    type Addr = Addr<T>;

    fn variable(&self, name: Identifier, _value: &V, t: &T) -> Addr<T> {
        Addr::Variable {
            name,
            snapshot: None,
            time: t.clone(),
        }
    }

    fn primitive(&self, name: Identifier) -> Addr<T> {
        Addr::Primitive { name }
    }

    fn cell_at(&self, site: Position, role: CellRole, t: &T) -> Addr<T> {
        Addr::Cell {
            site,
            role,
            time: t.clone(),
        }
    }
}

/// name ⊗ value ⊗ timestamp: bindings of distinct abstract values get
/// distinct addresses, trading store size for flow precision.
#[derive(Clone, Copy, Default, Debug)]
pub struct ValueSensitiveAllocator;

impl<E: Expression, V: Display, T: Timestamp> Allocator<E, V, T> for ValueSensitiveAllocator {
    type Addr = Addr<T>;

    fn variable(&self, name: Identifier, value: &V, t: &T) -> Addr<T> {
        Addr::Variable {
            name,
            snapshot: Some(Identifier::new(&value.to_string())),
            time: t.clone(),
        }
    }

    fn primitive(&self, name: Identifier) -> Addr<T> {
        Addr::Primitive { name }
    }

    fn cell_at(&self, site: Position, role: CellRole, t: &T) -> Addr<T> {
        Addr::Cell {
            site,
            role,
            time: t.clone(),
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::time::ZeroCfa;

    /// Minimal address for carrier tests.
    #[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
    pub(crate) struct TestAddr(pub u32);

    impl Display for TestAddr {
        fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
            write!(f, "a{}", self.0)
        }
    }

    impl Address for TestAddr {}

    #[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
    struct TestExp(Position);

    impl Display for TestExp {
        fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
            write!(f, "e@{}", self.0)
        }
    }

    impl Expression for TestExp {
        fn position(&self) -> Position {
            self.0
        }
    }

    #[test]
    fn classical_ignores_the_value_coordinate() {
        let x = Identifier::new("x");
        let t = ZeroCfa;
        let a: Addr<ZeroCfa> =
            Allocator::<TestExp, i64, _>::variable(&ClassicalAllocator, x, &1, &t);
        let b: Addr<ZeroCfa> =
            Allocator::<TestExp, i64, _>::variable(&ClassicalAllocator, x, &2, &t);
        assert_eq!(a, b);
    }

    #[test]
    fn value_sensitive_allocation_round_trips() {
        let x = Identifier::new("x");
        let t = ZeroCfa;
        let alloc = ValueSensitiveAllocator;
        let a: Addr<ZeroCfa> = Allocator::<TestExp, i64, _>::variable(&alloc, x, &1, &t);
        let b: Addr<ZeroCfa> = Allocator::<TestExp, i64, _>::variable(&alloc, x, &2, &t);
        let a2: Addr<ZeroCfa> = Allocator::<TestExp, i64, _>::variable(&alloc, x, &1, &t);
        assert_ne!(a, b);
        assert_eq!(a, a2);
    }

    #[test]
    fn kont_addresses_coalesce_per_expression_and_context() {
        let e = TestExp(Position::new(4, 2));
        let alloc = ClassicalAllocator;
        let k1 = Allocator::<TestExp, i64, ZeroCfa>::kont(&alloc, &e, &ZeroCfa);
        let k2 = Allocator::<TestExp, i64, ZeroCfa>::kont(&alloc, &e, &ZeroCfa);
        assert_eq!(k1, k2);
        assert!(!k1.is_halt());
    }
}
