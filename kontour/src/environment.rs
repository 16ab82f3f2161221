use crate::address::Address;
use crate::exp::Identifier;
use std::collections::BTreeMap;
use std::fmt::{self, Display, Formatter};

/// Variable name → address. Immutable after construction: `extend` returns
/// a new environment, so environments captured in closures and frames are
/// never invalidated by later bindings.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Env<A: Address> {
    map: BTreeMap<Identifier, A>,
}

impl<A: Address> Env<A> {
    pub fn empty() -> Self {
        Env {
            map: BTreeMap::new(),
        }
    }

    pub fn lookup(&self, name: &Identifier) -> Option<&A> {
        self.map.get(name)
    }

    pub fn extend(&self, name: Identifier, addr: A) -> Self {
        let mut map = self.map.clone();
        map.insert(name, addr);
        Env { map }
    }

    pub fn extend_all(&self, bindings: impl IntoIterator<Item = (Identifier, A)>) -> Self {
        let mut map = self.map.clone();
        map.extend(bindings);
        Env { map }
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Identifier, &A)> {
        self.map.iter()
    }
}

impl<A: Address> Display for Env<A> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "ρ{{")?;
        for (i, (name, addr)) in self.map.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{name} ↦ {addr}")?;
        }
        write!(f, "}}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::tests::TestAddr;

    #[test]
    fn extend_leaves_the_original_untouched() {
        let x = Identifier::new("x");
        let base = Env::<TestAddr>::empty();
        let extended = base.extend(x, TestAddr(1));
        assert!(base.lookup(&x).is_none());
        assert_eq!(extended.lookup(&x), Some(&TestAddr(1)));
    }

    #[test]
    fn later_bindings_shadow() {
        let x = Identifier::new("x");
        let env = Env::<TestAddr>::empty()
            .extend(x, TestAddr(1))
            .extend_all([(x, TestAddr(2)), (Identifier::new("y"), TestAddr(3))]);
        assert_eq!(env.lookup(&x), Some(&TestAddr(2)));
        assert_eq!(env.len(), 2);
    }
}
