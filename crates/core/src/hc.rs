use std::hash;
use std::fmt;
use std::ops::Deref;
use std::ptr;
use std::rc::{Rc, Weak};

use ahash::AHashMap;

/// A hash-consed handle. Equality and hashing are by pointer, which is sound
/// because every `Hc` is produced through an `HcTable` that guarantees at most
/// one live allocation per structurally distinct value.
#[derive(Debug, Clone)]
pub struct Hc<T>(Rc<T>);

impl<T> Hc<T> {
    fn inner(&self) -> &Rc<T> {
        let Hc(inner) = self;
        inner
    }

    fn to_weak(&self) -> WeakHc<T> {
        WeakHc(Rc::downgrade(self.inner()))
    }
}

impl<T: Clone> Hc<T> {
    pub fn cloned(&self) -> T {
        self.inner().as_ref().clone()
    }
}

impl<T> PartialEq for Hc<T> {
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(self.inner(), other.inner())
    }
}
impl<T> Eq for Hc<T> { }

impl<T: hash::Hash> hash::Hash for Hc<T> {
    #[inline]
    fn hash<H: hash::Hasher>(&self, state: &mut H) {
        ptr::hash(Rc::as_ptr(self.inner()), state);
    }
}

impl<T> Deref for Hc<T> {
    type Target = T;

    #[inline]
    fn deref(&self) -> &Self::Target {
        self.inner()
    }
}

impl<T: fmt::Display> fmt::Display for Hc<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Hc(inner) = self;
        inner.fmt(f)
    }
}

#[derive(Debug, Clone)]
struct WeakHc<T>(Weak<T>);

impl<T> WeakHc<T> {
    fn upgrade(&self) -> Option<Hc<T>> {
        let WeakHc(inner) = self;
        inner.upgrade().map(Hc)
    }
}

/// Weak interning table. Entries do not keep their values alive; a dead entry
/// is replaced in place the next time its key is interned.
#[derive(Debug)]
pub struct HcTable<T: hash::Hash + Eq + Clone> {
    table: AHashMap<T, WeakHc<T>>,
}

impl<T: hash::Hash + Eq + Clone> HcTable<T> {
    pub fn with_capacity(capacity: usize) -> HcTable<T> {
        HcTable {
            table: AHashMap::with_capacity(capacity)
        }
    }

    pub fn get(&self, element: &T) -> Option<Hc<T>> {
        self.table
            .get(element)
            .and_then(|w| w.upgrade())
    }

    pub fn intern(&mut self, element: T) -> Hc<T> {
        if let Some(hc) = self.get(&element) {
            return hc;
        }
        let result = Hc(Rc::new(element.clone()));
        self.table.insert(element, result.to_weak());
        result
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interning_shares_allocations() {
        let mut table: HcTable<String> = HcTable::with_capacity(4);
        let a = table.intern("hello".to_string());
        let b = table.intern("hello".to_string());
        let c = table.intern("world".to_string());
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn dead_entries_are_replaced() {
        let mut table: HcTable<String> = HcTable::with_capacity(4);
        let a = table.intern("hello".to_string());
        drop(a);
        assert!(table.get(&"hello".to_string()).is_none());
        let b = table.intern("hello".to_string());
        assert_eq!(table.get(&"hello".to_string()), Some(b));
    }
}
