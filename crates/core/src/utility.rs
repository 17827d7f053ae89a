
use std::{ops, fmt};
use std::rc::Rc;

use internment::LocalIntern;

#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct Symbol(LocalIntern<String>);

impl From<&str> for Symbol {
    fn from(s: &str) -> Self { Symbol(LocalIntern::from(s)) }
}

impl AsRef<String> for Symbol {
    fn as_ref(&self) -> &String { self.0.as_ref() }
}

impl ops::Deref for Symbol {
    type Target = String;
    fn deref(&self) -> &Self::Target { self.0.deref() }
}

impl Default for Symbol {
    fn default() -> Self { Self::from("_") }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.as_ref().fmt(f)
    }
}

#[derive(Debug, Hash, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Icit {
    Expl,
    Impl
}

impl fmt::Display for Icit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Icit::Expl => write!(f, "explicit"),
            Icit::Impl => write!(f, "implicit")
        }
    }
}

/// Index into the flat top-level declaration store.
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct DeclId(usize);

impl ops::Deref for DeclId {
    type Target = usize;

    fn deref(&self) -> &Self::Target {
        let DeclId(result) = self;
        result
    }
}

impl From<usize> for DeclId {
    fn from(value: usize) -> Self {
        DeclId(value)
    }
}

impl fmt::Display for DeclId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        (**self).fmt(f)
    }
}

#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct Index(usize);

impl ops::Add<usize> for Index {
    type Output = Self;

    fn add(self, rhs: usize) -> Self::Output {
        (*self + rhs).into()
    }
}

impl ops::Deref for Index {
    type Target = usize;

    fn deref(&self) -> &Self::Target {
        let Index(result) = self;
        result
    }
}

impl From<usize> for Index {
    fn from(value: usize) -> Self {
        Index(value)
    }
}

impl fmt::Display for Index {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        (**self).fmt(f)
    }
}

impl Index {
    pub fn to_level(self, env: usize) -> Level {
        (env - *self - 1).into()
    }
}

#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct Level(usize);

impl ops::Add<usize> for Level {
    type Output = Self;

    fn add(self, rhs: usize) -> Self::Output {
        (*self + rhs).into()
    }
}

impl ops::Sub<usize> for Level {
    type Output = Self;

    fn sub(self, rhs: usize) -> Self::Output {
        (*self - rhs).into()
    }
}

impl ops::Deref for Level {
    type Target = usize;

    fn deref(&self) -> &Self::Target {
        let Level(result) = self;
        result
    }
}

impl From<usize> for Level {
    fn from(value: usize) -> Self {
        Level(value)
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        (**self).fmt(f)
    }
}

impl Level {
    pub fn to_index(self, env: usize) -> Index {
        (env - *self - 1).into()
    }
}

pub trait Rced: Sized {
    fn rced(self) -> Rc<Self> { Rc::new(self) }
}

impl<T: Sized> Rced for T { }

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn index_level_conversions_invert() {
        let env = 5;
        for i in 0..env {
            let index = Index::from(i);
            assert_eq!(index.to_level(env).to_index(env), index);
        }
        assert_eq!(*Index::from(0).to_level(3), 2);
        assert_eq!(*Level::from(0).to_index(3), 2);
    }

    #[test]
    fn symbols_intern() {
        let a = Symbol::from("x");
        let b = Symbol::from("x");
        assert_eq!(a, b);
        assert_eq!(Symbol::default(), Symbol::from("_"));
    }
}
