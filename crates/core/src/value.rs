
use std::fmt;
use std::rc::Rc;
use std::cell::OnceCell;

use imbl::Vector;

use crate::hc::*;
use crate::utility::*;
use crate::term::*;
use crate::metavar::MetaVar;
use crate::database::Database;

pub type Spine = Vector<SpineEntry>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpineEntry {
    pub icit: Icit,
    pub value: LazyValue,
}

impl SpineEntry {
    pub fn new(icit: Icit, value: LazyValue) -> SpineEntry {
        SpineEntry { icit, value }
    }
}

impl fmt::Display for SpineEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.icit {
            Icit::Expl => write!(f, "{}", self.value),
            Icit::Impl => write!(f, "{{{}}}", self.value)
        }
    }
}

pub type Env = Vector<EnvEntry>;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EnvEntry {
    pub name: Symbol,
    pub value: LazyValue,
}

impl EnvEntry {
    pub fn new(name: Symbol, value: LazyValue) -> EnvEntry {
        EnvEntry { name, value }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EnvBound {
    Defined,
    Bound
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Closure {
    pub env: Env,
    pub code: Term,
}

impl fmt::Display for Closure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.code.fmt(f)
    }
}

impl Closure {
    pub fn new(env: Env, code: Term) -> Closure {
        Closure { env, code }
    }
}

pub type LazyValue = Hc<LazyValueData>;

/// A suspended evaluation, forced at most once. The cell is excluded from
/// hashing so that a forced and an unforced suspension of the same code in
/// the same environment intern to the same handle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LazyValueData {
    pub(crate) value: OnceCell<Value>,
    pub env: Env,
    pub code: Term
}

impl fmt::Display for LazyValueData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.code.fmt(f)
    }
}

impl LazyValueData {
    pub fn lazy(db: &mut Database, env: Env, code: Term) -> LazyValue {
        db.make_value(LazyValueData {
            value: OnceCell::new(),
            env,
            code
        })
    }

    /// A fresh rigid variable. The cell is pre-set; the code field is only
    /// the interning key.
    pub fn var(db: &mut Database, level: Level) -> LazyValue {
        let spine = Spine::new();
        let value = OnceCell::from(ValueData::Variable { level, spine }.rced());
        let env = Env::new();
        let code = db.make_term(TermData::Bound { index: (*level).into() });
        db.make_value(LazyValueData { value, env, code })
    }
}

impl std::hash::Hash for LazyValueData {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.env.hash(state);
        self.code.hash(state);
    }
}

pub type Value = Rc<ValueData>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValueData {
    Variable {
        level: Level,
        spine: Spine
    },
    MetaVariable {
        meta: MetaVar,
        spine: Spine
    },
    Reference {
        name: Symbol,
        decl: DeclId,
        spine: Spine,
        /// The definition body, kept suspended so conversion can compare
        /// references folded first and unfold only on demand.
        unfolded: Option<LazyValue>
    },
    Lambda {
        icit: Icit,
        name: Symbol,
        closure: Closure
    },
    Pi {
        icit: Icit,
        name: Symbol,
        domain: Value,
        closure: Closure
    },
    Star,
}

impl fmt::Display for ValueData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn with_spine(f: &mut fmt::Formatter<'_>, head: String, spine: &Spine) -> fmt::Result {
            write!(f, "{}", head)?;
            for entry in spine.iter() {
                write!(f, " {}", entry)?;
            }
            Ok(())
        }
        match self {
            ValueData::Variable { level, spine } => {
                with_spine(f, format!("#{}", level), spine)
            }
            ValueData::MetaVariable { meta, spine } => {
                with_spine(f, meta.to_string(), spine)
            }
            ValueData::Reference { name, spine, .. } => {
                with_spine(f, name.to_string(), spine)
            }
            ValueData::Lambda { icit: Icit::Expl, name, closure } => {
                write!(f, "λ {}. {}", name, closure)
            }
            ValueData::Lambda { icit: Icit::Impl, name, closure } => {
                write!(f, "λ {{{}}}. {}", name, closure)
            }
            ValueData::Pi { icit: Icit::Expl, name, domain, closure } => {
                write!(f, "({} : {}) -> {}", name, domain, closure)
            }
            ValueData::Pi { icit: Icit::Impl, name, domain, closure } => {
                write!(f, "{{{} : {}}} -> {}", name, domain, closure)
            }
            ValueData::Star => write!(f, "★"),
        }
    }
}

pub trait ValueOps {
    fn var(level: impl Into<Level>) -> Self;
    fn spine(&self) -> Spine;
    fn push_entry(&self, entry: SpineEntry) -> Self;
}

impl ValueOps for Value {
    fn var(level: impl Into<Level>) -> Value {
        let spine = Spine::new();
        ValueData::Variable { level: level.into(), spine }.rced()
    }

    fn spine(&self) -> Spine {
        match self.as_ref() {
            ValueData::Variable { spine, .. }
            | ValueData::MetaVariable { spine, .. }
            | ValueData::Reference { spine, .. } => spine.clone(),
            _ => Spine::new()
        }
    }

    fn push_entry(&self, entry: SpineEntry) -> Value {
        match self.as_ref() {
            ValueData::Variable { level, spine } => {
                let mut spine = spine.clone();
                spine.push_back(entry);
                ValueData::Variable { level: *level, spine }.rced()
            }
            ValueData::MetaVariable { meta, spine } => {
                let mut spine = spine.clone();
                spine.push_back(entry);
                ValueData::MetaVariable { meta: *meta, spine }.rced()
            }
            ValueData::Reference { name, decl, spine, unfolded } => {
                let mut spine = spine.clone();
                spine.push_back(entry);
                ValueData::Reference {
                    name: *name,
                    decl: *decl,
                    spine,
                    unfolded: unfolded.clone()
                }.rced()
            }
            _ => unreachable!("spine entries can only be pushed onto neutral values")
        }
    }
}
