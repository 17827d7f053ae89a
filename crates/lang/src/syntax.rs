
use mica_core::utility::*;

pub type Span = (usize, usize);

/// How an argument or binder names its position: either explicitly by the
/// implicit binder's name (`f {A = t}`), or positionally with an icity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NameOrIcit {
    Named(Symbol),
    Unnamed(Icit)
}

#[derive(Debug, Clone)]
pub struct LambdaVar {
    pub info: NameOrIcit,
    pub var: Option<Symbol>,
    pub anno: Option<Term>
}

#[derive(Debug, Clone)]
pub struct DefineTerm {
    pub span: Span,
    pub name: Symbol,
    pub anno: Option<Box<Term>>,
    pub body: Box<Term>
}

#[derive(Debug, Clone)]
pub struct Definition {
    pub span: Span,
    pub name: Symbol,
    pub vars: Vec<LambdaVar>,
    pub anno: Option<Box<Term>>,
    pub body: Box<Term>
}

#[derive(Debug, Clone)]
pub enum Term {
    Lambda {
        span: Span,
        vars: Vec<LambdaVar>,
        body: Box<Term>
    },
    Let {
        span: Span,
        def: DefineTerm,
        body: Box<Term>
    },
    Pi {
        span: Span,
        icit: Icit,
        var: Option<Symbol>,
        domain: Box<Term>,
        body: Box<Term>
    },
    Apply {
        span: Span,
        info: NameOrIcit,
        fun: Box<Term>,
        arg: Box<Term>
    },
    Variable {
        span: Span,
        name: Symbol
    },
    Hole {
        span: Span
    },
    Star {
        span: Span
    }
}

impl DefineTerm {
    pub fn as_str<'a>(&self, text: &'a str) -> &'a str {
        let (start, end) = self.span;
        &text[start..end]
    }
}

impl Definition {
    pub fn as_str<'a>(&self, text: &'a str) -> &'a str {
        let (start, end) = self.span;
        &text[start..end]
    }
}

impl Term {
    pub fn span(&self) -> Span {
        match self {
            Term::Lambda { span, .. }
            | Term::Let { span, .. }
            | Term::Pi { span, .. }
            | Term::Apply { span, .. }
            | Term::Variable { span, .. }
            | Term::Hole { span, .. }
            | Term::Star { span, .. }
            => *span,
        }
    }

    pub fn as_str<'a>(&self, text: &'a str) -> &'a str {
        let (start, end) = self.span();
        &text[start..end]
    }

    pub fn boxed(self) -> Box<Term> {
        Box::new(self)
    }
}
