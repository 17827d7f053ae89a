
use std::fmt;

use imbl::Vector;

use crate::hc::*;
use crate::utility::*;
use crate::value::EnvBound;
use crate::metavar::MetaVar;

/// An elaborated top-level definition.
#[derive(Debug, Hash, Clone, PartialEq, Eq)]
pub struct Decl {
    pub name: Symbol,
    pub ty: Term,
    pub body: Term
}

pub type Term = Hc<TermData>;

#[derive(Debug, Hash, Clone, PartialEq, Eq)]
pub enum TermData {
    Lambda {
        icit: Icit,
        name: Symbol,
        body: Term
    },
    Let {
        name: Symbol,
        anno: Term,
        let_body: Term,
        body: Term
    },
    Pi {
        icit: Icit,
        name: Symbol,
        domain: Term,
        body: Term
    },
    Apply {
        icit: Icit,
        fun: Term,
        arg: Term
    },
    Bound {
        index: Index
    },
    Free {
        name: Symbol,
        decl: DeclId
    },
    Meta {
        meta: MetaVar
    },
    /// A metavariable minted by the elaborator, to be applied to every bound
    /// variable of the context it was created in. The mask mirrors that
    /// context: `Bound` entries become spine arguments, `Defined` entries are
    /// skipped.
    InsertedMeta {
        meta: MetaVar,
        mask: Vec<EnvBound>
    },
    Star,
}

impl fmt::Display for Decl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} : {} = {}", self.name, self.ty, self.body)
    }
}

impl TermData {
    pub fn ambiguous(&self) -> bool {
        match self {
            TermData::Lambda { .. }
            | TermData::Let { .. }
            | TermData::Pi { .. }
            | TermData::Apply { .. } => true,
            TermData::Bound { .. }
            | TermData::Free { .. }
            | TermData::Meta { .. }
            | TermData::InsertedMeta { .. }
            | TermData::Star => false,
        }
    }

    pub fn is_apply(&self) -> bool { matches!(self, TermData::Apply { .. }) }

    pub fn to_string_with_context(&self, mut ctx: Vector<Symbol>) -> String {
        match self {
            TermData::Lambda { icit, name, body } => {
                ctx.push_back(*name);
                let body = body.to_string_with_context(ctx);
                match icit {
                    Icit::Expl => format!("λ {}. {}", name, body),
                    Icit::Impl => format!("λ {{{}}}. {}", name, body)
                }
            }
            TermData::Let { name, anno, let_body, body } => {
                let anno = anno.to_string_with_context(ctx.clone());
                let let_body = let_body.to_string_with_context(ctx.clone());
                ctx.push_back(*name);
                let body = body.to_string_with_context(ctx);
                format!("let {} : {} := {}; {}", name, anno, let_body, body)
            }
            TermData::Pi { icit, name, domain, body } => {
                let domain_str = domain.to_string_with_context(ctx.clone());
                ctx.push_back(*name);
                let body = body.to_string_with_context(ctx);
                match icit {
                    Icit::Expl => format!("({} : {}) -> {}", name, domain_str, body),
                    Icit::Impl => format!("{{{} : {}}} -> {}", name, domain_str, body)
                }
            }
            TermData::Apply { icit, fun, arg } => {
                let fun_str = fun.to_string_with_context(ctx.clone());
                let arg_str = arg.to_string_with_context(ctx);
                let fun_str = if fun.is_apply() || !fun.ambiguous() { fun_str }
                    else { format!("({})", fun_str) };
                match icit {
                    Icit::Impl => format!("{} {{{}}}", fun_str, arg_str),
                    Icit::Expl if arg.ambiguous() => format!("{} ({})", fun_str, arg_str),
                    Icit::Expl => format!("{} {}", fun_str, arg_str),
                }
            }
            TermData::Bound { index } => {
                let mut result = index.to_string();
                if ctx.len() > **index {
                    let level = index.to_level(ctx.len());
                    if let Some(var) = ctx.get(*level) {
                        result = var.to_string()
                    }
                }
                result
            }
            TermData::Free { name, .. } => name.to_string(),
            TermData::Meta { meta } => meta.to_string(),
            TermData::InsertedMeta { meta, mask } => {
                let mut args = String::new();
                for (i, bound) in mask.iter().enumerate() {
                    if *bound == EnvBound::Bound {
                        args.push(' ');
                        let symbol = ctx.get(i)
                            .cloned()
                            .unwrap_or_default();
                        args.push_str(symbol.as_str());
                    }
                }
                format!("({}{})", meta, args)
            }
            TermData::Star => "★".to_string(),
        }
    }
}

impl fmt::Display for TermData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_string_with_context(Vector::new()))
    }
}
