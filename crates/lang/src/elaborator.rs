
use std::sync::Arc;

use colored::Colorize;
use imbl::Vector;
use miette::{Diagnostic, SourceSpan};
use thiserror::Error;

use mica_core::prelude::*;

use crate::syntax::{self, NameOrIcit, Span};
use crate::error::MicaError;

#[derive(Debug, Error, Diagnostic)]
pub enum ElabError {
    #[error("Inconvertible")]
    Inconvertible {
        #[source_code]
        src: Arc<String>,
        #[label("{left} ~= {right}")]
        span: SourceSpan,
        left: String,
        right: String
    },
    #[error("Not a pattern")]
    NotAPattern {
        #[source_code]
        src: Arc<String>,
        #[label("Metavariable is applied to a spine that is not distinct bound variables")]
        span: SourceSpan,
    },
    #[error("Occurs check failed")]
    OccursCheck {
        #[source_code]
        src: Arc<String>,
        #[label("Solving here would make {meta} refer to itself")]
        span: SourceSpan,
        meta: MetaVar
    },
    #[error("Scope escape")]
    ScopeEscape {
        #[source_code]
        src: Arc<String>,
        #[label("Solution mentions a variable (level {level}) outside the metavariable scope")]
        span: SourceSpan,
        level: Level
    },
    #[error("Missing name")]
    MissingName {
        #[source_code]
        src: Arc<String>,
        #[label("Identifier {name} is not in scope")]
        span: SourceSpan,
        name: String
    },
    #[error("Mismatched argument")]
    IcitMismatch {
        #[source_code]
        src: Arc<String>,
        #[label("The function wants an {expected} argument, but an {provided} one was supplied")]
        span: SourceSpan,
        expected: Icit,
        provided: Icit
    },
    #[error("Cannot insert implicit argument")]
    CannotInsertImplicit {
        #[source_code]
        src: Arc<String>,
        #[label("An implicit argument was supplied, but the function type takes none here")]
        span: SourceSpan,
    },
    #[error("Named argument not found")]
    NamedArgumentNotFound {
        #[source_code]
        src: Arc<String>,
        #[label("The function type has no implicit argument named {name}")]
        span: SourceSpan,
        name: String
    },
    #[error("Duplicate named argument")]
    DuplicateNamedArgument {
        #[source_code]
        src: Arc<String>,
        #[label("The argument {name} is already supplied by this application")]
        span: SourceSpan,
        name: String
    },
    #[error("Definition collision")]
    DefinitionCollision {
        #[source_code]
        src: Arc<String>,
        #[label("The name {name} already has a definition")]
        span: SourceSpan,
        name: String
    },
    #[error("Named lambda binder")]
    NamedLambda {
        #[source_code]
        src: Arc<String>,
        #[label("A named binder needs an implicit function type to refer to")]
        span: SourceSpan,
    }
}

/// The local typing context. Columns are kept in binding order, outermost
/// first, so a level indexes every column directly.
#[derive(Debug, Clone)]
pub struct Context {
    env: Env,
    env_mask: Vec<EnvBound>,
    pub names: Vector<Symbol>,
    pub types: Vector<Value>
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

impl Context {
    pub fn new() -> Context {
        Context {
            env: Env::new(),
            env_mask: Vec::new(),
            names: Vector::new(),
            types: Vector::new()
        }
    }

    pub fn bind(&self, db: &mut Database, name: Symbol, value_type: Value) -> Context {
        let var = LazyValueData::var(db, self.env_lvl());
        let mut result = self.clone();
        result.env.push_back(EnvEntry::new(name, var));
        result.env_mask.push(EnvBound::Bound);
        result.names.push_back(name);
        result.types.push_back(value_type);
        result
    }

    pub fn define(&self, name: Symbol, value: LazyValue, value_type: Value) -> Context {
        let mut result = self.clone();
        result.env.push_back(EnvEntry::new(name, value));
        result.env_mask.push(EnvBound::Defined);
        result.names.push_back(name);
        result.types.push_back(value_type);
        result
    }

    pub fn env(&self) -> Env {
        self.env.clone()
    }

    pub fn env_mask(&self) -> Vec<EnvBound> {
        self.env_mask.clone()
    }

    pub fn env_lvl(&self) -> Level {
        self.env.len().into()
    }

    pub fn len(&self) -> usize {
        self.env.len()
    }

    pub fn is_empty(&self) -> bool {
        self.env.is_empty()
    }
}

/// Elaborate a batch of definitions against the database. Later definitions
/// still elaborate when earlier ones fail; every failure is reported.
pub fn elaborate(db: &mut Database, defs: &[syntax::Definition]) -> Result<(), MicaError> {
    let mut errors = vec![];
    for def in defs.iter() {
        if let Err(error) = elaborate_def(db, def) {
            errors.push(error);
        }
    }
    if errors.is_empty() { Ok(()) }
    else { Err(MicaError::Collection(errors)) }
}

fn elaborate_def(db: &mut Database, def: &syntax::Definition) -> Result<(), MicaError> {
    db.metas.new_generation();
    if db.lookup_decl(def.name).is_some() {
        return Err(ElabError::DefinitionCollision {
            src: db.text(),
            span: source_span(def.span),
            name: def.name.to_string()
        }.into());
    }
    let ctx = Context::new();
    let body = if def.vars.is_empty() { (*def.body).clone() }
        else {
            syntax::Term::Lambda {
                span: def.span,
                vars: def.vars.clone(),
                body: def.body.clone()
            }
        };
    let (body, ty) = match &def.anno {
        Some(anno) => {
            let anno_elabed = check(db, &ctx, anno, ValueData::Star.rced())?;
            let anno_value = eval(db, ctx.env(), anno_elabed.clone());
            let body = check(db, &ctx, &body, anno_value)?;
            (body, anno_elabed)
        }
        None => {
            let (body, inferred) = infer(db, &ctx, &body)?;
            let ty = quote(db, inferred, ctx.env_lvl());
            (body, ty)
        }
    };
    let body = zonk(db, Env::new(), 0.into(), body);
    let ty = zonk(db, Env::new(), 0.into(), ty);
    let decl = Decl { name: def.name, ty, body };
    log::info!("\n{} {}\n{}", def.name, "elaborated to".green(), decl);
    db.insert_decl(decl)?;
    Ok(())
}

pub fn check(db: &mut Database, ctx: &Context, term: &syntax::Term, ty: Value) -> Result<Term, ElabError> {
    if let syntax::Term::Lambda { span, vars, body } = term {
        return check_lambda(db, ctx, *span, 0, vars, body, ty);
    }
    let ty_folded = ty.clone();
    let ty = unfold_meta_to_head(db, ty);
    match (term, ty.as_ref()) {
        (_, ValueData::Pi { icit: Icit::Impl, name, domain, closure }) => {
            let (name, domain, closure) = (*name, domain.clone(), closure.clone());
            let var = LazyValueData::var(db, ctx.env_lvl());
            let inner = ctx.bind(db, name, domain);
            let body_type = closure.eval(db, EnvEntry::new(name, var));
            let body = check(db, &inner, term, body_type)?;
            Ok(db.make_term(TermData::Lambda { icit: Icit::Impl, name, body }))
        }
        (syntax::Term::Let { def, body, .. }, _) => {
            let (anno_elabed, anno_value) = check_let_anno(db, ctx, def)?;
            let let_body = check(db, ctx, &def.body, anno_value.clone())?;
            let def_value = LazyValueData::lazy(db, ctx.env(), let_body.clone());
            let inner = ctx.define(def.name, def_value, anno_value);
            let body_elabed = check(db, &inner, body, ty_folded)?;
            Ok(db.make_term(TermData::Let {
                name: def.name,
                anno: anno_elabed,
                let_body,
                body: body_elabed
            }))
        }
        (syntax::Term::Hole { .. }, _) => Ok(fresh_meta(db, ctx, ty_folded)),
        _ => {
            let (term_elabed, inferred) = infer(db, ctx, term)?;
            let (term_elabed, inferred) = insert(db, ctx, term_elabed, inferred);
            try_unify(db, ctx, term.span(), ty_folded, inferred)?;
            Ok(term_elabed)
        }
    }
}

fn check_lambda(
    db: &mut Database,
    ctx: &Context,
    span: Span,
    index: usize,
    vars: &[syntax::LambdaVar],
    body: &syntax::Term,
    ty: Value
) -> Result<Term, ElabError> {
    if index >= vars.len() {
        return check(db, ctx, body, ty);
    }
    let ty_folded = ty.clone();
    let ty = unfold_meta_to_head(db, ty);
    let var = &vars[index];
    match ty.as_ref() {
        ValueData::Pi { icit, name: pi_name, domain, closure } => {
            let binder_matches = match &var.info {
                NameOrIcit::Named(n) => *icit == Icit::Impl && n == pi_name,
                NameOrIcit::Unnamed(i) => i == icit
            };
            if binder_matches {
                if let Some(anno) = &var.anno {
                    let anno_elabed = check(db, ctx, anno, ValueData::Star.rced())?;
                    let anno_value = eval(db, ctx.env(), anno_elabed);
                    try_unify(db, ctx, span, domain.clone(), anno_value)?;
                }
                let name = var.var.unwrap_or(*pi_name);
                let inner = ctx.bind(db, name, domain.clone());
                let var_value = LazyValueData::var(db, ctx.env_lvl());
                let body_type = closure.eval(db, EnvEntry::new(*pi_name, var_value));
                let body_elabed = check_lambda(db, &inner, span, index + 1, vars, body, body_type)?;
                Ok(db.make_term(TermData::Lambda { icit: *icit, name, body: body_elabed }))
            } else if *icit == Icit::Impl {
                // The binder targets a later argument, so an implicit lambda
                // is inserted for this one and the same binder is retried.
                let inner = ctx.bind(db, *pi_name, domain.clone());
                let var_value = LazyValueData::var(db, ctx.env_lvl());
                let body_type = closure.eval(db, EnvEntry::new(*pi_name, var_value));
                let body_elabed = check_lambda(db, &inner, span, index, vars, body, body_type)?;
                Ok(db.make_term(TermData::Lambda { icit: Icit::Impl, name: *pi_name, body: body_elabed }))
            } else {
                match &var.info {
                    NameOrIcit::Named(n) => Err(ElabError::NamedArgumentNotFound {
                        src: db.text(),
                        span: source_span(span),
                        name: n.to_string()
                    }),
                    NameOrIcit::Unnamed(i) => Err(ElabError::IcitMismatch {
                        src: db.text(),
                        span: source_span(span),
                        expected: *icit,
                        provided: *i
                    })
                }
            }
        }
        _ => {
            let residual = syntax::Term::Lambda {
                span,
                vars: vars[index..].to_vec(),
                body: body.clone().boxed()
            };
            let (term_elabed, inferred) = infer(db, ctx, &residual)?;
            let (term_elabed, inferred) = insert(db, ctx, term_elabed, inferred);
            try_unify(db, ctx, span, ty_folded, inferred)?;
            Ok(term_elabed)
        }
    }
}

fn check_let_anno(db: &mut Database, ctx: &Context, def: &syntax::DefineTerm) -> Result<(Term, Value), ElabError> {
    match &def.anno {
        Some(anno) => {
            let anno_elabed = check(db, ctx, anno, ValueData::Star.rced())?;
            let anno_value = eval(db, ctx.env(), anno_elabed.clone());
            Ok((anno_elabed, anno_value))
        }
        None => {
            let meta = fresh_meta(db, ctx, ValueData::Star.rced());
            let value = eval(db, ctx.env(), meta.clone());
            Ok((meta, value))
        }
    }
}

pub fn infer(db: &mut Database, ctx: &Context, term: &syntax::Term) -> Result<(Term, Value), ElabError> {
    match term {
        syntax::Term::Lambda { span, vars, body } => infer_lambda(db, ctx, *span, vars, body),
        syntax::Term::Let { def, body, .. } => {
            let (anno_elabed, anno_value) = check_let_anno(db, ctx, def)?;
            let let_body = check(db, ctx, &def.body, anno_value.clone())?;
            let def_value = LazyValueData::lazy(db, ctx.env(), let_body.clone());
            let inner = ctx.define(def.name, def_value, anno_value);
            let (body_elabed, body_type) = infer(db, &inner, body)?;
            let result = db.make_term(TermData::Let {
                name: def.name,
                anno: anno_elabed,
                let_body,
                body: body_elabed
            });
            Ok((result, body_type))
        }
        syntax::Term::Pi { icit, var, domain, body, .. } => {
            let name = var.unwrap_or_default();
            let domain_elabed = check(db, ctx, domain, ValueData::Star.rced())?;
            let domain_value = eval(db, ctx.env(), domain_elabed.clone());
            let inner = ctx.bind(db, name, domain_value);
            let body_elabed = check(db, &inner, body, ValueData::Star.rced())?;
            let result = db.make_term(TermData::Pi {
                icit: *icit,
                name,
                domain: domain_elabed,
                body: body_elabed
            });
            Ok((result, ValueData::Star.rced()))
        }
        syntax::Term::Apply { span, info, fun, arg } => {
            if let NameOrIcit::Named(name) = info {
                if spine_has_named(fun, *name) {
                    return Err(ElabError::DuplicateNamedArgument {
                        src: db.text(),
                        span: source_span(*span),
                        name: name.to_string()
                    });
                }
            }
            let icit = match info {
                NameOrIcit::Named(_) => Icit::Impl,
                NameOrIcit::Unnamed(icit) => *icit
            };
            let (fun_elabed, fun_type) = match info {
                NameOrIcit::Named(name) => {
                    let (f, t) = infer(db, ctx, fun)?;
                    insert_until_name(db, ctx, *span, f, t, *name)?
                }
                NameOrIcit::Unnamed(Icit::Impl) => infer(db, ctx, fun)?,
                NameOrIcit::Unnamed(Icit::Expl) => {
                    let (f, t) = infer(db, ctx, fun)?;
                    insert_implicits(db, ctx, f, t)
                }
            };
            let fun_type = unfold_to_head(db, fun_type);
            let (domain, closure) = match fun_type.as_ref() {
                ValueData::Pi { icit: pi_icit, domain, closure, .. } => {
                    if *pi_icit != icit {
                        return Err(if icit == Icit::Impl {
                            ElabError::CannotInsertImplicit {
                                src: db.text(),
                                span: source_span(*span)
                            }
                        } else {
                            ElabError::IcitMismatch {
                                src: db.text(),
                                span: source_span(*span),
                                expected: *pi_icit,
                                provided: icit
                            }
                        });
                    }
                    (domain.clone(), closure.clone())
                }
                _ => {
                    // The head does not have a function type yet. Mint a
                    // candidate Pi out of fresh metavariables and unify.
                    let domain_meta = fresh_meta(db, ctx, ValueData::Star.rced());
                    let domain = eval(db, ctx.env(), domain_meta);
                    let inner = ctx.bind(db, Symbol::default(), domain.clone());
                    let codomain_meta = fresh_meta(db, &inner, ValueData::Star.rced());
                    let closure = Closure::new(ctx.env(), codomain_meta);
                    let candidate = ValueData::Pi {
                        icit,
                        name: Symbol::default(),
                        domain: domain.clone(),
                        closure: closure.clone()
                    }.rced();
                    try_unify(db, ctx, *span, candidate, fun_type.clone())?;
                    (domain, closure)
                }
            };
            let arg_elabed = check(db, ctx, arg, domain)?;
            let arg_value = LazyValueData::lazy(db, ctx.env(), arg_elabed.clone());
            let result_type = closure.eval(db, EnvEntry::new(Symbol::default(), arg_value));
            let result = db.make_term(TermData::Apply { icit, fun: fun_elabed, arg: arg_elabed });
            Ok((result, result_type))
        }
        syntax::Term::Variable { span, name } => {
            let local = ctx.names.iter()
                .enumerate()
                .rev()
                .find(|(_, n)| *n == name)
                .map(|(level, _)| level);
            if let Some(level) = local {
                let index = Level::from(level).to_index(ctx.len());
                let result = db.make_term(TermData::Bound { index });
                Ok((result, ctx.types[level].clone()))
            } else if let Some(id) = db.lookup_decl(*name) {
                let result = db.make_term(TermData::Free { name: *name, decl: id });
                let ty = db.decl_type(id).force(db);
                Ok((result, ty))
            } else {
                Err(ElabError::MissingName {
                    src: db.text(),
                    span: source_span(*span),
                    name: name.to_string()
                })
            }
        }
        syntax::Term::Hole { .. } => {
            let ty_meta = fresh_meta(db, ctx, ValueData::Star.rced());
            let ty = eval(db, ctx.env(), ty_meta);
            let result = fresh_meta(db, ctx, ty.clone());
            Ok((result, ty))
        }
        syntax::Term::Star { .. } => {
            Ok((db.make_term(TermData::Star), ValueData::Star.rced()))
        }
    }
}

fn infer_lambda(
    db: &mut Database,
    ctx: &Context,
    span: Span,
    vars: &[syntax::LambdaVar],
    body: &syntax::Term
) -> Result<(Term, Value), ElabError> {
    if vars.is_empty() {
        return infer(db, ctx, body);
    }
    let var = &vars[0];
    let icit = match &var.info {
        NameOrIcit::Unnamed(icit) => *icit,
        NameOrIcit::Named(_) => return Err(ElabError::NamedLambda {
            src: db.text(),
            span: source_span(span)
        })
    };
    let name = var.var.unwrap_or_default();
    let domain_value = match &var.anno {
        Some(anno) => {
            let anno_elabed = check(db, ctx, anno, ValueData::Star.rced())?;
            eval(db, ctx.env(), anno_elabed)
        }
        None => {
            let meta = fresh_meta(db, ctx, ValueData::Star.rced());
            eval(db, ctx.env(), meta)
        }
    };
    let inner = ctx.bind(db, name, domain_value.clone());
    let (body_elabed, body_type) = infer_lambda(db, &inner, span, &vars[1..], body)?;
    let (body_elabed, body_type) = insert(db, &inner, body_elabed, body_type);
    let result = db.make_term(TermData::Lambda { icit, name, body: body_elabed });
    let body_type_quoted = quote(db, body_type, inner.env_lvl());
    let result_type = ValueData::Pi {
        icit,
        name,
        domain: domain_value,
        closure: Closure::new(ctx.env(), body_type_quoted)
    }.rced();
    Ok((result, result_type))
}

fn fresh_meta(db: &mut Database, ctx: &Context, ty: Value) -> Term {
    let meta = db.metas.fresh(ty, ctx.names.clone(), ctx.env_lvl());
    db.make_term(TermData::InsertedMeta { meta, mask: ctx.env_mask() })
}

/// Apply a term to fresh metavariables until its type is no longer an
/// implicit Pi. The returned type is not unfolded past the last insertion.
fn insert_implicits(db: &mut Database, ctx: &Context, term: Term, ty: Value) -> (Term, Value) {
    let mut term = term;
    let mut ty = ty;
    loop {
        let unfolded = unfold_meta_to_head(db, ty.clone());
        match unfolded.as_ref() {
            ValueData::Pi { icit: Icit::Impl, domain, closure, .. } => {
                let meta = fresh_meta(db, ctx, domain.clone());
                let meta_value = LazyValueData::lazy(db, ctx.env(), meta.clone());
                term = db.make_term(TermData::Apply { icit: Icit::Impl, fun: term, arg: meta });
                ty = closure.eval(db, EnvEntry::new(Symbol::default(), meta_value));
            }
            _ => break
        }
    }
    (term, ty)
}

/// Insert implicits unless the term is itself an implicit lambda, which
/// must be allowed to line up with an implicit Pi on its own.
fn insert(db: &mut Database, ctx: &Context, term: Term, ty: Value) -> (Term, Value) {
    if matches!(&*term, TermData::Lambda { icit: Icit::Impl, .. }) { (term, ty) }
    else { insert_implicits(db, ctx, term, ty) }
}

/// Apply a term to fresh metavariables until the implicit Pi named `name`
/// comes up. Stopping leaves that Pi intact for the caller to consume.
fn insert_until_name(
    db: &mut Database,
    ctx: &Context,
    span: Span,
    term: Term,
    ty: Value,
    name: Symbol
) -> Result<(Term, Value), ElabError> {
    let mut term = term;
    let mut ty = ty;
    loop {
        ty = unfold_meta_to_head(db, ty);
        let (pi_name, domain, closure) = match ty.as_ref() {
            ValueData::Pi { icit: Icit::Impl, name: pi_name, domain, closure } => {
                (*pi_name, domain.clone(), closure.clone())
            }
            _ => return Err(ElabError::NamedArgumentNotFound {
                src: db.text(),
                span: source_span(span),
                name: name.to_string()
            })
        };
        if pi_name == name {
            return Ok((term, ty));
        }
        let meta = fresh_meta(db, ctx, domain);
        let meta_value = LazyValueData::lazy(db, ctx.env(), meta.clone());
        term = db.make_term(TermData::Apply { icit: Icit::Impl, fun: term, arg: meta });
        ty = closure.eval(db, EnvEntry::new(pi_name, meta_value));
    }
}

fn spine_has_named(term: &syntax::Term, name: Symbol) -> bool {
    let mut current = term;
    loop {
        match current {
            syntax::Term::Apply { info: NameOrIcit::Named(n), fun, .. } => {
                if *n == name { return true; }
                current = fun;
            }
            syntax::Term::Apply { fun, .. } => current = fun,
            _ => return false
        }
    }
}

fn try_unify(db: &mut Database, ctx: &Context, span: Span, expected: Value, provided: Value) -> Result<(), ElabError> {
    let result = unify(db, ctx.env_lvl(), Rigidity::Rigid, expected.clone(), provided.clone());
    match result {
        Ok(()) => Ok(()),
        Err(UnifyError::RigidMismatch { .. }) => {
            let left = quote(db, expected, ctx.env_lvl())
                .to_string_with_context(ctx.names.clone());
            let right = quote(db, provided, ctx.env_lvl())
                .to_string_with_context(ctx.names.clone());
            Err(ElabError::Inconvertible {
                src: db.text(),
                span: source_span(span),
                left,
                right
            })
        }
        Err(UnifyError::NotAPattern) => Err(ElabError::NotAPattern {
            src: db.text(),
            span: source_span(span)
        }),
        Err(UnifyError::OccursCheck { meta }) => Err(ElabError::OccursCheck {
            src: db.text(),
            span: source_span(span),
            meta
        }),
        Err(UnifyError::ScopeEscape { level }) => Err(ElabError::ScopeEscape {
            src: db.text(),
            span: source_span(span),
            level
        })
    }
}

fn source_span(span: Span) -> SourceSpan {
    let (start, end) = span;
    SourceSpan::new(start.into(), end.saturating_sub(start).into())
}
