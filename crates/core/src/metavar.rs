
use std::fmt;

use ahash::AHashMap;
use colored::Colorize;
use imbl::Vector;
use thiserror::Error;

use crate::utility::*;
use crate::term::*;
use crate::value::*;
use crate::eval::*;
use crate::unify::unfold_meta_to_head;
use crate::database::Database;

/// Identifies a metavariable by its generation (one per top-level definition)
/// and its slot inside that generation's block.
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct MetaVar {
    pub generation: usize,
    pub slot: usize
}

impl fmt::Display for MetaVar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "?{}.{}", self.generation, self.slot)
    }
}

#[derive(Debug, Clone)]
pub enum MetaState {
    Unsolved,
    Solved(Value),
}

#[derive(Debug, Clone)]
pub struct MetaEntry {
    pub state: MetaState,
    pub ty: Value,
    /// Names of the context the meta was created in, for reporting.
    pub names: Vector<Symbol>,
    pub lvl: Level
}

/// Append-only store of metavariables, blocked by generation. Entries are
/// never removed; a solved entry stays solved.
#[derive(Debug)]
pub struct MetaContext {
    blocks: Vec<Vec<MetaEntry>>
}

impl Default for MetaContext {
    fn default() -> Self {
        Self::new()
    }
}

impl MetaContext {
    pub fn new() -> MetaContext {
        MetaContext { blocks: vec![Vec::new()] }
    }

    pub fn new_generation(&mut self) {
        self.blocks.push(Vec::new());
    }

    pub fn fresh(&mut self, ty: Value, names: Vector<Symbol>, lvl: Level) -> MetaVar {
        let generation = self.blocks.len() - 1;
        let block = self.blocks.last_mut()
            .expect("Impossible, the metacontext always has a generation.");
        let slot = block.len();
        block.push(MetaEntry { state: MetaState::Unsolved, ty, names, lvl });
        MetaVar { generation, slot }
    }

    pub fn lookup(&self, meta: MetaVar) -> &MetaEntry {
        self.blocks.get(meta.generation)
            .and_then(|block| block.get(meta.slot))
            .expect("Impossible, any created meta must exist.")
    }

    pub fn solve(&mut self, meta: MetaVar, value: Value) {
        let entry = self.blocks.get_mut(meta.generation)
            .and_then(|block| block.get_mut(meta.slot))
            .expect("Impossible, any created meta must exist.");
        match entry.state {
            MetaState::Unsolved => entry.state = MetaState::Solved(value),
            MetaState::Solved(_) => panic!("Impossible, meta {} solved twice.", meta)
        }
    }

    pub fn is_solved(&self, meta: MetaVar) -> bool {
        matches!(self.lookup(meta).state, MetaState::Solved(_))
    }

    pub fn solved_count(&self) -> usize {
        self.blocks.iter()
            .flatten()
            .filter(|e| matches!(e.state, MetaState::Solved(_)))
            .count()
    }
}

/// Tracks whether a unification failure happened under a rigid head or under
/// an unsolved metavariable. Bookkeeping only; it never delays a problem.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rigidity {
    Rigid,
    Flex
}

impl Rigidity {
    pub fn meld(self, other: Rigidity) -> Rigidity {
        match (self, other) {
            (Rigidity::Rigid, Rigidity::Rigid) => Rigidity::Rigid,
            _ => Rigidity::Flex
        }
    }
}

#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum UnifyError {
    #[error("values disagree at a rigid head")]
    RigidMismatch { rigidity: Rigidity },
    #[error("metavariable spine is not a pattern")]
    NotAPattern,
    #[error("occurs check failed for {meta}")]
    OccursCheck { meta: MetaVar },
    #[error("variable #{level} escapes the metavariable scope")]
    ScopeEscape { level: Level },
}

struct PartialRenaming {
    domain: Level,
    codomain: Level,
    renaming: AHashMap<Level, Level>
}

fn lift(renaming: &PartialRenaming) -> PartialRenaming {
    let PartialRenaming { domain, codomain, renaming } = renaming;
    let mut renaming = renaming.clone();
    renaming.insert(*codomain, *domain);
    PartialRenaming {
        domain: *domain + 1,
        codomain: *codomain + 1,
        renaming
    }
}

fn invert(db: &mut Database, env: Level, spine: Spine) -> Result<(PartialRenaming, Vec<Icit>), UnifyError> {
    let mut result = PartialRenaming {
        domain: 0.into(),
        codomain: env,
        renaming: AHashMap::new()
    };
    let mut icits = vec![];
    for entry in spine.iter() {
        icits.push(entry.icit);
        let value = entry.value.force(db);
        let value = unfold_meta_to_head(db, value);
        match value.as_ref() {
            ValueData::Variable { level, spine }
            if spine.is_empty() && !result.renaming.contains_key(level) =>
            {
                result.renaming.insert(*level, result.domain);
                result.domain = result.domain + 1;
            }
            _ => return Err(UnifyError::NotAPattern)
        }
    }
    Ok((result, icits))
}

fn rename(db: &mut Database, meta: MetaVar, renaming: &PartialRenaming, value: Value) -> Result<Term, UnifyError> {
    fn rename_spine(db: &mut Database, meta: MetaVar, renaming: &PartialRenaming, head: Term, spine: Spine) -> Result<Term, UnifyError> {
        let mut result = head;
        for entry in spine.iter() {
            let value = entry.value.force(db);
            let arg = rename(db, meta, renaming, value)?;
            result = db.make_term(TermData::Apply {
                icit: entry.icit,
                fun: result,
                arg
            });
        }
        Ok(result)
    }

    let value = unfold_meta_to_head(db, value);
    match value.as_ref() {
        ValueData::Variable { level, spine } => {
            if let Some(renamed) = renaming.renaming.get(level) {
                let index = renamed.to_index(*renaming.domain);
                let head = db.make_term(TermData::Bound { index });
                rename_spine(db, meta, renaming, head, spine.clone())
            } else {
                Err(UnifyError::ScopeEscape { level: *level })
            }
        }
        ValueData::MetaVariable { meta: other, spine } => {
            if *other == meta {
                Err(UnifyError::OccursCheck { meta })
            } else {
                let head = db.make_term(TermData::Meta { meta: *other });
                rename_spine(db, meta, renaming, head, spine.clone())
            }
        }
        ValueData::Reference { name, decl, spine, .. } => {
            let head = db.make_term(TermData::Free { name: *name, decl: *decl });
            rename_spine(db, meta, renaming, head, spine.clone())
        }
        ValueData::Lambda { icit, name, closure } => {
            let arg = EnvEntry::new(*name, LazyValueData::var(db, renaming.codomain));
            let body = closure.eval(db, arg);
            let body = rename(db, meta, &lift(renaming), body)?;
            Ok(db.make_term(TermData::Lambda {
                icit: *icit,
                name: *name,
                body
            }))
        }
        ValueData::Pi { icit, name, domain, closure } => {
            let domain = rename(db, meta, renaming, domain.clone())?;
            let arg = EnvEntry::new(*name, LazyValueData::var(db, renaming.codomain));
            let body = closure.eval(db, arg);
            let body = rename(db, meta, &lift(renaming), body)?;
            Ok(db.make_term(TermData::Pi {
                icit: *icit,
                name: *name,
                domain,
                body
            }))
        }
        ValueData::Star => Ok(db.make_term(TermData::Star)),
    }
}

fn wrap_in_lambdas(db: &mut Database, icits: &[Icit], body: Term) -> Term {
    let mut result = body;
    for (i, icit) in icits.iter().enumerate().rev() {
        let name = Symbol::from(format!("x{}", i).as_str());
        result = db.make_term(TermData::Lambda {
            icit: *icit,
            name,
            body: result
        });
    }
    result
}

/// Solve `meta spine ≡ rhs` by pattern unification: invert the spine into a
/// partial renaming, rename the right hand side through it (performing the
/// occurs and scope checks), and wrap the result in one lambda per spine
/// entry.
pub fn solve(db: &mut Database, env: Level, meta: MetaVar, spine: Spine, rhs: Value) -> Result<(), UnifyError> {
    let (renaming, icits) = invert(db, env, spine)?;
    let rhs = rename(db, meta, &renaming, rhs)?;
    let solution = wrap_in_lambdas(db, &icits, rhs);
    let solution = eval(db, Env::new(), solution);
    log::debug!("{} {} {}", meta, "solved to".green(), solution);
    db.metas.solve(meta, solution);
    Ok(())
}
