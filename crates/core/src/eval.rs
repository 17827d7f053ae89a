
use crate::utility::*;
use crate::database::*;
use crate::term::*;
use crate::value::*;
use crate::metavar::{MetaState, MetaVar};
use crate::unify::unfold_meta_to_head;

pub trait ApplyValue {
    fn apply(self, db: &mut Database, arg: SpineEntry) -> Self;
    fn apply_spine(self, db: &mut Database, spine: Spine) -> Self;
}

impl ApplyValue for Value {
    fn apply(self, db: &mut Database, arg: SpineEntry) -> Self {
        match self.as_ref() {
            ValueData::Lambda { name, closure, .. } => {
                let entry = EnvEntry::new(*name, arg.value);
                closure.eval(db, entry)
            }
            ValueData::Variable { .. }
            | ValueData::MetaVariable { .. }
            | ValueData::Reference { .. } => self.push_entry(arg),
            _ => unreachable!("applied value must be a lambda or a neutral")
        }
    }

    fn apply_spine(self, db: &mut Database, spine: Spine) -> Self {
        let mut result = self;
        for entry in spine.iter().cloned() {
            result = result.apply(db, entry);
        }
        result
    }
}

pub trait ForceValue {
    fn force(&self, db: &mut Database) -> Value;
}

impl ForceValue for LazyValue {
    fn force(&self, db: &mut Database) -> Value {
        let v = self.value.get().cloned();
        match v {
            Some(v) => v,
            None => {
                let (env, code) = (self.env.clone(), self.code.clone());
                let new_value = eval(db, env, code);
                self.value.set(new_value.clone()).ok();
                new_value
            }
        }
    }
}

impl Closure {
    pub fn eval(&self, db: &mut Database, arg: EnvEntry) -> Value {
        let Closure { env, code } = self;
        let mut env = env.clone();
        env.push_back(arg);
        eval(db, env, code.clone())
    }
}

pub fn eval(db: &mut Database, env: Env, term: Term) -> Value {
    stacker::maybe_grow(32 * 1024, 1024 * 1024, || eval_inner(db, env, term))
}

fn eval_inner(db: &mut Database, env: Env, term: Term) -> Value {
    match term.cloned() {
        TermData::Lambda { icit, name, body } => {
            let closure = Closure::new(env, body);
            ValueData::Lambda { icit, name, closure }.rced()
        }
        TermData::Let { name, let_body, body, .. } => {
            let def = LazyValueData::lazy(db, env.clone(), let_body);
            let mut env = env;
            env.push_back(EnvEntry::new(name, def));
            eval(db, env, body)
        }
        TermData::Pi { icit, name, domain, body } => {
            let domain = eval(db, env.clone(), domain);
            let closure = Closure::new(env, body);
            ValueData::Pi { icit, name, domain, closure }.rced()
        }
        TermData::Apply { icit, fun, arg } => {
            let fun = eval(db, env.clone(), fun);
            let arg = LazyValueData::lazy(db, env, arg);
            fun.apply(db, SpineEntry::new(icit, arg))
        }
        TermData::Bound { index } => {
            let position = index.to_level(env.len());
            env.get(*position)
                .expect("Impossible, a bound index cannot escape its environment.")
                .value
                .force(db)
        }
        TermData::Free { name, decl } => {
            let spine = Spine::new();
            let unfolded = Some(db.decl_def(decl));
            ValueData::Reference { name, decl, spine, unfolded }.rced()
        }
        TermData::Meta { meta } => eval_meta(db, meta),
        TermData::InsertedMeta { meta, mask } => {
            let mut result = eval_meta(db, meta);
            for (level, bound) in mask.iter().enumerate() {
                match bound {
                    EnvBound::Bound => {
                        let arg = &env[level];
                        let entry = SpineEntry::new(Icit::Expl, arg.value.clone());
                        result = result.apply(db, entry);
                    }
                    EnvBound::Defined => { }
                }
            }
            result
        }
        TermData::Star => ValueData::Star.rced(),
    }
}

fn eval_meta(db: &mut Database, meta: MetaVar) -> Value {
    match db.lookup_meta(meta) {
        MetaState::Unsolved => ValueData::MetaVariable { meta, spine: Spine::new() }.rced(),
        MetaState::Solved(v) => v
    }
}

fn quote_spine(db: &mut Database, head: Term, spine: Spine, level: Level) -> Term {
    spine.iter().cloned().fold(head, |acc, entry| {
        let arg = entry.value.force(db);
        let arg = quote(db, arg, level);
        db.make_term(TermData::Apply { icit: entry.icit, fun: acc, arg })
    })
}

pub fn quote(db: &mut Database, value: Value, level: Level) -> Term {
    let value = unfold_meta_to_head(db, value);
    match value.as_ref().clone() {
        ValueData::Variable { level: vlvl, spine } => {
            let index = vlvl.to_index(*level);
            let head = db.make_term(TermData::Bound { index });
            quote_spine(db, head, spine, level)
        }
        ValueData::MetaVariable { meta, spine } => {
            let head = db.make_term(TermData::Meta { meta });
            quote_spine(db, head, spine, level)
        }
        ValueData::Reference { name, decl, spine, .. } => {
            let head = db.make_term(TermData::Free { name, decl });
            quote_spine(db, head, spine, level)
        }
        ValueData::Lambda { icit, name, closure } => {
            let input = EnvEntry::new(name, LazyValueData::var(db, level));
            let body = closure.eval(db, input);
            let body = quote(db, body, level + 1);
            db.make_term(TermData::Lambda { icit, name, body })
        }
        ValueData::Pi { icit, name, domain, closure } => {
            let domain = quote(db, domain, level);
            let input = EnvEntry::new(name, LazyValueData::var(db, level));
            let body = closure.eval(db, input);
            let body = quote(db, body, level + 1);
            db.make_term(TermData::Pi { icit, name, domain, body })
        }
        ValueData::Star => db.make_term(TermData::Star),
    }
}

/// Substitute solved metavariables into a term without otherwise changing its
/// structure. Terms leave the elaborator through this.
pub fn zonk(db: &mut Database, env: Env, level: Level, term: Term) -> Term {
    match term.cloned() {
        TermData::Meta { .. }
        | TermData::InsertedMeta { .. }
        | TermData::Apply { .. } => {
            match zonk_head(db, env, level, term) {
                ZonkHead::Value(value) => quote(db, value, level),
                ZonkHead::Term(term) => term
            }
        }
        TermData::Lambda { icit, name, body } => {
            let mut env = env;
            let var = LazyValueData::var(db, level);
            env.push_back(EnvEntry::new(name, var));
            let body = zonk(db, env, level + 1, body);
            db.make_term(TermData::Lambda { icit, name, body })
        }
        TermData::Pi { icit, name, domain, body } => {
            let domain = zonk(db, env.clone(), level, domain);
            let mut env = env;
            let var = LazyValueData::var(db, level);
            env.push_back(EnvEntry::new(name, var));
            let body = zonk(db, env, level + 1, body);
            db.make_term(TermData::Pi { icit, name, domain, body })
        }
        TermData::Let { name, anno, let_body, body } => {
            let anno = zonk(db, env.clone(), level, anno);
            let let_body = zonk(db, env.clone(), level, let_body);
            let def = LazyValueData::lazy(db, env.clone(), let_body.clone());
            let mut env = env;
            env.push_back(EnvEntry::new(name, def));
            let body = zonk(db, env, level + 1, body);
            db.make_term(TermData::Let { name, anno, let_body, body })
        }
        TermData::Bound { .. }
        | TermData::Free { .. }
        | TermData::Star => term
    }
}

enum ZonkHead {
    Value(Value),
    Term(Term)
}

/// Application heads need care: a solved meta applied to arguments must
/// beta-reduce, not leave a lambda stranded in an application.
fn zonk_head(db: &mut Database, env: Env, level: Level, term: Term) -> ZonkHead {
    match term.cloned() {
        TermData::Meta { meta } => {
            match db.lookup_meta(meta) {
                MetaState::Solved(value) => ZonkHead::Value(value),
                MetaState::Unsolved => ZonkHead::Term(term)
            }
        }
        TermData::InsertedMeta { meta, .. } => {
            match db.lookup_meta(meta) {
                MetaState::Solved(_) => ZonkHead::Value(eval(db, env, term)),
                MetaState::Unsolved => ZonkHead::Term(term)
            }
        }
        TermData::Apply { icit, fun, arg } => {
            match zonk_head(db, env.clone(), level, fun) {
                ZonkHead::Value(fun) => {
                    let arg = LazyValueData::lazy(db, env, arg);
                    ZonkHead::Value(fun.apply(db, SpineEntry::new(icit, arg)))
                }
                ZonkHead::Term(fun) => {
                    let arg = zonk(db, env, level, arg);
                    ZonkHead::Term(db.make_term(TermData::Apply { icit, fun, arg }))
                }
            }
        }
        _ => ZonkHead::Term(zonk(db, env, level, term))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use imbl::Vector;

    fn identity(db: &mut Database) -> Term {
        let body = db.make_term(TermData::Bound { index: 0.into() });
        db.make_term(TermData::Lambda {
            icit: Icit::Expl,
            name: Symbol::from("x"),
            body
        })
    }

    #[test]
    fn quote_inverts_eval_on_identity() {
        let mut db = Database::new();
        let term = identity(&mut db);
        let value = eval(&mut db, Env::new(), term.clone());
        let quoted = quote(&mut db, value, 0.into());
        assert_eq!(term, quoted);
    }

    #[test]
    fn quote_inverts_eval_on_pi() {
        let mut db = Database::new();
        let domain = db.make_term(TermData::Star);
        let body = db.make_term(TermData::Bound { index: 0.into() });
        let term = db.make_term(TermData::Pi {
            icit: Icit::Impl,
            name: Symbol::from("A"),
            domain,
            body
        });
        let value = eval(&mut db, Env::new(), term.clone());
        let quoted = quote(&mut db, value, 0.into());
        assert_eq!(term, quoted);
    }

    #[test]
    fn application_beta_reduces() {
        let mut db = Database::new();
        let fun = identity(&mut db);
        let arg = db.make_term(TermData::Star);
        let app = db.make_term(TermData::Apply { icit: Icit::Expl, fun, arg });
        let value = eval(&mut db, Env::new(), app);
        assert!(matches!(value.as_ref(), ValueData::Star));
    }

    #[test]
    fn let_bindings_substitute() {
        let mut db = Database::new();
        let anno = db.make_term(TermData::Star);
        let let_body = db.make_term(TermData::Star);
        let body = db.make_term(TermData::Bound { index: 0.into() });
        let term = db.make_term(TermData::Let {
            name: Symbol::from("a"),
            anno,
            let_body,
            body
        });
        let value = eval(&mut db, Env::new(), term);
        assert!(matches!(value.as_ref(), ValueData::Star));
    }

    #[test]
    fn application_extends_neutral_spines() {
        let mut db = Database::new();
        let var = Value::var(0);
        let arg = LazyValueData::var(&mut db, 1.into());
        let result = var.apply(&mut db, SpineEntry::new(Icit::Expl, arg));
        match result.as_ref() {
            ValueData::Variable { level, spine } => {
                assert_eq!(*level, 0.into());
                assert_eq!(spine.len(), 1);
            }
            _ => panic!("expected a neutral variable")
        }
    }

    #[test]
    fn zonk_replaces_solved_metas() {
        let mut db = Database::new();
        let meta = db.metas.fresh(ValueData::Star.rced(), Vector::new(), 0.into());
        db.metas.solve(meta, ValueData::Star.rced());
        let term = db.make_term(TermData::Meta { meta });
        let zonked = zonk(&mut db, Env::new(), 0.into(), term);
        let star = db.make_term(TermData::Star);
        assert_eq!(zonked, star);
    }

    #[test]
    fn zonk_beta_reduces_solved_meta_applications() {
        let mut db = Database::new();
        let meta = db.metas.fresh(ValueData::Star.rced(), Vector::new(), 0.into());
        let solution_term = identity(&mut db);
        let solution = eval(&mut db, Env::new(), solution_term);
        db.metas.solve(meta, solution);

        let fun = db.make_term(TermData::Meta { meta });
        let arg = db.make_term(TermData::Star);
        let app = db.make_term(TermData::Apply { icit: Icit::Expl, fun, arg });
        let zonked = zonk(&mut db, Env::new(), 0.into(), app);
        let star = db.make_term(TermData::Star);
        assert_eq!(zonked, star);
    }

    #[test]
    fn zonk_keeps_unsolved_metas() {
        let mut db = Database::new();
        let meta = db.metas.fresh(ValueData::Star.rced(), Vector::new(), 0.into());
        let term = db.make_term(TermData::Meta { meta });
        let zonked = zonk(&mut db, Env::new(), 0.into(), term.clone());
        assert_eq!(zonked, term);
    }

    #[test]
    fn forcing_is_memoized() {
        let mut db = Database::new();
        let term = db.make_term(TermData::Star);
        let lazy = LazyValueData::lazy(&mut db, Env::new(), term);
        let first = lazy.force(&mut db);
        let second = lazy.force(&mut db);
        assert!(std::rc::Rc::ptr_eq(&first, &second));
    }
}
