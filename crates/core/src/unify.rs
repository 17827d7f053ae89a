
use if_chain::if_chain;

use crate::utility::*;
use crate::value::*;
use crate::eval::*;
use crate::metavar::{self, MetaState, Rigidity, UnifyError};
use crate::database::*;

/// Unfold solved metavariables at the head until the head is stable.
pub fn unfold_meta_to_head(db: &mut Database, value: Value) -> Value {
    let mut result = value;
    loop {
        match result.as_ref() {
            ValueData::MetaVariable { meta, spine } => {
                let (meta, spine) = (*meta, spine.clone());
                match db.lookup_meta(meta) {
                    MetaState::Solved(v) => result = v.apply_spine(db, spine),
                    MetaState::Unsolved => break
                }
            }
            _ => break
        }
    }
    result
}

/// Weak head normalization: unfold solved metavariables and top-level
/// references until the head is stable. Idempotent.
pub fn unfold_to_head(db: &mut Database, value: Value) -> Value {
    let mut result = value;
    loop {
        match result.as_ref() {
            ValueData::Reference { unfolded, spine, .. } => {
                if let Some(unfolded) = unfolded {
                    let unfolded = unfolded.force(db);
                    result = unfolded.apply_spine(db, spine.clone());
                } else { break }
            }
            ValueData::MetaVariable { meta, spine } => {
                let (meta, spine) = (*meta, spine.clone());
                match db.lookup_meta(meta) {
                    MetaState::Solved(v) => result = v.apply_spine(db, spine),
                    MetaState::Unsolved => break
                }
            }
            _ => break
        }
    }
    result
}

/// Equal heads must have pointwise-convertible spines. Arity or icity
/// disagreement is a genuine mismatch, never recoverable.
fn unify_spine(db: &mut Database, level: Level, rho: Rigidity, lhs: Spine, rhs: Spine) -> Result<(), UnifyError> {
    if lhs.len() != rhs.len() {
        return Err(UnifyError::RigidMismatch { rigidity: rho });
    }
    for (e1, e2) in lhs.iter().cloned().zip(rhs.iter().cloned()) {
        if e1.icit != e2.icit {
            return Err(UnifyError::RigidMismatch { rigidity: rho });
        }
        let v1 = e1.value.force(db);
        let v2 = e2.value.force(db);
        unify(db, level, rho, v1, v2)?;
    }
    Ok(())
}

pub fn unify(db: &mut Database, level: Level, rho: Rigidity, lhs: Value, rhs: Value) -> Result<(), UnifyError> {
    stacker::maybe_grow(32 * 1024, 1024 * 1024, || unify_inner(db, level, rho, lhs, rhs))
}

fn is_neutral(value: &Value) -> bool {
    matches!(
        value.as_ref(),
        ValueData::Variable { .. }
        | ValueData::MetaVariable { .. }
        | ValueData::Reference { .. }
    )
}

fn unify_inner(db: &mut Database, level: Level, rho: Rigidity, lhs: Value, rhs: Value) -> Result<(), UnifyError> {
    let lhs = unfold_meta_to_head(db, lhs);
    let rhs = unfold_meta_to_head(db, rhs);
    match (lhs.as_ref().clone(), rhs.as_ref().clone()) {
        (ValueData::Star, ValueData::Star) => Ok(()),

        (ValueData::Pi { icit: i1, name: n1, domain: d1, closure: c1 }
        , ValueData::Pi { icit: i2, name: n2, domain: d2, closure: c2 })
        => {
            if i1 != i2 {
                return Err(UnifyError::RigidMismatch { rigidity: rho });
            }
            unify(db, level, rho, d1, d2)?;
            let input = LazyValueData::var(db, level);
            let c1 = c1.eval(db, EnvEntry::new(n1, input.clone()));
            let c2 = c2.eval(db, EnvEntry::new(n2, input));
            unify(db, level + 1, rho, c1, c2)
        }

        (ValueData::Lambda { name: n1, closure: c1, .. }
        , ValueData::Lambda { name: n2, closure: c2, .. })
        => {
            let input = LazyValueData::var(db, level);
            let c1 = c1.eval(db, EnvEntry::new(n1, input.clone()));
            let c2 = c2.eval(db, EnvEntry::new(n2, input));
            unify(db, level + 1, rho, c1, c2)
        }

        // eta; only a neutral can absorb the fresh argument, a canonical
        // head on the other side is a genuine clash
        (ValueData::Lambda { icit, name, closure }, _) if is_neutral(&rhs) => {
            let input = LazyValueData::var(db, level);
            let body = closure.eval(db, EnvEntry::new(name, input.clone()));
            let rhs = rhs.apply(db, SpineEntry::new(icit, input));
            unify(db, level + 1, rho, body, rhs)
        }
        (_, ValueData::Lambda { icit, name, closure }) if is_neutral(&lhs) => {
            let input = LazyValueData::var(db, level);
            let body = closure.eval(db, EnvEntry::new(name, input.clone()));
            let lhs = lhs.apply(db, SpineEntry::new(icit, input));
            unify(db, level + 1, rho, lhs, body)
        }
        (ValueData::Lambda { .. }, _) | (_, ValueData::Lambda { .. }) =>
            Err(UnifyError::RigidMismatch { rigidity: rho }),

        (ValueData::Variable { level: l1, spine: s1 }
        , ValueData::Variable { level: l2, spine: s2 })
        => {
            if l1 == l2 { unify_spine(db, level, rho, s1, s2) }
            else { Err(UnifyError::RigidMismatch { rigidity: rho }) }
        }

        (ValueData::MetaVariable { meta: m1, spine: s1 }
        , ValueData::MetaVariable { meta: m2, spine: s2 })
        => {
            if m1 == m2 {
                unify_spine(db, level, rho.meld(Rigidity::Flex), s1, s2)
            } else {
                // Invert the shorter spine first; it is the more likely
                // pattern. The other side is only tried when the first is
                // not a pattern at all.
                let ((m1, s1, r1), (m2, s2, r2)) = if s1.len() <= s2.len() {
                    ((m1, s1, rhs), (m2, s2, lhs))
                } else {
                    ((m2, s2, lhs), (m1, s1, rhs))
                };
                match metavar::solve(db, level, m1, s1, r1) {
                    Err(UnifyError::NotAPattern) => metavar::solve(db, level, m2, s2, r2),
                    result => result
                }
            }
        }

        (ValueData::MetaVariable { meta, spine }, _) =>
            metavar::solve(db, level, meta, spine, rhs),
        (_, ValueData::MetaVariable { meta, spine }) =>
            metavar::solve(db, level, meta, spine, lhs),

        (ValueData::Reference { decl: d1, spine: p1, unfolded: u1, .. }
        , ValueData::Reference { decl: d2, spine: p2, unfolded: u2, .. })
        => {
            let folded = if d1 == d2 {
                unify_spine(db, level, rho, p1.clone(), p2.clone())
            } else {
                Err(UnifyError::RigidMismatch { rigidity: rho })
            };
            if folded.is_ok() { return folded }
            if_chain! {
                if let Some(u1) = u1;
                if let Some(u2) = u2;
                then {
                    let u1 = u1.force(db).apply_spine(db, p1);
                    let u2 = u2.force(db).apply_spine(db, p2);
                    unify(db, level, rho, u1, u2)
                } else {
                    folded
                }
            }
        }
        (ValueData::Reference { spine, unfolded, .. }, _) => {
            match unfolded {
                Some(u) => {
                    let u = u.force(db).apply_spine(db, spine);
                    unify(db, level, rho, u, rhs)
                }
                None => Err(UnifyError::RigidMismatch { rigidity: rho })
            }
        }
        (_, ValueData::Reference { spine, unfolded, .. }) => {
            match unfolded {
                Some(u) => {
                    let u = u.force(db).apply_spine(db, spine);
                    unify(db, level, rho, lhs, u)
                }
                None => Err(UnifyError::RigidMismatch { rigidity: rho })
            }
        }

        _ => Err(UnifyError::RigidMismatch { rigidity: rho })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::term::*;
    use imbl::Vector;

    fn identity_value(db: &mut Database) -> Value {
        let body = db.make_term(TermData::Bound { index: 0.into() });
        let term = db.make_term(TermData::Lambda {
            icit: Icit::Expl,
            name: Symbol::from("x"),
            body
        });
        eval(db, Env::new(), term)
    }

    #[test]
    fn unification_is_reflexive_without_new_solutions() {
        let mut db = Database::new();
        let v = identity_value(&mut db);
        let before = db.metas.solved_count();
        unify(&mut db, 0.into(), Rigidity::Rigid, v.clone(), v).unwrap();
        assert_eq!(db.metas.solved_count(), before);
    }

    #[test]
    fn eta_expansion_identifies_wrapped_neutrals() {
        let mut db = Database::new();
        // λ x. f x against f, under a context binding f
        let f_var = LazyValueData::var(&mut db, 0.into());
        let env = Env::unit(EnvEntry::new(Symbol::from("f"), f_var.clone()));
        let fun = db.make_term(TermData::Bound { index: 1.into() });
        let arg = db.make_term(TermData::Bound { index: 0.into() });
        let body = db.make_term(TermData::Apply { icit: Icit::Expl, fun, arg });
        let lambda = db.make_term(TermData::Lambda {
            icit: Icit::Expl,
            name: Symbol::from("x"),
            body
        });
        let lhs = eval(&mut db, env, lambda);
        let rhs = f_var.force(&mut db);
        unify(&mut db, 1.into(), Rigidity::Rigid, lhs, rhs).unwrap();
    }

    #[test]
    fn distinct_rigid_heads_mismatch() {
        let mut db = Database::new();
        let star = ValueData::Star.rced();
        let body = db.make_term(TermData::Star);
        let pi = ValueData::Pi {
            icit: Icit::Expl,
            name: Symbol::from("x"),
            domain: star.clone(),
            closure: Closure::new(Env::new(), body)
        }.rced();
        let result = unify(&mut db, 0.into(), Rigidity::Rigid, star, pi);
        assert_eq!(result, Err(UnifyError::RigidMismatch { rigidity: Rigidity::Rigid }));
    }

    #[test]
    fn distinct_variables_mismatch() {
        let mut db = Database::new();
        let a = Value::var(0);
        let b = Value::var(1);
        let result = unify(&mut db, 2.into(), Rigidity::Rigid, a, b);
        assert_eq!(result, Err(UnifyError::RigidMismatch { rigidity: Rigidity::Rigid }));
    }

    #[test]
    fn flex_rigid_solves_the_meta() {
        let mut db = Database::new();
        let meta = db.metas.fresh(ValueData::Star.rced(), Vector::new(), 0.into());
        let flex = ValueData::MetaVariable { meta, spine: Spine::new() }.rced();
        unify(&mut db, 0.into(), Rigidity::Rigid, flex, ValueData::Star.rced()).unwrap();
        assert!(db.metas.is_solved(meta));
        match db.lookup_meta(meta) {
            MetaState::Solved(v) => assert!(matches!(v.as_ref(), ValueData::Star)),
            MetaState::Unsolved => unreachable!()
        }
    }

    #[test]
    fn solved_metas_unfold_before_comparison() {
        let mut db = Database::new();
        let meta = db.metas.fresh(ValueData::Star.rced(), Vector::new(), 0.into());
        db.metas.solve(meta, ValueData::Star.rced());
        let flex = ValueData::MetaVariable { meta, spine: Spine::new() }.rced();
        unify(&mut db, 0.into(), Rigidity::Rigid, flex, ValueData::Star.rced()).unwrap();
    }

    #[test]
    fn spine_arity_mismatch_is_rigid() {
        let mut db = Database::new();
        let arg = LazyValueData::var(&mut db, 1.into());
        let applied = Value::var(0).push_entry(SpineEntry::new(Icit::Expl, arg));
        let bare = Value::var(0);
        let result = unify(&mut db, 2.into(), Rigidity::Rigid, applied, bare);
        assert_eq!(result, Err(UnifyError::RigidMismatch { rigidity: Rigidity::Rigid }));
    }

    #[test]
    fn spine_comparison_under_a_flex_head_reports_flex() {
        let mut db = Database::new();
        let meta = db.metas.fresh(ValueData::Star.rced(), Vector::new(), 2.into());
        let a = LazyValueData::var(&mut db, 0.into());
        let b = LazyValueData::var(&mut db, 1.into());
        let lhs = ValueData::MetaVariable {
            meta,
            spine: Spine::unit(SpineEntry::new(Icit::Expl, a))
        }.rced();
        let rhs = ValueData::MetaVariable {
            meta,
            spine: Spine::unit(SpineEntry::new(Icit::Expl, b))
        }.rced();
        let result = unify(&mut db, 2.into(), Rigidity::Rigid, lhs, rhs);
        assert_eq!(result, Err(UnifyError::RigidMismatch { rigidity: Rigidity::Flex }));
    }

    #[test]
    fn eta_expansion_against_a_canonical_head_mismatches() {
        let mut db = Database::new();
        let lambda = identity_value(&mut db);
        let result = unify(&mut db, 0.into(), Rigidity::Rigid, lambda.clone(), ValueData::Star.rced());
        assert_eq!(result, Err(UnifyError::RigidMismatch { rigidity: Rigidity::Rigid }));
        let result = unify(&mut db, 0.into(), Rigidity::Rigid, ValueData::Star.rced(), lambda);
        assert_eq!(result, Err(UnifyError::RigidMismatch { rigidity: Rigidity::Rigid }));
    }

    #[test]
    fn whnf_is_idempotent_after_unfolding() {
        let mut db = Database::new();
        let meta = db.metas.fresh(ValueData::Star.rced(), Vector::new(), 0.into());
        let id = identity_value(&mut db);
        db.metas.solve(meta, id);
        let star = db.make_term(TermData::Star);
        let arg = LazyValueData::lazy(&mut db, Env::new(), star);
        let flex = ValueData::MetaVariable {
            meta,
            spine: Spine::unit(SpineEntry::new(Icit::Expl, arg))
        }.rced();
        let once = unfold_to_head(&mut db, flex);
        let twice = unfold_to_head(&mut db, once.clone());
        assert!(matches!(once.as_ref(), ValueData::Star));
        assert_eq!(once, twice);
    }

    #[test]
    fn whnf_is_idempotent_on_canonical_values() {
        let mut db = Database::new();
        let star = ValueData::Star.rced();
        let once = unfold_to_head(&mut db, star.clone());
        let twice = unfold_to_head(&mut db, once.clone());
        assert_eq!(once, twice);
        assert_eq!(once, star);
    }
}
