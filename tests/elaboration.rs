
use mica_core::prelude::*;
use mica_lang::prelude::*;
use mica_lang::syntax::{self, NameOrIcit, Span};

const SOURCE: &str = "\
id : {A : Type} -> (x : A) -> A = fun x. x
tyid = id Type
ghost_use = ghost";

fn init_logging() {
    env_logger::builder().is_test(true).try_init().ok();
}

fn span_of(needle: &str) -> Span {
    let start = SOURCE.find(needle).unwrap();
    (start, start + needle.len())
}

fn var(name: &str) -> syntax::Term {
    syntax::Term::Variable { span: span_of(name), name: Symbol::from(name) }
}

fn star() -> syntax::Term {
    syntax::Term::Star { span: span_of("Type") }
}

fn apply(fun: syntax::Term, arg: syntax::Term) -> syntax::Term {
    let (start, _) = fun.span();
    let (_, end) = arg.span();
    syntax::Term::Apply {
        span: (start, end),
        info: NameOrIcit::Unnamed(Icit::Expl),
        fun: fun.boxed(),
        arg: arg.boxed()
    }
}

fn pi(icit: Icit, name: &str, domain: syntax::Term, body: syntax::Term) -> syntax::Term {
    let (start, _) = domain.span();
    let (_, end) = body.span();
    syntax::Term::Pi {
        span: (start, end),
        icit,
        var: Some(Symbol::from(name)),
        domain: domain.boxed(),
        body: body.boxed()
    }
}

fn define_id(db: &mut Database) {
    let anno = pi(
        Icit::Impl, "A",
        star(),
        pi(Icit::Expl, "x", var("A"), var("A"))
    );
    let def = syntax::Definition {
        span: span_of("id : {A : Type} -> (x : A) -> A = fun x. x"),
        name: Symbol::from("id"),
        vars: vec![syntax::LambdaVar {
            info: NameOrIcit::Unnamed(Icit::Expl),
            var: Some(Symbol::from("x")),
            anno: None
        }],
        anno: Some(anno.boxed()),
        body: var("x").boxed()
    };
    elaborate(db, std::slice::from_ref(&def)).unwrap();
}

#[test]
fn the_pipeline_elaborates_and_zonks_definitions() {
    init_logging();
    let mut db = Database::new();
    db.set_text(SOURCE);
    define_id(&mut db);

    let def = syntax::Definition {
        span: span_of("tyid = id Type"),
        name: Symbol::from("tyid"),
        vars: vec![],
        anno: None,
        body: apply(var("id"), star()).boxed()
    };
    elaborate(&mut db, std::slice::from_ref(&def)).unwrap();

    let id = db.lookup_decl(Symbol::from("id")).unwrap();
    let tyid = db.decl(db.lookup_decl(Symbol::from("tyid")).unwrap()).clone();
    let star = db.make_term(TermData::Star);
    let free = db.make_term(TermData::Free { name: Symbol::from("id"), decl: id });
    let inner = db.make_term(TermData::Apply { icit: Icit::Impl, fun: free, arg: star.clone() });
    let expected = db.make_term(TermData::Apply { icit: Icit::Expl, fun: inner, arg: star.clone() });
    assert_eq!(tyid.body, expected);
    assert_eq!(tyid.ty, star);
}

#[test]
fn later_definitions_see_earlier_ones() {
    init_logging();
    let mut db = Database::new();
    db.set_text(SOURCE);
    define_id(&mut db);

    let body = syntax::Term::Let {
        span: span_of("tyid = id Type"),
        def: syntax::DefineTerm {
            span: span_of("Type"),
            name: Symbol::from("t"),
            anno: Some(star().boxed()),
            body: star().boxed()
        },
        body: apply(var("id"), var("t")).boxed()
    };
    let def = syntax::Definition {
        span: span_of("tyid = id Type"),
        name: Symbol::from("c"),
        vars: vec![],
        anno: None,
        body: body.boxed()
    };
    elaborate(&mut db, std::slice::from_ref(&def)).unwrap();

    let c = db.decl(db.lookup_decl(Symbol::from("c")).unwrap()).clone();
    assert_eq!(c.ty, db.make_term(TermData::Star));
}

#[test]
fn reported_errors_carry_source_snippets() {
    init_logging();
    let mut db = Database::new();
    db.set_text(SOURCE);

    let def = syntax::Definition {
        span: span_of("ghost_use = ghost"),
        name: Symbol::from("ghost_use"),
        vars: vec![],
        anno: None,
        body: var("ghost").boxed()
    };
    let error = elaborate(&mut db, std::slice::from_ref(&def))
        .expect_err("an unknown identifier must not elaborate");
    let rendered = error.to_string();
    assert!(rendered.contains("Missing name"));
    assert!(rendered.contains("is not in scope"));
    assert!(rendered.contains("ghost"));
}

#[test]
fn failed_definitions_do_not_block_later_ones() {
    init_logging();
    let mut db = Database::new();
    db.set_text(SOURCE);
    define_id(&mut db);

    let broken = syntax::Definition {
        span: span_of("ghost_use = ghost"),
        name: Symbol::from("ghost_use"),
        vars: vec![],
        anno: None,
        body: var("ghost").boxed()
    };
    let fine = syntax::Definition {
        span: span_of("tyid = id Type"),
        name: Symbol::from("tyid"),
        vars: vec![],
        anno: None,
        body: apply(var("id"), star()).boxed()
    };
    assert!(elaborate(&mut db, &[broken, fine]).is_err());
    assert!(db.lookup_decl(Symbol::from("tyid")).is_some());
    assert!(db.lookup_decl(Symbol::from("ghost_use")).is_none());
}
