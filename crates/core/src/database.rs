
use std::sync::Arc;

use ahash::AHashMap;
use thiserror::Error;

use crate::hc::*;
use crate::utility::*;
use crate::term::*;
use crate::value::*;
use crate::metavar::{MetaContext, MetaState, MetaVar};

#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("The name {name} already has a definition")]
    DeclCollision { name: String }
}

#[derive(Debug, Clone)]
pub struct DeclValues {
    pub type_value: LazyValue,
    pub def_value: LazyValue
}

/// Shared state threaded through evaluation, unification and elaboration:
/// the hash-consing tables, the metacontext, the top-level declarations and
/// the source text used for diagnostics.
#[derive(Debug)]
pub struct Database {
    pub term_data: HcTable<TermData>,
    pub value_data: HcTable<LazyValueData>,
    pub metas: MetaContext,
    decls: Vec<Decl>,
    values: Vec<DeclValues>,
    names: AHashMap<Symbol, DeclId>,
    text: Arc<String>
}

impl Default for Database {
    fn default() -> Self {
        Self::new()
    }
}

impl Database {
    pub fn new() -> Database {
        Database {
            term_data: HcTable::with_capacity(128),
            value_data: HcTable::with_capacity(128),
            metas: MetaContext::new(),
            decls: Vec::new(),
            values: Vec::new(),
            names: AHashMap::new(),
            text: Arc::new(String::new())
        }
    }

    pub fn make_term(&mut self, t: TermData) -> Term {
        self.term_data.intern(t)
    }

    pub fn make_value(&mut self, v: LazyValueData) -> LazyValue {
        self.value_data.intern(v)
    }

    pub fn set_text(&mut self, text: &str) {
        self.text = Arc::new(text.to_string());
    }

    pub fn text(&self) -> Arc<String> {
        self.text.clone()
    }

    pub fn text_ref(&self) -> &str {
        self.text.as_ref()
    }

    /// Append a fully elaborated declaration. Anonymous (`_`) declarations
    /// are stored but not added to the name scope.
    pub fn insert_decl(&mut self, decl: Decl) -> Result<DeclId, DatabaseError> {
        let id = DeclId::from(self.decls.len());
        if decl.name != Symbol::default() {
            if self.names.contains_key(&decl.name) {
                return Err(DatabaseError::DeclCollision { name: decl.name.to_string() });
            }
            self.names.insert(decl.name, id);
        }
        let type_value = LazyValueData::lazy(self, Env::new(), decl.ty.clone());
        let def_value = LazyValueData::lazy(self, Env::new(), decl.body.clone());
        self.decls.push(decl);
        self.values.push(DeclValues { type_value, def_value });
        Ok(id)
    }

    pub fn lookup_decl(&self, name: Symbol) -> Option<DeclId> {
        self.names.get(&name).copied()
    }

    pub fn decl(&self, id: DeclId) -> &Decl {
        self.decls.get(*id)
            .expect("Impossible, any created declaration must exist.")
    }

    pub fn decl_type(&self, id: DeclId) -> LazyValue {
        self.values.get(*id)
            .expect("Impossible, any created declaration must exist.")
            .type_value
            .clone()
    }

    pub fn decl_def(&self, id: DeclId) -> LazyValue {
        self.values.get(*id)
            .expect("Impossible, any created declaration must exist.")
            .def_value
            .clone()
    }

    pub fn lookup_meta(&self, meta: MetaVar) -> MetaState {
        self.metas.lookup(meta).state.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eval::*;

    #[test]
    fn declarations_resolve_by_name() {
        let mut db = Database::new();
        let ty = db.make_term(TermData::Star);
        let body = db.make_term(TermData::Star);
        let id = db.insert_decl(Decl { name: Symbol::from("t"), ty, body }).unwrap();
        assert_eq!(db.lookup_decl(Symbol::from("t")), Some(id));
        assert_eq!(db.decl(id).name, Symbol::from("t"));
    }

    #[test]
    fn colliding_declarations_are_rejected() {
        let mut db = Database::new();
        let ty = db.make_term(TermData::Star);
        let body = db.make_term(TermData::Star);
        db.insert_decl(Decl { name: Symbol::from("t"), ty: ty.clone(), body: body.clone() }).unwrap();
        let result = db.insert_decl(Decl { name: Symbol::from("t"), ty, body });
        assert!(matches!(result, Err(DatabaseError::DeclCollision { .. })));
    }

    #[test]
    fn anonymous_declarations_stay_out_of_scope() {
        let mut db = Database::new();
        let ty = db.make_term(TermData::Star);
        let body = db.make_term(TermData::Star);
        db.insert_decl(Decl { name: Symbol::default(), ty, body }).unwrap();
        assert_eq!(db.lookup_decl(Symbol::default()), None);
    }

    #[test]
    fn references_unfold_to_their_definition() {
        let mut db = Database::new();
        let ty = db.make_term(TermData::Star);
        let body = db.make_term(TermData::Star);
        let id = db.insert_decl(Decl { name: Symbol::from("t"), ty, body }).unwrap();
        let unfolded = db.decl_def(id).force(&mut db);
        assert!(matches!(unfolded.as_ref(), ValueData::Star));
    }
}
