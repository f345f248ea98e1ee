//! Label storage: a flat arena of label records plus a stack of name maps.
//! Scope maps are allocated per `.local` site and reused across passes, so
//! a label keeps its arena slot (and thus its converging value) from one
//! pass to the next.

use crate::source::Location;
use crate::value::Value;
use std::collections::HashMap;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct LabelId(pub usize);

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum LabelScope {
    Global,
    Block,
    Reusable,
}

#[derive(Clone, Debug)]
pub struct Label {
    pub name: String,
    pub value: Value,
    pub scope: LabelScope,
    pub is_defined: bool,
    pub defined_in_pass: u32,
    pub is_used: bool,
    pub is_global: bool,
    pub is_required: bool,
    pub defined_at: Option<Location>,
}

impl Label {
    fn new(name: &str, scope: LabelScope) -> Label {
        Label {
            name: name.to_string(),
            value: Value::invalid(),
            scope,
            is_defined: false,
            defined_in_pass: 0,
            is_used: false,
            is_global: false,
            is_required: false,
            defined_at: None,
        }
    }
}

pub struct LabelPool {
    arena: Vec<Label>,
    /// Map pool; index 0 is the global scope, the rest are `.local` scopes
    /// keyed by their per-pass ordinal.
    maps: Vec<HashMap<String, LabelId>>,
    /// Active scope stack of indices into `maps`.
    stack: Vec<usize>,
}

impl LabelPool {
    pub fn new() -> LabelPool {
        LabelPool {
            arena: Vec::new(),
            maps: vec![HashMap::new()],
            stack: vec![0],
        }
    }

    /// Resets the scope stack for a new pass; arena and maps persist.
    pub fn begin_pass(&mut self) {
        self.stack.clear();
        self.stack.push(0);
    }

    /// Enters the block scope with the given per-pass ordinal, allocating
    /// its map on the first pass that reaches it.
    pub fn enter_block(&mut self, ordinal: usize) {
        while self.maps.len() <= ordinal {
            self.maps.push(HashMap::new());
        }
        self.stack.push(ordinal);
    }

    pub fn leave_block(&mut self) -> bool {
        if self.stack.len() > 1 {
            self.stack.pop();
            true
        } else {
            false
        }
    }

    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    pub fn truncate_to(&mut self, depth: usize) {
        while self.stack.len() > depth.max(1) {
            self.stack.pop();
        }
    }

    /// Name lookup walking the scope stack from the top down.
    pub fn find(&self, name: &str) -> Option<LabelId> {
        for &scope in self.stack.iter().rev() {
            if let Some(&id) = self.maps[scope].get(name) {
                return Some(id);
            }
        }
        None
    }

    /// Finds an existing binding or creates one in the current scope.
    pub fn find_or_create(&mut self, name: &str, scope_kind: LabelScope) -> LabelId {
        if let Some(id) = self.find(name) {
            return id;
        }
        let id = LabelId(self.arena.len());
        self.arena.push(Label::new(name, scope_kind));
        let top = *self.stack.last().unwrap();
        self.maps[top].insert(name.to_string(), id);
        id
    }

    /// Finds a binding in the current scope only, creating one there if
    /// absent. Definitions use this so an inner definition shadows an
    /// outer label instead of clobbering it.
    pub fn define(&mut self, name: &str, scope_kind: LabelScope) -> LabelId {
        let top = *self.stack.last().unwrap();
        if let Some(&id) = self.maps[top].get(name) {
            return id;
        }
        let id = LabelId(self.arena.len());
        self.arena.push(Label::new(name, scope_kind));
        self.maps[top].insert(name.to_string(), id);
        id
    }

    /// Creates or finds a binding in the global scope, bypassing blocks.
    pub fn find_or_create_global(&mut self, name: &str) -> LabelId {
        if let Some(&id) = self.maps[0].get(name) {
            return id;
        }
        let id = LabelId(self.arena.len());
        self.arena.push(Label::new(name, LabelScope::Global));
        self.maps[0].insert(name.to_string(), id);
        id
    }

    pub fn get(&self, id: LabelId) -> &Label {
        &self.arena[id.0]
    }

    pub fn get_mut(&mut self, id: LabelId) -> &mut Label {
        &mut self.arena[id.0]
    }

    pub fn iter(&self) -> std::slice::Iter<Label> {
        self.arena.iter()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::value::Validity;

    #[test]
    fn lookup_walks_scopes_top_down() {
        let mut pool = LabelPool::new();
        let outer = pool.find_or_create("x", LabelScope::Global);
        pool.enter_block(1);
        let inner = pool.find_or_create("x", LabelScope::Block);
        // "x" was found in the outer scope, not duplicated.
        assert_eq!(outer, inner);

        let shadow = pool.find_or_create("y", LabelScope::Block);
        assert_eq!(pool.find("y"), Some(shadow));
        pool.leave_block();
        assert_eq!(pool.find("y"), None);
    }

    #[test]
    fn block_scopes_persist_across_passes() {
        let mut pool = LabelPool::new();
        pool.enter_block(1);
        let id = pool.find_or_create("local", LabelScope::Block);
        pool.get_mut(id).value = Value::new(7, Validity::Preliminary);
        pool.leave_block();

        pool.begin_pass();
        pool.enter_block(1);
        let again = pool.find_or_create("local", LabelScope::Block);
        assert_eq!(id, again);
        assert_eq!(pool.get(again).value.value, 7);
    }

    #[test]
    fn global_creation_bypasses_blocks() {
        let mut pool = LabelPool::new();
        pool.enter_block(1);
        let id = pool.find_or_create_global("g");
        pool.leave_block();
        assert_eq!(pool.find("g"), Some(id));
    }
}
