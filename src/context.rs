//! Scoped attribute-value stores populated during decode and consulted
//! during render.
//!
//! Scopes follow a stack discipline aligned with the result builder tree:
//! decoding a nested result pushes a scope, finalizing it pops the scope and
//! merges it into the enclosing one. Lookup resolves against the innermost
//! scope first.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Identity of an attribute. Values are keyed by identity, not by name, so
/// two attributes may share a display name without colliding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AttributeId(u64);

impl AttributeId {
    pub(crate) fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        AttributeId(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

/// Erased attribute value with a runtime type tag.
#[derive(Debug, Clone, PartialEq)]
pub enum AttrValue {
    U8(u8),
    U16(u16),
    U32(u32),
    U64(u64),
    I8(i8),
    I16(i16),
    I32(i32),
    I64(i64),
    Str(Arc<str>),
    Bytes(Arc<[u8]>),
}

/// Values bound in one result scope, plus the contexts inherited from
/// finalized child results, in completion order.
#[derive(Debug, Clone, Default)]
pub struct ResultContext {
    values: HashMap<AttributeId, AttrValue>,
    children: Vec<ResultContext>,
}

impl ResultContext {
    /// Own values first, then children most-recent first.
    pub fn lookup(&self, id: AttributeId) -> Option<&AttrValue> {
        self.values
            .get(&id)
            .or_else(|| self.children.iter().rev().find_map(|child| child.lookup(id)))
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty() && self.children.is_empty()
    }
}

/// The stack of scopes threaded through decode and render.
#[derive(Debug, Default)]
pub struct ContextStack {
    scopes: Vec<ResultContext>,
}

impl ContextStack {
    pub fn new() -> Self {
        ContextStack::default()
    }

    /// A single-scope stack re-entering a frozen result's context.
    pub fn for_render(context: &ResultContext) -> Self {
        ContextStack {
            scopes: vec![context.clone()],
        }
    }

    pub fn push_scope(&mut self) {
        self.scopes.push(ResultContext::default());
    }

    pub fn pop_scope(&mut self) -> ResultContext {
        self.scopes.pop().expect("scope stack underflow")
    }

    /// Bind a value in the innermost scope. Rebinding overwrites, which is
    /// what repeated specs (array elements) rely on.
    pub fn set(&mut self, id: AttributeId, value: AttrValue) {
        let scope = self.scopes.last_mut().expect("no active scope");
        scope.values.insert(id, value);
    }

    /// Resolve innermost-outward.
    pub fn get(&self, id: AttributeId) -> Option<&AttrValue> {
        self.scopes.iter().rev().find_map(|scope| scope.lookup(id))
    }

    /// Attach a popped child scope to the now-innermost scope. A popped root
    /// scope has no enclosing scope and is dropped here; the caller keeps its
    /// own snapshot.
    pub fn merge_child(&mut self, child: ResultContext) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.children.push(child);
        }
    }

    /// A self-contained context for a finished result: the scopes still on
    /// the stack (outermost first) plus the result's own popped scope, so a
    /// later render resolves exactly what the decode could see.
    pub fn snapshot_with(&self, scope: &ResultContext) -> ResultContext {
        let mut snapshot = ResultContext::default();
        snapshot.children.extend(self.scopes.iter().cloned());
        snapshot.children.push(scope.clone());
        snapshot
    }

    pub fn depth(&self) -> usize {
        self.scopes.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_innermost_scope_wins() {
        let id = AttributeId::next();
        let mut stack = ContextStack::new();
        stack.push_scope();
        stack.set(id, AttrValue::U32(1));
        stack.push_scope();
        assert_eq!(stack.get(id), Some(&AttrValue::U32(1)));
        stack.set(id, AttrValue::U32(2));
        assert_eq!(stack.get(id), Some(&AttrValue::U32(2)));
        let child = stack.pop_scope();
        stack.merge_child(child);
        // The merged child scope is younger than the outer binding.
        assert_eq!(stack.get(id), Some(&AttrValue::U32(2)));
    }

    #[test]
    fn test_sibling_contexts_resolve_most_recent_first() {
        let id = AttributeId::next();
        let mut stack = ContextStack::new();
        stack.push_scope();
        for value in [10u32, 20] {
            stack.push_scope();
            stack.set(id, AttrValue::U32(value));
            let child = stack.pop_scope();
            stack.merge_child(child);
        }
        assert_eq!(stack.get(id), Some(&AttrValue::U32(20)));
    }

    #[test]
    fn test_render_stack_reenters_snapshot() {
        let id = AttributeId::next();
        let mut stack = ContextStack::new();
        stack.push_scope();
        stack.set(id, AttrValue::Str(Arc::from("probe")));
        let snapshot = stack.pop_scope();

        let render = ContextStack::for_render(&snapshot);
        assert_eq!(render.get(id), Some(&AttrValue::Str(Arc::from("probe"))));
    }
}
