//! Late-bound values: either a literal or a thunk evaluated against the
//! active context at decode or render time.

use std::fmt;
use std::sync::Arc;

use crate::context::ContextStack;
use crate::err::Result;

pub enum ValueExpression<T> {
    Value(T),
    Lazy(Arc<dyn Fn(&ContextStack) -> Result<T> + Send + Sync>),
}

impl<T: Clone> ValueExpression<T> {
    pub fn lazy(thunk: impl Fn(&ContextStack) -> Result<T> + Send + Sync + 'static) -> Self {
        ValueExpression::Lazy(Arc::new(thunk))
    }

    pub fn eval(&self, scopes: &ContextStack) -> Result<T> {
        match self {
            ValueExpression::Value(value) => Ok(value.clone()),
            ValueExpression::Lazy(thunk) => thunk(scopes),
        }
    }

    /// The literal value, when this expression is not late-bound.
    pub fn constant(&self) -> Option<&T> {
        match self {
            ValueExpression::Value(value) => Some(value),
            ValueExpression::Lazy(_) => None,
        }
    }
}

impl<T: Clone> Clone for ValueExpression<T> {
    fn clone(&self) -> Self {
        match self {
            ValueExpression::Value(value) => ValueExpression::Value(value.clone()),
            ValueExpression::Lazy(thunk) => ValueExpression::Lazy(Arc::clone(thunk)),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for ValueExpression<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueExpression::Value(value) => f.debug_tuple("Value").field(value).finish(),
            ValueExpression::Lazy(_) => f.write_str("Lazy(..)"),
        }
    }
}

impl<T> From<T> for ValueExpression<T> {
    fn from(value: T) -> Self {
        ValueExpression::Value(value)
    }
}

impl From<&str> for ValueExpression<String> {
    fn from(value: &str) -> Self {
        ValueExpression::Value(value.to_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{AttrValue, AttributeId};

    #[test]
    fn test_literal_and_lazy_evaluation() {
        let id = AttributeId::next();
        let mut scopes = ContextStack::new();
        scopes.push_scope();
        scopes.set(id, AttrValue::U32(40));

        let literal: ValueExpression<u64> = 7u64.into();
        assert_eq!(literal.eval(&scopes).unwrap(), 7);
        assert_eq!(literal.constant(), Some(&7));

        let lazy = ValueExpression::lazy(move |scopes: &ContextStack| {
            match scopes.get(id) {
                Some(AttrValue::U32(v)) => Ok(u64::from(*v) + 2),
                _ => Err(crate::err::ScanError::UnboundAttribute {
                    name: "forty".to_owned(),
                }),
            }
        });
        assert_eq!(lazy.eval(&scopes).unwrap(), 42);
        assert!(lazy.constant().is_none());
    }
}
