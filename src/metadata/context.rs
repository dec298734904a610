//! Generic instantiation context.
//!
//! A context carries the type arguments of the enclosing generic type (`!n`) and of the
//! enclosing generic method (`!!n`) that were in effect where a token was encountered, usually a
//! frame of the paused call stack.

use crate::metadata::signatures::TypeSignature;

/// The generic arguments in effect while resolving a context-sensitive token.
///
/// An empty context selects the "no context" cache of a
/// [`crate::metadata::module::ModuleView`]; a non-empty one selects the per-context cache.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct GenericContext {
    /// Arguments substituted for `!n` placeholders
    pub type_args: Vec<TypeSignature>,
    /// Arguments substituted for `!!n` placeholders
    pub method_args: Vec<TypeSignature>,
}

impl GenericContext {
    /// The empty context
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// A context with both type and method arguments
    #[must_use]
    pub fn new(type_args: Vec<TypeSignature>, method_args: Vec<TypeSignature>) -> Self {
        GenericContext {
            type_args,
            method_args,
        }
    }

    /// A context inside a generic type, outside any generic method
    #[must_use]
    pub fn for_type(type_args: Vec<TypeSignature>) -> Self {
        Self::new(type_args, Vec::new())
    }

    /// A context inside a generic method of a non-generic type
    #[must_use]
    pub fn for_method(method_args: Vec<TypeSignature>) -> Self {
        Self::new(Vec::new(), method_args)
    }

    /// `true` if neither type nor method arguments are present
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.type_args.is_empty() && self.method_args.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_context() {
        assert!(GenericContext::empty().is_empty());
        assert!(!GenericContext::for_method(vec![TypeSignature::I4]).is_empty());
        assert_ne!(
            GenericContext::for_type(vec![TypeSignature::I4]),
            GenericContext::for_method(vec![TypeSignature::I4])
        );
    }
}
