//! The objects a [`crate::metadata::module::ModuleView`] hands out for metadata rows.
//!
//! # Lazy proxies
//!
//! [`TypeDef`], [`FieldProxy`], [`MethodProxy`], [`PropertyProxy`], [`EventProxy`] and
//! [`ResourceProxy`] are created with nothing but their identity (module, owner, rid and original
//! token). The first access to any descriptive accessor reads the row from the target under a
//! [`crate::metadata::lazy::LazyInit`]; each facet (constant, marshalling, custom attributes,
//! security, body) is a further single-shot query cached in a `OnceLock`. Facet queries that fail
//! degrade to an absent value.
//!
//! # Simple rows
//!
//! Reference rows ([`TypeRef`], [`ModuleRef`], [`AssemblyRef`], [`DeclSecurity`], [`File`],
//! [`ExportedType`], [`Param`], [`GenericParam`]) are read once, when first resolved.
//!
//! # Context-sensitive rows
//!
//! [`MemberRef`], [`StandAloneSig`], [`TypeSpec`], [`MethodSpec`], [`GenericParamConstraint`]
//! and [`InterfaceImpl`] are built under a [`crate::metadata::context::GenericContext`] and
//! report through [`crate::metadata::object::ContainsGenericParameter`] whether they may be
//! cached.

mod attributes;
mod constant;
mod event;
mod field;
mod method;
mod property;
mod references;
mod resource;
mod specs;
mod typedef;

pub use attributes::*;
pub use constant::ConstantValue;
pub use event::{EventAccessors, EventInfo, EventProxy, EventRc};
pub use field::{FieldInfo, FieldProxy, FieldRc};
pub use method::{MethodInfo, MethodProxy, MethodRc};
pub use property::{PropertyAccessors, PropertyInfo, PropertyProxy, PropertyRc};
pub use references::*;
pub use resource::{ResourceInfo, ResourceProxy, ResourceRc};
pub use specs::*;
pub use typedef::{TypeDef, TypeDefInfo, TypeDefRc};

use tracing::debug;

use crate::{metadata::token::Token, Result};

/// Turns a failed facet query into an absent value.
pub(crate) fn absent_on_error<T: Default>(token: Token, facet: &'static str, result: Result<T>) -> T {
    result.unwrap_or_else(|err| {
        debug!(%token, facet, %err, "facet query failed, treating as absent");
        T::default()
    })
}
