//! The closed set of objects [`crate::metadata::module::ModuleView::resolve`] can produce.

use std::sync::Arc;

use crate::metadata::{
    members::{
        AssemblyRefRc, DeclSecurityRc, EventRc, ExportedTypeRc, FieldRc, FileRc,
        GenericParamConstraintRc, GenericParamRc, InterfaceImplRc, MemberRefRc, MethodRc,
        MethodSpecRc, ModuleRefRc, ParamRc, PropertyRc, ResourceRc, StandAloneSigRc, TypeDefRc,
        TypeRefRc, TypeSpecRc,
    },
    tableid::TableId,
    token::Token,
};

/// Query for open generic parameters.
///
/// A value that answers `true` must not be kept in a context cache: the same token resolved
/// under a different context would mean something else.
pub trait ContainsGenericParameter {
    /// `true` if the value still mentions a `!n` or `!!n` placeholder
    fn contains_generic_parameter(&self) -> bool;
}

/// A resolved metadata row.
#[derive(Debug, Clone)]
#[allow(missing_docs)]
pub enum MetadataObject {
    TypeRef(TypeRefRc),
    TypeDef(TypeDefRc),
    Field(FieldRc),
    Method(MethodRc),
    Param(ParamRc),
    InterfaceImpl(InterfaceImplRc),
    MemberRef(MemberRefRc),
    DeclSecurity(DeclSecurityRc),
    StandAloneSig(StandAloneSigRc),
    Event(EventRc),
    Property(PropertyRc),
    ModuleRef(ModuleRefRc),
    TypeSpec(TypeSpecRc),
    AssemblyRef(AssemblyRefRc),
    File(FileRc),
    ExportedType(ExportedTypeRc),
    Resource(ResourceRc),
    GenericParam(GenericParamRc),
    MethodSpec(MethodSpecRc),
    GenericParamConstraint(GenericParamConstraintRc),
}

impl MetadataObject {
    /// The live token of the row
    pub fn token(&self) -> Token {
        match self {
            MetadataObject::TypeRef(o) => o.token,
            MetadataObject::TypeDef(o) => o.token(),
            MetadataObject::Field(o) => o.token(),
            MetadataObject::Method(o) => o.token(),
            MetadataObject::Param(o) => o.token,
            MetadataObject::InterfaceImpl(o) => o.token,
            MetadataObject::MemberRef(o) => o.token,
            MetadataObject::DeclSecurity(o) => o.token,
            MetadataObject::StandAloneSig(o) => o.token,
            MetadataObject::Event(o) => o.token(),
            MetadataObject::Property(o) => o.token(),
            MetadataObject::ModuleRef(o) => o.token,
            MetadataObject::TypeSpec(o) => o.token,
            MetadataObject::AssemblyRef(o) => o.token,
            MetadataObject::File(o) => o.token,
            MetadataObject::ExportedType(o) => o.token,
            MetadataObject::Resource(o) => o.token(),
            MetadataObject::GenericParam(o) => o.token,
            MetadataObject::MethodSpec(o) => o.token,
            MetadataObject::GenericParamConstraint(o) => o.token,
        }
    }

    /// The table of the row
    pub fn table(&self) -> TableId {
        match self {
            MetadataObject::TypeRef(_) => TableId::TypeRef,
            MetadataObject::TypeDef(_) => TableId::TypeDef,
            MetadataObject::Field(_) => TableId::Field,
            MetadataObject::Method(_) => TableId::MethodDef,
            MetadataObject::Param(_) => TableId::Param,
            MetadataObject::InterfaceImpl(_) => TableId::InterfaceImpl,
            MetadataObject::MemberRef(_) => TableId::MemberRef,
            MetadataObject::DeclSecurity(_) => TableId::DeclSecurity,
            MetadataObject::StandAloneSig(_) => TableId::StandAloneSig,
            MetadataObject::Event(_) => TableId::Event,
            MetadataObject::Property(_) => TableId::Property,
            MetadataObject::ModuleRef(_) => TableId::ModuleRef,
            MetadataObject::TypeSpec(_) => TableId::TypeSpec,
            MetadataObject::AssemblyRef(_) => TableId::AssemblyRef,
            MetadataObject::File(_) => TableId::File,
            MetadataObject::ExportedType(_) => TableId::ExportedType,
            MetadataObject::Resource(_) => TableId::ManifestResource,
            MetadataObject::GenericParam(_) => TableId::GenericParam,
            MetadataObject::MethodSpec(_) => TableId::MethodSpec,
            MetadataObject::GenericParamConstraint(_) => TableId::GenericParamConstraint,
        }
    }

    /// `true` if both values are the very same instance
    pub fn ptr_eq(&self, other: &MetadataObject) -> bool {
        match (self, other) {
            (MetadataObject::TypeRef(a), MetadataObject::TypeRef(b)) => Arc::ptr_eq(a, b),
            (MetadataObject::TypeDef(a), MetadataObject::TypeDef(b)) => Arc::ptr_eq(a, b),
            (MetadataObject::Field(a), MetadataObject::Field(b)) => Arc::ptr_eq(a, b),
            (MetadataObject::Method(a), MetadataObject::Method(b)) => Arc::ptr_eq(a, b),
            (MetadataObject::Param(a), MetadataObject::Param(b)) => Arc::ptr_eq(a, b),
            (MetadataObject::InterfaceImpl(a), MetadataObject::InterfaceImpl(b)) => {
                Arc::ptr_eq(a, b)
            }
            (MetadataObject::MemberRef(a), MetadataObject::MemberRef(b)) => Arc::ptr_eq(a, b),
            (MetadataObject::DeclSecurity(a), MetadataObject::DeclSecurity(b)) => {
                Arc::ptr_eq(a, b)
            }
            (MetadataObject::StandAloneSig(a), MetadataObject::StandAloneSig(b)) => {
                Arc::ptr_eq(a, b)
            }
            (MetadataObject::Event(a), MetadataObject::Event(b)) => Arc::ptr_eq(a, b),
            (MetadataObject::Property(a), MetadataObject::Property(b)) => Arc::ptr_eq(a, b),
            (MetadataObject::ModuleRef(a), MetadataObject::ModuleRef(b)) => Arc::ptr_eq(a, b),
            (MetadataObject::TypeSpec(a), MetadataObject::TypeSpec(b)) => Arc::ptr_eq(a, b),
            (MetadataObject::AssemblyRef(a), MetadataObject::AssemblyRef(b)) => Arc::ptr_eq(a, b),
            (MetadataObject::File(a), MetadataObject::File(b)) => Arc::ptr_eq(a, b),
            (MetadataObject::ExportedType(a), MetadataObject::ExportedType(b)) => {
                Arc::ptr_eq(a, b)
            }
            (MetadataObject::Resource(a), MetadataObject::Resource(b)) => Arc::ptr_eq(a, b),
            (MetadataObject::GenericParam(a), MetadataObject::GenericParam(b)) => {
                Arc::ptr_eq(a, b)
            }
            (MetadataObject::MethodSpec(a), MetadataObject::MethodSpec(b)) => Arc::ptr_eq(a, b),
            (
                MetadataObject::GenericParamConstraint(a),
                MetadataObject::GenericParamConstraint(b),
            ) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl ContainsGenericParameter for MetadataObject {
    fn contains_generic_parameter(&self) -> bool {
        match self {
            MetadataObject::TypeSpec(o) => o.contains_generic_parameter(),
            MetadataObject::MemberRef(o) => o.contains_generic_parameter(),
            MetadataObject::MethodSpec(o) => o.contains_generic_parameter(),
            MetadataObject::StandAloneSig(o) => o.contains_generic_parameter(),
            MetadataObject::InterfaceImpl(o) => o.contains_generic_parameter(),
            MetadataObject::GenericParamConstraint(o) => o.contains_generic_parameter(),
            _ => false,
        }
    }
}
