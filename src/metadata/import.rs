//! The out-of-process metadata query interface.
//!
//! The live model never reads a PE file. Every row it knows about was handed out by the native
//! debugging transport through a [`MetadataImport`], one query at a time. The rows are delivered
//! in their raw shape: names already decoded, coded indexes already expanded to [`Token`]s, blobs
//! copied out of the target.
//!
//! Implementations must be cheap to query repeatedly and must report a row that has since
//! disappeared from the target (class unload, module unload) as invalid rather than stale.

use crate::{
    metadata::{tableid::TableId, token::Token},
    Result,
};

#[derive(Clone, Debug, PartialEq, Eq)]
/// A reference to a type defined in another module or assembly. `TableId` = 0x01
pub struct TypeRefRaw {
    /// Token
    pub token: Token,
    /// `Module`, `ModuleRef`, `AssemblyRef` or `TypeRef` the type lives in
    pub resolution_scope: Token,
    /// Simple name
    pub name: String,
    /// Namespace
    pub namespace: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
/// A type defined in this module. `TableId` = 0x02
pub struct TypeDefRaw {
    /// Token
    pub token: Token,
    /// a 4-byte bitmask of type `TypeAttributes`
    pub flags: u32,
    /// Simple name
    pub name: String,
    /// Namespace
    pub namespace: String,
    /// `TypeDefOrRef` of the base type, null for interfaces and `System.Object`
    pub extends: Token,
}

#[derive(Clone, Debug, PartialEq, Eq)]
/// A field. `TableId` = 0x04
pub struct FieldRaw {
    /// Token
    pub token: Token,
    /// a 2-byte bitmask of type `FieldAttributes`
    pub flags: u32,
    /// Name
    pub name: String,
    /// `FieldSig` blob
    pub signature: Vec<u8>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
/// A method. `TableId` = 0x06
pub struct MethodDefRaw {
    /// Token
    pub token: Token,
    /// Relative virtual address of the IL body, 0 for abstract, runtime or P/Invoke methods
    pub rva: u32,
    /// a 2-byte bitmask of type `MethodImplAttributes`
    pub impl_flags: u32,
    /// a 2-byte bitmask of type `MethodAttributes`
    pub flags: u32,
    /// Name
    pub name: String,
    /// `MethodDefSig` blob
    pub signature: Vec<u8>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
/// A parameter of a method. `TableId` = 0x08
pub struct ParamRaw {
    /// Token
    pub token: Token,
    /// a 2-byte bitmask of type `ParamAttributes`
    pub flags: u32,
    /// 0 for the return value, 1-based position otherwise
    pub sequence: u32,
    /// Name
    pub name: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
/// An interface implemented by a type. `TableId` = 0x09
pub struct InterfaceImplRaw {
    /// Token
    pub token: Token,
    /// The implementing `TypeDef`
    pub class: Token,
    /// `TypeDefOrRef` of the interface, a `TypeSpec` for generic interfaces
    pub interface: Token,
}

#[derive(Clone, Debug, PartialEq, Eq)]
/// A reference to a field or method of another type. `TableId` = 0x0A
pub struct MemberRefRaw {
    /// Token
    pub token: Token,
    /// `MemberRefParent`: `TypeDef`, `TypeRef`, `ModuleRef`, `MethodDef` or `TypeSpec`
    pub class: Token,
    /// Name
    pub name: String,
    /// `FieldSig` or `MethodRefSig` blob
    pub signature: Vec<u8>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
/// A declarative security attribute. `TableId` = 0x0E
pub struct DeclSecurityRaw {
    /// Token
    pub token: Token,
    /// `SecurityAction`
    pub action: u16,
    /// `HasDeclSecurity`: `TypeDef`, `MethodDef` or `Assembly`
    pub parent: Token,
    /// Permission set blob
    pub permission_set: Vec<u8>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
/// A stand-alone signature (locals, `calli` sites). `TableId` = 0x11
pub struct StandAloneSigRaw {
    /// Token
    pub token: Token,
    /// Signature blob
    pub signature: Vec<u8>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
/// An event. `TableId` = 0x14
pub struct EventRaw {
    /// Token
    pub token: Token,
    /// a 2-byte bitmask of type `EventAttributes`
    pub flags: u32,
    /// Name
    pub name: String,
    /// `TypeDefOrRef` of the delegate type
    pub event_type: Token,
}

#[derive(Clone, Debug, PartialEq, Eq)]
/// A property. `TableId` = 0x17
pub struct PropertyRaw {
    /// Token
    pub token: Token,
    /// a 2-byte bitmask of type `PropertyAttributes`
    pub flags: u32,
    /// Name
    pub name: String,
    /// `PropertySig` blob
    pub signature: Vec<u8>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
/// A reference to another module of the same assembly. `TableId` = 0x1A
pub struct ModuleRefRaw {
    /// Token
    pub token: Token,
    /// Module name
    pub name: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
/// A type specification. `TableId` = 0x1B
pub struct TypeSpecRaw {
    /// Token
    pub token: Token,
    /// `TypeSpec` signature blob
    pub signature: Vec<u8>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
/// A reference to another assembly. `TableId` = 0x23
pub struct AssemblyRefRaw {
    /// Token
    pub token: Token,
    /// Major version
    pub major_version: u16,
    /// Minor version
    pub minor_version: u16,
    /// Build number
    pub build_number: u16,
    /// Revision number
    pub revision_number: u16,
    /// a 4-byte bitmask of type `AssemblyFlags`
    pub flags: u32,
    /// Public key or token blob
    pub public_key_or_token: Vec<u8>,
    /// Simple name
    pub name: String,
    /// Culture, empty for neutral
    pub culture: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
/// A file of a multi-module assembly. `TableId` = 0x26
pub struct FileRaw {
    /// Token
    pub token: Token,
    /// a 4-byte bitmask of type `FileAttributes`
    pub flags: u32,
    /// File name
    pub name: String,
    /// Hash blob
    pub hash_value: Vec<u8>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
/// A type forwarded or exported from another module. `TableId` = 0x27
pub struct ExportedTypeRaw {
    /// Token
    pub token: Token,
    /// a 4-byte bitmask of type `TypeAttributes`
    pub flags: u32,
    /// Hint into the `TypeDef` table of the target module
    pub type_def_id: u32,
    /// Simple name
    pub name: String,
    /// Namespace
    pub namespace: String,
    /// `Implementation`: `File`, `AssemblyRef` or `ExportedType`
    pub implementation: Token,
}

#[derive(Clone, Debug, PartialEq, Eq)]
/// A manifest resource. `TableId` = 0x28
pub struct ManifestResourceRaw {
    /// Token
    pub token: Token,
    /// Offset into the resource section, if embedded
    pub offset: u32,
    /// a 4-byte bitmask of type `ManifestResourceAttributes`
    pub flags: u32,
    /// Name
    pub name: String,
    /// `Implementation`, null for resources embedded in this module
    pub implementation: Token,
}

#[derive(Clone, Debug, PartialEq, Eq)]
/// A generic parameter of a type or method. `TableId` = 0x2A
pub struct GenericParamRaw {
    /// Token
    pub token: Token,
    /// 0-based position
    pub number: u16,
    /// a 2-byte bitmask of type `GenericParamAttributes`
    pub flags: u32,
    /// `TypeOrMethodDef` owner
    pub owner: Token,
    /// Name
    pub name: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
/// An instantiation of a generic method. `TableId` = 0x2B
pub struct MethodSpecRaw {
    /// Token
    pub token: Token,
    /// `MethodDefOrRef` of the generic method
    pub method: Token,
    /// `MethodSpec` signature blob
    pub instantiation: Vec<u8>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
/// A constraint on a generic parameter. `TableId` = 0x2C
pub struct GenericParamConstraintRaw {
    /// Token
    pub token: Token,
    /// The constrained `GenericParam`
    pub owner: Token,
    /// `TypeDefOrRef` of the constraint
    pub constraint: Token,
}

/// One row as delivered by the target.
#[derive(Clone, Debug, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum RawRow {
    TypeRef(TypeRefRaw),
    TypeDef(TypeDefRaw),
    Field(FieldRaw),
    MethodDef(MethodDefRaw),
    Param(ParamRaw),
    InterfaceImpl(InterfaceImplRaw),
    MemberRef(MemberRefRaw),
    DeclSecurity(DeclSecurityRaw),
    StandAloneSig(StandAloneSigRaw),
    Event(EventRaw),
    Property(PropertyRaw),
    ModuleRef(ModuleRefRaw),
    TypeSpec(TypeSpecRaw),
    AssemblyRef(AssemblyRefRaw),
    File(FileRaw),
    ExportedType(ExportedTypeRaw),
    ManifestResource(ManifestResourceRaw),
    GenericParam(GenericParamRaw),
    MethodSpec(MethodSpecRaw),
    GenericParamConstraint(GenericParamConstraintRaw),
}

impl RawRow {
    /// The token of this row
    #[must_use]
    pub fn token(&self) -> Token {
        match self {
            RawRow::TypeRef(row) => row.token,
            RawRow::TypeDef(row) => row.token,
            RawRow::Field(row) => row.token,
            RawRow::MethodDef(row) => row.token,
            RawRow::Param(row) => row.token,
            RawRow::InterfaceImpl(row) => row.token,
            RawRow::MemberRef(row) => row.token,
            RawRow::DeclSecurity(row) => row.token,
            RawRow::StandAloneSig(row) => row.token,
            RawRow::Event(row) => row.token,
            RawRow::Property(row) => row.token,
            RawRow::ModuleRef(row) => row.token,
            RawRow::TypeSpec(row) => row.token,
            RawRow::AssemblyRef(row) => row.token,
            RawRow::File(row) => row.token,
            RawRow::ExportedType(row) => row.token,
            RawRow::ManifestResource(row) => row.token,
            RawRow::GenericParam(row) => row.token,
            RawRow::MethodSpec(row) => row.token,
            RawRow::GenericParamConstraint(row) => row.token,
        }
    }

    /// The table this row belongs to
    #[must_use]
    pub fn table(&self) -> TableId {
        match self {
            RawRow::TypeRef(_) => TableId::TypeRef,
            RawRow::TypeDef(_) => TableId::TypeDef,
            RawRow::Field(_) => TableId::Field,
            RawRow::MethodDef(_) => TableId::MethodDef,
            RawRow::Param(_) => TableId::Param,
            RawRow::InterfaceImpl(_) => TableId::InterfaceImpl,
            RawRow::MemberRef(_) => TableId::MemberRef,
            RawRow::DeclSecurity(_) => TableId::DeclSecurity,
            RawRow::StandAloneSig(_) => TableId::StandAloneSig,
            RawRow::Event(_) => TableId::Event,
            RawRow::Property(_) => TableId::Property,
            RawRow::ModuleRef(_) => TableId::ModuleRef,
            RawRow::TypeSpec(_) => TableId::TypeSpec,
            RawRow::AssemblyRef(_) => TableId::AssemblyRef,
            RawRow::File(_) => TableId::File,
            RawRow::ExportedType(_) => TableId::ExportedType,
            RawRow::ManifestResource(_) => TableId::ManifestResource,
            RawRow::GenericParam(_) => TableId::GenericParam,
            RawRow::MethodSpec(_) => TableId::MethodSpec,
            RawRow::GenericParamConstraint(_) => TableId::GenericParamConstraint,
        }
    }
}

/// The default value of a field, parameter or property (II.22.9)
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConstantRaw {
    /// `ELEMENT_TYPE` of the value
    pub element_type: u8,
    /// Little-endian value bytes
    pub value: Vec<u8>,
}

/// A custom attribute attached to a row (II.22.10)
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CustomAttributeRaw {
    /// Token of the `CustomAttribute` row
    pub token: Token,
    /// `MethodDef` or `MemberRef` of the attribute constructor
    pub constructor: Token,
    /// Value blob
    pub value: Vec<u8>,
}

/// One accessor of a property or event (II.22.28)
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MethodSemanticsRaw {
    /// a 2-byte bitmask of type `MethodSemanticsAttributes`
    pub semantics: u32,
    /// The accessor `MethodDef`
    pub method: Token,
}

/// Read access to the metadata of one module instance inside the target process.
///
/// Every method may fail with [`crate::Error::TargetDisconnected`] or
/// [`crate::Error::Transport`]; callers in the live model treat such failures as absence.
pub trait MetadataImport: Send + Sync {
    /// `true` if `token` names a row that currently exists in the target.
    fn is_valid_token(&self, token: Token) -> bool;

    /// Number of rows the target reports for `table`.
    ///
    /// # Errors
    /// Transport failures.
    fn row_count(&self, table: TableId) -> Result<u32>;

    /// Read one row.
    ///
    /// # Errors
    /// [`crate::Error::InvalidToken`] if the row does not exist, transport failures otherwise.
    fn row(&self, token: Token) -> Result<RawRow>;

    /// Rows of `table` owned by `owner`, in table order.
    ///
    /// Supported pairs: members of a `TypeDef` (`Field`, `MethodDef`, `Property`, `Event`,
    /// `InterfaceImpl`, `GenericParam`, `DeclSecurity`), `Param`/`GenericParam`/`DeclSecurity`
    /// of a `MethodDef`, and `GenericParamConstraint` of a `GenericParam`.
    ///
    /// # Errors
    /// Transport failures.
    fn children(&self, owner: Token, table: TableId) -> Result<Vec<Token>>;

    /// The `TypeDef` declaring a `Field`, `MethodDef`, `Property` or `Event`.
    ///
    /// # Errors
    /// Transport failures.
    fn parent_of(&self, member: Token) -> Result<Option<Token>>;

    /// The enclosing `TypeDef` of a nested type.
    ///
    /// # Errors
    /// Transport failures.
    fn enclosing_class(&self, type_def: Token) -> Result<Option<Token>>;

    /// The default value of a field, parameter or property.
    ///
    /// # Errors
    /// Transport failures.
    fn constant(&self, owner: Token) -> Result<Option<ConstantRaw>>;

    /// The native marshalling descriptor of a field or parameter.
    ///
    /// # Errors
    /// Transport failures.
    fn field_marshal(&self, owner: Token) -> Result<Option<Vec<u8>>>;

    /// The RVA of a field's initial value.
    ///
    /// # Errors
    /// Transport failures.
    fn field_rva(&self, field: Token) -> Result<Option<u32>>;

    /// Custom attributes attached to `owner`.
    ///
    /// # Errors
    /// Transport failures.
    fn custom_attributes(&self, owner: Token) -> Result<Vec<CustomAttributeRaw>>;

    /// Accessors of a property or event.
    ///
    /// # Errors
    /// Transport failures.
    fn method_semantics(&self, owner: Token) -> Result<Vec<MethodSemanticsRaw>>;

    /// The IL body bytes (header included) of a method.
    ///
    /// # Errors
    /// Transport failures.
    fn method_body(&self, method: Token) -> Result<Option<Vec<u8>>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_row_identity() {
        let row = RawRow::TypeSpec(TypeSpecRaw {
            token: Token::new(0x1B00_0002),
            signature: vec![0x08],
        });
        assert_eq!(row.token(), Token::new(0x1B00_0002));
        assert_eq!(row.table(), TableId::TypeSpec);
        assert_eq!(row.table().token_base(), row.token().value() & 0xFF00_0000);
    }
}
