use strum::{EnumCount, EnumIter, FromRepr};

/// Identifiers for the metadata tables defined in ECMA-335 Partition II, Section 22.
///
/// The numeric values are the table ids carried in the high byte of a [`crate::metadata::token::Token`].
///
/// The live model splits the tables into three groups:
///
/// - **Member tables** (`TypeDef`, `Field`, `MethodDef`, `Property`, `Event`): rows are lazy
///   proxies created when their owner enumerates them.
/// - **Simple tables** (`TypeRef`, `ModuleRef`, `AssemblyRef`, `DeclSecurity`, `File`,
///   `ExportedType`, `ManifestResource`, `Param`, `GenericParam`): one unconditional rid cache.
/// - **Context-sensitive tables** (`MemberRef`, `StandAloneSig`, `TypeSpec`, `MethodSpec`,
///   `GenericParamConstraint`, `InterfaceImpl`): rows may mention open generic parameters and are
///   cached per generic context, see [`TableId::is_context_sensitive`].
#[derive(Clone, Copy, PartialEq, Debug, EnumIter, EnumCount, FromRepr, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum TableId {
    /// `Module` table (0x00)
    Module = 0x00,
    /// `TypeRef` table (0x01) - references to types defined elsewhere
    TypeRef = 0x01,
    /// `TypeDef` table (0x02) - types defined in this module
    TypeDef = 0x02,
    /// `FieldPtr` table (0x03) - indirection table for unoptimized metadata
    FieldPtr = 0x03,
    /// `Field` table (0x04)
    Field = 0x04,
    /// `MethodPtr` table (0x05) - indirection table for unoptimized metadata
    MethodPtr = 0x05,
    /// `MethodDef` table (0x06)
    MethodDef = 0x06,
    /// `ParamPtr` table (0x07) - indirection table for unoptimized metadata
    ParamPtr = 0x07,
    /// `Param` table (0x08)
    Param = 0x08,
    /// `InterfaceImpl` table (0x09)
    InterfaceImpl = 0x09,
    /// `MemberRef` table (0x0A)
    MemberRef = 0x0A,
    /// `Constant` table (0x0B)
    Constant = 0x0B,
    /// `CustomAttribute` table (0x0C)
    CustomAttribute = 0x0C,
    /// `FieldMarshal` table (0x0D)
    FieldMarshal = 0x0D,
    /// `DeclSecurity` table (0x0E)
    DeclSecurity = 0x0E,
    /// `ClassLayout` table (0x0F)
    ClassLayout = 0x0F,
    /// `FieldLayout` table (0x10)
    FieldLayout = 0x10,
    /// `StandAloneSig` table (0x11)
    StandAloneSig = 0x11,
    /// `EventMap` table (0x12)
    EventMap = 0x12,
    /// `EventPtr` table (0x13)
    EventPtr = 0x13,
    /// `Event` table (0x14)
    Event = 0x14,
    /// `PropertyMap` table (0x15)
    PropertyMap = 0x15,
    /// `PropertyPtr` table (0x16)
    PropertyPtr = 0x16,
    /// `Property` table (0x17)
    Property = 0x17,
    /// `MethodSemantics` table (0x18)
    MethodSemantics = 0x18,
    /// `MethodImpl` table (0x19)
    MethodImpl = 0x19,
    /// `ModuleRef` table (0x1A)
    ModuleRef = 0x1A,
    /// `TypeSpec` table (0x1B)
    TypeSpec = 0x1B,
    /// `ImplMap` table (0x1C)
    ImplMap = 0x1C,
    /// `FieldRVA` table (0x1D)
    FieldRVA = 0x1D,
    /// `EncLog` table (0x1E)
    EncLog = 0x1E,
    /// `EncMap` table (0x1F)
    EncMap = 0x1F,
    /// `Assembly` table (0x20)
    Assembly = 0x20,
    /// `AssemblyProcessor` table (0x21)
    AssemblyProcessor = 0x21,
    /// `AssemblyOS` table (0x22)
    AssemblyOS = 0x22,
    /// `AssemblyRef` table (0x23)
    AssemblyRef = 0x23,
    /// `AssemblyRefProcessor` table (0x24)
    AssemblyRefProcessor = 0x24,
    /// `AssemblyRefOS` table (0x25)
    AssemblyRefOS = 0x25,
    /// `File` table (0x26)
    File = 0x26,
    /// `ExportedType` table (0x27)
    ExportedType = 0x27,
    /// `ManifestResource` table (0x28)
    ManifestResource = 0x28,
    /// `NestedClass` table (0x29)
    NestedClass = 0x29,
    /// `GenericParam` table (0x2A)
    GenericParam = 0x2A,
    /// `MethodSpec` table (0x2B)
    MethodSpec = 0x2B,
    /// `GenericParamConstraint` table (0x2C)
    GenericParamConstraint = 0x2C,
}

impl TableId {
    /// Returns the table for the high byte of a token, if it names a known table.
    #[must_use]
    pub fn from_token_byte(value: u8) -> Option<TableId> {
        TableId::from_repr(value)
    }

    /// The value of the high byte of tokens pointing into this table.
    #[must_use]
    pub fn token_base(self) -> u32 {
        (self as u32) << 24
    }

    /// Rows of these tables can reference open generic parameters and are cached per
    /// generic context instead of unconditionally.
    #[must_use]
    pub fn is_context_sensitive(self) -> bool {
        matches!(
            self,
            TableId::MemberRef
                | TableId::StandAloneSig
                | TableId::TypeSpec
                | TableId::MethodSpec
                | TableId::GenericParamConstraint
                | TableId::InterfaceImpl
        )
    }

    /// Rows of these tables are owned by a type and created when the type enumerates them.
    #[must_use]
    pub fn is_member(self) -> bool {
        matches!(
            self,
            TableId::Field | TableId::MethodDef | TableId::Property | TableId::Event
        )
    }
}
