use std::{fmt::Write, sync::Arc};

use crate::metadata::{
    import::{
        AssemblyRefRaw, DeclSecurityRaw, ExportedTypeRaw, FileRaw, GenericParamRaw,
        MetadataImport, ModuleRefRaw, ParamRaw, TypeRefRaw,
    },
    members::{absent_on_error, ConstantValue, GenericParamAttributes, ParamAttributes, TypeAttributes},
    tableid::TableId,
    token::Token,
};

/// A reference to a `TypeRef`
pub type TypeRefRc = Arc<TypeRef>;
/// A reference to a `ModuleRef`
pub type ModuleRefRc = Arc<ModuleRef>;
/// A reference to an `AssemblyRef`
pub type AssemblyRefRc = Arc<AssemblyRef>;
/// A reference to a `DeclSecurity`
pub type DeclSecurityRc = Arc<DeclSecurity>;
/// A reference to a `File`
pub type FileRc = Arc<File>;
/// A reference to an `ExportedType`
pub type ExportedTypeRc = Arc<ExportedType>;
/// A reference to a `Param`
pub type ParamRc = Arc<Param>;
/// A reference to a `GenericParam`
pub type GenericParamRc = Arc<GenericParam>;

fn join_name(namespace: &str, name: &str) -> String {
    if namespace.is_empty() {
        name.to_string()
    } else {
        format!("{namespace}.{name}")
    }
}

/// A type defined in another module or assembly
#[derive(Debug, Clone)]
pub struct TypeRef {
    /// Token
    pub token: Token,
    /// Where the type lives
    pub resolution_scope: Token,
    /// Simple name
    pub name: String,
    /// Namespace
    pub namespace: String,
}

impl TypeRef {
    /// `Namespace.Name`
    pub fn full_name(&self) -> String {
        join_name(&self.namespace, &self.name)
    }
}

impl From<TypeRefRaw> for TypeRef {
    fn from(raw: TypeRefRaw) -> Self {
        TypeRef {
            token: raw.token,
            resolution_scope: raw.resolution_scope,
            name: raw.name,
            namespace: raw.namespace,
        }
    }
}

/// Another module of the same assembly
#[derive(Debug, Clone)]
pub struct ModuleRef {
    /// Token
    pub token: Token,
    /// Module name
    pub name: String,
}

impl From<ModuleRefRaw> for ModuleRef {
    fn from(raw: ModuleRefRaw) -> Self {
        ModuleRef {
            token: raw.token,
            name: raw.name,
        }
    }
}

/// Four part assembly version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AssemblyVersion {
    /// Major version
    pub major: u16,
    /// Minor version
    pub minor: u16,
    /// Build number
    pub build: u16,
    /// Revision number
    pub revision: u16,
}

impl std::fmt::Display for AssemblyVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}.{}.{}.{}",
            self.major, self.minor, self.build, self.revision
        )
    }
}

/// A referenced assembly
#[derive(Debug, Clone)]
pub struct AssemblyRef {
    /// Token
    pub token: Token,
    /// Version
    pub version: AssemblyVersion,
    /// `AssemblyFlags`
    pub flags: u32,
    /// Public key or its token
    pub public_key_or_token: Vec<u8>,
    /// Simple name
    pub name: String,
    /// Culture, empty for neutral
    pub culture: String,
}

impl AssemblyRef {
    /// The display name, e.g. `mscorlib, Version=4.0.0.0, Culture=neutral, PublicKeyToken=b77a5c561934e089`
    pub fn full_name(&self) -> String {
        let culture = if self.culture.is_empty() {
            "neutral"
        } else {
            self.culture.as_str()
        };

        let mut name = format!("{}, Version={}, Culture={culture}", self.name, self.version);
        if self.public_key_or_token.is_empty() {
            name.push_str(", PublicKeyToken=null");
        } else {
            name.push_str(", PublicKeyToken=");
            for byte in &self.public_key_or_token {
                let _ = write!(name, "{byte:02x}");
            }
        }
        name
    }
}

impl From<AssemblyRefRaw> for AssemblyRef {
    fn from(raw: AssemblyRefRaw) -> Self {
        AssemblyRef {
            token: raw.token,
            version: AssemblyVersion {
                major: raw.major_version,
                minor: raw.minor_version,
                build: raw.build_number,
                revision: raw.revision_number,
            },
            flags: raw.flags,
            public_key_or_token: raw.public_key_or_token,
            name: raw.name,
            culture: raw.culture,
        }
    }
}

/// Declarative security on a type, method or assembly
#[derive(Debug, Clone)]
pub struct DeclSecurity {
    /// Token
    pub token: Token,
    /// `SecurityAction`
    pub action: u16,
    /// The protected row
    pub parent: Token,
    /// Permission set blob
    pub permission_set: Vec<u8>,
}

impl From<DeclSecurityRaw> for DeclSecurity {
    fn from(raw: DeclSecurityRaw) -> Self {
        DeclSecurity {
            token: raw.token,
            action: raw.action,
            parent: raw.parent,
            permission_set: raw.permission_set,
        }
    }
}

/// A file of a multi-module assembly
#[derive(Debug, Clone)]
pub struct File {
    /// Token
    pub token: Token,
    /// `FileAttributes`
    pub flags: u32,
    /// File name
    pub name: String,
    /// Hash blob
    pub hash_value: Vec<u8>,
}

impl File {
    /// `false` for resource-only files
    pub fn contains_metadata(&self) -> bool {
        self.flags & 0x0001 == 0
    }
}

impl From<FileRaw> for File {
    fn from(raw: FileRaw) -> Self {
        File {
            token: raw.token,
            flags: raw.flags,
            name: raw.name,
            hash_value: raw.hash_value,
        }
    }
}

/// A type exported or forwarded by this assembly
#[derive(Debug, Clone)]
pub struct ExportedType {
    /// Token
    pub token: Token,
    /// Flags of the exported type
    pub flags: TypeAttributes,
    /// `TypeDef` hint in the implementing module
    pub type_def_id: u32,
    /// Simple name
    pub name: String,
    /// Namespace
    pub namespace: String,
    /// `File`, `AssemblyRef` or enclosing `ExportedType`
    pub implementation: Token,
}

impl ExportedType {
    /// `Namespace.Name`
    pub fn full_name(&self) -> String {
        join_name(&self.namespace, &self.name)
    }

    /// `true` for type forwarders
    pub fn is_forwarder(&self) -> bool {
        self.implementation.is_row_of(TableId::AssemblyRef)
    }
}

impl From<ExportedTypeRaw> for ExportedType {
    fn from(raw: ExportedTypeRaw) -> Self {
        ExportedType {
            token: raw.token,
            flags: TypeAttributes::from_bits_truncate(raw.flags),
            type_def_id: raw.type_def_id,
            name: raw.name,
            namespace: raw.namespace,
            implementation: raw.implementation,
        }
    }
}

/// A parameter of a method
#[derive(Debug, Clone)]
pub struct Param {
    /// Token
    pub token: Token,
    /// Flags of the parameter
    pub flags: ParamAttributes,
    /// 0 for the return value, 1-based position otherwise
    pub sequence: u32,
    /// Name
    pub name: String,
    /// Default value, for optional parameters
    pub constant: Option<ConstantValue>,
}

impl Param {
    /// Build from the raw row, reading the default value if the flags announce one
    pub(crate) fn read(raw: ParamRaw, import: &dyn MetadataImport) -> Self {
        let flags = ParamAttributes::from_bits_truncate(raw.flags);
        let constant = if flags.contains(ParamAttributes::HAS_DEFAULT) {
            absent_on_error(raw.token, "constant", import.constant(raw.token)).and_then(|c| {
                absent_on_error(raw.token, "constant", ConstantValue::decode(&c).map(Some))
            })
        } else {
            None
        };

        Param {
            token: raw.token,
            flags,
            sequence: raw.sequence,
            name: raw.name,
            constant,
        }
    }
}

/// A generic parameter of a type or method
#[derive(Debug, Clone)]
pub struct GenericParam {
    /// Token
    pub token: Token,
    /// 0-based position
    pub number: u16,
    /// Variance and special constraints
    pub flags: GenericParamAttributes,
    /// Declaring `TypeDef` or `MethodDef`
    pub owner: Token,
    /// Name
    pub name: String,
    /// Tokens of the `GenericParamConstraint` rows of this parameter
    pub constraints: Vec<Token>,
}

impl GenericParam {
    /// Build from the raw row, enumerating the constraint rows
    pub(crate) fn read(raw: GenericParamRaw, import: &dyn MetadataImport) -> Self {
        let constraints = absent_on_error(
            raw.token,
            "constraints",
            import.children(raw.token, TableId::GenericParamConstraint),
        );

        GenericParam {
            token: raw.token,
            number: raw.number,
            flags: GenericParamAttributes::from_bits_truncate(raw.flags),
            owner: raw.owner,
            name: raw.name,
            constraints,
        }
    }

    /// `true` for parameters declared by a method (`!!n`)
    pub fn is_method_parameter(&self) -> bool {
        self.owner.is_row_of(TableId::MethodDef)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assembly_ref_full_name() {
        let reference = AssemblyRef::from(AssemblyRefRaw {
            token: Token::new(0x2300_0001),
            major_version: 4,
            minor_version: 0,
            build_number: 0,
            revision_number: 0,
            flags: 0,
            public_key_or_token: vec![0xb7, 0x7a, 0x5c, 0x56, 0x19, 0x34, 0xe0, 0x89],
            name: "mscorlib".to_string(),
            culture: String::new(),
        });
        assert_eq!(
            reference.full_name(),
            "mscorlib, Version=4.0.0.0, Culture=neutral, PublicKeyToken=b77a5c561934e089"
        );
    }

    #[test]
    fn exported_type_forwarder() {
        let exported = ExportedType::from(ExportedTypeRaw {
            token: Token::new(0x2700_0001),
            flags: 0x0020_0000,
            type_def_id: 0,
            name: "List`1".to_string(),
            namespace: "System.Collections.Generic".to_string(),
            implementation: Token::new(0x2300_0002),
        });
        assert!(exported.is_forwarder());
        assert_eq!(exported.full_name(), "System.Collections.Generic.List`1");
    }
}
