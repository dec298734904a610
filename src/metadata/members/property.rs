use std::sync::{Arc, OnceLock, RwLock, Weak};

use crate::{
    metadata::{
        import::{CustomAttributeRaw, MetadataImport},
        lazy::LazyInit,
        members::{
            absent_on_error, ConstantValue, MethodRc, MethodSemanticsAttributes,
            PropertyAttributes, TypeDef, TypeDefRc,
        },
        module::ModuleView,
        signatures::{parse_property_signature, SignatureProperty},
        token::Token,
    },
    Result,
};

/// A reference to a `PropertyProxy`
pub type PropertyRc = Arc<PropertyProxy>;

/// The row data of a property, valid once the proxy is initialised
#[derive(Debug, Clone)]
pub struct PropertyInfo {
    /// Flags of the property
    pub flags: PropertyAttributes,
    /// Name of the property
    pub name: String,
    /// `PropertySig` blob
    pub signature: Vec<u8>,
}

/// The accessor methods of a property
#[derive(Debug, Clone, Default)]
pub struct PropertyAccessors {
    /// `get_` accessor
    pub getter: Option<MethodRc>,
    /// `set_` accessor
    pub setter: Option<MethodRc>,
    /// Any other associated methods
    pub other: Vec<MethodRc>,
}

#[derive(Default)]
struct PropertyFacets {
    signature: OnceLock<Option<SignatureProperty>>,
    constant: OnceLock<Option<ConstantValue>>,
    accessors: OnceLock<PropertyAccessors>,
    custom_attributes: OnceLock<Vec<CustomAttributeRaw>>,
}

/// Lazy proxy for a `Property` row.
pub struct PropertyProxy {
    module: Weak<ModuleView>,
    import: Arc<dyn MetadataImport>,
    owner: Weak<TypeDef>,
    token: Token,
    original_token: Token,
    init: LazyInit,
    info: RwLock<PropertyInfo>,
    facets: RwLock<Arc<PropertyFacets>>,
}

impl PropertyProxy {
    pub(crate) fn new(
        module: Weak<ModuleView>,
        import: Arc<dyn MetadataImport>,
        owner: Weak<TypeDef>,
        token: Token,
    ) -> Self {
        PropertyProxy {
            module,
            import,
            owner,
            token,
            original_token: token,
            init: LazyInit::new(),
            info: RwLock::new(PropertyInfo {
                flags: PropertyAttributes::empty(),
                name: String::new(),
                signature: Vec::new(),
            }),
            facets: RwLock::new(Arc::default()),
        }
    }

    /// The live token of this property
    pub fn token(&self) -> Token {
        self.token
    }

    /// The token this property had when it was first seen
    pub fn original_token(&self) -> Token {
        self.original_token
    }

    /// The declaring type, unless it has been unloaded
    pub fn owner(&self) -> Option<TypeDefRc> {
        self.owner.upgrade()
    }

    /// `true` once the row has been read
    pub fn is_initialized(&self) -> bool {
        self.init.is_ready()
    }

    /// Read the row if that has not happened yet.
    ///
    /// # Errors
    /// [`crate::Error::Reentrancy`] when called from inside its own initialisation, transport
    /// errors if the row could not be read.
    pub fn ensure_initialized(&self) -> Result<bool> {
        self.init.ensure(self.token, || {
            if self.owner.upgrade().is_none() {
                return Err(crate::Error::InvalidToken(self.token));
            }

            let raw = expect_row!(self.import.row(self.original_token)?, Property, self.token);
            *write_lock!(self.info) = PropertyInfo {
                flags: PropertyAttributes::from_bits_truncate(raw.flags),
                name: raw.name,
                signature: raw.signature,
            };
            *write_lock!(self.facets) = Arc::default();
            Ok(())
        })
    }

    /// Require the next access to read the row again
    pub fn invalidate(&self) {
        self.init.invalidate();
    }

    /// Name of the property
    pub fn name(&self) -> String {
        let _ = self.ensure_initialized();
        read_lock!(self.info).name.clone()
    }

    /// Flags of the property
    pub fn flags(&self) -> PropertyAttributes {
        let _ = self.ensure_initialized();
        read_lock!(self.info).flags
    }

    fn facets(&self) -> Arc<PropertyFacets> {
        let _ = self.ensure_initialized();
        read_lock!(self.facets).clone()
    }

    /// The parsed property signature
    pub fn signature(&self) -> Option<SignatureProperty> {
        let facets = self.facets();
        facets
            .signature
            .get_or_init(|| {
                let blob = read_lock!(self.info).signature.clone();
                absent_on_error(
                    self.token,
                    "signature",
                    parse_property_signature(&blob).map(Some),
                )
            })
            .clone()
    }

    /// The default value of the property
    pub fn constant(&self) -> Option<ConstantValue> {
        let facets = self.facets();
        facets
            .constant
            .get_or_init(|| {
                absent_on_error(
                    self.token,
                    "constant",
                    self.import.constant(self.original_token),
                )
                .and_then(|raw| {
                    absent_on_error(self.token, "constant", ConstantValue::decode(&raw).map(Some))
                })
            })
            .clone()
    }

    /// Getter, setter and other accessors
    pub fn accessors(&self) -> PropertyAccessors {
        let facets = self.facets();
        facets
            .accessors
            .get_or_init(|| {
                let mut accessors = PropertyAccessors::default();
                let Some(module) = self.module.upgrade() else {
                    return accessors;
                };

                let semantics = absent_on_error(
                    self.token,
                    "accessors",
                    self.import.method_semantics(self.original_token),
                );
                for entry in semantics {
                    let Some(method) = module.resolve_method(entry.method.row()) else {
                        continue;
                    };

                    let role = MethodSemanticsAttributes::from_bits_truncate(entry.semantics);
                    if role.contains(MethodSemanticsAttributes::GETTER) {
                        accessors.getter = Some(method);
                    } else if role.contains(MethodSemanticsAttributes::SETTER) {
                        accessors.setter = Some(method);
                    } else {
                        accessors.other.push(method);
                    }
                }
                accessors
            })
            .clone()
    }

    /// Custom attributes attached to the property
    pub fn custom_attributes(&self) -> Vec<CustomAttributeRaw> {
        let facets = self.facets();
        facets
            .custom_attributes
            .get_or_init(|| {
                absent_on_error(
                    self.token,
                    "custom attributes",
                    self.import.custom_attributes(self.original_token),
                )
            })
            .clone()
    }
}

impl std::fmt::Debug for PropertyProxy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PropertyProxy")
            .field("token", &self.token)
            .field("initialized", &self.is_initialized())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use crate::{
        metadata::{
            import::ConstantRaw,
            members::{ConstantValue, MethodSemanticsAttributes},
            signatures::TypeSignature,
        },
        test::{static_module, MetadataBuilder},
    };

    #[test]
    fn test_signature() {
        let builder = MetadataBuilder::new();
        let program = builder.type_def(1, "App", "Program");
        builder.property(program, 1, "Count");
        let view = static_module(&builder);

        let count = view.resolve_property(1).unwrap();
        assert!(!count.is_initialized());
        assert_eq!(count.name(), "Count");

        let signature = count.signature().unwrap();
        assert!(signature.has_this);
        assert_eq!(signature.base, TypeSignature::I4);
        assert!(signature.params.is_empty());
    }

    #[test]
    fn test_accessors() {
        let builder = MetadataBuilder::new();
        let program = builder.type_def(1, "App", "Program");
        let getter = builder.method(program, 1, "get_Count");
        let setter = builder.method(program, 2, "set_Count");
        let reset = builder.method(program, 3, "reset_Count");
        let count = builder.property(program, 1, "Count");
        builder.accessor(count, getter, MethodSemanticsAttributes::GETTER.bits());
        builder.accessor(count, setter, MethodSemanticsAttributes::SETTER.bits());
        builder.accessor(count, reset, MethodSemanticsAttributes::OTHER.bits());
        let view = static_module(&builder);

        let accessors = view.resolve_property(1).unwrap().accessors();
        assert!(Arc::ptr_eq(
            accessors.getter.as_ref().unwrap(),
            &view.resolve_method(1).unwrap()
        ));
        assert_eq!(accessors.setter.unwrap().name(), "set_Count");
        assert_eq!(accessors.other.len(), 1);
        assert_eq!(accessors.other[0].name(), "reset_Count");
    }

    #[test]
    fn test_string_constant() {
        let builder = MetadataBuilder::new();
        let program = builder.type_def(1, "App", "Program");
        let greeting = builder.property(program, 1, "Greeting");
        let value = "hi".encode_utf16().flat_map(u16::to_le_bytes).collect();
        builder.import().set_constant(
            greeting,
            ConstantRaw {
                element_type: 0x0E,
                value,
            },
        );
        let view = static_module(&builder);

        let property = view.resolve_property(1).unwrap();
        assert_eq!(property.constant(), Some(ConstantValue::String("hi".to_string())));
        assert!(property.custom_attributes().is_empty());
    }

    #[test]
    fn test_owner_lists_the_property() {
        let builder = MetadataBuilder::new();
        let program = builder.type_def(1, "App", "Program");
        builder.property(program, 1, "Count");
        let view = static_module(&builder);

        let owner = view.resolve_type_def(1).unwrap();
        let properties = owner.properties();
        assert_eq!(properties.len(), 1);
        assert!(Arc::ptr_eq(&properties[0], &view.resolve_property(1).unwrap()));
        assert!(Arc::ptr_eq(&properties[0].owner().unwrap(), &owner));
    }
}
