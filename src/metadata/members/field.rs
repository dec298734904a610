use std::sync::{Arc, OnceLock, RwLock, Weak};

use crate::{
    metadata::{
        import::{CustomAttributeRaw, MetadataImport},
        lazy::LazyInit,
        members::{absent_on_error, ConstantValue, FieldAttributes, TypeDef, TypeDefRc},
        module::ModuleView,
        signatures::{parse_field_signature, SignatureField},
        token::Token,
    },
    Result,
};

/// A reference to a `FieldProxy`
pub type FieldRc = Arc<FieldProxy>;

/// The row data of a field, valid once the proxy is initialised
#[derive(Debug, Clone)]
pub struct FieldInfo {
    /// Flags of the field
    pub flags: FieldAttributes,
    /// Name of the field
    pub name: String,
    /// `FieldSig` blob
    pub signature: Vec<u8>,
}

#[derive(Default)]
struct FieldFacets {
    signature: OnceLock<Option<SignatureField>>,
    constant: OnceLock<Option<ConstantValue>>,
    marshal: OnceLock<Option<Vec<u8>>>,
    rva: OnceLock<Option<u32>>,
    custom_attributes: OnceLock<Vec<CustomAttributeRaw>>,
}

/// Lazy proxy for a `Field` row.
pub struct FieldProxy {
    module: Weak<ModuleView>,
    import: Arc<dyn MetadataImport>,
    owner: Weak<TypeDef>,
    token: Token,
    original_token: Token,
    init: LazyInit,
    info: RwLock<FieldInfo>,
    facets: RwLock<Arc<FieldFacets>>,
}

impl FieldProxy {
    pub(crate) fn new(
        module: Weak<ModuleView>,
        import: Arc<dyn MetadataImport>,
        owner: Weak<TypeDef>,
        token: Token,
    ) -> Self {
        FieldProxy {
            module,
            import,
            owner,
            token,
            original_token: token,
            init: LazyInit::new(),
            info: RwLock::new(FieldInfo {
                flags: FieldAttributes::empty(),
                name: String::new(),
                signature: Vec::new(),
            }),
            facets: RwLock::new(Arc::default()),
        }
    }

    /// The live token of this field
    pub fn token(&self) -> Token {
        self.token
    }

    /// The token this field had when it was first seen
    pub fn original_token(&self) -> Token {
        self.original_token
    }

    /// The row id of this field
    pub fn rid(&self) -> u32 {
        self.token.row()
    }

    /// The declaring type, unless it has been unloaded
    pub fn owner(&self) -> Option<TypeDefRc> {
        self.owner.upgrade()
    }

    /// The module this field lives in, unless it has been unloaded
    pub fn module(&self) -> Option<Arc<ModuleView>> {
        self.module.upgrade()
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

            let raw = expect_row!(self.import.row(self.original_token)?, Field, self.token);
            *write_lock!(self.info) = FieldInfo {
                flags: FieldAttributes::from_bits_truncate(raw.flags),
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

    /// Snapshot of the row data
    pub fn info(&self) -> FieldInfo {
        let _ = self.ensure_initialized();
        read_lock!(self.info).clone()
    }

    /// Name of the field
    pub fn name(&self) -> String {
        let _ = self.ensure_initialized();
        read_lock!(self.info).name.clone()
    }

    /// Flags of the field
    pub fn flags(&self) -> FieldAttributes {
        let _ = self.ensure_initialized();
        read_lock!(self.info).flags
    }

    fn facets(&self) -> Arc<FieldFacets> {
        let _ = self.ensure_initialized();
        read_lock!(self.facets).clone()
    }

    /// The parsed field signature
    pub fn signature(&self) -> Option<SignatureField> {
        let facets = self.facets();
        facets
            .signature
            .get_or_init(|| {
                let blob = read_lock!(self.info).signature.clone();
                absent_on_error(self.token, "signature", parse_field_signature(&blob).map(Some))
            })
            .clone()
    }

    /// The default value, for literal fields
    pub fn constant(&self) -> Option<ConstantValue> {
        let facets = self.facets();
        facets
            .constant
            .get_or_init(|| {
                let raw = absent_on_error(
                    self.token,
                    "constant",
                    self.import.constant(self.original_token),
                );
                raw.and_then(|raw| {
                    absent_on_error(self.token, "constant", ConstantValue::decode(&raw).map(Some))
                })
            })
            .clone()
    }

    /// The native marshalling descriptor
    pub fn marshal(&self) -> Option<Vec<u8>> {
        let facets = self.facets();
        facets
            .marshal
            .get_or_init(|| {
                absent_on_error(
                    self.token,
                    "marshal",
                    self.import.field_marshal(self.original_token),
                )
            })
            .clone()
    }

    /// The RVA of the initial value, for fields mapped onto data
    pub fn rva(&self) -> Option<u32> {
        let facets = self.facets();
        *facets.rva.get_or_init(|| {
            absent_on_error(self.token, "rva", self.import.field_rva(self.original_token))
        })
    }

    /// Custom attributes attached to the field
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

impl std::fmt::Debug for FieldProxy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FieldProxy")
            .field("token", &self.token)
            .field("initialized", &self.is_initialized())
            .finish()
    }
}
