use std::sync::{Arc, OnceLock, RwLock, Weak};

use crate::{
    metadata::{
        import::{CustomAttributeRaw, MetadataImport},
        lazy::LazyInit,
        members::{
            absent_on_error, DeclSecurityRc, GenericParamRc, MethodAttributes,
            MethodImplAttributes, ParamRc, TypeDef, TypeDefRc,
        },
        module::ModuleView,
        signatures::{parse_method_signature, SignatureMethod},
        tableid::TableId,
        token::Token,
    },
    Result,
};

/// A reference to a `MethodProxy`
pub type MethodRc = Arc<MethodProxy>;

/// The row data of a method, valid once the proxy is initialised
#[derive(Debug, Clone)]
pub struct MethodInfo {
    /// RVA of the IL body, 0 if there is none
    pub rva: u32,
    /// Implementation flags
    pub impl_flags: MethodImplAttributes,
    /// Flags of the method
    pub flags: MethodAttributes,
    /// Name of the method
    pub name: String,
    /// `MethodDefSig` blob
    pub signature: Vec<u8>,
}

#[derive(Default)]
struct MethodFacets {
    signature: OnceLock<Option<SignatureMethod>>,
    params: OnceLock<Vec<ParamRc>>,
    generic_params: OnceLock<Vec<GenericParamRc>>,
    security: OnceLock<Vec<DeclSecurityRc>>,
    custom_attributes: OnceLock<Vec<CustomAttributeRaw>>,
    body: OnceLock<Option<Arc<[u8]>>>,
}

/// Lazy proxy for a `MethodDef` row.
pub struct MethodProxy {
    module: Weak<ModuleView>,
    import: Arc<dyn MetadataImport>,
    owner: Weak<TypeDef>,
    token: Token,
    original_token: Token,
    init: LazyInit,
    info: RwLock<MethodInfo>,
    facets: RwLock<Arc<MethodFacets>>,
}

impl MethodProxy {
    pub(crate) fn new(
        module: Weak<ModuleView>,
        import: Arc<dyn MetadataImport>,
        owner: Weak<TypeDef>,
        token: Token,
    ) -> Self {
        MethodProxy {
            module,
            import,
            owner,
            token,
            original_token: token,
            init: LazyInit::new(),
            info: RwLock::new(MethodInfo {
                rva: 0,
                impl_flags: MethodImplAttributes::empty(),
                flags: MethodAttributes::empty(),
                name: String::new(),
                signature: Vec::new(),
            }),
            facets: RwLock::new(Arc::default()),
        }
    }

    /// The live token of this method
    pub fn token(&self) -> Token {
        self.token
    }

    /// The token this method had when it was first seen
    pub fn original_token(&self) -> Token {
        self.original_token
    }

    /// The row id of this method
    pub fn rid(&self) -> u32 {
        self.token.row()
    }

    /// The declaring type, unless it has been unloaded
    pub fn owner(&self) -> Option<TypeDefRc> {
        self.owner.upgrade()
    }

    /// The module this method lives in, unless it has been unloaded
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

            let raw = expect_row!(self.import.row(self.original_token)?, MethodDef, self.token);
            *write_lock!(self.info) = MethodInfo {
                rva: raw.rva,
                impl_flags: MethodImplAttributes::from_bits_truncate(raw.impl_flags),
                flags: MethodAttributes::from_bits_truncate(raw.flags),
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
    pub fn info(&self) -> MethodInfo {
        let _ = self.ensure_initialized();
        read_lock!(self.info).clone()
    }

    /// Name of the method
    pub fn name(&self) -> String {
        let _ = self.ensure_initialized();
        read_lock!(self.info).name.clone()
    }

    /// Flags of the method
    pub fn flags(&self) -> MethodAttributes {
        let _ = self.ensure_initialized();
        read_lock!(self.info).flags
    }

    /// Implementation flags of the method
    pub fn impl_flags(&self) -> MethodImplAttributes {
        let _ = self.ensure_initialized();
        read_lock!(self.info).impl_flags
    }

    fn facets(&self) -> Arc<MethodFacets> {
        let _ = self.ensure_initialized();
        read_lock!(self.facets).clone()
    }

    /// The parsed method signature
    pub fn signature(&self) -> Option<SignatureMethod> {
        let facets = self.facets();
        facets
            .signature
            .get_or_init(|| {
                let blob = read_lock!(self.info).signature.clone();
                absent_on_error(self.token, "signature", parse_method_signature(&blob).map(Some))
            })
            .clone()
    }

    /// `Param` rows of the method, return value first if it has one
    pub fn params(&self) -> Vec<ParamRc> {
        let facets = self.facets();
        facets
            .params
            .get_or_init(|| {
                self.children(TableId::Param, |module, rid| module.resolve_param(rid))
            })
            .clone()
    }

    /// Generic parameters declared by the method
    pub fn generic_params(&self) -> Vec<GenericParamRc> {
        let facets = self.facets();
        facets
            .generic_params
            .get_or_init(|| {
                self.children(TableId::GenericParam, |module, rid| {
                    module.resolve_generic_param(rid)
                })
            })
            .clone()
    }

    /// Declarative security attached to the method
    pub fn security(&self) -> Vec<DeclSecurityRc> {
        let facets = self.facets();
        facets
            .security
            .get_or_init(|| {
                self.children(TableId::DeclSecurity, |module, rid| {
                    module.resolve_decl_security(rid)
                })
            })
            .clone()
    }

    /// Custom attributes attached to the method
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

    /// The IL body bytes, header included
    pub fn body(&self) -> Option<Arc<[u8]>> {
        let facets = self.facets();
        facets
            .body
            .get_or_init(|| {
                if read_lock!(self.info).rva == 0 {
                    return None;
                }

                absent_on_error(self.token, "body", self.import.method_body(self.original_token))
                    .map(Arc::from)
            })
            .clone()
    }

    fn children<T, F>(&self, table: TableId, resolve: F) -> Vec<T>
    where
        F: Fn(&ModuleView, u32) -> Option<T>,
    {
        let Some(module) = self.module.upgrade() else {
            return Vec::new();
        };

        absent_on_error(
            self.token,
            "children",
            self.import.children(self.original_token, table),
        )
        .into_iter()
        .filter_map(|token| resolve(&module, token.row()))
        .collect()
    }
}

impl std::fmt::Debug for MethodProxy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MethodProxy")
            .field("token", &self.token)
            .field("initialized", &self.is_initialized())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        metadata::{
            import::{ConstantRaw, GenericParamRaw, MethodDefRaw, ParamRaw, RawRow},
            members::{ConstantValue, MethodAttributes},
            signatures::TypeSignature,
            tableid::TableId,
            token::Token,
        },
        test::{static_module, MetadataBuilder},
    };

    #[test]
    fn test_signature_and_flags() {
        let builder = MetadataBuilder::new();
        let program = builder.type_def(1, "App", "Program");
        builder.method(program, 1, "Main");
        let view = static_module(&builder);

        let main = view.resolve_method(1).unwrap();
        assert!(main.flags().contains(MethodAttributes::STATIC | MethodAttributes::PUBLIC));
        assert!(main.impl_flags().is_il());

        let signature = main.signature().unwrap();
        assert!(!signature.has_this);
        assert_eq!(signature.param_count, 0);
        assert_eq!(signature.return_type.base, TypeSignature::Void);
    }

    #[test]
    fn test_body() {
        let builder = MetadataBuilder::new();
        let program = builder.type_def(1, "App", "Program");
        let main = builder.method(program, 1, "Main");
        let import = builder.import();
        // tiny header, ret
        import.set_method_body(main, vec![0x06, 0x2A]);

        let abstract_method = Token::from_parts(TableId::MethodDef, 2);
        import.insert_child(
            program,
            RawRow::MethodDef(MethodDefRaw {
                token: abstract_method,
                rva: 0,
                impl_flags: 0,
                flags: 0x05C6,
                name: "Run".to_string(),
                signature: vec![0x20, 0x00, 0x01],
            }),
        );
        import.set_method_body(abstract_method, vec![0x06, 0x2A]);
        let view = static_module(&builder);

        let body = view.resolve_method(1).unwrap().body().unwrap();
        assert_eq!(&body[..], &[0x06, 0x2A]);
        assert!(view.resolve_method(2).unwrap().body().is_none());
    }

    #[test]
    fn test_params_and_generic_params() {
        let builder = MetadataBuilder::new();
        let program = builder.type_def(1, "App", "Program");
        let main = builder.method(program, 1, "Main");
        let import = builder.import();
        let param = Token::from_parts(TableId::Param, 1);
        import.insert_child(
            main,
            RawRow::Param(ParamRaw {
                token: param,
                flags: 0x1010,
                sequence: 1,
                name: "retries".to_string(),
            }),
        );
        import.set_constant(
            param,
            ConstantRaw {
                element_type: 0x08,
                value: 3i32.to_le_bytes().to_vec(),
            },
        );
        import.insert_child(
            main,
            RawRow::GenericParam(GenericParamRaw {
                token: Token::from_parts(TableId::GenericParam, 1),
                number: 0,
                flags: 0,
                owner: main,
                name: "T".to_string(),
            }),
        );
        let view = static_module(&builder);
        let method = view.resolve_method(1).unwrap();

        let params = method.params();
        assert_eq!(params.len(), 1);
        assert_eq!(params[0].name, "retries");
        assert_eq!(params[0].sequence, 1);
        assert_eq!(params[0].constant, Some(ConstantValue::I4(3)));

        let generic_params = method.generic_params();
        assert_eq!(generic_params.len(), 1);
        assert_eq!(generic_params[0].name, "T");
        assert!(method.security().is_empty());
    }

    #[test]
    fn test_invalidate_rereads_the_row() {
        let builder = MetadataBuilder::new();
        let program = builder.type_def(1, "App", "Program");
        let main = builder.method(program, 1, "Main");
        let view = static_module(&builder);
        let method = view.resolve_method(1).unwrap();
        assert_eq!(method.name(), "Main");

        builder.import().insert(RawRow::MethodDef(MethodDefRaw {
            token: main,
            rva: 0x2050,
            impl_flags: 0,
            flags: 0x0096,
            name: "MainAsync".to_string(),
            signature: vec![0x00, 0x00, 0x01],
        }));
        assert_eq!(method.name(), "Main");

        method.invalidate();
        assert_eq!(method.name(), "MainAsync");
    }
}
