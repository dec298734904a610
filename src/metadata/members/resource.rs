use std::sync::{Arc, OnceLock, RwLock, Weak};

use crate::{
    metadata::{
        import::{CustomAttributeRaw, MetadataImport},
        lazy::LazyInit,
        members::{absent_on_error, ManifestResourceAttributes},
        module::ModuleView,
        token::Token,
    },
    Result,
};

/// A reference to a `ResourceProxy`
pub type ResourceRc = Arc<ResourceProxy>;

/// The row data of a manifest resource, valid once the proxy is initialised
#[derive(Debug, Clone)]
pub struct ResourceInfo {
    /// Offset of the data in the resource section
    pub offset: u32,
    /// Visibility of the resource
    pub flags: ManifestResourceAttributes,
    /// Name of the resource
    pub name: String,
    /// `File` or `AssemblyRef` holding the data, null if embedded in this module
    pub implementation: Token,
}

impl ResourceInfo {
    /// `true` if the data lives in this module
    pub fn is_embedded(&self) -> bool {
        self.implementation.is_null()
    }
}

/// Lazy proxy for a `ManifestResource` row.
///
/// Resources belong to the module rather than to a type, so binding to the owner means
/// checking that the module is still loaded.
pub struct ResourceProxy {
    module: Weak<ModuleView>,
    import: Arc<dyn MetadataImport>,
    token: Token,
    original_token: Token,
    init: LazyInit,
    info: RwLock<ResourceInfo>,
    custom_attributes: RwLock<Arc<OnceLock<Vec<CustomAttributeRaw>>>>,
}

impl ResourceProxy {
    pub(crate) fn new(
        module: Weak<ModuleView>,
        import: Arc<dyn MetadataImport>,
        token: Token,
    ) -> Self {
        ResourceProxy {
            module,
            import,
            token,
            original_token: token,
            init: LazyInit::new(),
            info: RwLock::new(ResourceInfo {
                offset: 0,
                flags: ManifestResourceAttributes::empty(),
                name: String::new(),
                implementation: Token::new(0),
            }),
            custom_attributes: RwLock::new(Arc::default()),
        }
    }

    /// The live token of this resource
    pub fn token(&self) -> Token {
        self.token
    }

    /// The token this resource had when it was first seen
    pub fn original_token(&self) -> Token {
        self.original_token
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
            if self.module.upgrade().is_none() {
                return Err(crate::Error::InvalidToken(self.token));
            }

            let raw = expect_row!(
                self.import.row(self.original_token)?,
                ManifestResource,
                self.token
            );
            *write_lock!(self.info) = ResourceInfo {
                offset: raw.offset,
                flags: ManifestResourceAttributes::from_bits_truncate(raw.flags),
                name: raw.name,
                implementation: raw.implementation,
            };
            *write_lock!(self.custom_attributes) = Arc::default();
            Ok(())
        })
    }

    /// Require the next access to read the row again
    pub fn invalidate(&self) {
        self.init.invalidate();
    }

    /// Snapshot of the row data
    pub fn info(&self) -> ResourceInfo {
        let _ = self.ensure_initialized();
        read_lock!(self.info).clone()
    }

    /// Name of the resource
    pub fn name(&self) -> String {
        let _ = self.ensure_initialized();
        read_lock!(self.info).name.clone()
    }

    /// Custom attributes attached to the resource
    pub fn custom_attributes(&self) -> Vec<CustomAttributeRaw> {
        let _ = self.ensure_initialized();
        let cell = read_lock!(self.custom_attributes).clone();
        cell.get_or_init(|| {
            absent_on_error(
                self.token,
                "custom attributes",
                self.import.custom_attributes(self.original_token),
            )
        })
        .clone()
    }
}

impl std::fmt::Debug for ResourceProxy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceProxy")
            .field("token", &self.token)
            .field("initialized", &self.is_initialized())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        metadata::{
            import::{ManifestResourceRaw, RawRow},
            members::ManifestResourceAttributes,
            tableid::TableId,
            token::Token,
        },
        test::{dynamic_module, static_module, MetadataBuilder},
        utils::CancellationToken,
    };

    #[test]
    fn test_embedded_resource() {
        let builder = MetadataBuilder::new();
        builder.resource(1, "App.Strings.resources");
        let view = static_module(&builder);

        let resource = view.resolve_resource(1).unwrap();
        assert!(!resource.is_initialized());

        let info = resource.info();
        assert!(resource.is_initialized());
        assert!(info.is_embedded());
        assert_eq!(info.flags, ManifestResourceAttributes::PUBLIC);
        assert_eq!(resource.name(), "App.Strings.resources");
    }

    #[test]
    fn test_linked_resource() {
        let builder = MetadataBuilder::new();
        builder.import().insert(RawRow::ManifestResource(ManifestResourceRaw {
            token: Token::from_parts(TableId::ManifestResource, 1),
            offset: 0,
            flags: 0x0002,
            name: "Shared.resources".to_string(),
            implementation: Token::new(0x2300_0001),
        }));
        let view = static_module(&builder);

        let info = view.resolve_resource(1).unwrap().info();
        assert!(!info.is_embedded());
        assert_eq!(info.flags, ManifestResourceAttributes::PRIVATE);
    }

    #[test]
    fn test_emitted_resources_are_discovered() {
        let builder = MetadataBuilder::new();
        let view = dynamic_module(&builder);
        let cancel = CancellationToken::new();
        assert!(view.resources().is_empty());

        builder.resource(1, "Emitted.resources");
        assert!(view.discover_new_resources(&cancel).unwrap());
        assert_eq!(view.resources().len(), 1);
        assert!(!view.discover_new_resources(&cancel).unwrap());
    }
}
