use std::sync::{Arc, OnceLock, RwLock, Weak};

use crate::{
    metadata::{
        context::GenericContext,
        import::{CustomAttributeRaw, MetadataImport},
        lazy::LazyInit,
        members::{
            absent_on_error, EventAttributes, MethodRc, MethodSemanticsAttributes, TypeDef,
            TypeDefRc,
        },
        module::ModuleView,
        object::MetadataObject,
        token::Token,
    },
    Result,
};

/// A reference to an `EventProxy`
pub type EventRc = Arc<EventProxy>;

/// The row data of an event, valid once the proxy is initialised
#[derive(Debug, Clone)]
pub struct EventInfo {
    /// Flags of the event
    pub flags: EventAttributes,
    /// Name of the event
    pub name: String,
    /// `TypeDefOrRef` of the delegate type
    pub event_type: Token,
}

/// The accessor methods of an event
#[derive(Debug, Clone, Default)]
pub struct EventAccessors {
    /// `add_` accessor
    pub add: Option<MethodRc>,
    /// `remove_` accessor
    pub remove: Option<MethodRc>,
    /// `raise_` accessor
    pub raise: Option<MethodRc>,
    /// Any other associated methods
    pub other: Vec<MethodRc>,
}

#[derive(Default)]
struct EventFacets {
    accessors: OnceLock<EventAccessors>,
    custom_attributes: OnceLock<Vec<CustomAttributeRaw>>,
}

/// Lazy proxy for an `Event` row.
pub struct EventProxy {
    module: Weak<ModuleView>,
    import: Arc<dyn MetadataImport>,
    owner: Weak<TypeDef>,
    token: Token,
    original_token: Token,
    init: LazyInit,
    info: RwLock<EventInfo>,
    facets: RwLock<Arc<EventFacets>>,
}

impl EventProxy {
    pub(crate) fn new(
        module: Weak<ModuleView>,
        import: Arc<dyn MetadataImport>,
        owner: Weak<TypeDef>,
        token: Token,
    ) -> Self {
        EventProxy {
            module,
            import,
            owner,
            token,
            original_token: token,
            init: LazyInit::new(),
            info: RwLock::new(EventInfo {
                flags: EventAttributes::empty(),
                name: String::new(),
                event_type: Token::new(0),
            }),
            facets: RwLock::new(Arc::default()),
        }
    }

    /// The live token of this event
    pub fn token(&self) -> Token {
        self.token
    }

    /// The token this event had when it was first seen
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

            let raw = expect_row!(self.import.row(self.original_token)?, Event, self.token);
            *write_lock!(self.info) = EventInfo {
                flags: EventAttributes::from_bits_truncate(raw.flags),
                name: raw.name,
                event_type: raw.event_type,
            };
            *write_lock!(self.facets) = Arc::default();
            Ok(())
        })
    }

    /// Require the next access to read the row again
    pub fn invalidate(&self) {
        self.init.invalidate();
    }

    /// Name of the event
    pub fn name(&self) -> String {
        let _ = self.ensure_initialized();
        read_lock!(self.info).name.clone()
    }

    /// Flags of the event
    pub fn flags(&self) -> EventAttributes {
        let _ = self.ensure_initialized();
        read_lock!(self.info).flags
    }

    /// The delegate type of the event
    pub fn event_type(&self) -> Option<MetadataObject> {
        let _ = self.ensure_initialized();
        let token = read_lock!(self.info).event_type;
        self.module
            .upgrade()?
            .resolve(token, &GenericContext::empty())
    }

    fn facets(&self) -> Arc<EventFacets> {
        let _ = self.ensure_initialized();
        read_lock!(self.facets).clone()
    }

    /// Add, remove, raise and other accessors
    pub fn accessors(&self) -> EventAccessors {
        let facets = self.facets();
        facets
            .accessors
            .get_or_init(|| {
                let mut accessors = EventAccessors::default();
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
                    if role.contains(MethodSemanticsAttributes::ADD_ON) {
                        accessors.add = Some(method);
                    } else if role.contains(MethodSemanticsAttributes::REMOVE_ON) {
                        accessors.remove = Some(method);
                    } else if role.contains(MethodSemanticsAttributes::FIRE) {
                        accessors.raise = Some(method);
                    } else {
                        accessors.other.push(method);
                    }
                }
                accessors
            })
            .clone()
    }

    /// Custom attributes attached to the event
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

impl std::fmt::Debug for EventProxy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventProxy")
            .field("token", &self.token)
            .field("initialized", &self.is_initialized())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        metadata::{members::MethodSemanticsAttributes, object::MetadataObject},
        test::{static_module, MetadataBuilder},
    };

    #[test]
    fn test_event_type_and_accessors() {
        let builder = MetadataBuilder::new();
        let handler = builder.type_ref(1, "System", "EventHandler");
        let program = builder.type_def(1, "App", "Program");
        let add = builder.method(program, 1, "add_Changed");
        let remove = builder.method(program, 2, "remove_Changed");
        let raise = builder.method(program, 3, "raise_Changed");
        let changed = builder.event(program, 1, "Changed", handler);
        builder.accessor(changed, add, MethodSemanticsAttributes::ADD_ON.bits());
        builder.accessor(changed, remove, MethodSemanticsAttributes::REMOVE_ON.bits());
        builder.accessor(changed, raise, MethodSemanticsAttributes::FIRE.bits());
        let view = static_module(&builder);

        let event = view.resolve_event(1).unwrap();
        assert_eq!(event.name(), "Changed");

        let Some(MetadataObject::TypeRef(delegate)) = event.event_type() else {
            panic!("expected a TypeRef delegate");
        };
        assert_eq!(delegate.full_name(), "System.EventHandler");

        let accessors = event.accessors();
        assert_eq!(accessors.add.unwrap().name(), "add_Changed");
        assert_eq!(accessors.remove.unwrap().name(), "remove_Changed");
        assert_eq!(accessors.raise.unwrap().name(), "raise_Changed");
        assert!(accessors.other.is_empty());
    }

    #[test]
    fn test_accessor_to_missing_method_is_skipped() {
        let builder = MetadataBuilder::new();
        let handler = builder.type_ref(1, "System", "EventHandler");
        let program = builder.type_def(1, "App", "Program");
        let add = builder.method(program, 1, "add_Changed");
        let changed = builder.event(program, 1, "Changed", handler);
        builder.accessor(changed, add, MethodSemanticsAttributes::ADD_ON.bits());
        builder.accessor(
            changed,
            crate::metadata::token::Token::new(0x0600_0009),
            MethodSemanticsAttributes::REMOVE_ON.bits(),
        );
        let view = static_module(&builder);

        let accessors = view.resolve_event(1).unwrap().accessors();
        assert!(accessors.add.is_some());
        assert!(accessors.remove.is_none());
    }
}
