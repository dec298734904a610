use std::{
    collections::HashSet,
    sync::{Arc, Mutex, OnceLock, RwLock, Weak},
};

use tracing::debug;

use crate::{
    metadata::{
        context::GenericContext,
        import::{CustomAttributeRaw, MetadataImport},
        lazy::LazyInit,
        members::{
            absent_on_error, DeclSecurityRc, EventRc, FieldRc, GenericParamRc, InterfaceImplRc,
            MethodRc, PropertyRc, TypeAttributes,
        },
        module::ModuleView,
        object::MetadataObject,
        tableid::TableId,
        token::Token,
    },
    Result,
};

/// A reference to a `TypeDef`
pub type TypeDefRc = Arc<TypeDef>;

/// Nesting deeper than this is treated as a cycle when building names
const MAX_NESTING_DEPTH: usize = 64;

/// The row data of a type, valid once the type is initialised
#[derive(Debug, Clone)]
pub struct TypeDefInfo {
    /// Flags of the type
    pub flags: TypeAttributes,
    /// Simple name
    pub name: String,
    /// Namespace, empty for nested types
    pub namespace: String,
    /// Token of the base type, null if there is none
    pub extends: Token,
}

#[derive(Default)]
struct MemberState {
    loaded: bool,
    known: HashSet<Token>,
}

/// Lazy proxy for a `TypeDef` row, and owner of its member proxies.
///
/// Member lists are append-only: when the target adds members to a type that is being debugged,
/// [`TypeDef::refresh_members`] appends the new ones and existing proxies stay valid.
pub struct TypeDef {
    module: Weak<ModuleView>,
    import: Arc<dyn MetadataImport>,
    self_ref: Weak<TypeDef>,
    token: Token,
    original_token: Token,
    init: LazyInit,
    info: RwLock<TypeDefInfo>,
    members: Mutex<MemberState>,
    fields: boxcar::Vec<FieldRc>,
    methods: boxcar::Vec<MethodRc>,
    properties: boxcar::Vec<PropertyRc>,
    events: boxcar::Vec<EventRc>,
    custom_attributes: RwLock<Arc<OnceLock<Vec<CustomAttributeRaw>>>>,
}

impl TypeDef {
    /// Create a proxy for the type `original_token`, known to the live model as `token`.
    ///
    /// Both tokens are the same for rows read from metadata; they differ for types synthesized
    /// from a class-load event.
    pub(crate) fn new(
        module: Weak<ModuleView>,
        import: Arc<dyn MetadataImport>,
        token: Token,
        original_token: Token,
    ) -> TypeDefRc {
        Arc::new_cyclic(|self_ref| TypeDef {
            module,
            import,
            self_ref: self_ref.clone(),
            token,
            original_token,
            init: LazyInit::new(),
            info: RwLock::new(TypeDefInfo {
                flags: TypeAttributes::empty(),
                name: String::new(),
                namespace: String::new(),
                extends: Token::new(0),
            }),
            members: Mutex::new(MemberState::default()),
            fields: boxcar::Vec::new(),
            methods: boxcar::Vec::new(),
            properties: boxcar::Vec::new(),
            events: boxcar::Vec::new(),
            custom_attributes: RwLock::new(Arc::default()),
        })
    }

    /// The live token of this type
    pub fn token(&self) -> Token {
        self.token
    }

    /// The token the target used when this type was first seen
    pub fn original_token(&self) -> Token {
        self.original_token
    }

    /// The row id of this type
    pub fn rid(&self) -> u32 {
        self.token.row()
    }

    /// `true` for types synthesized from a class-load event
    pub fn is_synthetic(&self) -> bool {
        self.token != self.original_token
    }

    /// The module this type lives in, unless it has been unloaded
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
            if self.module.upgrade().is_none() {
                return Err(crate::Error::InvalidToken(self.token));
            }

            let raw = expect_row!(self.import.row(self.original_token)?, TypeDef, self.token);
            *write_lock!(self.info) = TypeDefInfo {
                flags: TypeAttributes::from_bits_truncate(raw.flags),
                name: raw.name,
                namespace: raw.namespace,
                extends: raw.extends,
            };
            *write_lock!(self.custom_attributes) = Arc::default();
            Ok(())
        })
    }

    /// Snapshot of the row data
    pub fn info(&self) -> TypeDefInfo {
        let _ = self.ensure_initialized();
        read_lock!(self.info).clone()
    }

    /// Simple name
    pub fn name(&self) -> String {
        let _ = self.ensure_initialized();
        read_lock!(self.info).name.clone()
    }

    /// Namespace
    pub fn namespace(&self) -> String {
        let _ = self.ensure_initialized();
        read_lock!(self.info).namespace.clone()
    }

    /// Flags of the type
    pub fn flags(&self) -> TypeAttributes {
        let _ = self.ensure_initialized();
        read_lock!(self.info).flags
    }

    /// `Namespace.Outer/Inner`
    pub fn full_name(&self) -> String {
        let mut parts = vec![self.name()];
        let mut outermost = self.declaring_type();
        let mut current = outermost.clone();
        let mut depth = 0;
        while let Some(outer) = current {
            depth += 1;
            if depth > MAX_NESTING_DEPTH {
                break;
            }
            parts.push(outer.name());
            current = outer.declaring_type();
            outermost = Some(outer);
        }
        parts.reverse();

        let namespace = outermost.map_or_else(|| self.namespace(), |outer| outer.namespace());
        let name = parts.join("/");
        if namespace.is_empty() {
            name
        } else {
            format!("{namespace}.{name}")
        }
    }

    /// The base type
    pub fn extends(&self) -> Option<MetadataObject> {
        let _ = self.ensure_initialized();
        let extends = read_lock!(self.info).extends;
        if extends.is_null() {
            return None;
        }

        self.module
            .upgrade()?
            .resolve(extends, &GenericContext::empty())
    }

    /// The enclosing type, for nested types
    pub fn declaring_type(&self) -> Option<TypeDefRc> {
        self.module.upgrade()?.enclosing_type(self.rid())
    }

    /// Types nested directly inside this one
    pub fn nested_types(&self) -> Vec<TypeDefRc> {
        self.module
            .upgrade()
            .map(|module| module.nested_types(self.rid()))
            .unwrap_or_default()
    }

    /// Enumerate the member rows of this type, creating proxies for rows not seen yet.
    ///
    /// Returns `true` if new members were added. Does nothing once the list is loaded; see
    /// [`TypeDef::refresh_members`] and [`TypeDef::invalidate_members`].
    pub fn load_members(&self) -> bool {
        let Some(module) = self.module.upgrade() else {
            return false;
        };

        let mut state = lock!(self.members);
        if state.loaded {
            return false;
        }

        let mut added = false;
        let mut complete = true;
        for table in [
            TableId::Field,
            TableId::MethodDef,
            TableId::Property,
            TableId::Event,
        ] {
            let tokens = match self.import.children(self.original_token, table) {
                Ok(tokens) => tokens,
                Err(err) => {
                    debug!(token = %self.token, ?table, %err, "failed to enumerate members");
                    complete = false;
                    continue;
                }
            };

            for token in tokens {
                if !state.known.insert(token) {
                    continue;
                }

                added = true;
                let owner = self.self_ref.clone();
                match table {
                    TableId::Field => {
                        self.fields.push(module.field_proxy(token, owner));
                    }
                    TableId::MethodDef => {
                        self.methods.push(module.method_proxy(token, owner));
                    }
                    TableId::Property => {
                        self.properties.push(module.property_proxy(token, owner));
                    }
                    _ => {
                        self.events.push(module.event_proxy(token, owner));
                    }
                }
            }
        }

        state.loaded = complete;
        added
    }

    /// Pick up members the target appended to this type since the last enumeration.
    ///
    /// Existing proxies are kept as they are. Returns `true` if new members were added.
    pub fn refresh_members(&self) -> bool {
        lock!(self.members).loaded = false;
        self.load_members()
    }

    /// Mark every member proxy for re-initialisation and re-enumerate on next access.
    pub fn invalidate_members(&self) {
        lock!(self.members).loaded = false;
        for (_, field) in self.fields.iter() {
            field.invalidate();
        }
        for (_, method) in self.methods.iter() {
            method.invalidate();
        }
        for (_, property) in self.properties.iter() {
            property.invalidate();
        }
        for (_, event) in self.events.iter() {
            event.invalidate();
        }
    }

    /// Re-read the row on next access, together with every member
    pub fn invalidate(&self) {
        self.init.invalidate();
        self.invalidate_members();
    }

    /// `true` once the member list has been enumerated
    pub fn members_loaded(&self) -> bool {
        lock!(self.members).loaded
    }

    /// Tokens of every member proxy created so far, without enumerating
    pub(crate) fn known_members(&self) -> Vec<Token> {
        lock!(self.members).known.iter().copied().collect()
    }

    /// Fields of the type
    pub fn fields(&self) -> Vec<FieldRc> {
        self.load_members();
        self.fields.iter().map(|(_, f)| f.clone()).collect()
    }

    /// Methods of the type
    pub fn methods(&self) -> Vec<MethodRc> {
        self.load_members();
        self.methods.iter().map(|(_, m)| m.clone()).collect()
    }

    /// Properties of the type
    pub fn properties(&self) -> Vec<PropertyRc> {
        self.load_members();
        self.properties.iter().map(|(_, p)| p.clone()).collect()
    }

    /// Events of the type
    pub fn events(&self) -> Vec<EventRc> {
        self.load_members();
        self.events.iter().map(|(_, e)| e.clone()).collect()
    }

    /// Interfaces implemented directly by the type, resolved without a generic context
    pub fn interfaces(&self) -> Vec<InterfaceImplRc> {
        self.children(TableId::InterfaceImpl, |module, rid| {
            module.resolve_interface_impl(rid, &GenericContext::empty())
        })
    }

    /// Generic parameters declared by the type
    pub fn generic_params(&self) -> Vec<GenericParamRc> {
        self.children(TableId::GenericParam, |module, rid| {
            module.resolve_generic_param(rid)
        })
    }

    /// Declarative security attached to the type
    pub fn security(&self) -> Vec<DeclSecurityRc> {
        self.children(TableId::DeclSecurity, |module, rid| {
            module.resolve_decl_security(rid)
        })
    }

    /// Custom attributes attached to the type
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

impl std::fmt::Debug for TypeDef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TypeDef")
            .field("token", &self.token)
            .field("original_token", &self.original_token)
            .field("initialized", &self.is_initialized())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use crate::{
        metadata::{
            import::{
                CustomAttributeRaw, GenericParamRaw, InterfaceImplRaw, RawRow, TypeDefRaw,
            },
            members::TypeAttributes,
            object::MetadataObject,
            tableid::TableId,
            token::Token,
        },
        test::{static_module, MetadataBuilder},
    };

    #[test]
    fn test_row_and_base_type() {
        let builder = MetadataBuilder::new();
        let object = builder.type_ref(1, "System", "Object");
        builder.import().insert(RawRow::TypeDef(TypeDefRaw {
            token: Token::from_parts(TableId::TypeDef, 1),
            flags: 0x0010_0101,
            name: "Program".to_string(),
            namespace: "App".to_string(),
            extends: object,
        }));
        let view = static_module(&builder);

        let program = view.resolve_type_def(1).unwrap();
        assert!(!program.is_initialized());
        assert_eq!(program.full_name(), "App.Program");
        assert!(program
            .flags()
            .contains(TypeAttributes::PUBLIC | TypeAttributes::SEALED));

        let Some(MetadataObject::TypeRef(base)) = program.extends() else {
            panic!("expected a TypeRef base");
        };
        assert_eq!(base.full_name(), "System.Object");
    }

    #[test]
    fn test_full_name_of_deeply_nested_type() {
        let builder = MetadataBuilder::new();
        let outer = builder.type_def(1, "App", "Outer");
        let middle = builder.type_def(2, "", "Middle");
        let inner = builder.type_def(3, "", "Inner");
        builder.nest(middle, outer);
        builder.nest(inner, middle);
        let global = builder.type_def(4, "", "<Module>");
        let view = static_module(&builder);

        let inner = view.resolve_type_def(inner.row()).unwrap();
        assert_eq!(inner.full_name(), "App.Outer/Middle/Inner");
        assert!(inner.extends().is_none());
        assert_eq!(
            view.resolve_type_def(global.row()).unwrap().full_name(),
            "<Module>"
        );
    }

    #[test]
    fn test_member_lists() {
        let builder = MetadataBuilder::new();
        let handler = builder.type_ref(1, "System", "EventHandler");
        let program = builder.type_def(1, "App", "Program");
        builder.field(program, 1, "count");
        builder.method(program, 1, "Main");
        builder.method(program, 2, "Tick");
        builder.property(program, 1, "Count");
        builder.event(program, 1, "Changed", handler);
        let view = static_module(&builder);

        let owner = view.resolve_type_def(1).unwrap();
        assert!(!owner.members_loaded());
        assert_eq!(owner.fields().len(), 1);
        assert!(owner.members_loaded());
        assert_eq!(owner.methods().len(), 2);
        assert_eq!(owner.properties().len(), 1);
        assert_eq!(owner.events().len(), 1);
        assert!(!owner.methods()[0].is_initialized());
    }

    #[test]
    fn test_refresh_keeps_existing_proxies() {
        let builder = MetadataBuilder::new();
        let program = builder.type_def(1, "App", "Program");
        builder.method(program, 1, "Main");
        let view = static_module(&builder);

        let owner = view.resolve_type_def(1).unwrap();
        let main = owner.methods()[0].clone();
        assert!(!owner.refresh_members());

        builder.method(program, 2, "Tick");
        assert_eq!(owner.methods().len(), 1);
        assert!(owner.refresh_members());

        let methods = owner.methods();
        assert_eq!(methods.len(), 2);
        assert!(Arc::ptr_eq(&methods[0], &main));
    }

    #[test]
    fn test_invalidate_members() {
        let builder = MetadataBuilder::new();
        let program = builder.type_def(1, "App", "Program");
        builder.field(program, 1, "count");
        builder.method(program, 1, "Main");
        let view = static_module(&builder);

        let owner = view.resolve_type_def(1).unwrap();
        let field = owner.fields()[0].clone();
        let method = owner.methods()[0].clone();
        assert_eq!(field.name(), "count");
        assert_eq!(method.name(), "Main");

        owner.invalidate_members();
        assert!(!owner.members_loaded());
        assert!(!field.is_initialized());
        assert!(!method.is_initialized());
        assert!(Arc::ptr_eq(&owner.fields()[0], &field));
    }

    #[test]
    fn test_interfaces_generic_params_and_attributes() {
        let builder = MetadataBuilder::new();
        let disposable = builder.type_ref(1, "System", "IDisposable");
        let list = builder.type_def(1, "App", "List`1");
        let import = builder.import();
        import.insert_child(
            list,
            RawRow::InterfaceImpl(InterfaceImplRaw {
                token: Token::from_parts(TableId::InterfaceImpl, 1),
                class: list,
                interface: disposable,
            }),
        );
        import.insert_child(
            list,
            RawRow::GenericParam(GenericParamRaw {
                token: Token::from_parts(TableId::GenericParam, 1),
                number: 0,
                flags: 0,
                owner: list,
                name: "T".to_string(),
            }),
        );
        import.add_custom_attribute(
            list,
            CustomAttributeRaw {
                token: Token::new(0x0C00_0001),
                constructor: Token::new(0x0A00_0001),
                value: vec![0x01, 0x00, 0x00, 0x00],
            },
        );
        let view = static_module(&builder);

        let owner = view.resolve_type_def(1).unwrap();
        let interfaces = owner.interfaces();
        assert_eq!(interfaces.len(), 1);
        assert!(matches!(
            &interfaces[0].interface,
            Some(MetadataObject::TypeRef(r)) if r.full_name() == "System.IDisposable"
        ));
        assert_eq!(owner.generic_params()[0].name, "T");
        assert_eq!(owner.custom_attributes().len(), 1);
        assert!(owner.security().is_empty());
    }
}
