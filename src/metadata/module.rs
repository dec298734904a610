//! The live view of one module loaded in the target process.
//!
//! A [`ModuleView`] turns metadata tokens into stable objects by querying a
//! [`MetadataImport`] on demand. Every table has its own rid cache:
//!
//! - member tables (`TypeDef`, `Field`, `MethodDef`, `Property`, `Event`) hold lazy proxies,
//!   created when their owning type enumerates its members
//! - simple tables hold rows read once on first resolution
//! - context-sensitive tables go through a [`ContextCache`], see [`crate::metadata::cache`]
//!
//! Dynamic modules keep growing while the target runs. The view remembers the last rid it saw
//! in the `TypeDef`, `ManifestResource` and `ExportedType` tables and the `discover_new_*`
//! methods probe forward from there. Types reported by a class-load event that metadata does not
//! know about yet get a rid from a reserved range starting at
//! [`crate::config::EngineConfig::synthetic_rid_base`].
//!
//! # Examples
//!
//! ```rust
//! use std::sync::Arc;
//! use livescope::config::EngineConfig;
//! use livescope::metadata::context::GenericContext;
//! use livescope::metadata::import::{RawRow, TypeDefRaw};
//! use livescope::metadata::memory::MemoryImport;
//! use livescope::metadata::module::{ModuleInfo, ModuleKey, ModuleView};
//! use livescope::metadata::token::Token;
//!
//! let import = Arc::new(MemoryImport::new());
//! import.insert(RawRow::TypeDef(TypeDefRaw {
//!     token: Token::new(0x0200_0001),
//!     flags: 0,
//!     name: "Program".to_string(),
//!     namespace: "App".to_string(),
//!     extends: Token::new(0),
//! }));
//!
//! let key = ModuleKey::new("App, Version=1.0.0.0", "App.dll", false, false);
//! let view = ModuleView::new(ModuleInfo::new(key), import, &EngineConfig::default());
//!
//! let object = view.resolve(Token::new(0x0200_0001), &GenericContext::empty()).unwrap();
//! assert_eq!(object.token(), Token::new(0x0200_0001));
//! assert!(view.resolve(Token::new(0x0200_0002), &GenericContext::empty()).is_none());
//! ```

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, AtomicU32, Ordering},
        Arc, RwLock, Weak,
    },
};

use dashmap::DashMap;
use strum::EnumCount;
use tracing::{debug, trace};

use crate::{
    config::EngineConfig,
    metadata::{
        cache::{ContextCache, RowCache},
        context::GenericContext,
        import::{MetadataImport, RawRow},
        members::{
            absent_on_error, AssemblyRef, AssemblyRefRc, DeclSecurity, DeclSecurityRc, EventProxy,
            EventRc, ExportedType, ExportedTypeRc, FieldProxy, FieldRc, File, FileRc, GenericParam,
            GenericParamConstraint, GenericParamConstraintRc, GenericParamRc, InterfaceImpl,
            InterfaceImplRc, MemberRef, MemberRefRc, MethodProxy, MethodRc, MethodSpec,
            MethodSpecRc, ModuleRef, ModuleRefRc, Param, ParamRc, PropertyProxy, PropertyRc,
            ResourceProxy, ResourceRc, StandAloneSig, StandAloneSigRc, TypeDef, TypeDefRc, TypeRef,
            TypeRefRc, TypeSpec, TypeSpecRc,
        },
        object::{ContainsGenericParameter, MetadataObject},
        tableid::TableId,
        token::{Token, MAX_RID},
    },
    utils::CancellationToken,
    Error, Result,
};

/// Structural identity of a module.
///
/// Carries no process handle, so the same logical module compares equal across reloads and
/// across processes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ModuleKey {
    /// Full name of the containing assembly
    pub assembly_full_name: String,
    /// Name of the module inside the assembly
    pub module_name: String,
    /// Module emitted at runtime
    pub is_dynamic: bool,
    /// Module loaded from a byte array rather than a file
    pub is_in_memory: bool,
}

impl ModuleKey {
    /// Create a new key
    pub fn new(
        assembly_full_name: impl Into<String>,
        module_name: impl Into<String>,
        is_dynamic: bool,
        is_in_memory: bool,
    ) -> Self {
        ModuleKey {
            assembly_full_name: assembly_full_name.into(),
            module_name: module_name.into(),
            is_dynamic,
            is_in_memory,
        }
    }
}

impl std::fmt::Display for ModuleKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}]{}", self.assembly_full_name, self.module_name)
    }
}

/// Description of a loaded module instance, as reported by the transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleInfo {
    /// Structural identity
    pub key: ModuleKey,
    /// Load address of the image, 0 for dynamic modules
    pub base_address: u64,
    /// Size of the image in memory
    pub size: u32,
    /// Module version id, if the target reported one
    pub mvid: Option<uguid::Guid>,
}

impl ModuleInfo {
    /// Info with only a key
    pub fn new(key: ModuleKey) -> Self {
        ModuleInfo {
            key,
            base_address: 0,
            size: 0,
            mvid: None,
        }
    }
}

/// Notification about a type that appeared or changed in a dynamic module
pub struct TypeUpdate {
    /// The module the type lives in
    pub module: Arc<ModuleView>,
    /// The type
    pub type_def: TypeDefRc,
    /// `true` if the type did not exist before
    pub was_created: bool,
    /// `true` if a class-load event reported the change
    pub from_load_class_event: bool,
}

/// Subscriber to [`TypeUpdate`]s
pub type TypeUpdateListener = Arc<dyn Fn(&TypeUpdate) + Send + Sync>;

/// Nesting relations of the `TypeDef` table, by rid.
#[derive(Default)]
struct NestedIndex {
    nested: HashMap<u32, Vec<u32>>,
    enclosing: HashMap<u32, u32>,
}

type Resolver = fn(&ModuleView, u32, &GenericContext) -> Option<MetadataObject>;

/// Resolver per table, indexed by table id. Tables without rows of their own (pointer,
/// map and layout tables) have none.
const RESOLVERS: [Option<Resolver>; TableId::COUNT] = {
    let mut table: [Option<Resolver>; TableId::COUNT] = [None; TableId::COUNT];
    table[TableId::TypeRef as usize] = Some(type_ref_row as Resolver);
    table[TableId::TypeDef as usize] = Some(type_def_row as Resolver);
    table[TableId::Field as usize] = Some(field_row as Resolver);
    table[TableId::MethodDef as usize] = Some(method_row as Resolver);
    table[TableId::Param as usize] = Some(param_row as Resolver);
    table[TableId::InterfaceImpl as usize] = Some(interface_impl_row as Resolver);
    table[TableId::MemberRef as usize] = Some(member_ref_row as Resolver);
    table[TableId::DeclSecurity as usize] = Some(decl_security_row as Resolver);
    table[TableId::StandAloneSig as usize] = Some(standalone_sig_row as Resolver);
    table[TableId::Event as usize] = Some(event_row as Resolver);
    table[TableId::Property as usize] = Some(property_row as Resolver);
    table[TableId::ModuleRef as usize] = Some(module_ref_row as Resolver);
    table[TableId::TypeSpec as usize] = Some(type_spec_row as Resolver);
    table[TableId::AssemblyRef as usize] = Some(assembly_ref_row as Resolver);
    table[TableId::File as usize] = Some(file_row as Resolver);
    table[TableId::ExportedType as usize] = Some(exported_type_row as Resolver);
    table[TableId::ManifestResource as usize] = Some(resource_row as Resolver);
    table[TableId::GenericParam as usize] = Some(generic_param_row as Resolver);
    table[TableId::MethodSpec as usize] = Some(method_spec_row as Resolver);
    table[TableId::GenericParamConstraint as usize] = Some(generic_param_constraint_row as Resolver);
    table
};

fn type_ref_row(m: &ModuleView, rid: u32, _: &GenericContext) -> Option<MetadataObject> {
    m.resolve_type_ref(rid).map(MetadataObject::TypeRef)
}

fn type_def_row(m: &ModuleView, rid: u32, _: &GenericContext) -> Option<MetadataObject> {
    m.type_def(rid, false).map(MetadataObject::TypeDef)
}

fn field_row(m: &ModuleView, rid: u32, _: &GenericContext) -> Option<MetadataObject> {
    m.resolve_field(rid).map(MetadataObject::Field)
}

fn method_row(m: &ModuleView, rid: u32, _: &GenericContext) -> Option<MetadataObject> {
    m.resolve_method(rid).map(MetadataObject::Method)
}

fn param_row(m: &ModuleView, rid: u32, _: &GenericContext) -> Option<MetadataObject> {
    m.resolve_param(rid).map(MetadataObject::Param)
}

fn interface_impl_row(m: &ModuleView, rid: u32, ctx: &GenericContext) -> Option<MetadataObject> {
    m.resolve_interface_impl(rid, ctx)
        .map(MetadataObject::InterfaceImpl)
}

fn member_ref_row(m: &ModuleView, rid: u32, ctx: &GenericContext) -> Option<MetadataObject> {
    m.resolve_member_ref(rid, ctx).map(MetadataObject::MemberRef)
}

fn decl_security_row(m: &ModuleView, rid: u32, _: &GenericContext) -> Option<MetadataObject> {
    m.resolve_decl_security(rid)
        .map(MetadataObject::DeclSecurity)
}

fn standalone_sig_row(m: &ModuleView, rid: u32, ctx: &GenericContext) -> Option<MetadataObject> {
    m.resolve_standalone_sig(rid, ctx)
        .map(MetadataObject::StandAloneSig)
}

fn event_row(m: &ModuleView, rid: u32, _: &GenericContext) -> Option<MetadataObject> {
    m.resolve_event(rid).map(MetadataObject::Event)
}

fn property_row(m: &ModuleView, rid: u32, _: &GenericContext) -> Option<MetadataObject> {
    m.resolve_property(rid).map(MetadataObject::Property)
}

fn module_ref_row(m: &ModuleView, rid: u32, _: &GenericContext) -> Option<MetadataObject> {
    m.resolve_module_ref(rid).map(MetadataObject::ModuleRef)
}

fn type_spec_row(m: &ModuleView, rid: u32, ctx: &GenericContext) -> Option<MetadataObject> {
    m.resolve_type_spec(rid, ctx).map(MetadataObject::TypeSpec)
}

fn assembly_ref_row(m: &ModuleView, rid: u32, _: &GenericContext) -> Option<MetadataObject> {
    m.resolve_assembly_ref(rid).map(MetadataObject::AssemblyRef)
}

fn file_row(m: &ModuleView, rid: u32, _: &GenericContext) -> Option<MetadataObject> {
    m.resolve_file(rid).map(MetadataObject::File)
}

fn exported_type_row(m: &ModuleView, rid: u32, _: &GenericContext) -> Option<MetadataObject> {
    m.resolve_exported_type(rid)
        .map(MetadataObject::ExportedType)
}

fn resource_row(m: &ModuleView, rid: u32, _: &GenericContext) -> Option<MetadataObject> {
    m.resource(rid, false).map(MetadataObject::Resource)
}

fn generic_param_row(m: &ModuleView, rid: u32, _: &GenericContext) -> Option<MetadataObject> {
    m.resolve_generic_param(rid)
        .map(MetadataObject::GenericParam)
}

fn method_spec_row(m: &ModuleView, rid: u32, ctx: &GenericContext) -> Option<MetadataObject> {
    m.resolve_method_spec(rid, ctx).map(MetadataObject::MethodSpec)
}

fn generic_param_constraint_row(
    m: &ModuleView,
    rid: u32,
    ctx: &GenericContext,
) -> Option<MetadataObject> {
    m.resolve_generic_param_constraint(rid, ctx)
        .map(MetadataObject::GenericParamConstraint)
}

/// One loaded module, resolved lazily against the target's metadata.
///
/// Every object handed out is cached by rid, so resolving the same token twice yields the same
/// `Arc`. The exception are context-sensitive rows that still mention open generic parameters:
/// those are rebuilt on every call and never cached.
///
/// Lookups never fail with an error. A token that is out of range, points into a table without
/// rows or belongs to a module that has been unloaded resolves to `None`.
pub struct ModuleView {
    self_ref: Weak<ModuleView>,
    info: ModuleInfo,
    import: Arc<dyn MetadataImport>,
    synthetic_rid_base: u32,
    max_discovery_probe: u32,

    types: RowCache<TypeDef>,
    fields: RowCache<FieldProxy>,
    methods: RowCache<MethodProxy>,
    properties: RowCache<PropertyProxy>,
    events: RowCache<EventProxy>,
    resources: RowCache<ResourceProxy>,

    type_refs: RowCache<TypeRef>,
    module_refs: RowCache<ModuleRef>,
    assembly_refs: RowCache<AssemblyRef>,
    decl_securities: RowCache<DeclSecurity>,
    files: RowCache<File>,
    exported_types: RowCache<ExportedType>,
    params: RowCache<Param>,
    generic_params: RowCache<GenericParam>,

    member_refs: ContextCache<MemberRef>,
    standalone_sigs: ContextCache<StandAloneSig>,
    type_specs: ContextCache<TypeSpec>,
    method_specs: ContextCache<MethodSpec>,
    generic_param_constraints: ContextCache<GenericParamConstraint>,
    interface_impls: ContextCache<InterfaceImpl>,

    nested: RwLock<Option<Arc<NestedIndex>>>,

    last_type_rid: AtomicU32,
    last_resource_rid: AtomicU32,
    last_exported_type_rid: AtomicU32,
    next_synthetic_rid: AtomicU32,
    synthetic: DashMap<Token, u32>,

    listeners: RwLock<Vec<TypeUpdateListener>>,
    unloaded: AtomicBool,
}

impl ModuleView {
    /// Create the view of a freshly loaded module.
    ///
    /// Nothing is read from the target except the current row counts of the growable tables.
    pub fn new(
        info: ModuleInfo,
        import: Arc<dyn MetadataImport>,
        config: &EngineConfig,
    ) -> Arc<ModuleView> {
        let synthetic_rid_base = config.synthetic_rid_base.clamp(1, MAX_RID);
        let row_count = |table: TableId| {
            absent_on_error(
                Token::from_parts(table, 0),
                "row count",
                import.row_count(table),
            )
            .min(synthetic_rid_base - 1)
        };
        let last_type_rid = row_count(TableId::TypeDef);
        let last_resource_rid = row_count(TableId::ManifestResource);
        let last_exported_type_rid = row_count(TableId::ExportedType);

        debug!(
            module = %info.key,
            types = last_type_rid,
            dynamic = info.key.is_dynamic,
            "module view created"
        );

        Arc::new_cyclic(|self_ref| ModuleView {
            self_ref: self_ref.clone(),
            info,
            import,
            synthetic_rid_base,
            max_discovery_probe: config.max_discovery_probe,
            types: RowCache::new(),
            fields: RowCache::new(),
            methods: RowCache::new(),
            properties: RowCache::new(),
            events: RowCache::new(),
            resources: RowCache::new(),
            type_refs: RowCache::new(),
            module_refs: RowCache::new(),
            assembly_refs: RowCache::new(),
            decl_securities: RowCache::new(),
            files: RowCache::new(),
            exported_types: RowCache::new(),
            params: RowCache::new(),
            generic_params: RowCache::new(),
            member_refs: ContextCache::new(),
            standalone_sigs: ContextCache::new(),
            type_specs: ContextCache::new(),
            method_specs: ContextCache::new(),
            generic_param_constraints: ContextCache::new(),
            interface_impls: ContextCache::new(),
            nested: RwLock::new(None),
            last_type_rid: AtomicU32::new(last_type_rid),
            last_resource_rid: AtomicU32::new(last_resource_rid),
            last_exported_type_rid: AtomicU32::new(last_exported_type_rid),
            next_synthetic_rid: AtomicU32::new(synthetic_rid_base),
            synthetic: DashMap::new(),
            listeners: RwLock::new(Vec::new()),
            unloaded: AtomicBool::new(false),
        })
    }

    /// Identity of the module
    pub fn key(&self) -> &ModuleKey {
        &self.info.key
    }

    /// Load information of the module
    pub fn info(&self) -> &ModuleInfo {
        &self.info
    }

    /// The metadata source of this module
    pub fn import(&self) -> &Arc<dyn MetadataImport> {
        &self.import
    }

    /// `true` for modules emitted at runtime
    pub fn is_dynamic(&self) -> bool {
        self.info.key.is_dynamic
    }

    /// `true` once the module-unload notification has been processed
    pub fn is_unloaded(&self) -> bool {
        self.unloaded.load(Ordering::Acquire)
    }

    /// Resolve `token` under `context`.
    ///
    /// The token is checked with the target before dispatching. Returns `None` for null, invalid
    /// or stale tokens.
    pub fn resolve(&self, token: Token, context: &GenericContext) -> Option<MetadataObject> {
        if token.is_null() || self.is_unloaded() {
            return None;
        }

        if !self.is_synthetic_token(token) && !self.import.is_valid_token(token) {
            trace!(module = %self.info.key, %token, "token rejected by target");
            return None;
        }

        self.resolve_prevalidated(token, context)
    }

    /// Resolve a token that came out of an enumeration of the target's metadata, skipping the
    /// validity check.
    pub fn resolve_prevalidated(
        &self,
        token: Token,
        context: &GenericContext,
    ) -> Option<MetadataObject> {
        if token.is_null() || self.is_unloaded() {
            return None;
        }

        let table = token.table_id()?;
        let resolver = RESOLVERS[table as usize]?;
        resolver(self, token.row(), context)
    }

    /// Resolve a `TypeDef` by rid.
    ///
    /// The first call builds the nesting relations of the whole type table.
    pub fn resolve_type_def(&self, rid: u32) -> Option<TypeDefRc> {
        self.type_def(rid, true)
    }

    fn type_def(&self, rid: u32, validate: bool) -> Option<TypeDefRc> {
        if rid == 0 || self.is_unloaded() {
            return None;
        }

        self.nested_index();
        if rid >= self.synthetic_rid_base {
            return self.types.get(rid);
        }

        self.types.get_or_create(rid, || {
            let token = Token::from_parts(TableId::TypeDef, rid);
            if validate && !self.import.is_valid_token(token) {
                return None;
            }

            Some(TypeDef::new(
                self.self_ref.clone(),
                self.import.clone(),
                token,
                token,
            ))
        })
    }

    /// Resolve a `Field` by rid, enumerating the members of its owner if needed
    pub fn resolve_field(&self, rid: u32) -> Option<FieldRc> {
        self.member(&self.fields, TableId::Field, rid)
    }

    /// Resolve a `MethodDef` by rid, enumerating the members of its owner if needed
    pub fn resolve_method(&self, rid: u32) -> Option<MethodRc> {
        self.member(&self.methods, TableId::MethodDef, rid)
    }

    /// Resolve a `Property` by rid, enumerating the members of its owner if needed
    pub fn resolve_property(&self, rid: u32) -> Option<PropertyRc> {
        self.member(&self.properties, TableId::Property, rid)
    }

    /// Resolve an `Event` by rid, enumerating the members of its owner if needed
    pub fn resolve_event(&self, rid: u32) -> Option<EventRc> {
        self.member(&self.events, TableId::Event, rid)
    }

    /// Member proxies are only ever created by their owner. A miss asks the owner to enumerate
    /// its members, and if the row is still unknown, to pick up rows appended since.
    fn member<T: Send + Sync + 'static>(
        &self,
        cache: &RowCache<T>,
        table: TableId,
        rid: u32,
    ) -> Option<Arc<T>> {
        if rid == 0 || self.is_unloaded() {
            return None;
        }
        if let Some(found) = cache.get(rid) {
            return Some(found);
        }

        let token = Token::from_parts(table, rid);
        let owner_token = match self.import.parent_of(token) {
            Ok(Some(owner)) => owner,
            Ok(None) => return None,
            Err(err) => {
                debug!(module = %self.info.key, %token, %err, "failed to query member owner");
                return None;
            }
        };

        let owner = self.type_for_original(owner_token)?;
        owner.load_members();
        if let Some(found) = cache.get(rid) {
            return Some(found);
        }

        owner.refresh_members();
        cache.get(rid)
    }

    fn type_for_original(&self, token: Token) -> Option<TypeDefRc> {
        if let Some(rid) = self.synthetic.get(&token).map(|entry| *entry.value()) {
            return self.types.get(rid);
        }

        self.type_def(token.row(), false)
    }

    pub(crate) fn field_proxy(&self, token: Token, owner: Weak<TypeDef>) -> FieldRc {
        self.fields.get_or_insert_with(token.row(), || {
            Arc::new(FieldProxy::new(
                self.self_ref.clone(),
                self.import.clone(),
                owner,
                token,
            ))
        })
    }

    pub(crate) fn method_proxy(&self, token: Token, owner: Weak<TypeDef>) -> MethodRc {
        self.methods.get_or_insert_with(token.row(), || {
            Arc::new(MethodProxy::new(
                self.self_ref.clone(),
                self.import.clone(),
                owner,
                token,
            ))
        })
    }

    pub(crate) fn property_proxy(&self, token: Token, owner: Weak<TypeDef>) -> PropertyRc {
        self.properties.get_or_insert_with(token.row(), || {
            Arc::new(PropertyProxy::new(
                self.self_ref.clone(),
                self.import.clone(),
                owner,
                token,
            ))
        })
    }

    pub(crate) fn event_proxy(&self, token: Token, owner: Weak<TypeDef>) -> EventRc {
        self.events.get_or_insert_with(token.row(), || {
            Arc::new(EventProxy::new(
                self.self_ref.clone(),
                self.import.clone(),
                owner,
                token,
            ))
        })
    }

    /// Resolve a `ManifestResource` by rid
    pub fn resolve_resource(&self, rid: u32) -> Option<ResourceRc> {
        self.resource(rid, true)
    }

    fn resource(&self, rid: u32, validate: bool) -> Option<ResourceRc> {
        if rid == 0 || self.is_unloaded() {
            return None;
        }

        self.resources.get_or_create(rid, || {
            let token = Token::from_parts(TableId::ManifestResource, rid);
            if validate && !self.import.is_valid_token(token) {
                return None;
            }

            Some(Arc::new(ResourceProxy::new(
                self.self_ref.clone(),
                self.import.clone(),
                token,
            )))
        })
    }

    /// Resolve a `TypeRef` by rid
    pub fn resolve_type_ref(&self, rid: u32) -> Option<TypeRefRc> {
        self.simple(&self.type_refs, TableId::TypeRef, rid, |row| match row {
            RawRow::TypeRef(raw) => Some(TypeRef::from(raw)),
            _ => None,
        })
    }

    /// Resolve a `ModuleRef` by rid
    pub fn resolve_module_ref(&self, rid: u32) -> Option<ModuleRefRc> {
        self.simple(&self.module_refs, TableId::ModuleRef, rid, |row| match row {
            RawRow::ModuleRef(raw) => Some(ModuleRef::from(raw)),
            _ => None,
        })
    }

    /// Resolve an `AssemblyRef` by rid
    pub fn resolve_assembly_ref(&self, rid: u32) -> Option<AssemblyRefRc> {
        self.simple(&self.assembly_refs, TableId::AssemblyRef, rid, |row| match row {
            RawRow::AssemblyRef(raw) => Some(AssemblyRef::from(raw)),
            _ => None,
        })
    }

    /// Resolve a `DeclSecurity` by rid
    pub fn resolve_decl_security(&self, rid: u32) -> Option<DeclSecurityRc> {
        self.simple(&self.decl_securities, TableId::DeclSecurity, rid, |row| match row {
            RawRow::DeclSecurity(raw) => Some(DeclSecurity::from(raw)),
            _ => None,
        })
    }

    /// Resolve a `File` by rid
    pub fn resolve_file(&self, rid: u32) -> Option<FileRc> {
        self.simple(&self.files, TableId::File, rid, |row| match row {
            RawRow::File(raw) => Some(File::from(raw)),
            _ => None,
        })
    }

    /// Resolve an `ExportedType` by rid
    pub fn resolve_exported_type(&self, rid: u32) -> Option<ExportedTypeRc> {
        self.simple(&self.exported_types, TableId::ExportedType, rid, |row| match row {
            RawRow::ExportedType(raw) => Some(ExportedType::from(raw)),
            _ => None,
        })
    }

    /// Resolve a `Param` by rid
    pub fn resolve_param(&self, rid: u32) -> Option<ParamRc> {
        self.simple(&self.params, TableId::Param, rid, |row| match row {
            RawRow::Param(raw) => Some(Param::read(raw, self.import.as_ref())),
            _ => None,
        })
    }

    /// Resolve a `GenericParam` by rid
    pub fn resolve_generic_param(&self, rid: u32) -> Option<GenericParamRc> {
        self.simple(&self.generic_params, TableId::GenericParam, rid, |row| match row {
            RawRow::GenericParam(raw) => Some(GenericParam::read(raw, self.import.as_ref())),
            _ => None,
        })
    }

    fn simple<T, F>(&self, cache: &RowCache<T>, table: TableId, rid: u32, build: F) -> Option<Arc<T>>
    where
        T: Send + Sync + 'static,
        F: FnOnce(RawRow) -> Option<T>,
    {
        if rid == 0 || self.is_unloaded() {
            return None;
        }

        cache.get_or_create(rid, || {
            build(self.read_row(table, rid)?).map(Arc::new)
        })
    }

    fn read_row(&self, table: TableId, rid: u32) -> Option<RawRow> {
        let token = Token::from_parts(table, rid);
        match self.import.row(token) {
            Ok(row) if row.table() == table => Some(row),
            Ok(row) => {
                debug!(module = %self.info.key, %token, table = ?row.table(), "row from unexpected table");
                None
            }
            Err(err) => {
                trace!(module = %self.info.key, %token, %err, "row not available");
                None
            }
        }
    }

    /// Resolve a `MemberRef` by rid under `context`
    pub fn resolve_member_ref(&self, rid: u32, context: &GenericContext) -> Option<MemberRefRc> {
        self.contextual(&self.member_refs, TableId::MemberRef, rid, context, |row| match row {
            RawRow::MemberRef(raw) => Some(MemberRef::build(self, raw, context)),
            _ => None,
        })
    }

    /// Resolve a `StandAloneSig` by rid under `context`
    pub fn resolve_standalone_sig(
        &self,
        rid: u32,
        context: &GenericContext,
    ) -> Option<StandAloneSigRc> {
        self.contextual(&self.standalone_sigs, TableId::StandAloneSig, rid, context, |row| match row {
            RawRow::StandAloneSig(raw) => Some(StandAloneSig::build(raw, context)),
            _ => None,
        })
    }

    /// Resolve a `TypeSpec` by rid under `context`
    pub fn resolve_type_spec(&self, rid: u32, context: &GenericContext) -> Option<TypeSpecRc> {
        self.contextual(&self.type_specs, TableId::TypeSpec, rid, context, |row| match row {
            RawRow::TypeSpec(raw) => Some(TypeSpec::build(self, raw, context)),
            _ => None,
        })
    }

    /// Resolve a `MethodSpec` by rid under `context`
    pub fn resolve_method_spec(&self, rid: u32, context: &GenericContext) -> Option<MethodSpecRc> {
        self.contextual(&self.method_specs, TableId::MethodSpec, rid, context, |row| match row {
            RawRow::MethodSpec(raw) => Some(MethodSpec::build(self, raw, context)),
            _ => None,
        })
    }

    /// Resolve a `GenericParamConstraint` by rid under `context`
    pub fn resolve_generic_param_constraint(
        &self,
        rid: u32,
        context: &GenericContext,
    ) -> Option<GenericParamConstraintRc> {
        self.contextual(
            &self.generic_param_constraints,
            TableId::GenericParamConstraint,
            rid,
            context,
            |row| match row {
                RawRow::GenericParamConstraint(raw) => {
                    Some(GenericParamConstraint::build(self, raw, context))
                }
                _ => None,
            },
        )
    }

    /// Resolve an `InterfaceImpl` by rid under `context`
    pub fn resolve_interface_impl(
        &self,
        rid: u32,
        context: &GenericContext,
    ) -> Option<InterfaceImplRc> {
        self.contextual(&self.interface_impls, TableId::InterfaceImpl, rid, context, |row| match row {
            RawRow::InterfaceImpl(raw) => Some(InterfaceImpl::build(self, raw, context)),
            _ => None,
        })
    }

    fn contextual<T, F>(
        &self,
        cache: &ContextCache<T>,
        table: TableId,
        rid: u32,
        context: &GenericContext,
        build: F,
    ) -> Option<Arc<T>>
    where
        T: ContainsGenericParameter,
        F: FnOnce(RawRow) -> Option<T>,
    {
        if rid == 0 || self.is_unloaded() {
            return None;
        }

        cache.resolve(
            rid,
            context,
            || build(self.read_row(table, rid)?).map(Arc::new),
            |value| !value.contains_generic_parameter(),
        )
    }

    fn nested_index(&self) -> Arc<NestedIndex> {
        if let Some(index) = read_lock!(self.nested).as_ref() {
            return index.clone();
        }

        let (index, complete) = self.build_nested_index();
        let index = Arc::new(index);
        if !complete {
            return index;
        }

        write_lock!(self.nested).get_or_insert(index).clone()
    }

    fn build_nested_index(&self) -> (NestedIndex, bool) {
        let mut index = NestedIndex::default();
        let mut complete = true;

        let mut types: Vec<(u32, Token)> = (1..=self.last_type_rid.load(Ordering::Acquire))
            .map(|rid| (rid, Token::from_parts(TableId::TypeDef, rid)))
            .collect();
        types.extend(
            self.synthetic
                .iter()
                .map(|entry| (*entry.value(), *entry.key())),
        );

        for (rid, original) in types {
            match self.import.enclosing_class(original) {
                Ok(Some(outer)) => {
                    let outer_rid = self
                        .synthetic
                        .get(&outer)
                        .map_or(outer.row(), |entry| *entry.value());
                    index.enclosing.insert(rid, outer_rid);
                    index.nested.entry(outer_rid).or_default().push(rid);
                }
                Ok(None) => {}
                Err(err) => {
                    debug!(module = %self.info.key, token = %original, %err, "failed to read enclosing class");
                    complete = false;
                }
            }
        }

        (index, complete)
    }

    /// Types nested directly inside the type `rid`
    pub fn nested_types(&self, rid: u32) -> Vec<TypeDefRc> {
        self.nested_index()
            .nested
            .get(&rid)
            .map(|nested| {
                nested
                    .iter()
                    .filter_map(|&rid| self.type_def(rid, false))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// The type enclosing the type `rid`, if it is nested
    pub fn enclosing_type(&self, rid: u32) -> Option<TypeDefRc> {
        let outer = *self.nested_index().enclosing.get(&rid)?;
        self.type_def(outer, false)
    }

    /// Every type known so far, including synthesized ones
    pub fn types(&self) -> Vec<TypeDefRc> {
        let mut types: Vec<TypeDefRc> = (1..=self.last_type_rid.load(Ordering::Acquire))
            .filter_map(|rid| self.type_def(rid, true))
            .collect();

        let mut synthetic: Vec<u32> = self.synthetic.iter().map(|entry| *entry.value()).collect();
        synthetic.sort_unstable();
        types.extend(synthetic.into_iter().filter_map(|rid| self.types.get(rid)));
        types
    }

    /// Every resource known so far
    pub fn resources(&self) -> Vec<ResourceRc> {
        (1..=self.last_resource_rid.load(Ordering::Acquire))
            .filter_map(|rid| self.resource(rid, true))
            .collect()
    }

    /// Every exported type known so far
    pub fn exported_types(&self) -> Vec<ExportedTypeRc> {
        (1..=self.last_exported_type_rid.load(Ordering::Acquire))
            .filter_map(|rid| self.resolve_exported_type(rid))
            .collect()
    }

    /// Probe for types the target appended since the last call.
    ///
    /// Only dynamic modules grow. Each new type is populated and announced to the
    /// [`TypeUpdate`] subscribers. Returns `true` if anything was found.
    ///
    /// # Errors
    /// [`Error::Cancelled`] if `cancel` fired; types found up to that point are kept.
    pub fn discover_new_types(&self, cancel: &CancellationToken) -> Result<bool> {
        self.discover_types(cancel, false)
    }

    fn discover_types(&self, cancel: &CancellationToken, from_load_class_event: bool) -> Result<bool> {
        self.probe_forward(TableId::TypeDef, &self.last_type_rid, cancel, |rid| {
            let Some(type_def) = self.type_def(rid, false) else {
                return;
            };
            let _ = type_def.ensure_initialized();
            type_def.load_members();

            *write_lock!(self.nested) = None;
            self.notify(&type_def, true, from_load_class_event);
        })
    }

    /// Probe for resources the target appended since the last call.
    ///
    /// # Errors
    /// [`Error::Cancelled`] if `cancel` fired.
    pub fn discover_new_resources(&self, cancel: &CancellationToken) -> Result<bool> {
        self.probe_forward(TableId::ManifestResource, &self.last_resource_rid, cancel, |rid| {
            if let Some(resource) = self.resource(rid, false) {
                let _ = resource.ensure_initialized();
            }
        })
    }

    /// Probe for exported types the target appended since the last call.
    ///
    /// # Errors
    /// [`Error::Cancelled`] if `cancel` fired.
    pub fn discover_new_exported_types(&self, cancel: &CancellationToken) -> Result<bool> {
        self.probe_forward(TableId::ExportedType, &self.last_exported_type_rid, cancel, |rid| {
            self.resolve_exported_type(rid);
        })
    }

    /// Walk forward from `mark` until the first rid the target rejects, bounded by the probe
    /// limit and the synthetic range.
    fn probe_forward<F>(
        &self,
        table: TableId,
        mark: &AtomicU32,
        cancel: &CancellationToken,
        mut found: F,
    ) -> Result<bool>
    where
        F: FnMut(u32),
    {
        if !self.is_dynamic() || self.is_unloaded() {
            return Ok(false);
        }

        let start = mark.load(Ordering::Acquire);
        let limit = start
            .saturating_add(self.max_discovery_probe)
            .min(self.synthetic_rid_base - 1);

        let mut any = false;
        let mut rid = start + 1;
        while rid <= limit {
            if let Err(err) = cancel.check() {
                debug!(module = %self.info.key, ?table, rid, "discovery cancelled");
                return Err(err);
            }

            if !self.import.is_valid_token(Token::from_parts(table, rid)) {
                break;
            }

            found(rid);
            mark.store(rid, Ordering::Release);
            any = true;
            rid += 1;
        }

        if rid > limit && limit > start {
            debug!(module = %self.info.key, ?table, limit, "discovery stopped at probe limit");
        }
        if any {
            debug!(module = %self.info.key, ?table, from = start + 1, to = rid - 1, "discovered new rows");
        } else {
            trace!(module = %self.info.key, ?table, "no new rows");
        }

        Ok(any)
    }

    /// Handle a class-load event for `token`.
    ///
    /// A type past the known rid range triggers discovery; a known type picks up members
    /// appended to it; a type metadata does not know about is synthesized.
    pub fn on_class_loaded(&self, token: Token) -> Option<TypeDefRc> {
        if self.is_unloaded() || !token.is_row_of(TableId::TypeDef) || token.row() == 0 {
            return None;
        }

        if let Some(rid) = self.synthetic.get(&token).map(|entry| *entry.value()) {
            return self.types.get(rid);
        }

        if !self.import.is_valid_token(token) {
            return self.synthesize_type(token);
        }

        if token.row() > self.last_type_rid.load(Ordering::Acquire) {
            if let Err(err) = self.discover_types(&CancellationToken::new(), true) {
                debug!(module = %self.info.key, %token, %err, "discovery after class load failed");
            }
            return self.type_def(token.row(), false);
        }

        let type_def = self.type_def(token.row(), false)?;
        if type_def.refresh_members() {
            self.notify(&type_def, false, true);
        }
        Some(type_def)
    }

    /// Register a type reported by the target that metadata does not list (yet).
    ///
    /// The type gets a rid from the synthetic range and keeps `token` as its original token.
    /// Registering the same token again returns the existing type.
    pub fn synthesize_type(&self, token: Token) -> Option<TypeDefRc> {
        if self.is_unloaded() {
            return None;
        }

        let mut created = None;
        let rid = *self.synthetic.entry(token).or_insert_with(|| {
            let rid = self.next_synthetic_rid.fetch_add(1, Ordering::AcqRel);
            if rid > MAX_RID {
                return 0;
            }

            let type_def = TypeDef::new(
                self.self_ref.clone(),
                self.import.clone(),
                Token::from_parts(TableId::TypeDef, rid),
                token,
            );
            self.types.insert(rid, type_def.clone());
            created = Some(type_def);
            rid
        });

        if rid == 0 {
            self.synthetic.remove(&token);
            debug!(module = %self.info.key, %token, "synthetic rid range exhausted");
            return None;
        }

        if let Some(type_def) = created {
            debug!(module = %self.info.key, original = %token, live = %type_def.token(), "synthesized type");
            *write_lock!(self.nested) = None;
            self.notify(&type_def, true, true);
            return Some(type_def);
        }

        self.types.get(rid)
    }

    /// Forget the type `rid` and its members after the target unloaded the class.
    ///
    /// Context-sensitive caches are dropped entirely since they may reference the type; the
    /// nesting relations are rebuilt on next use.
    pub fn invalidate_type(&self, rid: u32) {
        if let Some(type_def) = self.types.remove(rid) {
            for member in type_def.known_members() {
                match member.table_id() {
                    Some(TableId::Field) => {
                        self.fields.remove(member.row());
                    }
                    Some(TableId::MethodDef) => {
                        self.methods.remove(member.row());
                    }
                    Some(TableId::Property) => {
                        self.properties.remove(member.row());
                    }
                    Some(TableId::Event) => {
                        self.events.remove(member.row());
                    }
                    _ => {}
                }
            }
            type_def.invalidate();
            self.synthetic.remove(&type_def.original_token());
            debug!(module = %self.info.key, token = %type_def.token(), "type invalidated");
        }

        self.member_refs.clear();
        self.standalone_sigs.clear();
        self.type_specs.clear();
        self.method_specs.clear();
        self.generic_param_constraints.clear();
        self.interface_impls.clear();
        *write_lock!(self.nested) = None;
    }

    /// Handle a class-unload event for `token`, which may be the original token of a
    /// synthesized type.
    pub fn on_class_unloaded(&self, token: Token) {
        if !token.is_row_of(TableId::TypeDef) || token.row() == 0 {
            return;
        }

        let rid = self
            .synthetic
            .get(&token)
            .map_or(token.row(), |entry| *entry.value());
        self.invalidate_type(rid);
    }

    /// Evict everything after the module-unload notification. Any later resolution yields `None`.
    pub fn mark_unloaded(&self) {
        if self.unloaded.swap(true, Ordering::AcqRel) {
            return;
        }

        self.types.clear();
        self.fields.clear();
        self.methods.clear();
        self.properties.clear();
        self.events.clear();
        self.resources.clear();
        self.type_refs.clear();
        self.module_refs.clear();
        self.assembly_refs.clear();
        self.decl_securities.clear();
        self.files.clear();
        self.exported_types.clear();
        self.params.clear();
        self.generic_params.clear();
        self.member_refs.clear();
        self.standalone_sigs.clear();
        self.type_specs.clear();
        self.method_specs.clear();
        self.generic_param_constraints.clear();
        self.interface_impls.clear();
        self.synthetic.clear();
        *write_lock!(self.nested) = None;
        write_lock!(self.listeners).clear();

        debug!(module = %self.info.key, "module view unloaded");
    }

    /// Populate every type, member and simple row of the module.
    ///
    /// # Errors
    /// [`Error::Cancelled`] if `cancel` fired. Everything populated before that stays valid.
    pub fn load_everything(&self, cancel: &CancellationToken) -> Result<()> {
        let result = self.sweep(cancel);
        if let Err(Error::Cancelled) = &result {
            debug!(module = %self.info.key, "full sweep cancelled");
        }
        result
    }

    fn sweep(&self, cancel: &CancellationToken) -> Result<()> {
        for type_def in self.types() {
            cancel.check()?;
            let _ = type_def.ensure_initialized();
            for field in type_def.fields() {
                let _ = field.ensure_initialized();
            }
            for method in type_def.methods() {
                let _ = method.ensure_initialized();
            }
            for property in type_def.properties() {
                let _ = property.ensure_initialized();
            }
            for event in type_def.events() {
                let _ = event.ensure_initialized();
            }
        }

        for resource in self.resources() {
            cancel.check()?;
            let _ = resource.ensure_initialized();
        }

        for table in [
            TableId::TypeRef,
            TableId::ModuleRef,
            TableId::AssemblyRef,
            TableId::File,
            TableId::ExportedType,
            TableId::DeclSecurity,
        ] {
            let count = absent_on_error(
                Token::from_parts(table, 0),
                "row count",
                self.import.row_count(table),
            );
            for rid in 1..=count.min(self.synthetic_rid_base - 1) {
                cancel.check()?;
                self.resolve_prevalidated(Token::from_parts(table, rid), &GenericContext::empty());
            }
        }

        Ok(())
    }

    /// Subscribe to [`TypeUpdate`]s of this module
    pub fn subscribe_type_updates<F>(&self, listener: F)
    where
        F: Fn(&TypeUpdate) + Send + Sync + 'static,
    {
        write_lock!(self.listeners).push(Arc::new(listener));
    }

    fn notify(&self, type_def: &TypeDefRc, was_created: bool, from_load_class_event: bool) {
        let Some(module) = self.self_ref.upgrade() else {
            return;
        };

        let listeners = read_lock!(self.listeners).clone();
        if listeners.is_empty() {
            return;
        }

        let update = TypeUpdate {
            module,
            type_def: type_def.clone(),
            was_created,
            from_load_class_event,
        };
        for listener in listeners {
            listener(&update);
        }
    }

    fn is_synthetic_token(&self, token: Token) -> bool {
        token.is_row_of(TableId::TypeDef) && token.row() >= self.synthetic_rid_base
    }
}

impl std::fmt::Debug for ModuleView {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleView")
            .field("key", &self.info.key)
            .field("types", &self.last_type_rid.load(Ordering::Relaxed))
            .field("unloaded", &self.is_unloaded())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use super::*;
    use crate::{
        metadata::signatures::TypeSignature,
        test::{dynamic_module, static_module, MetadataBuilder},
    };

    #[test]
    fn test_simple_rows_are_cached() {
        let builder = MetadataBuilder::new();
        let type_ref = builder.type_ref(1, "System", "Object");
        let view = static_module(&builder);

        let first = view.resolve(type_ref, &GenericContext::empty()).unwrap();
        let second = view.resolve(type_ref, &GenericContext::empty()).unwrap();
        assert!(first.ptr_eq(&second));

        let MetadataObject::TypeRef(resolved) = first else {
            panic!("expected a TypeRef");
        };
        assert_eq!(resolved.full_name(), "System.Object");
    }

    #[test]
    fn test_invalid_tokens_resolve_to_none() {
        let builder = MetadataBuilder::new();
        builder.type_def(1, "App", "Program");
        let view = static_module(&builder);

        let empty = GenericContext::empty();
        assert!(view.resolve(Token::new(0), &empty).is_none());
        assert!(view.resolve(Token::new(0x0200_0000), &empty).is_none());
        assert!(view.resolve(Token::new(0x0200_0002), &empty).is_none());
        assert!(view.resolve(Token::new(0x0100_0001), &empty).is_none());
        assert!(view.resolve(Token::new(0x7000_0001), &empty).is_none());
        assert!(view.resolve(Token::new(0x0300_0001), &empty).is_none());
    }

    #[test]
    fn test_member_resolution_loads_owner() {
        let builder = MetadataBuilder::new();
        let program = builder.type_def(1, "App", "Program");
        let field = builder.field(program, 1, "count");
        let main = builder.method(program, 1, "Main");
        let view = static_module(&builder);

        let resolved = view.resolve_method(main.row()).unwrap();
        assert_eq!(resolved.name(), "Main");
        assert_eq!(resolved.owner().unwrap().token(), program);

        let owner = view.resolve_type_def(program.row()).unwrap();
        assert!(owner.members_loaded());
        assert!(Arc::ptr_eq(&owner.fields()[0], &view.resolve_field(field.row()).unwrap()));
    }

    #[test]
    fn test_member_appended_after_load_is_found() {
        let builder = MetadataBuilder::new();
        let program = builder.type_def(1, "App", "Program");
        builder.method(program, 1, "Main");
        let view = static_module(&builder);

        let owner = view.resolve_type_def(1).unwrap();
        assert_eq!(owner.methods().len(), 1);
        let first = owner.methods()[0].clone();

        let added = builder.method(program, 2, "Added");
        let resolved = view.resolve_method(added.row()).unwrap();
        assert_eq!(resolved.name(), "Added");
        assert_eq!(owner.methods().len(), 2);
        assert!(Arc::ptr_eq(&owner.methods()[0], &first));
    }

    #[test]
    fn test_nested_types() {
        let builder = MetadataBuilder::new();
        let outer = builder.type_def(1, "App", "Outer");
        let inner = builder.type_def(2, "", "Inner");
        builder.nest(inner, outer);
        let view = static_module(&builder);

        let inner_type = view.resolve_type_def(inner.row()).unwrap();
        assert_eq!(inner_type.full_name(), "App.Outer/Inner");
        assert_eq!(inner_type.declaring_type().unwrap().token(), outer);

        let nested = view.resolve_type_def(outer.row()).unwrap().nested_types();
        assert_eq!(nested.len(), 1);
        assert!(Arc::ptr_eq(&nested[0], &inner_type));
    }

    #[test]
    fn test_open_type_spec_is_not_cached() {
        let builder = MetadataBuilder::new();
        // GENERICINST CLASS TypeRef(1) 1 VAR 0
        builder.type_ref(1, "System.Collections.Generic", "List`1");
        let spec = builder.type_spec(1, vec![0x15, 0x12, 0x05, 0x01, 0x13, 0x00]);
        let view = static_module(&builder);

        let empty = GenericContext::empty();
        let first = view.resolve(spec, &empty).unwrap();
        let second = view.resolve(spec, &empty).unwrap();
        assert!(!first.ptr_eq(&second));
        assert_eq!(view.type_specs.cached_count(), 0);

        let closed = GenericContext::for_type(vec![TypeSignature::I4]);
        let first = view.resolve(spec, &closed).unwrap();
        let second = view.resolve(spec, &closed).unwrap();
        assert!(first.ptr_eq(&second));
        assert_eq!(view.type_specs.cached_count(), 1);
    }

    #[test]
    fn test_closed_type_spec_is_cached() {
        let builder = MetadataBuilder::new();
        builder.type_ref(1, "System.Collections.Generic", "List`1");
        let spec = builder.type_spec(1, vec![0x15, 0x12, 0x05, 0x01, 0x08]);
        let view = static_module(&builder);

        let first = view.resolve(spec, &GenericContext::empty()).unwrap();
        let second = view.resolve(spec, &GenericContext::empty()).unwrap();
        assert!(first.ptr_eq(&second));
    }

    #[test]
    fn test_discovery_on_static_module_is_noop() {
        let builder = MetadataBuilder::new();
        builder.type_def(1, "App", "Program");
        let view = static_module(&builder);

        builder.type_def(2, "App", "Late");
        assert!(!view.discover_new_types(&CancellationToken::new()).unwrap());
        assert_eq!(view.types().len(), 1);
    }

    #[test]
    fn test_discovery_notifies_subscribers() {
        let builder = MetadataBuilder::new();
        builder.type_def(1, "Dyn", "A");
        let view = dynamic_module(&builder);

        let created = Arc::new(AtomicUsize::new(0));
        let counter = created.clone();
        view.subscribe_type_updates(move |update| {
            assert!(update.was_created);
            assert!(!update.from_load_class_event);
            counter.fetch_add(1, Ordering::SeqCst);
        });

        builder.type_def(2, "Dyn", "B");
        builder.type_def(3, "Dyn", "C");
        assert!(view.discover_new_types(&CancellationToken::new()).unwrap());
        assert!(!view.discover_new_types(&CancellationToken::new()).unwrap());
        assert_eq!(created.load(Ordering::SeqCst), 2);
        assert_eq!(view.types().len(), 3);
    }

    #[test]
    fn test_class_loads_then_discovery_announce_each_new_type_once() {
        let builder = MetadataBuilder::new();
        let first = builder.type_def(1, "Dyn", "A");
        let view = dynamic_module(&builder);
        let known = view.resolve_type_def(first.row()).unwrap();

        let updates = Arc::new(std::sync::Mutex::new(Vec::new()));
        let sink = updates.clone();
        view.subscribe_type_updates(move |update| {
            sink.lock().unwrap().push((
                update.type_def.clone(),
                update.was_created,
                update.from_load_class_event,
            ));
        });

        let second = builder.type_def(2, "Dyn", "B");
        let third = builder.type_def(3, "Dyn", "C");

        let loaded_second = view.on_class_loaded(second).unwrap();
        let loaded_third = view.on_class_loaded(third).unwrap();
        assert!(!view.discover_new_types(&CancellationToken::new()).unwrap());

        let updates = updates.lock().unwrap();
        let announced: Vec<Token> = updates.iter().map(|(t, _, _)| t.token()).collect();
        assert_eq!(announced, vec![second, third]);
        assert!(updates.iter().all(|(_, created, from_event)| *created && *from_event));
        assert!(Arc::ptr_eq(&updates[0].0, &loaded_second));
        assert!(Arc::ptr_eq(&updates[1].0, &loaded_third));

        let types = view.types();
        assert_eq!(types.len(), 3);
        assert!(Arc::ptr_eq(&types[0], &known));
        assert!(Arc::ptr_eq(&types[1], &loaded_second));
        assert!(Arc::ptr_eq(&types[2], &loaded_third));
        assert!(Arc::ptr_eq(&view.resolve_type_def(first.row()).unwrap(), &known));
    }

    #[test]
    fn test_discovery_respects_probe_limit() {
        let builder = MetadataBuilder::new();
        let config = EngineConfig {
            max_discovery_probe: 2,
            ..EngineConfig::default()
        };
        let view = ModuleView::new(
            ModuleInfo::new(ModuleKey::new("Dyn", "Dyn.dll", true, true)),
            builder.import(),
            &config,
        );

        for rid in 1..=5 {
            builder.type_def(rid, "Dyn", &format!("T{rid}"));
        }

        let cancel = CancellationToken::new();
        assert!(view.discover_new_types(&cancel).unwrap());
        assert_eq!(view.types().len(), 2);
        assert!(view.discover_new_types(&cancel).unwrap());
        assert!(view.discover_new_types(&cancel).unwrap());
        assert!(!view.discover_new_types(&cancel).unwrap());
        assert_eq!(view.types().len(), 5);
    }

    #[test]
    fn test_cancelled_discovery() {
        let builder = MetadataBuilder::new();
        let view = dynamic_module(&builder);
        builder.type_def(1, "Dyn", "A");

        let cancel = CancellationToken::new();
        cancel.cancel();
        assert!(matches!(
            view.discover_new_types(&cancel),
            Err(Error::Cancelled)
        ));
        assert!(view.discover_new_types(&CancellationToken::new()).unwrap());
    }

    #[test]
    fn test_synthesize_type() {
        let builder = MetadataBuilder::new();
        builder.type_def(1, "Dyn", "A");
        let view = dynamic_module(&builder);

        let unknown = Token::new(0x0200_0010);
        let synthetic = view.on_class_loaded(unknown).unwrap();
        assert!(synthetic.is_synthetic());
        assert_eq!(synthetic.original_token(), unknown);
        assert_eq!(synthetic.rid(), 0x00F0_0000);

        let again = view.synthesize_type(unknown).unwrap();
        assert!(Arc::ptr_eq(&synthetic, &again));

        let resolved = view
            .resolve(synthetic.token(), &GenericContext::empty())
            .unwrap();
        assert_eq!(resolved.token(), synthetic.token());
        assert_eq!(view.types().len(), 2);
    }

    #[test]
    fn test_class_unload_of_synthesized_type() {
        let builder = MetadataBuilder::new();
        let view = dynamic_module(&builder);

        let unknown = Token::new(0x0200_0010);
        let synthetic = view.on_class_loaded(unknown).unwrap();
        view.on_class_unloaded(unknown);

        assert!(view.resolve_type_def(synthetic.rid()).is_none());
        assert!(view.types().is_empty());
        assert!(!Arc::ptr_eq(&synthetic, &view.synthesize_type(unknown).unwrap()));
    }

    #[test]
    fn test_invalidate_type_evicts_members() {
        let builder = MetadataBuilder::new();
        let program = builder.type_def(1, "App", "Program");
        let main = builder.method(program, 1, "Main");
        let view = static_module(&builder);

        let before = view.resolve_method(main.row()).unwrap();
        assert_eq!(before.name(), "Main");
        assert!(before.is_initialized());
        view.invalidate_type(program.row());
        assert!(!before.is_initialized());

        let after = view.resolve_method(main.row()).unwrap();
        assert!(!Arc::ptr_eq(&before, &after));
        assert_eq!(after.name(), "Main");
    }

    #[test]
    fn test_unloaded_module_resolves_nothing() {
        let builder = MetadataBuilder::new();
        let program = builder.type_def(1, "App", "Program");
        let view = static_module(&builder);

        let type_def = view.resolve_type_def(program.row()).unwrap();
        view.mark_unloaded();
        assert!(view.is_unloaded());
        assert!(view.resolve(program, &GenericContext::empty()).is_none());
        assert_eq!(type_def.token(), program);
    }

    #[test]
    fn test_load_everything_cancelled() {
        let builder = MetadataBuilder::new();
        let program = builder.type_def(1, "App", "Program");
        builder.method(program, 1, "Main");
        let view = static_module(&builder);

        let cancel = CancellationToken::new();
        cancel.cancel();
        assert!(view.load_everything(&cancel).is_err());

        view.load_everything(&CancellationToken::new()).unwrap();
        let type_def = view.resolve_type_def(1).unwrap();
        assert!(type_def.is_initialized());
        assert!(type_def.methods()[0].is_initialized());
    }
}
