//! An in-memory [`MetadataImport`].
//!
//! `MemoryImport` holds rows captured from a target (or built by hand) and answers queries the
//! way a live transport would. Rows can be appended and removed while a
//! [`crate::metadata::module::ModuleView`] is reading from it, which is how dynamic module
//! growth and class unloads are replayed. It also counts queries and can simulate a lost
//! connection.

use std::{
    collections::{BTreeMap, HashMap},
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        RwLock,
    },
};

use crate::{
    metadata::{
        import::{
            ConstantRaw, CustomAttributeRaw, MetadataImport, MethodSemanticsRaw, RawRow,
        },
        tableid::TableId,
        token::Token,
    },
    Error, Result,
};

#[derive(Default)]
struct Tables {
    rows: BTreeMap<Token, RawRow>,
    children: HashMap<(Token, TableId), Vec<Token>>,
    parents: HashMap<Token, Token>,
    enclosing: HashMap<Token, Token>,
    constants: HashMap<Token, ConstantRaw>,
    marshal: HashMap<Token, Vec<u8>>,
    rvas: HashMap<Token, u32>,
    attributes: HashMap<Token, Vec<CustomAttributeRaw>>,
    semantics: HashMap<Token, Vec<MethodSemanticsRaw>>,
    bodies: HashMap<Token, Vec<u8>>,
}

/// Metadata held in memory, queryable through [`MetadataImport`].
///
/// # Examples
///
/// ```rust
/// use livescope::metadata::import::{MetadataImport, RawRow, TypeRefRaw};
/// use livescope::metadata::memory::MemoryImport;
/// use livescope::metadata::token::Token;
///
/// let import = MemoryImport::new();
/// import.insert(RawRow::TypeRef(TypeRefRaw {
///     token: Token::new(0x0100_0001),
///     resolution_scope: Token::new(0x2300_0001),
///     name: "Object".to_string(),
///     namespace: "System".to_string(),
/// }));
///
/// assert!(import.is_valid_token(Token::new(0x0100_0001)));
/// assert!(!import.is_valid_token(Token::new(0x0100_0002)));
/// ```
#[derive(Default)]
pub struct MemoryImport {
    tables: RwLock<Tables>,
    disconnected: AtomicBool,
    queries: AtomicUsize,
}

impl MemoryImport {
    /// Create an empty import
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a row
    pub fn insert(&self, row: RawRow) {
        let mut tables = write_lock!(self.tables);
        tables.rows.insert(row.token(), row);
    }

    /// Add a row owned by `owner`. Member rows also record `owner` as their parent.
    pub fn insert_child(&self, owner: Token, row: RawRow) {
        let token = row.token();
        let table = row.table();

        let mut tables = write_lock!(self.tables);
        tables.rows.insert(token, row);
        tables.children.entry((owner, table)).or_default().push(token);
        if table.is_member() {
            tables.parents.insert(token, owner);
        }
    }

    /// Remove a row and every relation that mentions it
    pub fn remove(&self, token: Token) {
        let mut tables = write_lock!(self.tables);
        tables.rows.remove(&token);
        tables.parents.remove(&token);
        tables.enclosing.remove(&token);
        for children in tables.children.values_mut() {
            children.retain(|child| *child != token);
        }
    }

    /// Record `nested` as a nested type of `enclosing`
    pub fn set_enclosing(&self, nested: Token, enclosing: Token) {
        write_lock!(self.tables).enclosing.insert(nested, enclosing);
    }

    /// Set the default value of a field, parameter or property
    pub fn set_constant(&self, owner: Token, constant: ConstantRaw) {
        write_lock!(self.tables).constants.insert(owner, constant);
    }

    /// Set the marshalling descriptor of a field or parameter
    pub fn set_field_marshal(&self, owner: Token, descriptor: Vec<u8>) {
        write_lock!(self.tables).marshal.insert(owner, descriptor);
    }

    /// Set the RVA of a field's initial value
    pub fn set_field_rva(&self, field: Token, rva: u32) {
        write_lock!(self.tables).rvas.insert(field, rva);
    }

    /// Attach a custom attribute to `owner`
    pub fn add_custom_attribute(&self, owner: Token, attribute: CustomAttributeRaw) {
        write_lock!(self.tables)
            .attributes
            .entry(owner)
            .or_default()
            .push(attribute);
    }

    /// Attach an accessor to a property or event
    pub fn add_method_semantics(&self, owner: Token, semantics: MethodSemanticsRaw) {
        write_lock!(self.tables)
            .semantics
            .entry(owner)
            .or_default()
            .push(semantics);
    }

    /// Set the IL body of a method
    pub fn set_method_body(&self, method: Token, body: Vec<u8>) {
        write_lock!(self.tables).bodies.insert(method, body);
    }

    /// Simulate losing (or regaining) the connection to the target
    pub fn set_disconnected(&self, disconnected: bool) {
        self.disconnected.store(disconnected, Ordering::SeqCst);
    }

    /// Number of queries answered so far, [`MetadataImport::is_valid_token`] excluded
    pub fn query_count(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }

    fn query(&self) -> Result<std::sync::RwLockReadGuard<'_, Tables>> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        if self.disconnected.load(Ordering::SeqCst) {
            return Err(Error::TargetDisconnected);
        }

        Ok(read_lock!(self.tables))
    }
}

impl MetadataImport for MemoryImport {
    fn is_valid_token(&self, token: Token) -> bool {
        if self.disconnected.load(Ordering::SeqCst) {
            return false;
        }

        read_lock!(self.tables).rows.contains_key(&token)
    }

    fn row_count(&self, table: TableId) -> Result<u32> {
        let tables = self.query()?;
        let start = Token::from_parts(table, 0);
        let end = Token::from_parts(table, crate::metadata::token::MAX_RID);
        Ok(tables
            .rows
            .range(start..=end)
            .next_back()
            .map_or(0, |(token, _)| token.row()))
    }

    fn row(&self, token: Token) -> Result<RawRow> {
        self.query()?
            .rows
            .get(&token)
            .cloned()
            .ok_or(Error::InvalidToken(token))
    }

    fn children(&self, owner: Token, table: TableId) -> Result<Vec<Token>> {
        Ok(self
            .query()?
            .children
            .get(&(owner, table))
            .cloned()
            .unwrap_or_default())
    }

    fn parent_of(&self, member: Token) -> Result<Option<Token>> {
        Ok(self.query()?.parents.get(&member).copied())
    }

    fn enclosing_class(&self, type_def: Token) -> Result<Option<Token>> {
        Ok(self.query()?.enclosing.get(&type_def).copied())
    }

    fn constant(&self, owner: Token) -> Result<Option<ConstantRaw>> {
        Ok(self.query()?.constants.get(&owner).cloned())
    }

    fn field_marshal(&self, owner: Token) -> Result<Option<Vec<u8>>> {
        Ok(self.query()?.marshal.get(&owner).cloned())
    }

    fn field_rva(&self, field: Token) -> Result<Option<u32>> {
        Ok(self.query()?.rvas.get(&field).copied())
    }

    fn custom_attributes(&self, owner: Token) -> Result<Vec<CustomAttributeRaw>> {
        Ok(self
            .query()?
            .attributes
            .get(&owner)
            .cloned()
            .unwrap_or_default())
    }

    fn method_semantics(&self, owner: Token) -> Result<Vec<MethodSemanticsRaw>> {
        Ok(self
            .query()?
            .semantics
            .get(&owner)
            .cloned()
            .unwrap_or_default())
    }

    fn method_body(&self, method: Token) -> Result<Option<Vec<u8>>> {
        Ok(self.query()?.bodies.get(&method).cloned())
    }
}
