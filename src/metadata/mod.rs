//! Live metadata of modules loaded in the target process.
//!
//! Nothing here reads a file. Every row comes from a [`import::MetadataImport`], which answers
//! queries against the running target (or, for [`memory::MemoryImport`], against rows held in
//! memory). The [`module::ModuleView`] on top of it hands out stable, lazily populated objects.
//!
//! # Key Components
//!
//! - [`module`] - [`module::ModuleView`], the per-module token resolver and its rid caches
//! - [`members`] - lazy member proxies, reference rows and context-sensitive rows
//! - [`signatures`] - ECMA-335 signature blobs, generic-parameter queries and instantiation
//! - [`cache`] - [`cache::RowCache`] and the reserve-then-discard [`cache::ContextCache`]
//! - [`lazy`] - [`lazy::LazyInit`], the one-shot initialisation state of every proxy
//! - [`token`] - Metadata table row references used throughout .NET
//!
//! # Examples
//!
//! ```rust
//! use std::sync::Arc;
//! use livescope::config::EngineConfig;
//! use livescope::metadata::context::GenericContext;
//! use livescope::metadata::import::{RawRow, TypeRefRaw};
//! use livescope::metadata::memory::MemoryImport;
//! use livescope::metadata::module::{ModuleInfo, ModuleKey, ModuleView};
//! use livescope::metadata::object::MetadataObject;
//! use livescope::metadata::token::Token;
//!
//! let import = Arc::new(MemoryImport::new());
//! import.insert(RawRow::TypeRef(TypeRefRaw {
//!     token: Token::new(0x0100_0001),
//!     resolution_scope: Token::new(0x2300_0001),
//!     name: "Console".to_string(),
//!     namespace: "System".to_string(),
//! }));
//!
//! let key = ModuleKey::new("App", "App.dll", false, false);
//! let view = ModuleView::new(ModuleInfo::new(key), import, &EngineConfig::default());
//!
//! if let Some(MetadataObject::TypeRef(type_ref)) =
//!     view.resolve(Token::new(0x0100_0001), &GenericContext::empty())
//! {
//!     assert_eq!(type_ref.full_name(), "System.Console");
//! }
//! ```

/// Rid caches owned by a module view
pub mod cache;
/// Generic arguments in scope while resolving a token
pub mod context;
/// Implementation of the Header of CIL
pub mod cor20header;
/// The out-of-process metadata query interface and its raw rows
pub mod import;
/// One-shot initialisation state of lazy proxies
pub mod lazy;
/// Objects handed out for metadata rows
pub mod members;
/// In-memory implementation of the metadata query interface
pub mod memory;
/// The live view of a loaded module
pub mod module;
/// The closed set of resolved objects
pub mod object;
/// Implementation of method and type signatures
pub mod signatures;
/// Identifiers of the metadata tables
pub mod tableid;
/// Commonly used metadata token type
pub mod token;
