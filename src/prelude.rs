//! # livescope Prelude
//!
//! This module provides a convenient prelude for the most commonly used types and traits
//! from the livescope library. Import this module to get quick access to the essential
//! types for driving a target and reading its live metadata.

// ================================================================================================
// Core Types and Error Handling
// ================================================================================================

/// The main error type for all livescope operations
pub use crate::Error;

/// The result type used throughout livescope
pub use crate::Result;

/// Engine configuration
pub use crate::config::EngineConfig;

/// Cooperative cancellation of long sweeps
pub use crate::utils::CancellationToken;

// ================================================================================================
// Live Metadata Model
// ================================================================================================

/// Metadata token type for referencing table entries
pub use crate::metadata::token::Token;

/// Metadata table identifiers
pub use crate::metadata::tableid::TableId;

/// Module identity and the per-module view
pub use crate::metadata::module::{ModuleInfo, ModuleKey, ModuleView, TypeUpdate};

/// The out-of-process query interface, its raw rows and the in-memory implementation
pub use crate::metadata::{
    import::{MetadataImport, RawRow, TypeDefRaw, TypeRefRaw},
    memory::MemoryImport,
};

/// Resolved objects and generic context
pub use crate::metadata::{
    context::GenericContext,
    object::{ContainsGenericParameter, MetadataObject},
};

/// Lazy member proxies
pub use crate::metadata::members::{
    EventProxy, EventRc, FieldProxy, FieldRc, MethodProxy, MethodRc, PropertyProxy, PropertyRc,
    ResourceProxy, ResourceRc, TypeDef, TypeDefRc,
};

/// Signatures
pub use crate::metadata::signatures::{SignatureMethod, TypeSignature};

// ================================================================================================
// Debugger
// ================================================================================================

/// The transport boundary
pub use crate::debug::transport::{CodeKind, DebugTransport, RawCallback};

/// Typed events
pub use crate::debug::event::{DebugEvent, DebugEventKind, DebugEventType, PauseReason};

/// Breakpoints
pub use crate::debug::breakpoints::{
    BindError, BreakpointCondition, BreakpointId, BreakpointRequest, HitCondition,
    LogicalBreakpoint,
};

/// Startup strategies
pub use crate::debug::startup::BreakProcessKind;

/// The engine and its thread
pub use crate::debug::{engine::DebuggerEngine, thread::DebuggerThread};
