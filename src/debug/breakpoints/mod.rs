//! Logical breakpoints and their bindings to loaded modules.
//!
//! A [`LogicalBreakpoint`] is what the user asked for: a location in a module identified by its
//! [`ModuleKey`], or an event type. It outlives the module instances it binds to. Every loaded
//! instance of a matching module gets one [`BoundBreakpoint`], a native breakpoint created by the
//! transport. Unloading the instance drops the binding; loading the module again binds anew.
//!
//! # Examples
//!
//! ```rust
//! use livescope::debug::breakpoints::{BreakpointCondition, BreakpointRequest, HitCondition};
//! use livescope::metadata::module::ModuleKey;
//! use livescope::metadata::token::Token;
//!
//! let key = ModuleKey::new("App", "App.dll", false, false);
//! let request = BreakpointRequest::il(key, Token::new(0x0600_0001), 0)
//!     .with_condition(BreakpointCondition::hit_count(HitCondition::AtLeast(3)));
//! assert!(request.is_enabled());
//! ```

mod condition;
mod manager;

pub use condition::{BreakpointCondition, ConditionContext, HitCondition};
pub use manager::{BindErrorListener, BreakpointManager};

use crate::{
    debug::{
        event::DebugEventType,
        handles::{ModuleHandle, NativeBreakpointHandle},
        transport::CodeKind,
    },
    metadata::{module::ModuleKey, token::Token},
};

/// Identity of a logical breakpoint, unique within a [`BreakpointManager`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BreakpointId(pub u64);

impl std::fmt::Display for BreakpointId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "bp#{}", self.0)
    }
}

/// Why a code breakpoint could not be bound to a module instance
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BindError {
    /// The module has no function with the breakpoint's token
    #[error("Function not found")]
    FunctionNotFound,
    /// The target refused to create the native breakpoint
    #[error("Could not create breakpoint")]
    CouldNotCreateBreakpoint,
    /// Anything else
    #[error("{0}")]
    OtherError(String),
}

/// A location in code
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CodeBreakpoint {
    /// Module the function lives in
    pub module: ModuleKey,
    /// `MethodDef` token of the function
    pub token: Token,
    /// Offset into the function's code
    pub offset: u32,
    /// What the offset is relative to
    pub kind: CodeKind,
}

impl CodeBreakpoint {
    /// A location at an IL offset
    pub fn il(module: ModuleKey, token: Token, offset: u32) -> Self {
        CodeBreakpoint {
            module,
            token,
            offset,
            kind: CodeKind::Il,
        }
    }

    /// A location at a native offset
    pub fn native(module: ModuleKey, token: Token, offset: u32) -> Self {
        CodeBreakpoint {
            module,
            token,
            offset,
            kind: CodeKind::Native,
        }
    }
}

/// Every event of one type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AnyEventBreakpoint {
    /// The event type to match
    pub event: DebugEventType,
}

/// What a logical breakpoint matches
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum BreakpointKind {
    /// Hits of a bound code location
    Code(CodeBreakpoint),
    /// Events of one type
    AnyEvent(AnyEventBreakpoint),
}

/// A breakpoint to add
#[derive(Debug)]
pub struct BreakpointRequest {
    pub(crate) kind: BreakpointKind,
    pub(crate) condition: Option<BreakpointCondition>,
    pub(crate) enabled: bool,
}

impl BreakpointRequest {
    /// A breakpoint at an IL offset of the function `token` in module `module`
    pub fn il(module: ModuleKey, token: Token, offset: u32) -> Self {
        Self::code(CodeBreakpoint::il(module, token, offset))
    }

    /// A breakpoint at a native offset of the function `token` in module `module`
    pub fn native(module: ModuleKey, token: Token, offset: u32) -> Self {
        Self::code(CodeBreakpoint::native(module, token, offset))
    }

    /// A breakpoint at `location`
    pub fn code(location: CodeBreakpoint) -> Self {
        BreakpointRequest {
            kind: BreakpointKind::Code(location),
            condition: None,
            enabled: true,
        }
    }

    /// A breakpoint matching every event of type `event`
    pub fn any_event(event: DebugEventType) -> Self {
        BreakpointRequest {
            kind: BreakpointKind::AnyEvent(AnyEventBreakpoint { event }),
            condition: None,
            enabled: true,
        }
    }

    /// Run `condition` on every match instead of always pausing
    #[must_use]
    pub fn with_condition(mut self, condition: BreakpointCondition) -> Self {
        self.condition = Some(condition);
        self
    }

    /// Add the breakpoint disabled
    #[must_use]
    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    /// What the breakpoint will match
    pub fn kind(&self) -> &BreakpointKind {
        &self.kind
    }

    /// `false` if the breakpoint will be added disabled
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }
}

/// A code breakpoint bound to one module instance
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoundBreakpoint {
    /// The module instance
    pub module: ModuleHandle,
    /// The native breakpoint created in it
    pub native: NativeBreakpointHandle,
    /// Last state pushed to the native breakpoint
    pub active: bool,
}

/// A registered breakpoint
#[derive(Debug)]
pub struct LogicalBreakpoint {
    id: BreakpointId,
    kind: BreakpointKind,
    enabled: bool,
    hits: u64,
    bind_error: Option<BindError>,
    bound: Vec<BoundBreakpoint>,
    condition: Option<BreakpointCondition>,
}

impl LogicalBreakpoint {
    pub(crate) fn new(id: BreakpointId, request: BreakpointRequest) -> Self {
        LogicalBreakpoint {
            id,
            kind: request.kind,
            enabled: request.enabled,
            hits: 0,
            bind_error: None,
            bound: Vec::new(),
            condition: request.condition,
        }
    }

    /// Identity
    pub fn id(&self) -> BreakpointId {
        self.id
    }

    /// What the breakpoint matches
    pub fn kind(&self) -> &BreakpointKind {
        &self.kind
    }

    /// `true` if matches are dispatched to the condition
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Number of matching events while enabled
    pub fn hits(&self) -> u64 {
        self.hits
    }

    /// Outcome of the last binding attempt, `None` if it succeeded or none was made
    pub fn bind_error(&self) -> Option<&BindError> {
        self.bind_error.as_ref()
    }

    /// Current bindings
    pub fn bound(&self) -> &[BoundBreakpoint] {
        &self.bound
    }

    fn code(&self) -> Option<&CodeBreakpoint> {
        match &self.kind {
            BreakpointKind::Code(code) => Some(code),
            BreakpointKind::AnyEvent(_) => None,
        }
    }
}
