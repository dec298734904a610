//! The boundary with the native debugging interface.
//!
//! A [`DebugTransport`] delivers one [`RawCallback`] at a time and offers the few control
//! operations the engine needs. It is created and used on the debugger thread only, see
//! [`crate::debug::thread::DebuggerThread`].

use std::sync::Arc;

use strum::FromRepr;
use widestring::U16String;

use crate::{
    debug::handles::{
        AppDomainHandle, AssemblyHandle, ControllerHandle, FunctionHandle, ModuleHandle,
        NativeBreakpointHandle, ProcessHandle, ThreadHandle,
    },
    metadata::{import::MetadataImport, module::ModuleInfo, token::Token},
    Result,
};

/// The kind of code a breakpoint is placed in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CodeKind {
    /// IL code, offsets are IL offsets
    Il,
    /// Jitted native code, offsets are native offsets
    Native,
}

/// Callback codes of the native interface, in its vtable order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, FromRepr)]
#[repr(u32)]
#[allow(missing_docs)]
pub enum CallbackCode {
    Breakpoint = 0,
    StepComplete = 1,
    Break = 2,
    Exception = 3,
    EvalComplete = 4,
    EvalException = 5,
    CreateProcess = 6,
    ExitProcess = 7,
    CreateThread = 8,
    ExitThread = 9,
    LoadModule = 10,
    UnloadModule = 11,
    LoadClass = 12,
    UnloadClass = 13,
    DebuggerError = 14,
    LogMessage = 15,
    LogSwitch = 16,
    CreateAppDomain = 17,
    ExitAppDomain = 18,
    LoadAssembly = 19,
    UnloadAssembly = 20,
    ControlCTrap = 21,
    NameChange = 22,
    UpdateModuleSymbols = 23,
    EditAndContinueRemap = 24,
    BreakpointSetError = 25,
    FunctionRemapOpportunity = 26,
    CreateConnection = 27,
    ChangeConnection = 28,
    DestroyConnection = 29,
    Exception2 = 30,
    ExceptionUnwind = 31,
    FunctionRemapComplete = 32,
    MdaNotification = 33,
    CustomNotification = 34,
}

/// One callback exactly as the transport received it.
///
/// Only `code` and `controller` are always present; which of the other fields are required
/// depends on the code. [`crate::debug::event::DebugEvent::decode`] checks them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawCallback {
    /// Raw callback code, see [`CallbackCode`]
    pub code: u32,
    /// The process or application domain to resume afterwards
    pub controller: ControllerHandle,
    /// Process
    pub process: Option<ProcessHandle>,
    /// Application domain
    pub app_domain: Option<AppDomainHandle>,
    /// Thread
    pub thread: Option<ThreadHandle>,
    /// Assembly
    pub assembly: Option<AssemblyHandle>,
    /// Module
    pub module: Option<ModuleHandle>,
    /// Function
    pub function: Option<FunctionHandle>,
    /// Breakpoint
    pub breakpoint: Option<NativeBreakpointHandle>,
    /// Class token for class events
    pub token: Option<Token>,
    /// Offset, or step reason for step events
    pub offset: u32,
    /// Sub-kind: exception event kind, unwind kind, log switch reason
    pub flags: u32,
    /// Log level
    pub level: i32,
    /// `HRESULT` for error events
    pub error_code: i32,
    /// Connection id
    pub connection_id: u32,
    /// Message, connection name or MDA description
    pub text: Option<U16String>,
    /// Log switch name or MDA name
    pub name: Option<U16String>,
}

impl RawCallback {
    /// An empty callback with the given code
    pub fn new(code: CallbackCode, controller: ControllerHandle) -> Self {
        RawCallback {
            code: code as u32,
            controller,
            process: None,
            app_domain: None,
            thread: None,
            assembly: None,
            module: None,
            function: None,
            breakpoint: None,
            token: None,
            offset: 0,
            flags: 0,
            level: 0,
            error_code: 0,
            connection_id: 0,
            text: None,
            name: None,
        }
    }

    /// Set the process
    #[must_use]
    pub fn with_process(mut self, process: ProcessHandle) -> Self {
        self.process = Some(process);
        self
    }

    /// Set the application domain
    #[must_use]
    pub fn with_app_domain(mut self, app_domain: AppDomainHandle) -> Self {
        self.app_domain = Some(app_domain);
        self
    }

    /// Set the thread
    #[must_use]
    pub fn with_thread(mut self, thread: ThreadHandle) -> Self {
        self.thread = Some(thread);
        self
    }

    /// Set the assembly
    #[must_use]
    pub fn with_assembly(mut self, assembly: AssemblyHandle) -> Self {
        self.assembly = Some(assembly);
        self
    }

    /// Set the module
    #[must_use]
    pub fn with_module(mut self, module: ModuleHandle) -> Self {
        self.module = Some(module);
        self
    }

    /// Set the function
    #[must_use]
    pub fn with_function(mut self, function: FunctionHandle) -> Self {
        self.function = Some(function);
        self
    }

    /// Set the breakpoint
    #[must_use]
    pub fn with_breakpoint(mut self, breakpoint: NativeBreakpointHandle) -> Self {
        self.breakpoint = Some(breakpoint);
        self
    }

    /// Set the class token
    #[must_use]
    pub fn with_token(mut self, token: Token) -> Self {
        self.token = Some(token);
        self
    }

    /// Set the sub-kind flags
    #[must_use]
    pub fn with_flags(mut self, flags: u32) -> Self {
        self.flags = flags;
        self
    }

    /// Set the message text
    #[must_use]
    pub fn with_text(mut self, text: &str) -> Self {
        self.text = Some(U16String::from_str(text));
        self
    }

    /// Set the name
    #[must_use]
    pub fn with_name(mut self, name: &str) -> Self {
        self.name = Some(U16String::from_str(name));
        self
    }
}

/// The native debugging interface, as seen by the engine.
///
/// Implementations wrap whatever out-of-process API talks to the target. A transport may be
/// moved between threads, but once owned by a [`crate::debug::channel::DebugEventChannel`] it is
/// only called from the thread that created the channel. No call is expected to hang: timeouts
/// are the implementation's business.
pub trait DebugTransport: Send {
    /// Block until the target delivers the next callback. `None` once the connection is closed.
    ///
    /// # Errors
    /// Transport failures.
    fn next_callback(&mut self) -> Result<Option<RawCallback>>;

    /// Let the target continue after a callback
    ///
    /// # Errors
    /// Transport failures.
    fn resume(&mut self, controller: ControllerHandle) -> Result<()>;

    /// Describe a loaded module
    ///
    /// # Errors
    /// [`crate::Error::ModuleNotFound`] for unknown handles, transport failures.
    fn module_info(&self, module: ModuleHandle) -> Result<ModuleInfo>;

    /// The metadata query interface of a loaded module
    ///
    /// # Errors
    /// [`crate::Error::ModuleNotFound`] for unknown handles, transport failures.
    fn metadata(&self, module: ModuleHandle) -> Result<Arc<dyn MetadataImport>>;

    /// Raw bytes of the CLI header of a module image, `None` if the module has no image
    ///
    /// # Errors
    /// Transport failures.
    fn read_cor20_header(&self, module: ModuleHandle) -> Result<Option<Vec<u8>>>;

    /// The function with the given `MethodDef` token, `None` if the module has no such function
    ///
    /// # Errors
    /// Transport failures.
    fn find_function(&self, module: ModuleHandle, token: Token) -> Result<Option<FunctionHandle>>;

    /// Create an inactive breakpoint in the code of `function`
    ///
    /// # Errors
    /// The target refused to create the breakpoint.
    fn create_breakpoint(
        &mut self,
        function: FunctionHandle,
        kind: CodeKind,
        offset: u32,
    ) -> Result<NativeBreakpointHandle>;

    /// Arm or disarm a breakpoint
    ///
    /// # Errors
    /// Transport failures.
    fn set_breakpoint_active(&mut self, breakpoint: NativeBreakpointHandle, active: bool)
        -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn callback_codes() {
        assert_eq!(CallbackCode::from_repr(10), Some(CallbackCode::LoadModule));
        assert_eq!(CallbackCode::from_repr(34), Some(CallbackCode::CustomNotification));
        assert_eq!(CallbackCode::from_repr(35), None);
    }

    #[test]
    fn builder() {
        let raw = RawCallback::new(CallbackCode::LogMessage, ControllerHandle(1))
            .with_thread(ThreadHandle(2))
            .with_text("hello")
            .with_name("switch");

        assert_eq!(raw.code, 15);
        assert_eq!(raw.thread, Some(ThreadHandle(2)));
        assert_eq!(raw.text.unwrap().to_string_lossy(), "hello");
        assert_eq!(raw.name.unwrap().to_string_lossy(), "switch");
    }
}
