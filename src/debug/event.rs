//! Typed debug events.
//!
//! Every [`RawCallback`] is decoded into exactly one [`DebugEvent`]. The event carries an ordered
//! list of [`PauseReason`]s that breakpoint conditions and watchers append to while it is being
//! dispatched; an event is paused if and only if that list ends up non-empty.

use strum::{EnumCount, EnumDiscriminants, EnumIter, FromRepr};
use widestring::U16String;

use crate::{
    debug::{
        breakpoints::BreakpointId,
        handles::{
            AppDomainHandle, AssemblyHandle, ControllerHandle, FunctionHandle, ModuleHandle,
            NativeBreakpointHandle, ProcessHandle, ThreadHandle,
        },
        startup::BreakProcessKind,
        transport::{CallbackCode, RawCallback},
    },
    metadata::token::Token,
    Result,
};

/// Why a step completed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, FromRepr)]
#[repr(u32)]
#[allow(missing_docs)]
pub enum StepReason {
    Normal = 0,
    Return = 1,
    Call = 2,
    ExceptionFilter = 3,
    ExceptionHandler = 4,
    Intercept = 5,
    Exit = 6,
}

/// Stage of an exception reported by `Exception2`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, FromRepr)]
#[repr(u32)]
pub enum ExceptionStage {
    /// Thrown, no handler searched yet
    FirstChance = 1,
    /// First chance in user code
    UserFirstChance = 2,
    /// A handler was found
    CatchHandlerFound = 3,
    /// No handler exists
    Unhandled = 4,
}

/// Stage of an exception unwind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, FromRepr)]
#[repr(u32)]
pub enum UnwindStage {
    /// Unwinding starts
    Begin = 1,
    /// The debugger intercepted the exception
    Intercepted = 2,
}

/// What happened to a log switch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, FromRepr)]
#[repr(u32)]
#[allow(missing_docs)]
pub enum LogSwitchReason {
    Create = 0,
    Modify = 1,
    Delete = 2,
}

/// The closed set of debug events, with their payloads.
///
/// [`DebugEventType`] is the payload-free discriminant, used to match events against
/// any-event breakpoints.
#[derive(Debug, Clone, PartialEq, Eq, EnumDiscriminants)]
#[strum_discriminants(name(DebugEventType), derive(Hash, EnumIter, EnumCount))]
#[strum_discriminants(allow(missing_docs))]
#[allow(missing_docs)]
pub enum DebugEventKind {
    Breakpoint {
        app_domain: AppDomainHandle,
        thread: ThreadHandle,
        breakpoint: NativeBreakpointHandle,
    },
    StepComplete {
        app_domain: AppDomainHandle,
        thread: ThreadHandle,
        reason: StepReason,
    },
    Break {
        app_domain: AppDomainHandle,
        thread: ThreadHandle,
    },
    Exception {
        app_domain: AppDomainHandle,
        thread: ThreadHandle,
        unhandled: bool,
    },
    EvalComplete {
        app_domain: AppDomainHandle,
        thread: ThreadHandle,
    },
    EvalException {
        app_domain: AppDomainHandle,
        thread: ThreadHandle,
    },
    CreateProcess {
        process: ProcessHandle,
    },
    ExitProcess {
        process: ProcessHandle,
    },
    CreateThread {
        app_domain: AppDomainHandle,
        thread: ThreadHandle,
    },
    ExitThread {
        app_domain: AppDomainHandle,
        thread: ThreadHandle,
    },
    LoadModule {
        app_domain: AppDomainHandle,
        module: ModuleHandle,
    },
    UnloadModule {
        app_domain: AppDomainHandle,
        module: ModuleHandle,
    },
    LoadClass {
        app_domain: AppDomainHandle,
        module: ModuleHandle,
        token: Token,
    },
    UnloadClass {
        app_domain: AppDomainHandle,
        module: ModuleHandle,
        token: Token,
    },
    DebuggerError {
        process: ProcessHandle,
        error_code: i32,
        error: u32,
    },
    LogMessage {
        app_domain: AppDomainHandle,
        thread: ThreadHandle,
        level: i32,
        switch_name: U16String,
        message: U16String,
    },
    LogSwitch {
        app_domain: AppDomainHandle,
        thread: ThreadHandle,
        level: i32,
        reason: LogSwitchReason,
        switch_name: U16String,
        parent_name: U16String,
    },
    CreateAppDomain {
        process: ProcessHandle,
        app_domain: AppDomainHandle,
    },
    ExitAppDomain {
        process: ProcessHandle,
        app_domain: AppDomainHandle,
    },
    LoadAssembly {
        app_domain: AppDomainHandle,
        assembly: AssemblyHandle,
    },
    UnloadAssembly {
        app_domain: AppDomainHandle,
        assembly: AssemblyHandle,
    },
    ControlCTrap {
        process: ProcessHandle,
    },
    NameChange {
        app_domain: Option<AppDomainHandle>,
        thread: Option<ThreadHandle>,
    },
    UpdateModuleSymbols {
        app_domain: AppDomainHandle,
        module: ModuleHandle,
    },
    EditAndContinueRemap {
        app_domain: AppDomainHandle,
        thread: ThreadHandle,
        function: FunctionHandle,
        accurate: bool,
    },
    BreakpointSetError {
        app_domain: AppDomainHandle,
        thread: ThreadHandle,
        breakpoint: NativeBreakpointHandle,
        error: u32,
    },
    FunctionRemapOpportunity {
        app_domain: AppDomainHandle,
        thread: ThreadHandle,
        function: FunctionHandle,
        il_offset: u32,
    },
    FunctionRemapComplete {
        app_domain: AppDomainHandle,
        thread: ThreadHandle,
        function: FunctionHandle,
    },
    CreateConnection {
        process: ProcessHandle,
        connection_id: u32,
        name: U16String,
    },
    ChangeConnection {
        process: ProcessHandle,
        connection_id: u32,
    },
    DestroyConnection {
        process: ProcessHandle,
        connection_id: u32,
    },
    Exception2 {
        app_domain: AppDomainHandle,
        thread: ThreadHandle,
        stage: ExceptionStage,
        offset: u32,
    },
    ExceptionUnwind {
        app_domain: AppDomainHandle,
        thread: ThreadHandle,
        stage: UnwindStage,
    },
    MdaNotification {
        thread: Option<ThreadHandle>,
        name: U16String,
        description: U16String,
    },
    CustomNotification {
        app_domain: AppDomainHandle,
        thread: ThreadHandle,
    },
}

/// A recorded justification for stopping the target after an event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PauseReason {
    /// A logical breakpoint was hit and its condition asked to stop
    Breakpoint(BreakpointId),
    /// `Debugger.Break()` or a break request
    UserBreak,
    /// A step completed
    StepComplete,
    /// An exception was thrown
    Exception {
        /// `true` for first chance notifications
        first_chance: bool,
    },
    /// The runtime reported an internal debugger error
    DebuggerError,
    /// The startup strategy reached its location
    Startup(BreakProcessKind),
    /// Anything else, described in text
    Other(String),
}

/// One typed event, plus the pause reasons accumulated while dispatching it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DebugEvent {
    /// The event and its payload
    pub kind: DebugEventKind,
    /// The process or application domain to resume afterwards
    pub controller: ControllerHandle,
    pause_reasons: Vec<PauseReason>,
}

impl DebugEvent {
    /// An event with no pause reasons yet
    pub fn new(kind: DebugEventKind, controller: ControllerHandle) -> Self {
        DebugEvent {
            kind,
            controller,
            pause_reasons: Vec::new(),
        }
    }

    /// Decode a raw callback.
    ///
    /// # Errors
    /// A malformed error for unknown callback codes, unknown sub-kinds and missing required
    /// fields.
    pub fn decode(raw: &RawCallback) -> Result<DebugEvent> {
        let code = CallbackCode::from_repr(raw.code)
            .ok_or_else(|| malformed_error!("Unknown callback code {}", raw.code))?;

        macro_rules! req {
            ($field:ident) => {
                raw.$field.clone().ok_or_else(|| {
                    malformed_error!("{:?} callback without {}", code, stringify!($field))
                })?
            };
        }

        let kind = match code {
            CallbackCode::Breakpoint => DebugEventKind::Breakpoint {
                app_domain: req!(app_domain),
                thread: req!(thread),
                breakpoint: req!(breakpoint),
            },
            CallbackCode::StepComplete => DebugEventKind::StepComplete {
                app_domain: req!(app_domain),
                thread: req!(thread),
                reason: StepReason::from_repr(raw.offset)
                    .ok_or_else(|| malformed_error!("Unknown step reason {}", raw.offset))?,
            },
            CallbackCode::Break => DebugEventKind::Break {
                app_domain: req!(app_domain),
                thread: req!(thread),
            },
            CallbackCode::Exception => DebugEventKind::Exception {
                app_domain: req!(app_domain),
                thread: req!(thread),
                unhandled: raw.flags != 0,
            },
            CallbackCode::EvalComplete => DebugEventKind::EvalComplete {
                app_domain: req!(app_domain),
                thread: req!(thread),
            },
            CallbackCode::EvalException => DebugEventKind::EvalException {
                app_domain: req!(app_domain),
                thread: req!(thread),
            },
            CallbackCode::CreateProcess => DebugEventKind::CreateProcess {
                process: req!(process),
            },
            CallbackCode::ExitProcess => DebugEventKind::ExitProcess {
                process: req!(process),
            },
            CallbackCode::CreateThread => DebugEventKind::CreateThread {
                app_domain: req!(app_domain),
                thread: req!(thread),
            },
            CallbackCode::ExitThread => DebugEventKind::ExitThread {
                app_domain: req!(app_domain),
                thread: req!(thread),
            },
            CallbackCode::LoadModule => DebugEventKind::LoadModule {
                app_domain: req!(app_domain),
                module: req!(module),
            },
            CallbackCode::UnloadModule => DebugEventKind::UnloadModule {
                app_domain: req!(app_domain),
                module: req!(module),
            },
            CallbackCode::LoadClass => DebugEventKind::LoadClass {
                app_domain: req!(app_domain),
                module: req!(module),
                token: req!(token),
            },
            CallbackCode::UnloadClass => DebugEventKind::UnloadClass {
                app_domain: req!(app_domain),
                module: req!(module),
                token: req!(token),
            },
            CallbackCode::DebuggerError => DebugEventKind::DebuggerError {
                process: req!(process),
                error_code: raw.error_code,
                error: raw.flags,
            },
            CallbackCode::LogMessage => DebugEventKind::LogMessage {
                app_domain: req!(app_domain),
                thread: req!(thread),
                level: raw.level,
                switch_name: raw.name.clone().unwrap_or_default(),
                message: req!(text),
            },
            CallbackCode::LogSwitch => DebugEventKind::LogSwitch {
                app_domain: req!(app_domain),
                thread: req!(thread),
                level: raw.level,
                reason: LogSwitchReason::from_repr(raw.flags)
                    .ok_or_else(|| malformed_error!("Unknown log switch reason {}", raw.flags))?,
                switch_name: req!(name),
                parent_name: raw.text.clone().unwrap_or_default(),
            },
            CallbackCode::CreateAppDomain => DebugEventKind::CreateAppDomain {
                process: req!(process),
                app_domain: req!(app_domain),
            },
            CallbackCode::ExitAppDomain => DebugEventKind::ExitAppDomain {
                process: req!(process),
                app_domain: req!(app_domain),
            },
            CallbackCode::LoadAssembly => DebugEventKind::LoadAssembly {
                app_domain: req!(app_domain),
                assembly: req!(assembly),
            },
            CallbackCode::UnloadAssembly => DebugEventKind::UnloadAssembly {
                app_domain: req!(app_domain),
                assembly: req!(assembly),
            },
            CallbackCode::ControlCTrap => DebugEventKind::ControlCTrap {
                process: req!(process),
            },
            CallbackCode::NameChange => DebugEventKind::NameChange {
                app_domain: raw.app_domain,
                thread: raw.thread,
            },
            CallbackCode::UpdateModuleSymbols => DebugEventKind::UpdateModuleSymbols {
                app_domain: req!(app_domain),
                module: req!(module),
            },
            CallbackCode::EditAndContinueRemap => DebugEventKind::EditAndContinueRemap {
                app_domain: req!(app_domain),
                thread: req!(thread),
                function: req!(function),
                accurate: raw.flags != 0,
            },
            CallbackCode::BreakpointSetError => DebugEventKind::BreakpointSetError {
                app_domain: req!(app_domain),
                thread: req!(thread),
                breakpoint: req!(breakpoint),
                error: raw.flags,
            },
            CallbackCode::FunctionRemapOpportunity => DebugEventKind::FunctionRemapOpportunity {
                app_domain: req!(app_domain),
                thread: req!(thread),
                function: req!(function),
                il_offset: raw.offset,
            },
            CallbackCode::FunctionRemapComplete => DebugEventKind::FunctionRemapComplete {
                app_domain: req!(app_domain),
                thread: req!(thread),
                function: req!(function),
            },
            CallbackCode::CreateConnection => DebugEventKind::CreateConnection {
                process: req!(process),
                connection_id: raw.connection_id,
                name: raw.text.clone().unwrap_or_default(),
            },
            CallbackCode::ChangeConnection => DebugEventKind::ChangeConnection {
                process: req!(process),
                connection_id: raw.connection_id,
            },
            CallbackCode::DestroyConnection => DebugEventKind::DestroyConnection {
                process: req!(process),
                connection_id: raw.connection_id,
            },
            CallbackCode::Exception2 => DebugEventKind::Exception2 {
                app_domain: req!(app_domain),
                thread: req!(thread),
                stage: ExceptionStage::from_repr(raw.flags)
                    .ok_or_else(|| malformed_error!("Unknown exception stage {}", raw.flags))?,
                offset: raw.offset,
            },
            CallbackCode::ExceptionUnwind => DebugEventKind::ExceptionUnwind {
                app_domain: req!(app_domain),
                thread: req!(thread),
                stage: UnwindStage::from_repr(raw.flags)
                    .ok_or_else(|| malformed_error!("Unknown unwind stage {}", raw.flags))?,
            },
            CallbackCode::MdaNotification => DebugEventKind::MdaNotification {
                thread: raw.thread,
                name: req!(name),
                description: raw.text.clone().unwrap_or_default(),
            },
            CallbackCode::CustomNotification => DebugEventKind::CustomNotification {
                app_domain: req!(app_domain),
                thread: req!(thread),
            },
        };

        Ok(DebugEvent::new(kind, raw.controller))
    }

    /// The payload-free kind of this event
    pub fn event_type(&self) -> DebugEventType {
        DebugEventType::from(&self.kind)
    }

    /// Append a pause reason
    pub fn add_pause_reason(&mut self, reason: PauseReason) {
        self.pause_reasons.push(reason);
    }

    /// The pause reasons appended so far, in order
    pub fn pause_reasons(&self) -> &[PauseReason] {
        &self.pause_reasons
    }

    /// `true` if anything asked to stop on this event
    pub fn is_paused(&self) -> bool {
        !self.pause_reasons.is_empty()
    }

    /// The thread the event happened on, if it has one
    pub fn thread(&self) -> Option<ThreadHandle> {
        match &self.kind {
            DebugEventKind::Breakpoint { thread, .. }
            | DebugEventKind::StepComplete { thread, .. }
            | DebugEventKind::Break { thread, .. }
            | DebugEventKind::Exception { thread, .. }
            | DebugEventKind::EvalComplete { thread, .. }
            | DebugEventKind::EvalException { thread, .. }
            | DebugEventKind::CreateThread { thread, .. }
            | DebugEventKind::ExitThread { thread, .. }
            | DebugEventKind::LogMessage { thread, .. }
            | DebugEventKind::LogSwitch { thread, .. }
            | DebugEventKind::EditAndContinueRemap { thread, .. }
            | DebugEventKind::BreakpointSetError { thread, .. }
            | DebugEventKind::FunctionRemapOpportunity { thread, .. }
            | DebugEventKind::FunctionRemapComplete { thread, .. }
            | DebugEventKind::Exception2 { thread, .. }
            | DebugEventKind::ExceptionUnwind { thread, .. }
            | DebugEventKind::CustomNotification { thread, .. } => Some(*thread),
            DebugEventKind::NameChange { thread, .. }
            | DebugEventKind::MdaNotification { thread, .. } => *thread,
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::{EnumCount, IntoEnumIterator};

    fn controller() -> ControllerHandle {
        ControllerHandle(1)
    }

    #[test]
    fn decode_load_module() {
        let raw = RawCallback::new(CallbackCode::LoadModule, controller())
            .with_app_domain(AppDomainHandle(2))
            .with_module(ModuleHandle(3));

        let event = DebugEvent::decode(&raw).unwrap();
        assert_eq!(event.event_type(), DebugEventType::LoadModule);
        assert_eq!(
            event.kind,
            DebugEventKind::LoadModule {
                app_domain: AppDomainHandle(2),
                module: ModuleHandle(3),
            }
        );
        assert_eq!(event.controller, controller());
        assert!(!event.is_paused());
    }

    #[test]
    fn decode_log_message() {
        let raw = RawCallback::new(CallbackCode::LogMessage, controller())
            .with_app_domain(AppDomainHandle(2))
            .with_thread(ThreadHandle(4))
            .with_text("hello");

        let event = DebugEvent::decode(&raw).unwrap();
        let DebugEventKind::LogMessage { message, .. } = &event.kind else {
            panic!("expected a log message");
        };
        assert_eq!(message.to_string_lossy(), "hello");
        assert_eq!(event.thread(), Some(ThreadHandle(4)));
    }

    #[test]
    fn decode_rejects_malformed() {
        let unknown = RawCallback {
            code: 99,
            ..RawCallback::new(CallbackCode::Break, controller())
        };
        assert!(DebugEvent::decode(&unknown).is_err());

        let missing = RawCallback::new(CallbackCode::Breakpoint, controller())
            .with_app_domain(AppDomainHandle(2));
        assert!(matches!(
            DebugEvent::decode(&missing),
            Err(crate::Error::Malformed { .. })
        ));

        let bad_stage = RawCallback::new(CallbackCode::Exception2, controller())
            .with_app_domain(AppDomainHandle(2))
            .with_thread(ThreadHandle(3))
            .with_flags(9);
        assert!(DebugEvent::decode(&bad_stage).is_err());
    }

    #[test]
    fn pause_reasons_decide_pause() {
        let mut event = DebugEvent::new(
            DebugEventKind::ControlCTrap {
                process: ProcessHandle(1),
            },
            controller(),
        );
        assert!(!event.is_paused());

        event.add_pause_reason(PauseReason::UserBreak);
        event.add_pause_reason(PauseReason::Breakpoint(BreakpointId(7)));
        assert!(event.is_paused());
        assert_eq!(
            event.pause_reasons(),
            &[PauseReason::UserBreak, PauseReason::Breakpoint(BreakpointId(7))]
        );
    }

    #[test]
    fn every_code_has_an_event_type() {
        assert_eq!(DebugEventType::COUNT, 35);
        assert_eq!(DebugEventType::iter().count(), 35);

        let mut decoded = std::collections::HashSet::new();
        for value in 0..35 {
            let code = CallbackCode::from_repr(value).unwrap();
            let raw = RawCallback::new(code, controller())
                .with_process(ProcessHandle(1))
                .with_app_domain(AppDomainHandle(2))
                .with_thread(ThreadHandle(3))
                .with_assembly(AssemblyHandle(4))
                .with_module(ModuleHandle(5))
                .with_function(FunctionHandle(6))
                .with_breakpoint(NativeBreakpointHandle(7))
                .with_token(Token::new(0x0200_0001))
                .with_flags(1)
                .with_text("text")
                .with_name("name");

            let event = DebugEvent::decode(&raw).unwrap();
            let event_type = event.event_type();
            assert_eq!(format!("{event_type:?}"), format!("{code:?}"));
            assert_eq!(event_type, DebugEventType::from(event.kind.clone()));
            assert!(decoded.insert(event_type));
        }

        for event_type in DebugEventType::iter() {
            assert!(decoded.contains(&event_type), "{event_type:?} never decoded");
        }
    }
}
