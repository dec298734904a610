//! The engine the presentation layer talks to.
//!
//! [`DebuggerEngine`] ties the event channel, the module registry, the breakpoint manager and the
//! startup strategy together. [`DebuggerEngine::wait_next_event`] runs the control loop: it keeps
//! the live model in sync with module and class events, lets breakpoint conditions and watchers
//! vote, resumes the target for every event nobody wanted to stop at, and returns the first one
//! somebody did.
//!
//! Every call that reaches the target fails with [`crate::Error::WrongThread`] unless it comes
//! from the thread that created the engine. [`crate::debug::thread::DebuggerThread`] owns an
//! engine on a dedicated thread and marshals calls onto it.

use std::sync::Arc;

use tracing::{debug, trace, warn};

use crate::{
    config::EngineConfig,
    debug::{
        breakpoints::{
            BindError, BreakpointId, BreakpointManager, BreakpointRequest, LogicalBreakpoint,
        },
        channel::{DebugEventChannel, EventWatchers},
        event::{DebugEvent, DebugEventKind},
        handles::{AppDomainHandle, ModuleHandle},
        modules::{LoadedModule, ModuleRegistry},
        startup::BreakProcessHelper,
        transport::DebugTransport,
    },
    metadata::{
        context::GenericContext,
        module::{ModuleView, TypeUpdate, TypeUpdateListener},
        object::MetadataObject,
        token::Token,
    },
    Result,
};

/// Debugger state for one target process
pub struct DebuggerEngine {
    config: EngineConfig,
    channel: DebugEventChannel,
    watchers: EventWatchers,
    modules: ModuleRegistry,
    breakpoints: BreakpointManager,
    startup: BreakProcessHelper,
    type_listeners: Vec<TypeUpdateListener>,
}

impl DebuggerEngine {
    /// Take over `transport` and install the startup strategy of `config`
    ///
    /// # Errors
    /// Transport failures while installing the startup breakpoints.
    pub fn new(transport: Box<dyn DebugTransport>, config: EngineConfig) -> Result<Self> {
        let mut channel = DebugEventChannel::new(transport);
        let modules = ModuleRegistry::new();
        let mut breakpoints = BreakpointManager::new();
        let startup = BreakProcessHelper::install(
            config.startup,
            &mut breakpoints,
            channel.transport_mut()?,
            &modules,
        );

        Ok(DebuggerEngine {
            config,
            channel,
            watchers: EventWatchers::from_config(&config),
            modules,
            breakpoints,
            startup,
            type_listeners: Vec::new(),
        })
    }

    /// Block until an event pauses the target. `None` once the transport is closed.
    ///
    /// Events that do not pause are handled and the target is resumed before waiting again.
    ///
    /// # Errors
    /// [`crate::Error::WrongThread`] off the engine's thread, transport failures.
    pub fn wait_next_event(&mut self) -> Result<Option<DebugEvent>> {
        loop {
            let Some(mut event) = self.channel.receive()? else {
                return Ok(None);
            };

            self.process(&event);

            let transport = self.channel.transport_mut()?;
            self.breakpoints.dispatch(&mut event, transport, &self.modules);
            self.watchers.apply(&mut event);

            if event.is_paused() {
                debug!(event = ?event.event_type(), reasons = ?event.pause_reasons(), "target paused");
                return Ok(Some(event));
            }

            trace!(event = ?event.event_type(), "resuming");
            self.channel.resume(&event)?;
        }
    }

    /// Let the target continue after a paused event
    ///
    /// # Errors
    /// [`crate::Error::WrongThread`] off the engine's thread, transport failures.
    pub fn resume(&mut self, event: &DebugEvent) -> Result<()> {
        self.channel.resume(event)
    }

    /// Resolve `token` in the module instance `module`. Never touches the target's run state.
    pub fn resolve(
        &self,
        module: ModuleHandle,
        token: Token,
        context: &GenericContext,
    ) -> Option<MetadataObject> {
        self.modules.get(module)?.view.resolve(token, context)
    }

    /// The module instance `handle`
    pub fn module(&self, handle: ModuleHandle) -> Option<Arc<LoadedModule>> {
        self.modules.get(handle)
    }

    /// Every loaded module instance
    pub fn modules(&self) -> &ModuleRegistry {
        &self.modules
    }

    /// Register a breakpoint, binding it to loaded modules right away
    ///
    /// # Errors
    /// [`crate::Error::WrongThread`] off the engine's thread.
    pub fn add_breakpoint(&mut self, request: BreakpointRequest) -> Result<BreakpointId> {
        let transport = self.channel.transport_mut()?;
        Ok(self.breakpoints.add(request, transport, &self.modules))
    }

    /// Remove a breakpoint and all of its bindings
    ///
    /// # Errors
    /// [`crate::Error::BreakpointNotFound`], [`crate::Error::WrongThread`].
    pub fn remove_breakpoint(&mut self, id: BreakpointId) -> Result<()> {
        let transport = self.channel.transport_mut()?;
        self.breakpoints.remove(id, transport)
    }

    /// Enable or disable a breakpoint
    ///
    /// # Errors
    /// [`crate::Error::BreakpointNotFound`], [`crate::Error::WrongThread`].
    pub fn set_breakpoint_enabled(&mut self, id: BreakpointId, enabled: bool) -> Result<()> {
        let transport = self.channel.transport_mut()?;
        self.breakpoints.set_enabled(id, enabled, transport)
    }

    /// The breakpoint `id`
    pub fn breakpoint(&self, id: BreakpointId) -> Option<&LogicalBreakpoint> {
        self.breakpoints.get(id)
    }

    /// All breakpoints
    pub fn breakpoints(&self) -> &BreakpointManager {
        &self.breakpoints
    }

    /// Get notified whenever a breakpoint's bind error changes
    pub fn on_breakpoint_error_changed<F>(&mut self, listener: F)
    where
        F: FnMut(BreakpointId, Option<&BindError>) + Send + 'static,
    {
        self.breakpoints.subscribe_errors(listener);
    }

    /// Get notified about types created or grown in any module, loaded now or later
    pub fn subscribe_type_updates<F>(&mut self, listener: F)
    where
        F: Fn(&TypeUpdate) + Send + Sync + 'static,
    {
        let listener: TypeUpdateListener = Arc::new(listener);
        for module in self.modules.all() {
            attach(&module.view, &listener);
        }
        self.type_listeners.push(listener);
    }

    /// The startup strategy
    pub fn startup(&self) -> &BreakProcessHelper {
        &self.startup
    }

    /// The configuration the engine was created with
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    fn process(&mut self, event: &DebugEvent) {
        match event.kind {
            DebugEventKind::LoadModule { app_domain, module } => {
                if let Err(err) = self.load_module(app_domain, module) {
                    warn!(%module, %err, "failed to load module");
                }
            }
            DebugEventKind::UnloadModule { module, .. } => self.unload_module(module),
            DebugEventKind::LoadClass { module, token, .. } => {
                if let Some(loaded) = self.modules.get(module) {
                    if loaded.view.on_class_loaded(token).is_none() {
                        trace!(%module, %token, "class load ignored");
                    }
                }
            }
            DebugEventKind::UnloadClass { module, token, .. } => {
                if let Some(loaded) = self.modules.get(module) {
                    loaded.view.on_class_unloaded(token);
                }
            }
            DebugEventKind::ExitProcess { .. } => {
                for loaded in self.modules.drain() {
                    loaded.view.mark_unloaded();
                    self.breakpoints.on_module_unloaded(loaded.handle);
                }
                if let Ok(transport) = self.channel.transport_mut() {
                    self.startup.cancel(&mut self.breakpoints, transport);
                }
            }
            _ => {}
        }
    }

    fn load_module(&mut self, app_domain: AppDomainHandle, module: ModuleHandle) -> Result<()> {
        if self.modules.get(module).is_some() {
            warn!(%module, "module handle loaded again, dropping the earlier instance");
            self.unload_module(module);
        }

        let transport = self.channel.transport_mut()?;
        let info = transport.module_info(module)?;
        let import = transport.metadata(module)?;

        let view = ModuleView::new(info, import, &self.config);
        for listener in &self.type_listeners {
            attach(&view, listener);
        }

        let loaded = Arc::new(LoadedModule {
            handle: module,
            app_domain,
            view,
        });
        self.modules.add(loaded.clone());
        debug!(%module, key = %loaded.key(), "module loaded");

        self.breakpoints.on_module_loaded(&loaded, transport);
        Ok(())
    }

    fn unload_module(&mut self, module: ModuleHandle) {
        if let Some(loaded) = self.modules.remove(module) {
            loaded.view.mark_unloaded();
            self.breakpoints.on_module_unloaded(module);
            debug!(%module, key = %loaded.key(), "module unloaded");
        }
    }
}

impl std::fmt::Debug for DebuggerEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DebuggerEngine")
            .field("config", &self.config)
            .field("modules", &self.modules)
            .field("breakpoints", &self.breakpoints)
            .field("startup", &self.startup)
            .finish_non_exhaustive()
    }
}

fn attach(view: &ModuleView, listener: &TypeUpdateListener) {
    let listener = listener.clone();
    view.subscribe_type_updates(move |update| listener(update));
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::{
        debug::{
            event::{DebugEventType, PauseReason},
            handles::{ControllerHandle, FunctionHandle, ProcessHandle, ThreadHandle},
            startup::BreakProcessKind,
            transport::{CallbackCode, RawCallback},
        },
        metadata::module::{ModuleInfo, ModuleKey},
        test::{cor20_header, FakeTransport, MetadataBuilder},
    };

    const CONTROLLER: ControllerHandle = ControllerHandle(1);

    fn load(module: u64) -> RawCallback {
        RawCallback::new(CallbackCode::LoadModule, CONTROLLER)
            .with_app_domain(AppDomainHandle(1))
            .with_module(ModuleHandle(module))
    }

    fn create_thread() -> RawCallback {
        RawCallback::new(CallbackCode::CreateThread, CONTROLLER)
            .with_app_domain(AppDomainHandle(1))
            .with_thread(ThreadHandle(5))
    }

    fn app_key() -> ModuleKey {
        ModuleKey::new("App", "App.dll", false, false)
    }

    #[test]
    fn startup_at_entry_point() {
        let builder = MetadataBuilder::new();
        let main = builder.method(builder.type_def(2, "App", "Program"), 1, "Main");

        let fake = FakeTransport::new();
        fake.add_module(ModuleHandle(1), ModuleInfo::new(app_key()), builder.import());
        fake.set_header(ModuleHandle(1), cor20_header(main));
        fake.add_function(ModuleHandle(1), main, FunctionHandle(7));

        fake.push(
            RawCallback::new(CallbackCode::CreateProcess, CONTROLLER)
                .with_process(ProcessHandle(1)),
        );
        fake.push(load(1));
        fake.push(create_thread());

        let mut engine =
            DebuggerEngine::new(Box::new(fake.clone()), EngineConfig::default()).unwrap();

        assert!(engine.wait_next_event().unwrap().is_none());
        let native = engine.breakpoints().iter().next().unwrap().bound()[0].native;
        assert_eq!(fake.resumed().len(), 3);

        fake.push(
            RawCallback::new(CallbackCode::Breakpoint, CONTROLLER)
                .with_app_domain(AppDomainHandle(1))
                .with_thread(ThreadHandle(5))
                .with_breakpoint(native),
        );
        let event = engine.wait_next_event().unwrap().unwrap();
        assert_eq!(
            event.pause_reasons(),
            &[PauseReason::Startup(BreakProcessKind::EntryPoint)]
        );
        assert!(engine.startup().entry_reached());
        assert!(engine.breakpoints().is_empty());

        engine.resume(&event).unwrap();
        assert_eq!(fake.resumed().len(), 4);
    }

    #[test]
    fn modules_follow_load_and_unload() {
        let builder = MetadataBuilder::new();
        let program = builder.type_def(2, "App", "Program");
        let main = builder.method(program, 1, "Main");

        let fake = FakeTransport::new();
        fake.add_module(ModuleHandle(1), ModuleInfo::new(app_key()), builder.import());
        fake.add_function(ModuleHandle(1), main, FunctionHandle(7));
        fake.push(load(1));

        let mut engine =
            DebuggerEngine::new(Box::new(fake.clone()), EngineConfig::minimal()).unwrap();
        let id = engine
            .add_breakpoint(BreakpointRequest::il(app_key(), main, 0))
            .unwrap();
        assert!(engine.wait_next_event().unwrap().is_none());

        assert_eq!(engine.modules().len(), 1);
        assert_eq!(engine.breakpoint(id).unwrap().bound().len(), 1);
        let object = engine
            .resolve(ModuleHandle(1), program, &GenericContext::empty())
            .unwrap();
        assert_eq!(object.token(), program);

        let view = engine.module(ModuleHandle(1)).unwrap().view.clone();
        fake.push(
            RawCallback::new(CallbackCode::UnloadModule, CONTROLLER)
                .with_app_domain(AppDomainHandle(1))
                .with_module(ModuleHandle(1)),
        );
        assert!(engine.wait_next_event().unwrap().is_none());

        assert!(engine.modules().is_empty());
        assert!(view.is_unloaded());
        assert!(engine.breakpoint(id).unwrap().bound().is_empty());
        assert!(engine
            .resolve(ModuleHandle(1), program, &GenericContext::empty())
            .is_none());
    }

    #[test]
    fn repeated_module_load_replaces_the_instance() {
        let builder = MetadataBuilder::new();
        let program = builder.type_def(2, "App", "Program");
        let main = builder.method(program, 1, "Main");

        let fake = FakeTransport::new();
        fake.add_module(ModuleHandle(1), ModuleInfo::new(app_key()), builder.import());
        fake.add_function(ModuleHandle(1), main, FunctionHandle(7));
        fake.push(load(1));

        let mut engine =
            DebuggerEngine::new(Box::new(fake.clone()), EngineConfig::minimal()).unwrap();
        let id = engine
            .add_breakpoint(BreakpointRequest::il(app_key(), main, 0))
            .unwrap();
        assert!(engine.wait_next_event().unwrap().is_none());
        let first_view = engine.module(ModuleHandle(1)).unwrap().view.clone();
        let first_native = engine.breakpoint(id).unwrap().bound()[0].native;

        fake.push(load(1));
        assert!(engine.wait_next_event().unwrap().is_none());

        assert!(first_view.is_unloaded());
        assert_eq!(engine.modules().len(), 1);
        let current = engine.module(ModuleHandle(1)).unwrap();
        assert!(!Arc::ptr_eq(&current.view, &first_view));
        assert!(!current.view.is_unloaded());

        let bound = engine.breakpoint(id).unwrap().bound();
        assert_eq!(bound.len(), 1);
        assert_ne!(bound[0].native, first_native);
        assert!(fake.breakpoint_active(bound[0].native));
    }

    #[test]
    fn failed_module_load_is_not_fatal() {
        let fake = FakeTransport::new();
        fake.push(load(42));
        fake.push(
            RawCallback::new(CallbackCode::Break, CONTROLLER)
                .with_app_domain(AppDomainHandle(1))
                .with_thread(ThreadHandle(5)),
        );

        let mut engine =
            DebuggerEngine::new(Box::new(fake.clone()), EngineConfig::default()).unwrap();
        let event = engine.wait_next_event().unwrap().unwrap();
        assert_eq!(event.event_type(), DebugEventType::Break);
        assert_eq!(event.pause_reasons(), &[PauseReason::UserBreak]);
        assert!(engine.modules().is_empty());
    }

    #[test]
    fn type_updates_reach_subscribers() {
        let builder = MetadataBuilder::new();
        builder.type_def(1, "", "<Module>");

        let fake = FakeTransport::new();
        let key = ModuleKey::new("Emit", "Emit", true, true);
        fake.add_module(ModuleHandle(3), ModuleInfo::new(key), builder.import());
        fake.push(load(3));

        let mut engine =
            DebuggerEngine::new(Box::new(fake.clone()), EngineConfig::minimal()).unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        engine.subscribe_type_updates(move |update| {
            sink.lock()
                .unwrap()
                .push((update.type_def.token(), update.was_created));
        });
        assert!(engine.wait_next_event().unwrap().is_none());

        let emitted = builder.type_def(2, "Dyn", "Emitted");
        fake.push(
            RawCallback::new(CallbackCode::LoadClass, CONTROLLER)
                .with_app_domain(AppDomainHandle(1))
                .with_module(ModuleHandle(3))
                .with_token(emitted),
        );
        assert!(engine.wait_next_event().unwrap().is_none());

        assert_eq!(*seen.lock().unwrap(), vec![(emitted, true)]);
    }

    #[test]
    fn any_event_breakpoint_pauses() {
        let fake = FakeTransport::new();
        fake.push(create_thread());

        let mut engine =
            DebuggerEngine::new(Box::new(fake.clone()), EngineConfig::minimal()).unwrap();
        let id = engine
            .add_breakpoint(BreakpointRequest::any_event(DebugEventType::CreateThread))
            .unwrap();

        let event = engine.wait_next_event().unwrap().unwrap();
        assert_eq!(event.pause_reasons(), &[PauseReason::Breakpoint(id)]);
        assert!(fake.resumed().is_empty());

        engine.set_breakpoint_enabled(id, false).unwrap();
        engine.remove_breakpoint(id).unwrap();
        assert!(engine.remove_breakpoint(id).is_err());
    }
}
