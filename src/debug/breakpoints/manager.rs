use std::collections::BTreeMap;

use tracing::{debug, trace, warn};

use crate::{
    debug::{
        breakpoints::{
            condition::{ConditionContext, Deferred},
            BindError, BoundBreakpoint, BreakpointId, BreakpointKind, BreakpointRequest,
            LogicalBreakpoint,
        },
        event::{DebugEvent, DebugEventKind, PauseReason},
        handles::ModuleHandle,
        modules::{LoadedModule, ModuleRegistry},
        transport::DebugTransport,
    },
    Error, Result,
};

/// Called with a breakpoint's new bind error whenever it changes
pub type BindErrorListener = Box<dyn FnMut(BreakpointId, Option<&BindError>) + Send>;

/// The set of logical breakpoints and their bindings.
///
/// Owned by the debugger thread. Methods that touch native breakpoints take the transport
/// explicitly.
#[derive(Default)]
pub struct BreakpointManager {
    breakpoints: BTreeMap<BreakpointId, LogicalBreakpoint>,
    next_id: u64,
    error_listeners: Vec<BindErrorListener>,
}

impl BreakpointManager {
    /// An empty manager
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a breakpoint and bind it to every loaded instance of its module
    pub fn add(
        &mut self,
        request: BreakpointRequest,
        transport: &mut dyn DebugTransport,
        modules: &ModuleRegistry,
    ) -> BreakpointId {
        self.next_id += 1;
        let id = BreakpointId(self.next_id);
        self.insert(id, request, transport, modules);
        id
    }

    fn insert(
        &mut self,
        id: BreakpointId,
        request: BreakpointRequest,
        transport: &mut dyn DebugTransport,
        modules: &ModuleRegistry,
    ) {
        let mut breakpoint = LogicalBreakpoint::new(id, request);

        let key = breakpoint.code().map(|code| code.module.clone());
        if let Some(key) = key {
            for module in modules.find_by_key(&key) {
                if let Some(outcome) = bind(&mut breakpoint, &module, transport) {
                    record(&mut self.error_listeners, &mut breakpoint, outcome);
                }
            }
        }

        debug!(%id, kind = ?breakpoint.kind, "breakpoint added");
        self.breakpoints.insert(id, breakpoint);
    }

    /// Deactivate every binding of `id` and forget it
    ///
    /// # Errors
    /// [`Error::BreakpointNotFound`] if `id` is not registered.
    pub fn remove(&mut self, id: BreakpointId, transport: &mut dyn DebugTransport) -> Result<()> {
        let breakpoint = self
            .breakpoints
            .remove(&id)
            .ok_or(Error::BreakpointNotFound(id))?;

        for bound in breakpoint.bound.iter().filter(|bound| bound.active) {
            if let Err(err) = transport.set_breakpoint_active(bound.native, false) {
                warn!(%id, native = %bound.native, %err, "failed to deactivate breakpoint");
            }
        }

        debug!(%id, "breakpoint removed");
        Ok(())
    }

    /// Enable or disable `id` and every one of its bindings. Bindings are neither created nor
    /// dropped.
    ///
    /// # Errors
    /// [`Error::BreakpointNotFound`] if `id` is not registered.
    pub fn set_enabled(
        &mut self,
        id: BreakpointId,
        enabled: bool,
        transport: &mut dyn DebugTransport,
    ) -> Result<()> {
        let breakpoint = self
            .breakpoints
            .get_mut(&id)
            .ok_or(Error::BreakpointNotFound(id))?;

        breakpoint.enabled = enabled;
        for bound in &mut breakpoint.bound {
            match transport.set_breakpoint_active(bound.native, enabled) {
                Ok(()) => bound.active = enabled,
                Err(err) => {
                    warn!(%id, native = %bound.native, %err, "failed to toggle breakpoint");
                }
            }
        }
        Ok(())
    }

    /// Bind every code breakpoint of `module`'s key to the new instance
    pub fn on_module_loaded(&mut self, module: &LoadedModule, transport: &mut dyn DebugTransport) {
        for breakpoint in self.breakpoints.values_mut() {
            let matches = breakpoint
                .code()
                .is_some_and(|code| &code.module == module.key());
            if !matches {
                continue;
            }

            if let Some(outcome) = bind(breakpoint, module, transport) {
                record(&mut self.error_listeners, breakpoint, outcome);
            }
        }
    }

    /// Drop every binding to the unloaded instance `handle`. The logical breakpoints stay.
    pub fn on_module_unloaded(&mut self, handle: ModuleHandle) {
        for breakpoint in self.breakpoints.values_mut() {
            let before = breakpoint.bound.len();
            breakpoint.bound.retain(|bound| bound.module != handle);
            if breakpoint.bound.len() != before {
                debug!(id = %breakpoint.id, module = %handle, "breakpoint unbound");
            }
        }
    }

    /// Run the conditions of every enabled breakpoint matching `event`, then apply the changes
    /// they queued.
    pub fn dispatch(
        &mut self,
        event: &mut DebugEvent,
        transport: &mut dyn DebugTransport,
        modules: &ModuleRegistry,
    ) {
        let event_type = event.event_type();
        let native = match &event.kind {
            DebugEventKind::Breakpoint { breakpoint, .. } => Some(*breakpoint),
            _ => None,
        };

        let matching: Vec<BreakpointId> = self
            .breakpoints
            .values()
            .filter(|breakpoint| breakpoint.enabled)
            .filter(|breakpoint| match &breakpoint.kind {
                BreakpointKind::Code(_) => native.is_some_and(|native| {
                    breakpoint.bound.iter().any(|bound| bound.native == native)
                }),
                BreakpointKind::AnyEvent(any) => any.event == event_type,
            })
            .map(|breakpoint| breakpoint.id)
            .collect();

        let mut commands = Vec::new();
        for id in matching {
            let Some(breakpoint) = self.breakpoints.get_mut(&id) else {
                continue;
            };
            breakpoint.hits += 1;

            let reason = match &mut breakpoint.condition {
                Some(condition) => {
                    let mut ctx = ConditionContext {
                        id,
                        hits: breakpoint.hits,
                        event: &*event,
                        transport: &*transport,
                        modules,
                        commands: &mut commands,
                        next_id: &mut self.next_id,
                    };
                    condition.check(&mut ctx)
                }
                None => Some(PauseReason::Breakpoint(id)),
            };

            trace!(%id, hits = breakpoint.hits, ?reason, "breakpoint matched");
            if let Some(reason) = reason {
                event.add_pause_reason(reason);
            }
        }

        for command in commands {
            match command {
                Deferred::Remove(id) => {
                    if let Err(err) = self.remove(id, transport) {
                        trace!(%id, %err, "deferred removal skipped");
                    }
                }
                Deferred::Add(id, request) => {
                    self.insert(id, request, transport, modules);
                }
            }
        }
    }

    /// Get notified whenever a breakpoint's bind error changes
    pub fn subscribe_errors<F>(&mut self, listener: F)
    where
        F: FnMut(BreakpointId, Option<&BindError>) + Send + 'static,
    {
        self.error_listeners.push(Box::new(listener));
    }

    /// The breakpoint `id`
    pub fn get(&self, id: BreakpointId) -> Option<&LogicalBreakpoint> {
        self.breakpoints.get(&id)
    }

    /// Every breakpoint, ordered by id
    pub fn iter(&self) -> impl Iterator<Item = &LogicalBreakpoint> {
        self.breakpoints.values()
    }

    /// Number of bindings over all breakpoints
    pub fn bound_count(&self) -> usize {
        self.breakpoints
            .values()
            .map(|breakpoint| breakpoint.bound.len())
            .sum()
    }

    /// Number of registered breakpoints
    pub fn len(&self) -> usize {
        self.breakpoints.len()
    }

    /// `true` if nothing is registered
    pub fn is_empty(&self) -> bool {
        self.breakpoints.is_empty()
    }
}

impl std::fmt::Debug for BreakpointManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BreakpointManager")
            .field("breakpoints", &self.breakpoints)
            .field("next_id", &self.next_id)
            .finish_non_exhaustive()
    }
}

/// Bind a code breakpoint to `module`. `None` if it already is bound there.
fn bind(
    breakpoint: &mut LogicalBreakpoint,
    module: &LoadedModule,
    transport: &mut dyn DebugTransport,
) -> Option<std::result::Result<(), BindError>> {
    let code = breakpoint.code()?;
    if breakpoint
        .bound
        .iter()
        .any(|bound| bound.module == module.handle)
    {
        return None;
    }

    let function = match transport.find_function(module.handle, code.token) {
        Ok(Some(function)) => function,
        Ok(None) => return Some(Err(BindError::FunctionNotFound)),
        Err(err) => return Some(Err(BindError::OtherError(err.to_string()))),
    };

    let native = match transport.create_breakpoint(function, code.kind, code.offset) {
        Ok(native) => native,
        Err(err) => {
            debug!(id = %breakpoint.id, %function, %err, "native breakpoint creation failed");
            return Some(Err(BindError::CouldNotCreateBreakpoint));
        }
    };

    let active = match transport.set_breakpoint_active(native, breakpoint.enabled) {
        Ok(()) => breakpoint.enabled,
        Err(err) => {
            warn!(id = %breakpoint.id, %native, %err, "failed to activate breakpoint");
            false
        }
    };

    debug!(id = %breakpoint.id, module = %module.handle, %native, "breakpoint bound");
    breakpoint.bound.push(BoundBreakpoint {
        module: module.handle,
        native,
        active,
    });
    Some(Ok(()))
}

fn record(
    listeners: &mut [BindErrorListener],
    breakpoint: &mut LogicalBreakpoint,
    outcome: std::result::Result<(), BindError>,
) {
    let error = outcome.err();
    if breakpoint.bind_error == error {
        return;
    }

    match &error {
        Some(err) => debug!(id = %breakpoint.id, %err, "breakpoint bind failed"),
        None => debug!(id = %breakpoint.id, "breakpoint bind error cleared"),
    }
    breakpoint.bind_error = error;
    for listener in listeners.iter_mut() {
        listener(breakpoint.id, breakpoint.bind_error.as_ref());
    }
}
