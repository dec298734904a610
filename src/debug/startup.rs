//! Where to stop a freshly started target.
//!
//! [`BreakProcessHelper`] installs the breakpoints that pause the target at the location chosen
//! by a [`BreakProcessKind`]. The event based kinds use a one-shot any-event breakpoint. The two
//! code based kinds watch module loads and, for the first static module with a usable location,
//! place a one-shot IL breakpoint there. The location is found by querying raw metadata and the
//! CLI header, so no module view has to be populated this early.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Mutex,
};

use tracing::{debug, trace};

use crate::{
    debug::{
        breakpoints::{BreakpointCondition, BreakpointId, BreakpointManager, BreakpointRequest},
        event::{DebugEventKind, DebugEventType, PauseReason},
        handles::ModuleHandle,
        modules::{LoadedModule, ModuleRegistry},
        transport::DebugTransport,
    },
    metadata::{cor20header::Cor20Header, import::RawRow, tableid::TableId, token::Token},
};

/// Name of a type initializer
const CCTOR: &str = ".cctor";

/// Where the target pauses after it started
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BreakProcessKind {
    /// Never pause
    None,
    /// At the process creation event
    CreateProcess,
    /// At the first application domain
    CreateAppDomain,
    /// At the first module load
    LoadModule,
    /// At the first class load
    LoadClass,
    /// At the module initializer of the first static module with one, else at its entry point
    ModuleCctorOrEntryPoint,
    /// At the entry point of the first static module with one
    EntryPoint,
}

impl BreakProcessKind {
    fn event(self) -> Option<DebugEventType> {
        match self {
            BreakProcessKind::CreateProcess => Some(DebugEventType::CreateProcess),
            BreakProcessKind::CreateAppDomain => Some(DebugEventType::CreateAppDomain),
            BreakProcessKind::LoadModule => Some(DebugEventType::LoadModule),
            BreakProcessKind::LoadClass => Some(DebugEventType::LoadClass),
            _ => None,
        }
    }
}

/// The installed startup breakpoints of one target
#[derive(Debug)]
pub struct BreakProcessHelper {
    kind: BreakProcessKind,
    transient: Option<BreakpointId>,
    placed: Arc<Mutex<Option<BreakpointId>>>,
    reached: Arc<AtomicBool>,
}

impl BreakProcessHelper {
    /// Install the breakpoints for `kind`
    pub fn install(
        kind: BreakProcessKind,
        manager: &mut BreakpointManager,
        transport: &mut dyn DebugTransport,
        modules: &ModuleRegistry,
    ) -> Self {
        let reached = Arc::new(AtomicBool::new(false));
        let placed = Arc::new(Mutex::new(None));

        let transient = if let Some(event) = kind.event() {
            let flag = reached.clone();
            let condition = BreakpointCondition::new(move |ctx| {
                ctx.remove_self();
                flag.store(true, Ordering::Release);
                Some(PauseReason::Startup(kind))
            });
            Some(manager.add(
                BreakpointRequest::any_event(event).with_condition(condition),
                transport,
                modules,
            ))
        } else if kind == BreakProcessKind::None {
            None
        } else {
            let flag = reached.clone();
            let slot = placed.clone();
            let condition = BreakpointCondition::new(move |ctx| {
                let DebugEventKind::LoadModule { module, .. } = ctx.event.kind else {
                    return None;
                };
                let loaded = ctx.modules.get(module)?;
                let token = startup_location(kind, &loaded, ctx.transport)?;

                debug!(module = %loaded.key(), %token, ?kind, "startup breakpoint placed");
                ctx.remove_self();

                let flag = flag.clone();
                let id = ctx.add(
                    BreakpointRequest::il(loaded.key().clone(), token, 0).with_condition(
                        BreakpointCondition::new(move |ctx| {
                            ctx.remove_self();
                            flag.store(true, Ordering::Release);
                            Some(PauseReason::Startup(kind))
                        }),
                    ),
                );
                *lock!(slot) = Some(id);
                None
            });
            Some(manager.add(
                BreakpointRequest::any_event(DebugEventType::LoadModule).with_condition(condition),
                transport,
                modules,
            ))
        };

        BreakProcessHelper {
            kind,
            transient,
            placed,
            reached,
        }
    }

    /// The strategy
    pub fn kind(&self) -> BreakProcessKind {
        self.kind
    }

    /// `true` once the target paused at the startup location
    pub fn entry_reached(&self) -> bool {
        self.reached.load(Ordering::Acquire)
    }

    /// Remove the startup breakpoints that are still waiting, the placed code breakpoint
    /// included
    pub fn cancel(&mut self, manager: &mut BreakpointManager, transport: &mut dyn DebugTransport) {
        let placed = lock!(self.placed).take();
        for id in self.transient.take().into_iter().chain(placed) {
            if manager.remove(id, transport).is_ok() {
                debug!(%id, kind = ?self.kind, "startup breakpoint cancelled");
            }
        }
    }
}

/// The method to stop at in `module`, `None` for dynamic and in-memory modules
fn startup_location(
    kind: BreakProcessKind,
    module: &LoadedModule,
    transport: &dyn DebugTransport,
) -> Option<Token> {
    let key = module.key();
    if key.is_dynamic || key.is_in_memory {
        trace!(module = %key, "startup location skipped");
        return None;
    }

    match kind {
        BreakProcessKind::ModuleCctorOrEntryPoint => {
            module_cctor(module).or_else(|| entry_point(module.handle, transport))
        }
        BreakProcessKind::EntryPoint => entry_point(module.handle, transport),
        _ => None,
    }
}

/// The type initializer of the `<Module>` type, which runs before anything else in the module
fn module_cctor(module: &LoadedModule) -> Option<Token> {
    let import = module.view.import();
    let global = Token::from_parts(TableId::TypeDef, 1);

    import
        .children(global, TableId::MethodDef)
        .ok()?
        .into_iter()
        .find(|method| {
            matches!(
                import.row(*method),
                Ok(RawRow::MethodDef(row)) if row.name == CCTOR
            )
        })
}

fn entry_point(module: ModuleHandle, transport: &dyn DebugTransport) -> Option<Token> {
    let bytes = transport.read_cor20_header(module).ok()??;
    match Cor20Header::read(&bytes) {
        Ok(header) => header.entry_point(),
        Err(err) => {
            debug!(%module, %err, "unreadable CLI header");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        debug::{
            event::DebugEvent,
            handles::{AppDomainHandle, ControllerHandle, FunctionHandle, ThreadHandle},
        },
        test::{cor20_header, loaded_module, loaded_module_with, FakeTransport, MetadataBuilder},
    };

    fn module_loaded(module: ModuleHandle) -> DebugEvent {
        DebugEvent::new(
            DebugEventKind::LoadModule {
                app_domain: AppDomainHandle(1),
                module,
            },
            ControllerHandle(1),
        )
    }

    fn hit(native: crate::debug::handles::NativeBreakpointHandle) -> DebugEvent {
        DebugEvent::new(
            DebugEventKind::Breakpoint {
                app_domain: AppDomainHandle(1),
                thread: ThreadHandle(1),
                breakpoint: native,
            },
            ControllerHandle(1),
        )
    }

    #[test]
    fn event_kinds_are_one_shot() {
        let mut fake = FakeTransport::new();
        let modules = ModuleRegistry::new();
        let mut manager = BreakpointManager::new();

        let helper = BreakProcessHelper::install(
            BreakProcessKind::CreateAppDomain,
            &mut manager,
            &mut fake,
            &modules,
        );
        assert_eq!(manager.len(), 1);

        let created = || {
            DebugEvent::new(
                DebugEventKind::CreateAppDomain {
                    process: crate::debug::handles::ProcessHandle(1),
                    app_domain: AppDomainHandle(1),
                },
                ControllerHandle(1),
            )
        };

        let mut first = created();
        manager.dispatch(&mut first, &mut fake, &modules);
        assert_eq!(
            first.pause_reasons(),
            &[PauseReason::Startup(BreakProcessKind::CreateAppDomain)]
        );
        assert!(helper.entry_reached());
        assert!(manager.is_empty());

        let mut second = created();
        manager.dispatch(&mut second, &mut fake, &modules);
        assert!(!second.is_paused());
    }

    #[test]
    fn none_installs_nothing() {
        let mut fake = FakeTransport::new();
        let mut manager = BreakpointManager::new();
        let helper = BreakProcessHelper::install(
            BreakProcessKind::None,
            &mut manager,
            &mut fake,
            &ModuleRegistry::new(),
        );
        assert!(manager.is_empty());
        assert!(!helper.entry_reached());
    }

    #[test]
    fn entry_point_skips_dynamic_modules() {
        let mut fake = FakeTransport::new();
        let modules = ModuleRegistry::new();
        let mut manager = BreakpointManager::new();
        let helper = BreakProcessHelper::install(
            BreakProcessKind::EntryPoint,
            &mut manager,
            &mut fake,
            &modules,
        );

        let main = Token::new(0x0600_0002);
        let dynamic = loaded_module_with(&MetadataBuilder::new(), 1, "Emit", true, false);
        fake.set_header(dynamic.handle, cor20_header(main));
        fake.add_function(dynamic.handle, main, FunctionHandle(1));
        modules.add(dynamic.clone());

        let mut event = module_loaded(dynamic.handle);
        manager.dispatch(&mut event, &mut fake, &modules);
        assert!(!event.is_paused());
        assert_eq!(manager.len(), 1);
        assert_eq!(manager.bound_count(), 0);

        let app = loaded_module(&MetadataBuilder::new(), 2, "App.dll");
        fake.set_header(app.handle, cor20_header(main));
        fake.add_function(app.handle, main, FunctionHandle(2));
        modules.add(app.clone());

        let mut event = module_loaded(app.handle);
        manager.dispatch(&mut event, &mut fake, &modules);
        assert!(!event.is_paused());
        assert_eq!(manager.len(), 1);
        assert_eq!(manager.bound_count(), 1);

        let native = manager.iter().next().unwrap().bound()[0].native;
        let mut event = hit(native);
        manager.dispatch(&mut event, &mut fake, &modules);
        assert_eq!(
            event.pause_reasons(),
            &[PauseReason::Startup(BreakProcessKind::EntryPoint)]
        );
        assert!(helper.entry_reached());
        assert!(manager.is_empty());
        assert!(!fake.breakpoint_active(native));
    }

    #[test]
    fn module_cctor_wins_over_entry_point() {
        let mut fake = FakeTransport::new();
        let modules = ModuleRegistry::new();
        let mut manager = BreakpointManager::new();
        let helper = BreakProcessHelper::install(
            BreakProcessKind::ModuleCctorOrEntryPoint,
            &mut manager,
            &mut fake,
            &modules,
        );

        let builder = MetadataBuilder::new();
        let global = builder.type_def(1, "", "<Module>");
        let cctor = builder.method(global, 1, CCTOR);
        let main = Token::new(0x0600_0002);

        let app = loaded_module(&builder, 1, "App.dll");
        fake.set_header(app.handle, cor20_header(main));
        fake.add_function(app.handle, cctor, FunctionHandle(1));
        fake.add_function(app.handle, main, FunctionHandle(2));
        modules.add(app.clone());

        let mut event = module_loaded(app.handle);
        manager.dispatch(&mut event, &mut fake, &modules);

        let placed = manager.iter().next().unwrap();
        assert_eq!(
            placed.kind(),
            &crate::debug::breakpoints::BreakpointKind::Code(
                crate::debug::breakpoints::CodeBreakpoint::il(app.key().clone(), cctor, 0)
            )
        );
        assert!(!helper.entry_reached());
    }

    #[test]
    fn cancel_removes_placed_code_breakpoint() {
        let mut fake = FakeTransport::new();
        let modules = ModuleRegistry::new();
        let mut manager = BreakpointManager::new();
        let mut helper = BreakProcessHelper::install(
            BreakProcessKind::EntryPoint,
            &mut manager,
            &mut fake,
            &modules,
        );

        let main = Token::new(0x0600_0002);
        let app = loaded_module(&MetadataBuilder::new(), 1, "App.dll");
        fake.set_header(app.handle, cor20_header(main));
        fake.add_function(app.handle, main, FunctionHandle(1));
        modules.add(app.clone());

        let mut event = module_loaded(app.handle);
        manager.dispatch(&mut event, &mut fake, &modules);
        assert_eq!(manager.len(), 1);
        assert_eq!(fake.active_count(), 1);
        let native = manager.iter().next().unwrap().bound()[0].native;

        helper.cancel(&mut manager, &mut fake);
        assert!(manager.is_empty());
        assert_eq!(fake.active_count(), 0);
        assert!(!fake.breakpoint_active(native));

        let mut event = hit(native);
        manager.dispatch(&mut event, &mut fake, &modules);
        assert!(!event.is_paused());
        assert!(!helper.entry_reached());
    }

    #[test]
    fn cancel_removes_transient() {
        let mut fake = FakeTransport::new();
        let modules = ModuleRegistry::new();
        let mut manager = BreakpointManager::new();
        let mut helper = BreakProcessHelper::install(
            BreakProcessKind::EntryPoint,
            &mut manager,
            &mut fake,
            &modules,
        );

        helper.cancel(&mut manager, &mut fake);
        assert!(manager.is_empty());
        assert_eq!(helper.kind(), BreakProcessKind::EntryPoint);
    }
}
