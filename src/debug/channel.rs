//! The connection to the target, bound to the thread that created it.
//!
//! [`DebugEventChannel`] pulls raw callbacks from the transport and decodes them. A callback that
//! does not decode is logged and the target is resumed right away, so a malformed notification
//! never leaves the target suspended. [`EventWatchers`] append the built-in pause reasons
//! configured in [`EngineConfig`].

use std::thread::{self, ThreadId};

use tracing::{trace, warn};

use crate::{
    config::EngineConfig,
    debug::{
        event::{DebugEvent, DebugEventKind, ExceptionStage, PauseReason},
        transport::DebugTransport,
    },
    Error, Result,
};

/// Typed events from a [`DebugTransport`], usable only on the thread that created it
pub struct DebugEventChannel {
    transport: Box<dyn DebugTransport>,
    owner: ThreadId,
}

impl DebugEventChannel {
    /// Take ownership of `transport` and bind it to the calling thread
    pub fn new(transport: Box<dyn DebugTransport>) -> Self {
        DebugEventChannel {
            transport,
            owner: thread::current().id(),
        }
    }

    fn check_thread(&self) -> Result<()> {
        if thread::current().id() == self.owner {
            Ok(())
        } else {
            Err(Error::WrongThread)
        }
    }

    /// Wait for the next event that decodes. `None` once the transport is closed.
    ///
    /// # Errors
    /// [`Error::WrongThread`] off the owning thread, transport failures.
    pub fn receive(&mut self) -> Result<Option<DebugEvent>> {
        self.check_thread()?;

        loop {
            let Some(raw) = self.transport.next_callback()? else {
                return Ok(None);
            };

            match DebugEvent::decode(&raw) {
                Ok(event) => {
                    trace!(event = ?event.event_type(), controller = %event.controller, "received event");
                    return Ok(Some(event));
                }
                Err(err) => {
                    warn!(code = raw.code, controller = %raw.controller, %err, "malformed callback, resuming");
                    self.transport.resume(raw.controller)?;
                }
            }
        }
    }

    /// Let the target continue after `event`
    ///
    /// # Errors
    /// [`Error::WrongThread`] off the owning thread, transport failures.
    pub fn resume(&mut self, event: &DebugEvent) -> Result<()> {
        self.check_thread()?;
        self.transport.resume(event.controller)
    }

    /// The transport, for queries
    ///
    /// # Errors
    /// [`Error::WrongThread`] off the owning thread.
    pub fn transport(&self) -> Result<&dyn DebugTransport> {
        self.check_thread()?;
        Ok(self.transport.as_ref())
    }

    /// The transport, for control operations
    ///
    /// # Errors
    /// [`Error::WrongThread`] off the owning thread.
    pub fn transport_mut(&mut self) -> Result<&mut dyn DebugTransport> {
        self.check_thread()?;
        Ok(self.transport.as_mut())
    }
}

impl std::fmt::Debug for DebugEventChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DebugEventChannel")
            .field("owner", &self.owner)
            .finish_non_exhaustive()
    }
}

/// Built-in pause reasons, applied after breakpoint conditions ran
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventWatchers {
    on_break: bool,
    on_step_complete: bool,
    on_unhandled_exception: bool,
    on_first_chance_exception: bool,
    on_debugger_error: bool,
}

impl EventWatchers {
    /// Watchers enabled as `config` says
    pub fn from_config(config: &EngineConfig) -> Self {
        EventWatchers {
            on_break: config.pause_on_break,
            on_step_complete: config.pause_on_step_complete,
            on_unhandled_exception: config.pause_on_unhandled_exception,
            on_first_chance_exception: config.pause_on_first_chance_exception,
            on_debugger_error: config.pause_on_debugger_error,
        }
    }

    /// Append the pause reason of every watcher interested in `event`
    pub fn apply(&self, event: &mut DebugEvent) {
        let reason = match &event.kind {
            DebugEventKind::Break { .. } if self.on_break => Some(PauseReason::UserBreak),
            DebugEventKind::StepComplete { .. } if self.on_step_complete => {
                Some(PauseReason::StepComplete)
            }
            DebugEventKind::Exception {
                unhandled: true, ..
            } if self.on_unhandled_exception => Some(PauseReason::Exception {
                first_chance: false,
            }),
            DebugEventKind::Exception2 { stage, .. } => match stage {
                ExceptionStage::FirstChance | ExceptionStage::UserFirstChance
                    if self.on_first_chance_exception =>
                {
                    Some(PauseReason::Exception { first_chance: true })
                }
                ExceptionStage::Unhandled if self.on_unhandled_exception => {
                    Some(PauseReason::Exception {
                        first_chance: false,
                    })
                }
                _ => None,
            },
            DebugEventKind::DebuggerError { .. } if self.on_debugger_error => {
                Some(PauseReason::DebuggerError)
            }
            _ => None,
        };

        if let Some(reason) = reason {
            event.add_pause_reason(reason);
        }
    }
}
