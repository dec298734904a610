//! A dedicated thread owning a [`DebuggerEngine`].
//!
//! The native interface wants every call to come from the same thread. [`DebuggerThread`] creates
//! the engine on its own thread and runs every job posted to it there, one at a time.
//!
//! # Examples
//!
//! ```rust,no_run
//! use livescope::config::EngineConfig;
//! use livescope::debug::{engine::DebuggerEngine, thread::DebuggerThread, transport::DebugTransport};
//!
//! fn run(transport: Box<dyn DebugTransport>) -> livescope::Result<()> {
//!     let thread = DebuggerThread::spawn(move || DebuggerEngine::new(transport, EngineConfig::default()))?;
//!     if let Some(event) = thread.invoke(|engine| engine.wait_next_event())?? {
//!         thread.invoke(move |engine| engine.resume(&event))??;
//!     }
//!     Ok(())
//! }
//! ```

use std::{
    sync::mpsc::{self, Sender},
    thread::{self, JoinHandle},
};

use tracing::{debug, error};

use crate::{debug::engine::DebuggerEngine, Error, Result};

type Job = Box<dyn FnOnce(&mut DebuggerEngine) + Send>;

/// Owner of the engine thread
pub struct DebuggerThread {
    jobs: Option<Sender<Job>>,
    handle: Option<JoinHandle<()>>,
}

impl DebuggerThread {
    /// Start the thread and create the engine on it with `factory`
    ///
    /// # Errors
    /// The error of `factory`, or [`Error::Error`] if the thread could not be started.
    pub fn spawn<F>(factory: F) -> Result<Self>
    where
        F: FnOnce() -> Result<DebuggerEngine> + Send + 'static,
    {
        let (jobs, queue) = mpsc::channel::<Job>();
        let (ready, started) = mpsc::channel::<Result<()>>();

        let handle = thread::Builder::new()
            .name("livescope-debugger".to_string())
            .spawn(move || {
                let mut engine = match factory() {
                    Ok(engine) => {
                        let _ = ready.send(Ok(()));
                        engine
                    }
                    Err(err) => {
                        error!(%err, "debugger engine failed to start");
                        let _ = ready.send(Err(err));
                        return;
                    }
                };

                debug!("debugger thread running");
                while let Ok(job) = queue.recv() {
                    job(&mut engine);
                }
                debug!("debugger thread stopped");
            })
            .map_err(|err| Error::Error(format!("failed to spawn debugger thread: {err}")))?;

        match started.recv() {
            Ok(Ok(())) => Ok(DebuggerThread {
                jobs: Some(jobs),
                handle: Some(handle),
            }),
            Ok(Err(err)) => {
                let _ = handle.join();
                Err(err)
            }
            Err(_) => {
                let _ = handle.join();
                Err(Error::Error("debugger thread exited during startup".to_string()))
            }
        }
    }

    /// Run `job` on the engine thread and wait for its result
    ///
    /// # Errors
    /// [`Error::Error`] if the engine thread is gone.
    pub fn invoke<R, F>(&self, job: F) -> Result<R>
    where
        F: FnOnce(&mut DebuggerEngine) -> R + Send + 'static,
        R: Send + 'static,
    {
        let (reply, result) = mpsc::channel();
        self.post(move |engine| {
            let _ = reply.send(job(engine));
        })?;
        result
            .recv()
            .map_err(|_| Error::Error("debugger thread dropped the job".to_string()))
    }

    /// Queue `job` on the engine thread without waiting
    ///
    /// # Errors
    /// [`Error::Error`] if the engine thread is gone.
    pub fn post<F>(&self, job: F) -> Result<()>
    where
        F: FnOnce(&mut DebuggerEngine) + Send + 'static,
    {
        let jobs = self
            .jobs
            .as_ref()
            .ok_or_else(|| Error::Error("debugger thread is shut down".to_string()))?;
        jobs.send(Box::new(job))
            .map_err(|_| Error::Error("debugger thread is gone".to_string()))
    }

    /// `true` if the calling thread is the engine thread
    pub fn is_current(&self) -> bool {
        self.handle
            .as_ref()
            .is_some_and(|handle| handle.thread().id() == thread::current().id())
    }

    /// Stop accepting jobs, run the queued ones, and join the thread
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        self.jobs.take();
        if let Some(handle) = self.handle.take() {
            if handle.thread().id() == thread::current().id() {
                return;
            }
            if handle.join().is_err() {
                error!("debugger thread panicked");
            }
        }
    }
}

impl Drop for DebuggerThread {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for DebuggerThread {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DebuggerThread")
            .field("running", &self.jobs.is_some())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::EngineConfig,
        debug::{
            breakpoints::BreakpointRequest,
            event::{DebugEventType, PauseReason},
            handles::{AppDomainHandle, ControllerHandle, ThreadHandle},
            transport::{CallbackCode, RawCallback},
        },
        test::FakeTransport,
    };

    #[test]
    fn jobs_run_on_the_engine_thread() {
        let fake = FakeTransport::new();
        fake.push(
            RawCallback::new(CallbackCode::CreateThread, ControllerHandle(1))
                .with_app_domain(AppDomainHandle(1))
                .with_thread(ThreadHandle(2)),
        );

        let transport = fake.clone();
        let thread = DebuggerThread::spawn(move || {
            DebuggerEngine::new(Box::new(transport), EngineConfig::minimal())
        })
        .unwrap();
        assert!(!thread.is_current());

        let id = thread
            .invoke(|engine| {
                engine.add_breakpoint(BreakpointRequest::any_event(DebugEventType::CreateThread))
            })
            .unwrap()
            .unwrap();

        let event = thread
            .invoke(|engine| engine.wait_next_event())
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(event.pause_reasons(), &[PauseReason::Breakpoint(id)]);

        thread.invoke(move |engine| engine.resume(&event)).unwrap().unwrap();
        assert_eq!(fake.resumed(), vec![ControllerHandle(1)]);

        thread.shutdown();
    }

    #[test]
    fn factory_errors_are_returned() {
        let result = DebuggerThread::spawn(|| Err(Error::TargetDisconnected));
        assert!(matches!(result, Err(Error::TargetDisconnected)));
    }
}
