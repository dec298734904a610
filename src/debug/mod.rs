//! The debugger side: events from the target, breakpoints, and the engine driving both.
//!
//! # Key Components
//!
//! - [`transport`] - the [`transport::DebugTransport`] boundary and raw callbacks
//! - [`event`] - typed [`event::DebugEvent`]s and their pause reasons
//! - [`channel`] - thread-bound decoding and the built-in event watchers
//! - [`breakpoints`] - logical breakpoints, binding and conditions
//! - [`startup`] - where a freshly started target pauses
//! - [`engine`] - [`engine::DebuggerEngine`], the control loop
//! - [`thread`] - [`thread::DebuggerThread`], the engine on its own thread

pub mod breakpoints;
pub mod channel;
pub mod engine;
pub mod event;
pub mod handles;
pub mod modules;
pub mod startup;
pub mod thread;
pub mod transport;
