// Copyright 2025 Johann Kempter
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
// SPDX-License-Identifier: Apache-2.0

#![doc(html_no_source)]
#![deny(missing_docs)]
#![deny(unsafe_code)]
#![allow(clippy::too_many_arguments)]

//! # livescope
//!
//! The core of a live debugger for .NET targets. `livescope` keeps a lazily populated view of the
//! metadata of every module loaded in a running process, turns the callbacks of the native
//! debugging interface into typed events, and binds breakpoints to modules as they come and go.
//!
//! ## Features
//!
//! - **Lazy metadata** - rows are read from the target on first use and cached per module
//! - **Stable identity** - resolving a token twice yields the same object, except for rows whose
//!   meaning depends on open generic arguments
//! - **Dynamic modules** - types emitted at runtime are discovered and announced to subscribers
//! - **Typed events** - every callback of the native interface decoded into one closed enum
//! - **Breakpoints** - logical breakpoints that survive module unloads and rebind on reload
//! - **Startup strategies** - pause at process creation, module load, module initializer or
//!   entry point
//!
//! ## Quick Start
//!
//! The live model works against any [`metadata::import::MetadataImport`]. The in-memory
//! [`metadata::memory::MemoryImport`] is handy to try it out:
//!
//! ```rust
//! use std::sync::Arc;
//! use livescope::prelude::*;
//!
//! let import = Arc::new(MemoryImport::new());
//! import.insert(RawRow::TypeDef(TypeDefRaw {
//!     token: Token::new(0x0200_0001),
//!     flags: 0x0000_0001,
//!     name: "Program".to_string(),
//!     namespace: "App".to_string(),
//!     extends: Token::new(0),
//! }));
//!
//! let key = ModuleKey::new("App", "App.dll", false, false);
//! let view = ModuleView::new(ModuleInfo::new(key), import, &EngineConfig::default());
//!
//! let program = view.resolve_type_def(1).unwrap();
//! assert_eq!(program.full_name(), "App.Program");
//! ```
//!
//! ### Driving a target
//!
//! A [`debug::transport::DebugTransport`] connects the engine to the native interface. The
//! engine lives on its own thread:
//!
//! ```rust,no_run
//! use livescope::prelude::*;
//!
//! fn run(transport: Box<dyn DebugTransport>) -> livescope::Result<()> {
//!     let thread = DebuggerThread::spawn(move || {
//!         DebuggerEngine::new(transport, EngineConfig::interactive())
//!     })?;
//!
//!     while let Some(event) = thread.invoke(|engine| engine.wait_next_event())?? {
//!         println!("paused: {:?}", event.pause_reasons());
//!         thread.invoke(move |engine| engine.resume(&event))??;
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! - [`metadata`] - the live metadata model: module views, lazy proxies, signatures, caches
//! - [`debug`] - transport boundary, typed events, breakpoints, startup strategies, the engine
//! - [`config`] - [`config::EngineConfig`] and its presets
//! - [`prelude`] - Convenient re-exports of commonly used types and traits
//! - [`Error`] and [`Result`] - error handling
//!
//! ## Threading
//!
//! Everything that talks to the target runs on one thread. Module views and their objects are
//! `Send + Sync` and can be read from anywhere; a lazy object initialises at most once even when
//! several threads race for it.
//!
//! ## Logging
//!
//! The crate logs through [`tracing`] and never installs a subscriber.
#[macro_use]
pub(crate) mod macros;

#[macro_use]
pub(crate) mod error;

/// Shared functionality which is used in unit-tests
#[cfg(test)]
pub(crate) mod test;

/// Convenient re-exports of the most commonly used types and traits.
///
/// # Example
///
/// ```rust
/// use livescope::prelude::*;
///
/// let config = EngineConfig::minimal();
/// assert_eq!(config.startup, BreakProcessKind::None);
/// ```
pub mod prelude;

/// Engine configuration and its presets
pub mod config;

/// Debug events, breakpoints and the engine driving the target
pub mod debug;

/// The live metadata model of modules loaded in the target
pub mod metadata;

/// Blob parsing helpers and cooperative cancellation
pub mod utils;

/// `livescope` Result type
///
/// A type alias for `std::result::Result<T, Error>` where the error type is always [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// `livescope` Error type
///
/// The main error type for all operations in this crate.
///
/// # Examples
///
/// ```rust
/// use livescope::Error;
///
/// fn describe(err: &Error) -> &'static str {
///     match err {
///         Error::Cancelled => "cancelled",
///         Error::WrongThread => "called from the wrong thread",
///         Error::Malformed { .. } => "malformed data",
///         _ => "other",
///     }
/// }
/// assert_eq!(describe(&Error::Cancelled), "cancelled");
/// ```
pub use error::Error;

/// Cursor over a byte slice, used to read signatures and headers
pub use utils::Parser;
