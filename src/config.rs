//! Engine configuration
//!
//! [`EngineConfig`] collects the knobs of the live metadata model (synthetic rid range, discovery
//! bound), the built-in event watchers and the startup strategy.

use crate::debug::startup::BreakProcessKind;

/// Configuration of a [`crate::debug::engine::DebuggerEngine`] and the module views it creates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(clippy::struct_excessive_bools)]
pub struct EngineConfig {
    /// First rid handed to rows synthesized at runtime. Discovery never probes at or beyond it,
    /// so it must stay above any rid the target will hand out for real rows (default: `0x00F0_0000`)
    pub synthetic_rid_base: u32,

    /// Upper bound on the rids probed by a single `discover_new_*` call (default: `0x1_0000`)
    pub max_discovery_probe: u32,

    /// Pause on `Break` events (`Debugger.Break()` and break requests)
    pub pause_on_break: bool,

    /// Pause when a step completes
    pub pause_on_step_complete: bool,

    /// Pause on unhandled exceptions
    pub pause_on_unhandled_exception: bool,

    /// Pause on first chance exceptions
    pub pause_on_first_chance_exception: bool,

    /// Pause when the runtime reports a debugger error
    pub pause_on_debugger_error: bool,

    /// Where to stop when the process starts
    pub startup: BreakProcessKind,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            synthetic_rid_base: 0x00F0_0000,
            max_discovery_probe: 0x1_0000,
            pause_on_break: true,
            pause_on_step_complete: true,
            pause_on_unhandled_exception: true,
            pause_on_first_chance_exception: false,
            pause_on_debugger_error: true,
            startup: BreakProcessKind::EntryPoint,
        }
    }
}

impl EngineConfig {
    /// Creates a configuration without any built-in pause reason or startup break.
    ///
    /// Only breakpoints added by the caller stop the target.
    #[must_use]
    pub fn minimal() -> Self {
        Self {
            pause_on_break: false,
            pause_on_step_complete: false,
            pause_on_unhandled_exception: false,
            pause_on_first_chance_exception: false,
            pause_on_debugger_error: false,
            startup: BreakProcessKind::None,
            ..Self::default()
        }
    }

    /// Creates a configuration for an interactive session
    ///
    /// Stops on every exception and at the first module initializer or entry point.
    #[must_use]
    pub fn interactive() -> Self {
        Self {
            pause_on_first_chance_exception: true,
            startup: BreakProcessKind::ModuleCctorOrEntryPoint,
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_config_presets() {
        let minimal = EngineConfig::minimal();
        assert!(!minimal.pause_on_break);
        assert!(!minimal.pause_on_step_complete);
        assert!(!minimal.pause_on_unhandled_exception);
        assert!(!minimal.pause_on_debugger_error);
        assert_eq!(minimal.startup, BreakProcessKind::None);
        assert_eq!(minimal.synthetic_rid_base, 0x00F0_0000);

        let interactive = EngineConfig::interactive();
        assert!(interactive.pause_on_first_chance_exception);
        assert!(interactive.pause_on_unhandled_exception);
        assert_eq!(interactive.startup, BreakProcessKind::ModuleCctorOrEntryPoint);
    }

    #[test]
    fn test_default_config() {
        let default = EngineConfig::default();
        assert_eq!(default.max_discovery_probe, 0x1_0000);
        assert!(default.pause_on_break);
        assert!(!default.pause_on_first_chance_exception);
        assert_eq!(default.startup, BreakProcessKind::EntryPoint);
    }
}
