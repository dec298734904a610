//! Opaque handles of objects living in the target process.
//!
//! The transport hands these out and the engine only compares and stores them; none of them
//! carries meaning outside the connection that produced it.

macro_rules! handle {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub u64);

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, concat!($prefix, ":{:#x}"), self.0)
            }
        }
    };
}

handle!(
    /// A debugged process
    ProcessHandle,
    "process"
);
handle!(
    /// An application domain inside a process
    AppDomainHandle,
    "appdomain"
);
handle!(
    /// A managed thread
    ThreadHandle,
    "thread"
);
handle!(
    /// An assembly loaded into an application domain
    AssemblyHandle,
    "assembly"
);
handle!(
    /// One loaded instance of a module. Loading the same module twice yields two handles.
    ModuleHandle,
    "module"
);
handle!(
    /// A managed function of a loaded module
    FunctionHandle,
    "function"
);
handle!(
    /// A breakpoint object created by the transport
    NativeBreakpointHandle,
    "bp"
);
handle!(
    /// The object that has to be resumed after an event: a process or an application domain
    ControllerHandle,
    "controller"
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display() {
        assert_eq!(ModuleHandle(0x10).to_string(), "module:0x10");
        assert_eq!(ControllerHandle(1).to_string(), "controller:0x1");
    }
}
