use std::{
    collections::{BTreeMap, HashMap, HashSet, VecDeque},
    sync::{Arc, Mutex},
};

use crate::{
    debug::{
        handles::{ControllerHandle, FunctionHandle, ModuleHandle, NativeBreakpointHandle},
        transport::{CodeKind, DebugTransport, RawCallback},
    },
    metadata::{import::MetadataImport, memory::MemoryImport, module::ModuleInfo, token::Token},
    Error, Result,
};

#[derive(Default)]
struct State {
    callbacks: VecDeque<RawCallback>,
    resumed: Vec<ControllerHandle>,
    modules: HashMap<ModuleHandle, (ModuleInfo, Arc<MemoryImport>)>,
    headers: HashMap<ModuleHandle, Vec<u8>>,
    functions: HashMap<(ModuleHandle, Token), FunctionHandle>,
    failing: HashSet<FunctionHandle>,
    breakpoints: BTreeMap<NativeBreakpointHandle, bool>,
    next_breakpoint: u64,
}

/// A scripted target. Clones share their state, so a test can keep one clone to script and
/// inspect while the engine owns another.
#[derive(Clone, Default)]
pub struct FakeTransport {
    state: Arc<Mutex<State>>,
}

impl FakeTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a callback for `next_callback`
    pub fn push(&self, raw: RawCallback) {
        lock!(self.state).callbacks.push_back(raw);
    }

    /// Every controller resumed so far, in order
    pub fn resumed(&self) -> Vec<ControllerHandle> {
        lock!(self.state).resumed.clone()
    }

    pub fn add_module(&self, handle: ModuleHandle, info: ModuleInfo, import: Arc<MemoryImport>) {
        lock!(self.state).modules.insert(handle, (info, import));
    }

    pub fn set_header(&self, module: ModuleHandle, header: Vec<u8>) {
        lock!(self.state).headers.insert(module, header);
    }

    pub fn add_function(&self, module: ModuleHandle, token: Token, function: FunctionHandle) {
        lock!(self.state).functions.insert((module, token), function);
    }

    /// Refuse every breakpoint created in `function`
    pub fn fail_breakpoints_for(&self, function: FunctionHandle) {
        lock!(self.state).failing.insert(function);
    }

    pub fn breakpoint_active(&self, breakpoint: NativeBreakpointHandle) -> bool {
        lock!(self.state)
            .breakpoints
            .get(&breakpoint)
            .copied()
            .unwrap_or(false)
    }

    /// Number of armed native breakpoints
    pub fn active_count(&self) -> usize {
        lock!(self.state)
            .breakpoints
            .values()
            .filter(|active| **active)
            .count()
    }
}

impl DebugTransport for FakeTransport {
    fn next_callback(&mut self) -> Result<Option<RawCallback>> {
        Ok(lock!(self.state).callbacks.pop_front())
    }

    fn resume(&mut self, controller: ControllerHandle) -> Result<()> {
        lock!(self.state).resumed.push(controller);
        Ok(())
    }

    fn module_info(&self, module: ModuleHandle) -> Result<ModuleInfo> {
        lock!(self.state)
            .modules
            .get(&module)
            .map(|(info, _)| info.clone())
            .ok_or(Error::ModuleNotFound)
    }

    fn metadata(&self, module: ModuleHandle) -> Result<Arc<dyn MetadataImport>> {
        let state = lock!(self.state);
        match state.modules.get(&module) {
            Some((_, import)) => Ok(import.clone() as Arc<dyn MetadataImport>),
            None => Err(Error::ModuleNotFound),
        }
    }

    fn read_cor20_header(&self, module: ModuleHandle) -> Result<Option<Vec<u8>>> {
        Ok(lock!(self.state).headers.get(&module).cloned())
    }

    fn find_function(&self, module: ModuleHandle, token: Token) -> Result<Option<FunctionHandle>> {
        Ok(lock!(self.state).functions.get(&(module, token)).copied())
    }

    fn create_breakpoint(
        &mut self,
        function: FunctionHandle,
        _kind: CodeKind,
        _offset: u32,
    ) -> Result<NativeBreakpointHandle> {
        let mut state = lock!(self.state);
        if state.failing.contains(&function) {
            return Err(Error::Transport(format!("{function} refused a breakpoint")));
        }

        state.next_breakpoint += 1;
        let handle = NativeBreakpointHandle(state.next_breakpoint);
        state.breakpoints.insert(handle, false);
        Ok(handle)
    }

    fn set_breakpoint_active(
        &mut self,
        breakpoint: NativeBreakpointHandle,
        active: bool,
    ) -> Result<()> {
        match lock!(self.state).breakpoints.get_mut(&breakpoint) {
            Some(flag) => {
                *flag = active;
                Ok(())
            }
            None => Err(Error::Transport(format!("unknown {breakpoint}"))),
        }
    }
}
