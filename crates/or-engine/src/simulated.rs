//! Simulated in-process engine
//!
//! Runs a fixed script of memory accesses once per requested frame while
//! honouring run states, breakpoints and stop requests the same way a native
//! core does. Snapshots are JSON. Faults can be injected to exercise the
//! controller's crash, startup and teardown paths.

use crate::engine::{
    ConfigSection, CoreCallbacks, DebugCallbacks, Engine, StateCallback,
};
use crate::module::{ModuleHandle, ModuleLoader, PluginModule};
use crate::types::{
    Breakpoint, BreakpointFlags, CoreParam, EmuState, MemoryRegion, RunState, BREAKPOINT_WIDTH,
    SAVE_RAM_SIZE, STEP_SENTINEL,
};
use or_core::error::EngineResult;
use or_core::{AccessKind, EngineError, EngineStatus, ParamValue, PluginError, PluginKind};
use parking_lot::{Condvar, Mutex};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

/// Size of the simulated work RAM; addresses wrap into it
pub const WORK_RAM_SIZE: usize = 0x1000;

const ENGINE_HANDLE: ModuleHandle = ModuleHandle(0x0E40_0000);

/// VI_CURRENT_REG; holds the low 32 bits of the frame counter
const VI_CURRENT_OFFSET: usize = 0x10;

/// Register count of each register block
fn register_words(region: MemoryRegion) -> usize {
    match region {
        MemoryRegion::Rdram => 0,
        MemoryRegion::PiReg => 13,
        MemoryRegion::SiReg => 4,
        MemoryRegion::ViReg => 15,
        MemoryRegion::RiReg => 8,
        MemoryRegion::AiReg => 6,
    }
}

/// One memory access performed every frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScriptedAccess {
    pub kind: AccessKind,
    pub address: u32,
    /// Stored little-endian by write accesses
    pub value: u32,
}

impl ScriptedAccess {
    pub fn read(address: u32) -> Self {
        Self { kind: AccessKind::Read, address, value: 0 }
    }

    pub fn write(address: u32, value: u32) -> Self {
        Self { kind: AccessKind::Write, address, value }
    }

    pub fn execute(address: u32) -> Self {
        Self { kind: AccessKind::Execute, address, value: 0 }
    }
}

/// Injected misbehaviour
#[derive(Debug, Clone, Default)]
pub struct Faults {
    /// Worker exits with an error instead of running this frame
    pub crash_at_frame: Option<u64>,
    pub fail_startup: bool,
    /// Execute never reports `EmuState::Running`
    pub never_report_running: bool,
    /// Execute returns before reporting anything
    pub exit_immediately: bool,
    pub reject_attach: HashSet<PluginKind>,
    /// Stop commands are accepted but ignored
    pub ignore_stop: bool,
    /// Save/load state report a failed completion
    pub reject_state: bool,
}

/// Counters of commands received
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SimStats {
    pub steps: u32,
    pub run_state_changes: u32,
    pub stops: u32,
    pub shutdowns: u32,
    pub advances: u32,
    pub attaches: u32,
    pub detaches: u32,
    pub resets: u32,
    pub breaks: u32,
}

#[derive(Serialize, Deserialize)]
struct Snapshot {
    frame: u64,
    work_ram: Vec<u8>,
}

struct SimState {
    started: bool,
    executing: bool,
    stop_requested: bool,
    pending_frames: u32,
    step_tokens: u32,
    run_state: RunState,
    frame: u64,
    image: Option<Vec<u8>>,
    script: Vec<ScriptedAccess>,
    sections: Vec<(String, BTreeMap<String, ParamValue>)>,
    attached: BTreeMap<PluginKind, ModuleHandle>,
    breakpoints: Vec<Option<Breakpoint>>,
    triggered: (BreakpointFlags, u32),
    work_ram: Vec<u8>,
    registers: BTreeMap<MemoryRegion, Vec<u8>>,
    save_ram: Vec<u8>,
    on_state: Option<StateCallback>,
    core: CoreCallbacks,
    debug: DebugCallbacks,
    faults: Faults,
    stats: SimStats,
}

impl Default for SimState {
    fn default() -> Self {
        Self {
            started: false,
            executing: false,
            stop_requested: false,
            pending_frames: 0,
            step_tokens: 0,
            run_state: RunState::Paused,
            frame: 0,
            image: None,
            script: Vec::new(),
            sections: Vec::new(),
            attached: BTreeMap::new(),
            breakpoints: Vec::new(),
            triggered: (BreakpointFlags::empty(), 0),
            work_ram: vec![0; WORK_RAM_SIZE],
            registers: MemoryRegion::ALL
                .into_iter()
                .filter(|region| *region != MemoryRegion::Rdram)
                .map(|region| (region, vec![0; register_words(region) * 4]))
                .collect(),
            save_ram: vec![0; SAVE_RAM_SIZE],
            on_state: None,
            core: CoreCallbacks::default(),
            debug: DebugCallbacks::default(),
            faults: Faults::default(),
            stats: SimStats::default(),
        }
    }
}

fn ram_index(address: u32) -> usize {
    address as usize & (WORK_RAM_SIZE - 1)
}

/// In-process engine driven by a memory-access script
pub struct SimulatedEngine {
    state: Mutex<SimState>,
    wake: Condvar,
}

impl Default for SimulatedEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedEngine {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(SimState::default()),
            wake: Condvar::new(),
        }
    }

    /// Engine running `script` every frame
    pub fn with_script(script: Vec<ScriptedAccess>) -> Self {
        let engine = Self::new();
        engine.set_script(script);
        engine
    }

    pub fn set_script(&self, script: Vec<ScriptedAccess>) {
        self.state.lock().script = script;
    }

    /// Adjust injected faults
    pub fn inject(&self, f: impl FnOnce(&mut Faults)) {
        f(&mut self.state.lock().faults);
    }

    /// Stop the worker even when stop commands are being ignored
    pub fn force_stop(&self) {
        self.state.lock().stop_requested = true;
        self.wake.notify_all();
    }

    // Inspection

    pub fn stats(&self) -> SimStats {
        self.state.lock().stats.clone()
    }

    pub fn frame(&self) -> u64 {
        self.state.lock().frame
    }

    pub fn run_state(&self) -> RunState {
        self.state.lock().run_state
    }

    pub fn is_started(&self) -> bool {
        self.state.lock().started
    }

    pub fn has_image(&self) -> bool {
        self.state.lock().image.is_some()
    }

    /// Value stored under `name` in section `section`
    pub fn parameter(&self, section: &str, name: &str) -> Option<ParamValue> {
        let s = self.state.lock();
        s.sections
            .iter()
            .find(|(n, _)| n == section)
            .and_then(|(_, params)| params.get(name).cloned())
    }

    pub fn attached(&self) -> Vec<PluginKind> {
        self.state.lock().attached.keys().copied().collect()
    }

    pub fn breakpoints(&self) -> Vec<Breakpoint> {
        self.state.lock().breakpoints.iter().flatten().copied().collect()
    }

    /// 32-bit little-endian word of work RAM
    pub fn peek(&self, address: u32) -> u32 {
        let s = self.state.lock();
        let mut bytes = [0u8; 4];
        for (i, byte) in bytes.iter_mut().enumerate() {
            *byte = s.work_ram[ram_index(address.wrapping_add(i as u32))];
        }
        u32::from_le_bytes(bytes)
    }

    /// Overwrite bytes of save RAM starting at `offset`
    pub fn poke_save_ram(&self, offset: usize, bytes: &[u8]) {
        let mut s = self.state.lock();
        let end = (offset + bytes.len()).min(SAVE_RAM_SIZE);
        if offset < end {
            s.save_ram[offset..end].copy_from_slice(&bytes[..end - offset]);
        }
    }

    /// Deliver a debugger update with `index` from the calling thread
    pub fn report_debug_update(&self, index: i32) {
        let update = self.state.lock().debug.update.clone();
        if let Some(update) = update {
            update(index);
        }
    }

    fn notify(&self, param: CoreParam, value: i32) {
        let callback = self.state.lock().on_state.clone();
        if let Some(callback) = callback {
            callback(param, value);
        }
    }

    fn run_frames(&self) -> EngineResult<()> {
        loop {
            let script = {
                let mut s = self.state.lock();
                while s.pending_frames == 0 && !s.stop_requested {
                    self.wake.wait(&mut s);
                }
                if s.stop_requested {
                    return Ok(());
                }
                s.pending_frames -= 1;
                if s.faults.crash_at_frame == Some(s.frame + 1) {
                    tracing::error!("Simulated engine crashing at frame {}", s.frame + 1);
                    return Err(EngineError::Status {
                        command: "execute",
                        status: EngineStatus::SystemFail,
                    });
                }
                s.script.clone()
            };

            for access in script {
                if !self.perform(access) {
                    return Ok(());
                }
            }

            let (vi, render, frame) = {
                let mut s = self.state.lock();
                s.frame += 1;
                let current = (s.frame as u32).to_le_bytes();
                if let Some(vi) = s.registers.get_mut(&MemoryRegion::ViReg) {
                    vi[VI_CURRENT_OFFSET..VI_CURRENT_OFFSET + 4].copy_from_slice(&current);
                }
                tracing::trace!("Simulated frame {} complete", s.frame);
                (s.debug.vi.clone(), s.core.render.clone(), s.core.frame.clone())
            };
            for callback in [vi, render, frame].into_iter().flatten() {
                callback();
            }
        }
    }

    /// Run one access; `false` when a stop interrupted it
    fn perform(&self, access: ScriptedAccess) -> bool {
        let flag = BreakpointFlags::for_access(access.kind);
        let mut s = self.state.lock();

        let stepped = loop {
            if s.stop_requested {
                return false;
            }
            let run_state = s.run_state;
            match run_state {
                RunState::Running => break false,
                RunState::Paused | RunState::Stepping if s.step_tokens > 0 => {
                    s.step_tokens -= 1;
                    break run_state == RunState::Stepping;
                }
                _ => self.wake.wait(&mut s),
            }
        };

        let hit = s.breakpoints.iter().position(|bp| {
            bp.map_or(false, |bp| {
                bp.is_enabled()
                    && bp.flags.contains(flag)
                    && bp.overlaps(access.address, BREAKPOINT_WIDTH)
            })
        });
        if let Some(index) = hit {
            s.triggered = (flag, access.address);
            s.run_state = RunState::Paused;
            s.step_tokens = 0;
            s.stats.breaks += 1;
            let update = s.debug.update.clone();
            drop(s);

            if let Some(update) = update {
                update(index as i32);
            }

            s = self.state.lock();
            while s.step_tokens == 0 && !s.stop_requested {
                self.wake.wait(&mut s);
            }
            if s.stop_requested {
                return false;
            }
            s.step_tokens -= 1;
        }

        if access.kind == AccessKind::Write {
            for (i, byte) in access.value.to_le_bytes().into_iter().enumerate() {
                let index = ram_index(access.address.wrapping_add(i as u32));
                s.work_ram[index] = byte;
            }
        }

        let update = if stepped { s.debug.update.clone() } else { None };
        drop(s);
        if let Some(update) = update {
            update(STEP_SENTINEL);
        }
        true
    }

    fn status_error(command: &'static str, status: EngineStatus) -> EngineError {
        EngineError::Status { command, status }
    }
}

impl Engine for SimulatedEngine {
    fn name(&self) -> &str {
        "simulated"
    }

    fn module_handle(&self) -> ModuleHandle {
        ENGINE_HANDLE
    }

    fn startup(
        &self,
        api_version: i32,
        _config_dir: &Path,
        _data_dir: &Path,
        on_state: StateCallback,
    ) -> EngineResult<()> {
        let mut s = self.state.lock();
        if s.faults.fail_startup {
            return Err(EngineError::Startup("simulated startup failure".to_string()));
        }
        if s.started {
            return Err(Self::status_error("startup", EngineStatus::AlreadyInit));
        }
        tracing::debug!("Simulated engine starting (api 0x{:06x})", api_version);
        s.started = true;
        s.stop_requested = false;
        s.pending_frames = 0;
        s.run_state = RunState::Paused;
        s.on_state = Some(on_state);
        Ok(())
    }

    fn shutdown(&self) -> EngineResult<()> {
        let mut s = self.state.lock();
        s.stats.shutdowns += 1;
        s.started = false;
        s.on_state = None;
        s.core = CoreCallbacks::default();
        s.debug = DebugCallbacks::default();
        Ok(())
    }

    fn open_config_section(&self, name: &str) -> EngineResult<ConfigSection> {
        let mut s = self.state.lock();
        if let Some(index) = s.sections.iter().position(|(n, _)| n == name) {
            return Ok(ConfigSection(index));
        }
        s.sections.push((name.to_string(), BTreeMap::new()));
        Ok(ConfigSection(s.sections.len() - 1))
    }

    fn set_parameter(
        &self,
        section: ConfigSection,
        name: &str,
        value: &ParamValue,
    ) -> EngineResult<()> {
        let mut s = self.state.lock();
        let (_, params) = s
            .sections
            .get_mut(section.0)
            .ok_or_else(|| Self::status_error("set_parameter", EngineStatus::InputInvalid))?;
        params.insert(name.to_string(), value.clone());
        Ok(())
    }

    fn open_image(&self, image: &[u8]) -> EngineResult<()> {
        let mut s = self.state.lock();
        if !s.started {
            return Err(Self::status_error("open_image", EngineStatus::NotInit));
        }
        if image.is_empty() {
            return Err(Self::status_error("open_image", EngineStatus::InputInvalid));
        }
        s.image = Some(image.to_vec());
        Ok(())
    }

    fn close_image(&self) -> EngineResult<()> {
        let mut s = self.state.lock();
        if s.image.take().is_none() {
            return Err(Self::status_error("close_image", EngineStatus::InvalidState));
        }
        Ok(())
    }

    fn set_core_callbacks(&self, callbacks: CoreCallbacks) -> EngineResult<()> {
        self.state.lock().core = callbacks;
        Ok(())
    }

    fn execute(&self) -> EngineResult<()> {
        let (report_running, init) = {
            let mut s = self.state.lock();
            if s.image.is_none() {
                return Err(Self::status_error("execute", EngineStatus::InvalidState));
            }
            if s.faults.exit_immediately {
                tracing::warn!("Simulated engine exiting immediately");
                return Ok(());
            }
            s.executing = true;
            (!s.faults.never_report_running, s.debug.init.clone())
        };

        if report_running {
            self.notify(CoreParam::EmuState, EmuState::Running.raw());
        }
        if let Some(init) = init {
            init();
        }

        let result = self.run_frames();
        {
            let mut s = self.state.lock();
            s.executing = false;
            s.stop_requested = false;
        }
        if result.is_ok() {
            self.notify(CoreParam::EmuState, EmuState::Stopped.raw());
        }
        result
    }

    fn stop(&self) -> EngineResult<()> {
        let mut s = self.state.lock();
        s.stats.stops += 1;
        if s.faults.ignore_stop {
            return Ok(());
        }
        if s.executing {
            s.stop_requested = true;
            self.wake.notify_all();
        }
        Ok(())
    }

    fn reset(&self, hard: bool) -> EngineResult<()> {
        let mut s = self.state.lock();
        s.stats.resets += 1;
        if hard {
            s.work_ram.iter_mut().for_each(|b| *b = 0);
        }
        Ok(())
    }

    fn advance_frame(&self) -> EngineResult<()> {
        let mut s = self.state.lock();
        s.stats.advances += 1;
        s.pending_frames += 1;
        self.wake.notify_all();
        Ok(())
    }

    fn attach_plugin(&self, kind: PluginKind, module: ModuleHandle) -> EngineResult<()> {
        let mut s = self.state.lock();
        if s.faults.reject_attach.contains(&kind) {
            return Err(Self::status_error("attach_plugin", EngineStatus::PluginFail));
        }
        s.stats.attaches += 1;
        s.attached.insert(kind, module);
        Ok(())
    }

    fn detach_plugin(&self, kind: PluginKind) -> EngineResult<()> {
        let mut s = self.state.lock();
        s.stats.detaches += 1;
        s.attached.remove(&kind);
        Ok(())
    }

    fn set_debug_callbacks(&self, callbacks: DebugCallbacks) -> EngineResult<()> {
        self.state.lock().debug = callbacks;
        Ok(())
    }

    fn set_run_state(&self, state: RunState) -> EngineResult<()> {
        let mut s = self.state.lock();
        s.stats.run_state_changes += 1;
        s.run_state = state;
        self.wake.notify_all();
        Ok(())
    }

    fn step(&self) -> EngineResult<()> {
        let mut s = self.state.lock();
        s.stats.steps += 1;
        s.step_tokens += 1;
        self.wake.notify_all();
        Ok(())
    }

    fn add_breakpoint(&self, breakpoint: Breakpoint) -> EngineResult<u32> {
        let mut s = self.state.lock();
        let index = match s.breakpoints.iter().position(Option::is_none) {
            Some(free) => {
                s.breakpoints[free] = Some(breakpoint);
                free
            }
            None => {
                s.breakpoints.push(Some(breakpoint));
                s.breakpoints.len() - 1
            }
        };
        Ok(index as u32)
    }

    fn remove_breakpoint(&self, index: u32) -> EngineResult<()> {
        let mut s = self.state.lock();
        match s.breakpoints.get_mut(index as usize) {
            Some(slot @ Some(_)) => {
                *slot = None;
                Ok(())
            }
            _ => Err(Self::status_error("remove_breakpoint", EngineStatus::InputInvalid)),
        }
    }

    fn lookup_breakpoint(&self, address: u32, size: u32, flags: BreakpointFlags) -> Option<u32> {
        let s = self.state.lock();
        s.breakpoints
            .iter()
            .position(|bp| {
                bp.map_or(false, |bp| {
                    bp.is_enabled() && bp.flags.contains(flags) && bp.overlaps(address, size)
                })
            })
            .map(|index| index as u32)
    }

    fn breakpoint_triggered_by(&self) -> (BreakpointFlags, u32) {
        self.state.lock().triggered
    }

    fn save_state(&self, path: &Path) -> EngineResult<()> {
        let snapshot = {
            let s = self.state.lock();
            if s.faults.reject_state {
                None
            } else {
                Some(Snapshot {
                    frame: s.frame,
                    work_ram: s.work_ram.clone(),
                })
            }
        };

        let written = snapshot
            .map(|snapshot| {
                serde_json::to_vec(&snapshot)
                    .map_err(|e| e.to_string())
                    .and_then(|bytes| std::fs::write(path, bytes).map_err(|e| e.to_string()))
            })
            .unwrap_or_else(|| Err("rejected".to_string()));

        match &written {
            Ok(()) => self.notify(CoreParam::StateSaveComplete, 1),
            Err(reason) => {
                tracing::warn!("Simulated state save failed: {}", reason);
                self.notify(CoreParam::StateSaveComplete, 0);
            }
        }
        Ok(())
    }

    fn load_state(&self, path: &Path) -> EngineResult<()> {
        let rejected = self.state.lock().faults.reject_state;
        let snapshot = if rejected {
            None
        } else {
            std::fs::read(path)
                .ok()
                .and_then(|bytes| serde_json::from_slice::<Snapshot>(&bytes).ok())
                .filter(|snapshot| snapshot.work_ram.len() == WORK_RAM_SIZE)
        };

        match snapshot {
            Some(snapshot) => {
                {
                    let mut s = self.state.lock();
                    s.frame = snapshot.frame;
                    s.work_ram = snapshot.work_ram;
                }
                self.notify(CoreParam::StateLoadComplete, 1);
            }
            None => {
                tracing::warn!("Simulated state load failed for {}", path.display());
                self.notify(CoreParam::StateLoadComplete, 0);
            }
        }
        Ok(())
    }

    fn save_ram(&self, dest: &mut [u8]) -> EngineResult<()> {
        if dest.len() != SAVE_RAM_SIZE {
            return Err(Self::status_error("save_ram", EngineStatus::InputInvalid));
        }
        dest.copy_from_slice(&self.state.lock().save_ram);
        Ok(())
    }

    fn load_ram(&self, src: &[u8]) -> EngineResult<()> {
        if src.len() != SAVE_RAM_SIZE {
            return Err(Self::status_error("load_ram", EngineStatus::InputInvalid));
        }
        self.state.lock().save_ram.copy_from_slice(src);
        Ok(())
    }

    fn memory_size(&self, region: MemoryRegion) -> usize {
        let s = self.state.lock();
        match region {
            MemoryRegion::Rdram => s.work_ram.len(),
            other => s.registers.get(&other).map_or(0, Vec::len),
        }
    }

    fn read_memory(&self, region: MemoryRegion, offset: usize, dest: &mut [u8]) -> EngineResult<()> {
        let s = self.state.lock();
        let bytes = match region {
            MemoryRegion::Rdram => s.work_ram.as_slice(),
            other => s.registers.get(&other).map_or(&[][..], Vec::as_slice),
        };
        let range = region.checked_range(bytes.len(), offset, dest.len())?;
        dest.copy_from_slice(&bytes[range]);
        Ok(())
    }
}

/// Plugin lifecycle event recorded by [`SimulatedLoader`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PluginEvent {
    Loaded,
    Started,
    Shutdown,
    Unloaded,
}

type PluginLog = Arc<Mutex<Vec<(String, PluginEvent)>>>;

/// Plugin module that only records its lifecycle
pub struct SimulatedPlugin {
    kind: PluginKind,
    image: String,
    handle: ModuleHandle,
    fail_startup: bool,
    log: PluginLog,
}

impl SimulatedPlugin {
    fn record(&self, event: PluginEvent) {
        self.log.lock().push((self.image.clone(), event));
    }
}

impl PluginModule for SimulatedPlugin {
    fn kind(&self) -> PluginKind {
        self.kind
    }

    fn image(&self) -> &str {
        &self.image
    }

    fn handle(&self) -> ModuleHandle {
        self.handle
    }

    fn startup(&self, engine: ModuleHandle) -> EngineStatus {
        if self.fail_startup || engine != ENGINE_HANDLE {
            return EngineStatus::PluginFail;
        }
        self.record(PluginEvent::Started);
        EngineStatus::Success
    }

    fn shutdown(&self) -> EngineStatus {
        self.record(PluginEvent::Shutdown);
        EngineStatus::Success
    }
}

impl Drop for SimulatedPlugin {
    fn drop(&mut self) {
        self.record(PluginEvent::Unloaded);
    }
}

/// Loader handing out one shared [`SimulatedEngine`] and recording plugins
pub struct SimulatedLoader {
    engine: Arc<SimulatedEngine>,
    log: PluginLog,
    fail_load: Mutex<HashSet<String>>,
    fail_startup: Mutex<HashSet<String>>,
    fail_engine_load: AtomicBool,
    next_handle: AtomicUsize,
}

impl SimulatedLoader {
    pub fn new(engine: Arc<SimulatedEngine>) -> Self {
        Self {
            engine,
            log: Arc::new(Mutex::new(Vec::new())),
            fail_load: Mutex::new(HashSet::new()),
            fail_startup: Mutex::new(HashSet::new()),
            fail_engine_load: AtomicBool::new(false),
            next_handle: AtomicUsize::new(1),
        }
    }

    pub fn engine(&self) -> &Arc<SimulatedEngine> {
        &self.engine
    }

    /// Make loading `image` fail
    pub fn fail_load(&self, image: &str) {
        self.fail_load.lock().insert(image.to_string());
    }

    /// Make the startup entry point of `image` fail
    pub fn fail_startup(&self, image: &str) {
        self.fail_startup.lock().insert(image.to_string());
    }

    pub fn fail_engine_load(&self) {
        self.fail_engine_load.store(true, Ordering::SeqCst);
    }

    /// Every plugin event so far
    pub fn plugin_events(&self) -> Vec<(String, PluginEvent)> {
        self.log.lock().clone()
    }

    /// Number of `event`s recorded for `image`
    pub fn count(&self, image: &str, event: PluginEvent) -> usize {
        self.log
            .lock()
            .iter()
            .filter(|(i, e)| i == image && *e == event)
            .count()
    }
}

impl ModuleLoader for SimulatedLoader {
    fn load_engine(&self, image: &str) -> EngineResult<Arc<dyn Engine>> {
        if self.fail_engine_load.load(Ordering::SeqCst) {
            return Err(EngineError::Load {
                image: image.to_string(),
                reason: "simulated load failure".to_string(),
            });
        }
        Ok(self.engine.clone())
    }

    fn load_plugin(
        &self,
        kind: PluginKind,
        image: &str,
    ) -> Result<Box<dyn PluginModule>, PluginError> {
        if self.fail_load.lock().contains(image) {
            return Err(PluginError::Load {
                kind,
                image: image.to_string(),
                reason: "simulated load failure".to_string(),
            });
        }

        let plugin = SimulatedPlugin {
            kind,
            image: image.to_string(),
            handle: ModuleHandle(self.next_handle.fetch_add(1, Ordering::SeqCst)),
            fail_startup: self.fail_startup.lock().contains(image),
            log: Arc::clone(&self.log),
        };
        plugin.record(PluginEvent::Loaded);
        Ok(Box::new(plugin))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;
    use std::time::Duration;

    fn started(script: Vec<ScriptedAccess>) -> Arc<SimulatedEngine> {
        let engine = Arc::new(SimulatedEngine::with_script(script));
        engine
            .startup(0x020102, Path::new(""), Path::new(""), Arc::new(|_: CoreParam, _: i32| {}))
            .unwrap();
        engine.open_image(b"ROM").unwrap();
        engine
    }

    fn spawn(engine: &Arc<SimulatedEngine>) -> std::thread::JoinHandle<EngineResult<()>> {
        let engine = Arc::clone(engine);
        std::thread::spawn(move || engine.execute())
    }

    fn wait_for(mut done: impl FnMut() -> bool) {
        for _ in 0..500 {
            if done() {
                return;
            }
            std::thread::sleep(Duration::from_millis(2));
        }
        panic!("condition not reached");
    }

    #[test]
    fn test_memory_regions() {
        let engine = started(vec![ScriptedAccess::write(0x20, 0x0102_0304)]);
        engine.set_run_state(RunState::Running).unwrap();
        let worker = spawn(&engine);
        engine.advance_frame().unwrap();
        engine.advance_frame().unwrap();
        wait_for(|| engine.frame() == 2);

        assert_eq!(engine.memory_size(MemoryRegion::Rdram), WORK_RAM_SIZE);
        assert_eq!(engine.memory_size(MemoryRegion::ViReg), 15 * 4);
        let mut word = [0u8; 4];
        engine.read_memory(MemoryRegion::Rdram, 0x20, &mut word).unwrap();
        assert_eq!(word, [0x04, 0x03, 0x02, 0x01]);
        engine.read_memory(MemoryRegion::ViReg, VI_CURRENT_OFFSET, &mut word).unwrap();
        assert_eq!(u32::from_le_bytes(word), 2);

        assert!(matches!(
            engine.read_memory(MemoryRegion::AiReg, 6 * 4 - 2, &mut word),
            Err(EngineError::RegionBounds { region: "AI_REG", .. })
        ));

        engine.stop().unwrap();
        worker.join().unwrap().unwrap();
    }

    #[test]
    fn test_frames_advance_on_request() {
        let engine = started(vec![ScriptedAccess::write(0x10, 0xDEAD_BEEF)]);
        engine.set_run_state(RunState::Running).unwrap();
        let frames = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&frames);
        engine
            .set_core_callbacks(CoreCallbacks {
                frame: Some(Arc::new(move || {
                    counter.fetch_add(1, Ordering::SeqCst);
                })),
                render: None,
            })
            .unwrap();

        let worker = spawn(&engine);
        engine.advance_frame().unwrap();
        engine.advance_frame().unwrap();
        wait_for(|| frames.load(Ordering::SeqCst) == 2);
        assert_eq!(engine.frame(), 2);
        assert_eq!(engine.peek(0x10), 0xDEAD_BEEF);

        engine.stop().unwrap();
        worker.join().unwrap().unwrap();
    }

    #[test]
    fn test_breakpoint_holds_until_step() {
        let engine = started(vec![ScriptedAccess::write(0x100, 7)]);
        engine.set_run_state(RunState::Running).unwrap();
        engine
            .add_breakpoint(Breakpoint::watch(AccessKind::Write, 0x100))
            .unwrap();
        let hits = Arc::new(Mutex::new(Vec::new()));
        let seen = Arc::clone(&hits);
        engine
            .set_debug_callbacks(DebugCallbacks {
                update: Some(Arc::new(move |index: i32| seen.lock().push(index))),
                ..Default::default()
            })
            .unwrap();

        let worker = spawn(&engine);
        engine.advance_frame().unwrap();
        wait_for(|| !hits.lock().is_empty());
        assert_eq!(engine.run_state(), RunState::Paused);
        assert_eq!(engine.breakpoint_triggered_by(), (BreakpointFlags::WRITE, 0x100));
        assert_eq!(engine.peek(0x100), 0);

        engine.set_run_state(RunState::Running).unwrap();
        engine.step().unwrap();
        wait_for(|| engine.frame() == 1);
        assert_eq!(engine.peek(0x100), 7);
        assert_eq!(*hits.lock(), vec![0]);

        engine.stop().unwrap();
        worker.join().unwrap().unwrap();
    }

    #[test]
    fn test_breakpoint_table() {
        let engine = SimulatedEngine::new();
        let read = engine
            .add_breakpoint(Breakpoint::watch(AccessKind::Read, 0x200))
            .unwrap();
        let write = engine
            .add_breakpoint(Breakpoint::watch(AccessKind::Write, 0x200))
            .unwrap();
        assert_ne!(read, write);
        assert_eq!(engine.lookup_breakpoint(0x200, 4, BreakpointFlags::WRITE), Some(write));
        assert_eq!(engine.lookup_breakpoint(0x300, 4, BreakpointFlags::WRITE), None);

        engine.remove_breakpoint(read).unwrap();
        assert!(engine.remove_breakpoint(read).is_err());
        assert_eq!(engine.breakpoints().len(), 1);
        assert_eq!(
            engine
                .add_breakpoint(Breakpoint::watch(AccessKind::Execute, 0x400))
                .unwrap(),
            read
        );
    }

    #[test]
    fn test_snapshot_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        let completions = Arc::new(Mutex::new(Vec::new()));
        let seen = Arc::clone(&completions);
        let engine = SimulatedEngine::new();
        engine
            .startup(
                0x020102,
                Path::new(""),
                Path::new(""),
                Arc::new(move |param: CoreParam, value: i32| seen.lock().push((param, value))),
            )
            .unwrap();

        engine.save_state(&path).unwrap();
        engine.load_state(&path).unwrap();
        std::fs::write(&path, b"garbage").unwrap();
        engine.load_state(&path).unwrap();

        assert_eq!(
            *completions.lock(),
            vec![
                (CoreParam::StateSaveComplete, 1),
                (CoreParam::StateLoadComplete, 1),
                (CoreParam::StateLoadComplete, 0),
            ]
        );
    }

    #[test]
    fn test_save_ram_size_checked() {
        let engine = SimulatedEngine::new();
        engine.poke_save_ram(0, &[1, 2, 3]);
        let mut buffer = vec![0u8; SAVE_RAM_SIZE];
        engine.save_ram(&mut buffer).unwrap();
        assert_eq!(&buffer[..3], &[1, 2, 3]);
        assert!(engine.load_ram(&[0u8; 16]).is_err());
    }

    #[test]
    fn test_loader_records_plugin_lifecycle() {
        let loader = SimulatedLoader::new(Arc::new(SimulatedEngine::new()));
        let plugin = loader.load_plugin(PluginKind::Audio, "audio").unwrap();
        assert_eq!(plugin.startup(ENGINE_HANDLE), EngineStatus::Success);
        assert_eq!(plugin.shutdown(), EngineStatus::Success);
        drop(plugin);

        let events: Vec<_> = loader.plugin_events().into_iter().map(|(_, e)| e).collect();
        assert_eq!(
            events,
            vec![
                PluginEvent::Loaded,
                PluginEvent::Started,
                PluginEvent::Shutdown,
                PluginEvent::Unloaded
            ]
        );

        loader.fail_load("video");
        assert!(loader.load_plugin(PluginKind::Graphics, "video").is_err());
    }
}
