//! Session controller
//!
//! A [`Session`] owns one engine, its plugins and the worker thread that
//! runs the engine's blocking `execute`. The caller drives emulation one
//! frame at a time with [`Session::advance_frame`]; breakpoint hits raised
//! while the frame runs are delivered and the engine resumed before the call
//! returns.
//!
//! Only one session exists per process. Starting a new one tears down the
//! previous one first.

use crate::breakpoints::BreakpointTable;
use crate::events::{EngineSignal, EventDispatcher, PendingBreakEvent};
use crate::plugins::PluginRegistry;
use crate::run_state::RunStateMachine;
use crate::savestate;
use crossbeam::channel::RecvTimeoutError;
use once_cell::sync::Lazy;
use or_core::config::{CoreConfig, SessionConfig, VideoConfig};
use or_core::error::EngineResult;
use or_core::{AccessKind, Config, ParamValue, PluginKind, Result, SessionError};
use or_engine::{
    CoreCallbacks, CoreParam, DebugCallbacks, Engine, MemoryRegion, ModuleLoader, RunState,
    API_VERSION, SAVE_RAM_SIZE, STEP_SENTINEL,
};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::thread::JoinHandle;
use std::time::Instant;

/// The session currently registered process-wide
static ACTIVE_SESSION: Lazy<Mutex<Option<Weak<SessionInner>>>> = Lazy::new(|| Mutex::new(None));

/// Resources owned by a session
#[derive(Default)]
struct Controller {
    engine: Option<Arc<dyn Engine>>,
    plugins: Option<PluginRegistry>,
    worker: Option<JoinHandle<()>>,
    engine_started: bool,
    image_open: bool,
    /// Populated exactly once, at teardown
    save_ram_backup: Option<Vec<u8>>,
    torn_down: bool,
}

struct SessionInner {
    controller: Mutex<Controller>,
    dispatcher: Arc<EventDispatcher>,
    run_state: Arc<RunStateMachine>,
    alive: Arc<AtomicBool>,
    frame_count: AtomicU64,
    timing: SessionConfig,
}

/// Marks the engine dead when the worker leaves `execute`, even by panic
struct WorkerExit {
    alive: Arc<AtomicBool>,
    dispatcher: Arc<EventDispatcher>,
}

impl Drop for WorkerExit {
    fn drop(&mut self) {
        self.alive.store(false, Ordering::SeqCst);
        self.dispatcher.engine_exited();
    }
}

fn apply_core_config(engine: &dyn Engine, core: &CoreConfig) -> EngineResult<()> {
    let section = engine.open_config_section("Core")?;
    if core.disable_expansion_memory {
        engine.set_parameter(section, "DisableExtraMem", &ParamValue::Int(1))?;
    }
    if let Some(save_type) = core.save_type.raw() {
        engine.set_parameter(section, "SaveType", &ParamValue::Int(save_type))?;
    }
    engine.set_parameter(section, "R4300Emulator", &ParamValue::Int(core.emulator.raw()))?;
    engine.set_parameter(section, "EnableDebugger", &ParamValue::Int(1))?;
    Ok(())
}

fn apply_video_config(engine: &dyn Engine, video: &VideoConfig) -> EngineResult<()> {
    let general = engine.open_config_section("Video-General")?;
    engine.set_parameter(general, "ScreenWidth", &ParamValue::Int(video.width))?;
    engine.set_parameter(general, "ScreenHeight", &ParamValue::Int(video.height))?;

    if !video.parameters.is_empty() {
        let section = engine.open_config_section(video.plugin.section_name())?;
        for (name, value) in &video.parameters {
            engine.set_parameter(section, name, value)?;
        }
    }
    Ok(())
}

impl SessionInner {
    fn new(timing: SessionConfig) -> Self {
        Self {
            controller: Mutex::new(Controller::default()),
            dispatcher: Arc::new(EventDispatcher::new()),
            run_state: Arc::new(RunStateMachine::new()),
            alive: Arc::new(AtomicBool::new(false)),
            frame_count: AtomicU64::new(0),
            timing,
        }
    }

    fn boot(
        &self,
        loader: Arc<dyn ModuleLoader>,
        engine_image: &str,
        rom: &[u8],
        config: &Config,
    ) -> Result<()> {
        let engine = loader.load_engine(engine_image)?;
        tracing::info!("Loaded engine {}", engine.name());
        self.controller.lock().engine = Some(Arc::clone(&engine));

        let dispatcher = Arc::clone(&self.dispatcher);
        engine.startup(
            API_VERSION,
            &config.paths.engine_config,
            &config.paths.engine_data,
            Arc::new(move |param: CoreParam, value: i32| dispatcher.state_changed(param, value)),
        )?;
        self.controller.lock().engine_started = true;

        apply_core_config(engine.as_ref(), &config.core)?;
        engine.open_image(rom)?;
        self.controller.lock().image_open = true;
        apply_video_config(engine.as_ref(), &config.video)?;

        self.register_callbacks(&engine)?;

        let mut plugins = PluginRegistry::new(Arc::clone(&engine), loader);
        let attached = config
            .plugins
            .configured()
            .into_iter()
            .try_for_each(|(kind, image)| plugins.attach(kind, image).map(|_| ()));
        self.controller.lock().plugins = Some(plugins);
        attached?;

        self.spawn_worker(&engine)?;
        self.dispatcher
            .wait_for_startup(self.timing.startup_timeout())?;
        Ok(())
    }

    fn register_callbacks(&self, engine: &Arc<dyn Engine>) -> EngineResult<()> {
        let frame_dispatcher = Arc::clone(&self.dispatcher);
        let render_dispatcher = Arc::clone(&self.dispatcher);
        engine.set_core_callbacks(CoreCallbacks {
            frame: Some(Arc::new(move || frame_dispatcher.frame_ended())),
            render: Some(Arc::new(move || render_dispatcher.emit_before_render())),
        })?;

        let init_engine: Weak<dyn Engine> = Arc::downgrade(engine);
        let init_state = Arc::clone(&self.run_state);
        let init_dispatcher = Arc::clone(&self.dispatcher);
        let update_engine: Weak<dyn Engine> = Arc::downgrade(engine);
        let update_state = Arc::clone(&self.run_state);
        let update_dispatcher = Arc::clone(&self.dispatcher);
        let vi_dispatcher = Arc::clone(&self.dispatcher);

        engine.set_debug_callbacks(DebugCallbacks {
            init: Some(Arc::new(move || {
                let Some(engine) = init_engine.upgrade() else {
                    return;
                };
                match init_state.on_debugger_initialized(engine.as_ref()) {
                    Ok(()) => {
                        tracing::debug!("Debugger initialized, running");
                        init_dispatcher.debugger_ready();
                    }
                    Err(e) => tracing::error!("Failed to start engine after debugger init: {}", e),
                }
            })),
            update: Some(Arc::new(move |index: i32| {
                if index == STEP_SENTINEL {
                    update_state.on_step_completed();
                    tracing::trace!("Step completed");
                    return;
                }
                update_state.on_break_reported();
                let Some(engine) = update_engine.upgrade() else {
                    return;
                };
                let (kind, address) = BreakpointTable::new(engine.as_ref()).triggered_by();
                update_dispatcher.breakpoint(kind, address);
            })),
            vi: Some(Arc::new(move || vi_dispatcher.emit_vertical_interrupt())),
        })
    }

    fn spawn_worker(&self, engine: &Arc<dyn Engine>) -> Result<()> {
        let exit = WorkerExit {
            alive: Arc::clone(&self.alive),
            dispatcher: Arc::clone(&self.dispatcher),
        };
        let engine = Arc::clone(engine);

        self.alive.store(true, Ordering::SeqCst);
        let spawned = std::thread::Builder::new()
            .name("or-engine".to_string())
            .spawn(move || {
                let _exit = exit;
                tracing::info!("Engine thread started");
                match engine.execute() {
                    Ok(()) => tracing::info!("Engine thread finished"),
                    Err(e) => tracing::error!("Engine thread terminated: {}", e),
                }
            });

        match spawned {
            Ok(worker) => {
                self.controller.lock().worker = Some(worker);
                Ok(())
            }
            Err(e) => {
                self.alive.store(false, Ordering::SeqCst);
                Err(e.into())
            }
        }
    }

    fn engine(&self) -> Result<Arc<dyn Engine>> {
        self.controller
            .lock()
            .engine
            .clone()
            .ok_or(SessionError::SessionClosed)
    }

    /// Stop the worker and release everything, engine last
    fn teardown(&self) -> Result<()> {
        let mut controller = self.controller.lock();
        if controller.torn_down {
            return Ok(());
        }
        controller.torn_down = true;

        let Some(engine) = controller.engine.take() else {
            controller.save_ram_backup = Some(vec![0; SAVE_RAM_SIZE]);
            return Ok(());
        };
        tracing::info!("Tearing down session");

        let timeout = self.timing.stop_timeout();
        if controller.worker.is_some() {
            let deadline = Instant::now() + timeout;
            while self.alive.load(Ordering::SeqCst) {
                if Instant::now() >= deadline {
                    tracing::error!(
                        "Engine ignored stop for {:?}; abandoning it and its plugins",
                        timeout
                    );
                    controller.save_ram_backup = Some(vec![0; SAVE_RAM_SIZE]);
                    drop(controller.worker.take());
                    if let Some(plugins) = controller.plugins.take() {
                        plugins.leak();
                    }
                    std::mem::forget(engine);
                    return Err(SessionError::StopTimeout(timeout));
                }
                if let Err(e) = engine.stop() {
                    tracing::debug!("Stop command failed: {}", e);
                }
                std::thread::sleep(self.timing.stop_retry_interval());
            }
        }

        if let Some(worker) = controller.worker.take() {
            if worker.join().is_err() {
                tracing::error!("Engine thread panicked");
            }
        }

        let mut backup = vec![0u8; SAVE_RAM_SIZE];
        if controller.image_open {
            if let Err(e) = engine.save_ram(&mut backup) {
                tracing::warn!("Could not back up save RAM: {}", e);
                backup.fill(0);
            }
        }
        controller.save_ram_backup = Some(backup);

        if let Some(mut plugins) = controller.plugins.take() {
            plugins.detach_all();
        }
        if std::mem::take(&mut controller.image_open) {
            if let Err(e) = engine.close_image() {
                tracing::warn!("Closing image failed: {}", e);
            }
        }
        if std::mem::take(&mut controller.engine_started) {
            if let Err(e) = engine.shutdown() {
                tracing::warn!("Engine shutdown failed: {}", e);
            }
        }
        drop(engine);

        tracing::info!("Session torn down");
        Ok(())
    }
}

/// A running emulation session
pub struct Session {
    inner: Arc<SessionInner>,
}

impl Session {
    /// Load `engine_image`, boot `rom` and wait until the engine runs.
    ///
    /// Any previously started session is torn down first. On failure every
    /// acquired resource is released before the error is returned.
    pub fn start(
        loader: Arc<dyn ModuleLoader>,
        engine_image: &str,
        rom: &[u8],
        config: &Config,
    ) -> Result<Self> {
        let mut active = ACTIVE_SESSION.lock();
        if let Some(previous) = active.take().and_then(|weak| weak.upgrade()) {
            tracing::info!("Replacing the active session");
            if let Err(e) = previous.teardown() {
                tracing::warn!("Previous session did not tear down cleanly: {}", e);
            }
        }

        let inner = Arc::new(SessionInner::new(config.session.clone()));
        if let Err(e) = inner.boot(loader, engine_image, rom, config) {
            tracing::error!("Session start failed: {}", e);
            if let Err(cleanup) = inner.teardown() {
                tracing::warn!("Cleanup after failed start: {}", cleanup);
            }
            return Err(e);
        }

        *active = Some(Arc::downgrade(&inner));
        tracing::info!("Session started");
        Ok(Self { inner })
    }

    /// Run the engine until the next frame boundary.
    ///
    /// Does nothing when the engine is no longer alive. Breakpoint hits are
    /// dispatched and the engine resumed until the frame completes. Returns
    /// [`SessionError::EngineCrashed`] if the engine dies while waiting.
    pub fn advance_frame(&self) -> Result<()> {
        let inner = &self.inner;
        if !inner.alive.load(Ordering::SeqCst) {
            tracing::debug!("Frame advance ignored, engine not alive");
            return Ok(());
        }
        let Ok(engine) = inner.engine() else {
            return Ok(());
        };

        for signal in inner.dispatcher.drain_signals() {
            if let EngineSignal::Breakpoint(event) = signal {
                self.handle_break(engine.as_ref(), event)?;
            }
        }

        engine.advance_frame()?;
        let poll = inner.timing.poll_interval();
        loop {
            match inner.dispatcher.next_signal(poll) {
                Ok(EngineSignal::FrameEnded) => {
                    let frame = inner.frame_count.fetch_add(1, Ordering::SeqCst) + 1;
                    tracing::trace!("Frame {} finished", frame);
                    inner.dispatcher.emit_frame_finished();
                    return Ok(());
                }
                Ok(EngineSignal::Breakpoint(event)) => self.handle_break(engine.as_ref(), event)?,
                Err(RecvTimeoutError::Timeout) => {
                    if !inner.alive.load(Ordering::SeqCst) {
                        tracing::error!("Engine died while advancing a frame");
                        return Err(SessionError::EngineCrashed);
                    }
                }
                Err(RecvTimeoutError::Disconnected) => return Err(SessionError::EngineCrashed),
            }
        }
    }

    fn handle_break(&self, engine: &dyn Engine, event: PendingBreakEvent) -> Result<()> {
        tracing::debug!("Breakpoint hit: {} at 0x{:08x}", event.kind, event.address);
        self.inner
            .dispatcher
            .emit_breakpoint_hit(event.address, event.kind);
        event.dispatch();
        self.inner.run_state.resume(engine)?;
        Ok(())
    }

    // State

    /// Serialized engine state; the caller owns the buffer
    pub fn save_state(&self) -> Result<Vec<u8>> {
        let engine = self.inner.engine()?;
        savestate::save(
            engine.as_ref(),
            &self.inner.dispatcher,
            self.inner.timing.state_timeout(),
        )
    }

    /// Restore a state produced by [`Session::save_state`]
    pub fn load_state(&self, bytes: &[u8]) -> Result<()> {
        let engine = self.inner.engine()?;
        savestate::load(
            engine.as_ref(),
            &self.inner.dispatcher,
            bytes,
            self.inner.timing.state_timeout(),
        )
    }

    /// Cartridge save RAM.
    ///
    /// After teardown this is the copy taken during teardown; the engine is
    /// not queried again.
    pub fn save_non_volatile_memory(&self) -> Result<Vec<u8>> {
        let controller = self.inner.controller.lock();
        if let Some(backup) = &controller.save_ram_backup {
            return Ok(backup.clone());
        }
        let engine = controller.engine.as_ref().ok_or(SessionError::SessionClosed)?;
        let mut buffer = vec![0u8; SAVE_RAM_SIZE];
        engine.save_ram(&mut buffer)?;
        Ok(buffer)
    }

    /// Replace cartridge save RAM in the live engine
    pub fn load_non_volatile_memory(&self, bytes: &[u8]) -> Result<()> {
        if bytes.len() != SAVE_RAM_SIZE {
            return Err(SessionError::SaveRamSize {
                expected: SAVE_RAM_SIZE,
                actual: bytes.len(),
            });
        }
        self.inner.engine()?.load_ram(bytes)?;
        Ok(())
    }

    pub fn reset(&self, hard: bool) -> Result<()> {
        self.inner.engine()?.reset(hard)?;
        tracing::info!("{} reset", if hard { "Hard" } else { "Soft" });
        Ok(())
    }

    // Memory

    /// Size in bytes of `region`, 0 if the engine does not expose it
    pub fn memory_size(&self, region: MemoryRegion) -> Result<usize> {
        Ok(self.inner.engine()?.memory_size(region))
    }

    /// Copy `dest.len()` bytes of `region` starting at `offset`
    pub fn read_memory(&self, region: MemoryRegion, offset: usize, dest: &mut [u8]) -> Result<()> {
        self.inner.engine()?.read_memory(region, offset, dest)?;
        Ok(())
    }

    /// Snapshot of a whole memory region
    pub fn memory_region(&self, region: MemoryRegion) -> Result<Vec<u8>> {
        let engine = self.inner.engine()?;
        let mut bytes = vec![0u8; engine.memory_size(region)];
        engine.read_memory(region, 0, &mut bytes)?;
        Ok(bytes)
    }

    // Plugins

    pub fn attach_plugin(&self, kind: PluginKind, image: &str) -> Result<()> {
        let mut controller = self.inner.controller.lock();
        let plugins = controller
            .plugins
            .as_mut()
            .ok_or(SessionError::SessionClosed)?;
        plugins.attach(kind, image)?;
        Ok(())
    }

    pub fn detach_plugin(&self, kind: PluginKind) -> Result<()> {
        let mut controller = self.inner.controller.lock();
        let plugins = controller
            .plugins
            .as_mut()
            .ok_or(SessionError::SessionClosed)?;
        plugins.detach(kind);
        Ok(())
    }

    pub fn is_plugin_attached(&self, kind: PluginKind) -> bool {
        let controller = self.inner.controller.lock();
        controller
            .plugins
            .as_ref()
            .map_or(false, |plugins| plugins.is_attached(kind))
    }

    pub fn attached_plugins(&self) -> Vec<PluginKind> {
        let controller = self.inner.controller.lock();
        controller
            .plugins
            .as_ref()
            .map(PluginRegistry::attached_kinds)
            .unwrap_or_default()
    }

    // Debugger

    /// Watch `[address, address + 3]` for `kind` accesses
    pub fn set_breakpoint(&self, kind: AccessKind, address: u32) -> Result<u32> {
        let engine = self.inner.engine()?;
        BreakpointTable::new(engine.as_ref()).set(kind, address)
    }

    pub fn remove_breakpoint(&self, kind: AccessKind, address: u32) -> Result<()> {
        let engine = self.inner.engine()?;
        BreakpointTable::new(engine.as_ref()).remove(kind, address)
    }

    /// Set running and issue exactly one step
    pub fn resume(&self) -> Result<()> {
        let engine = self.inner.engine()?;
        self.inner.run_state.resume(engine.as_ref())?;
        Ok(())
    }

    pub fn pause(&self) -> Result<()> {
        let engine = self.inner.engine()?;
        self.inner.run_state.pause(engine.as_ref())?;
        Ok(())
    }

    pub fn step(&self) -> Result<()> {
        let engine = self.inner.engine()?;
        self.inner.run_state.step(engine.as_ref())?;
        Ok(())
    }

    pub fn run_state(&self) -> RunState {
        self.inner.run_state.state()
    }

    // Status

    pub fn is_alive(&self) -> bool {
        self.inner.alive.load(Ordering::SeqCst)
    }

    pub fn is_torn_down(&self) -> bool {
        self.inner.controller.lock().torn_down
    }

    /// Frames completed through [`Session::advance_frame`]
    pub fn frame_count(&self) -> u64 {
        self.inner.frame_count.load(Ordering::SeqCst)
    }

    /// Observer registration and memory-callback routing
    pub fn events(&self) -> &EventDispatcher {
        &self.inner.dispatcher
    }

    /// Stop the engine and release all resources. Safe to call repeatedly.
    pub fn teardown(&self) -> Result<()> {
        self.inner.teardown()
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if let Err(e) = self.inner.teardown() {
            tracing::error!("Teardown on drop failed: {}", e);
        }
    }
}
