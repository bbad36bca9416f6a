#![allow(dead_code)]

use or_core::Config;
use or_engine::{ScriptedAccess, SimulatedEngine, SimulatedLoader};
use parking_lot::{Mutex, MutexGuard};
use std::sync::Arc;

/// Sessions are process-wide, so tests that start one must not overlap
static SERIAL: Mutex<()> = parking_lot::const_mutex(());

pub fn serial() -> MutexGuard<'static, ()> {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
    SERIAL.lock()
}

pub fn fast_config() -> Config {
    let mut config = Config::default();
    config.session.poll_interval_ms = 10;
    config.session.startup_timeout_ms = 2_000;
    config.session.stop_timeout_ms = 1_000;
    config.session.stop_retry_interval_ms = 2;
    config.session.state_timeout_ms = 500;
    config
}

pub fn simulated(script: Vec<ScriptedAccess>) -> (Arc<SimulatedEngine>, Arc<SimulatedLoader>) {
    let engine = Arc::new(SimulatedEngine::with_script(script));
    let loader = Arc::new(SimulatedLoader::new(Arc::clone(&engine)));
    (engine, loader)
}
