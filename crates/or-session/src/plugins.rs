//! Plugin registry
//!
//! At most one module per [`PluginKind`]. Attaching replaces whatever was
//! there; a failed attach leaves nothing behind.

use or_core::{PluginError, PluginKind};
use or_engine::{Engine, ModuleHandle, ModuleLoader, PluginModule};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Attached plugin modules of one engine
pub struct PluginRegistry {
    engine: Arc<dyn Engine>,
    loader: Arc<dyn ModuleLoader>,
    slots: BTreeMap<PluginKind, Box<dyn PluginModule>>,
}

impl PluginRegistry {
    pub fn new(engine: Arc<dyn Engine>, loader: Arc<dyn ModuleLoader>) -> Self {
        Self {
            engine,
            loader,
            slots: BTreeMap::new(),
        }
    }

    /// Load, start and attach `image` as the `kind` plugin
    pub fn attach(&mut self, kind: PluginKind, image: &str) -> Result<ModuleHandle, PluginError> {
        self.detach(kind);

        let module = self.loader.load_plugin(kind, image)?;

        let status = module.startup(self.engine.module_handle());
        if !status.is_success() {
            return Err(PluginError::Startup {
                kind,
                image: image.to_string(),
                status,
            });
        }

        if let Err(e) = self.engine.attach_plugin(kind, module.handle()) {
            let status = module.shutdown();
            if !status.is_success() {
                tracing::warn!("{} plugin {} failed to shut down: {}", kind, image, status);
            }
            return Err(PluginError::Attach {
                kind,
                image: image.to_string(),
                reason: e.to_string(),
            });
        }

        let handle = module.handle();
        self.slots.insert(kind, module);
        tracing::info!("Attached {} plugin {}", kind, image);
        Ok(handle)
    }

    /// Detach, shut down and unload the `kind` plugin; no-op when absent
    pub fn detach(&mut self, kind: PluginKind) {
        let Some(module) = self.slots.remove(&kind) else {
            return;
        };

        if let Err(e) = self.engine.detach_plugin(kind) {
            tracing::warn!("Engine detach of {} plugin failed: {}", kind, e);
        }
        let status = module.shutdown();
        if !status.is_success() {
            tracing::warn!("{} plugin {} failed to shut down: {}", kind, module.image(), status);
        }
        tracing::info!("Detached {} plugin {}", kind, module.image());
    }

    /// Detach graphics, audio, input and RSP, in that order
    pub fn detach_all(&mut self) {
        for kind in PluginKind::TEARDOWN_ORDER {
            self.detach(kind);
        }
    }

    pub fn is_attached(&self, kind: PluginKind) -> bool {
        self.slots.contains_key(&kind)
    }

    /// Attached kinds in teardown order
    pub fn attached_kinds(&self) -> Vec<PluginKind> {
        PluginKind::TEARDOWN_ORDER
            .into_iter()
            .filter(|kind| self.slots.contains_key(kind))
            .collect()
    }

    /// Image the `kind` plugin was loaded from
    pub fn image(&self, kind: PluginKind) -> Option<&str> {
        self.slots.get(&kind).map(|module| module.image())
    }

    /// Abandon every module without shutting it down or unloading it
    pub(crate) fn leak(mut self) {
        for (_, module) in std::mem::take(&mut self.slots) {
            std::mem::forget(module);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use or_engine::simulated::PluginEvent;
    use or_engine::{SimulatedEngine, SimulatedLoader};

    fn registry() -> (Arc<SimulatedLoader>, PluginRegistry) {
        let engine = Arc::new(SimulatedEngine::new());
        let loader = Arc::new(SimulatedLoader::new(Arc::clone(&engine)));
        let registry = PluginRegistry::new(engine, loader.clone());
        (loader, registry)
    }

    #[test]
    fn test_attach_replaces_previous() {
        let (loader, mut registry) = registry();
        registry.attach(PluginKind::Audio, "audio-a").unwrap();
        registry.attach(PluginKind::Audio, "audio-b").unwrap();

        assert_eq!(registry.attached_kinds(), vec![PluginKind::Audio]);
        assert_eq!(registry.image(PluginKind::Audio), Some("audio-b"));
        assert_eq!(loader.count("audio-a", PluginEvent::Shutdown), 1);
        assert_eq!(loader.count("audio-a", PluginEvent::Unloaded), 1);
        assert_eq!(loader.count("audio-b", PluginEvent::Unloaded), 0);
        assert_eq!(loader.engine().attached(), vec![PluginKind::Audio]);
    }

    #[test]
    fn test_detach_order_and_idempotence() {
        let (loader, mut registry) = registry();
        registry.attach(PluginKind::Rsp, "rsp").unwrap();
        registry.attach(PluginKind::Graphics, "gfx").unwrap();
        assert_eq!(
            registry.attached_kinds(),
            vec![PluginKind::Graphics, PluginKind::Rsp]
        );

        registry.detach(PluginKind::Input);
        registry.detach_all();
        registry.detach_all();

        assert!(loader.engine().attached().is_empty());
        assert_eq!(loader.count("gfx", PluginEvent::Shutdown), 1);
        assert_eq!(loader.count("rsp", PluginEvent::Shutdown), 1);

        let unloads: Vec<_> = loader
            .plugin_events()
            .into_iter()
            .filter(|(_, event)| *event == PluginEvent::Unloaded)
            .map(|(image, _)| image)
            .collect();
        assert_eq!(unloads, vec!["gfx".to_string(), "rsp".to_string()]);
    }

    #[test]
    fn test_startup_failure_rolls_back() {
        let (loader, mut registry) = registry();
        loader.fail_startup("broken");

        let err = registry.attach(PluginKind::Input, "broken").unwrap_err();
        assert!(matches!(err, PluginError::Startup { kind: PluginKind::Input, .. }));
        assert!(!registry.is_attached(PluginKind::Input));
        assert_eq!(loader.count("broken", PluginEvent::Unloaded), 1);
        assert!(loader.engine().attached().is_empty());
    }

    #[test]
    fn test_engine_attach_failure_rolls_back() {
        let (loader, mut registry) = registry();
        loader
            .engine()
            .inject(|faults| {
                faults.reject_attach.insert(PluginKind::Graphics);
            });

        let err = registry.attach(PluginKind::Graphics, "gfx").unwrap_err();
        assert!(matches!(err, PluginError::Attach { kind: PluginKind::Graphics, .. }));
        assert!(!registry.is_attached(PluginKind::Graphics));
        assert_eq!(loader.count("gfx", PluginEvent::Started), 1);
        assert_eq!(loader.count("gfx", PluginEvent::Shutdown), 1);
        assert_eq!(loader.count("gfx", PluginEvent::Unloaded), 1);
    }

    #[test]
    fn test_load_failure_keeps_nothing() {
        let (loader, mut registry) = registry();
        loader.fail_load("missing");
        assert!(matches!(
            registry.attach(PluginKind::Rsp, "missing"),
            Err(PluginError::Load { .. })
        ));
        assert!(registry.attached_kinds().is_empty());
    }
}
