//! # Shader — Named Programs with Hot-Reload
//!
//! Every shader the renderer uses is registered here by a string key. The
//! WGSL sources are embedded with `include_str!` so the crate works from any
//! working directory; when the source files also exist on disk (a dev
//! checkout), they are watched and recompiled live.
//!
//! ## Reload safety
//!
//! A recompile happens inside a wgpu validation error scope: the candidate
//! module is created, the scope is popped, and only a clean scope swaps the
//! candidate in and bumps the program's generation (pipeline caches key on
//! the generation to know when to rebuild). On a validation error the
//! candidate is dropped on the spot and the last-good module stays
//! installed — a program that has never compiled stays `None` and every
//! draw that needs it is silently skipped.
//!
//! ## Watching
//!
//! Same scheme as texture hot-reload: a `notify` watcher feeds an mpsc
//! channel drained once per frame from [`ShaderCache::update`], with a
//! 100ms debounce so editors' atomic saves (write temp + rename) collapse
//! into one reload.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::mpsc;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use notify::{RecommendedWatcher, RecursiveMode, Watcher};

const DEBOUNCE_DURATION: Duration = Duration::from_millis(100);

/// Embedded programs: (key, file name under `shaders/`, source).
const SHADER_MANIFEST: &[(&str, &str, &str)] = &[
    (
        "depth_prepass",
        "depth_prepass.wgsl",
        include_str!("../shaders/depth_prepass.wgsl"),
    ),
    (
        "light_culling",
        "light_culling.wgsl",
        include_str!("../shaders/light_culling.wgsl"),
    ),
    ("shading", "shading.wgsl", include_str!("../shaders/shading.wgsl")),
    (
        "shading_fallback",
        "shading_fallback.wgsl",
        include_str!("../shaders/shading_fallback.wgsl"),
    ),
    (
        "light_debug",
        "light_debug.wgsl",
        include_str!("../shaders/light_debug.wgsl"),
    ),
    ("present", "present.wgsl", include_str!("../shaders/present.wgsl")),
    ("text", "text.wgsl", include_str!("../shaders/text.wgsl")),
    ("ui", "ui.wgsl", include_str!("../shaders/ui.wgsl")),
];

/// Embedded source for a registered key, `None` for unknown keys.
pub fn manifest_source(key: &str) -> Option<&'static str> {
    SHADER_MANIFEST
        .iter()
        .find(|(k, _, _)| *k == key)
        .map(|(_, _, source)| *source)
}

/// One named shader program. `module` is `None` until a compile succeeds
/// and thereafter always holds the last-good module.
pub struct ShaderProgram {
    key: &'static str,
    module: Option<wgpu::ShaderModule>,
    generation: u64,
}

impl ShaderProgram {
    /// The compiled module, or `None` if the program never compiled.
    /// Callers must skip binding on `None` rather than assume presence.
    pub fn module(&self) -> Option<&wgpu::ShaderModule> {
        self.module.as_ref()
    }

    /// Bumped on every successful (re)compile; pipeline caches compare this
    /// to know when their pipelines are stale.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn key(&self) -> &str {
        self.key
    }
}

/// Owns every compiled shader program, keyed by name, plus the file watcher
/// driving hot-reload. One instance per [`Renderer`](crate::forward::Renderer).
pub struct ShaderCache {
    entries: HashMap<&'static str, ShaderProgram>,
    watcher: Option<RecommendedWatcher>,
    rx: Mutex<mpsc::Receiver<Result<notify::Event, notify::Error>>>,
    watched: HashMap<PathBuf, &'static str>,
    pending: HashMap<PathBuf, Instant>,
    rx_disconnected: bool,
}

impl ShaderCache {
    /// Compile every registered program from its embedded source and start
    /// watching the on-disk copies that exist.
    pub fn new(device: &wgpu::Device) -> Self {
        let (tx, rx) = mpsc::channel();
        let watcher = match notify::recommended_watcher(move |res| {
            let _ = tx.send(res);
        }) {
            Ok(w) => Some(w),
            Err(e) => {
                log::warn!("Failed to create shader watcher: {e}. Hot-reload disabled.");
                None
            }
        };

        let mut cache = Self {
            entries: HashMap::new(),
            watcher,
            rx: Mutex::new(rx),
            watched: HashMap::new(),
            pending: HashMap::new(),
            rx_disconnected: false,
        };

        let shader_dir = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("shaders");
        for &(key, file, source) in SHADER_MANIFEST {
            let module = compile(device, key, source);
            let generation = module.is_some() as u64;
            cache.entries.insert(
                key,
                ShaderProgram {
                    key,
                    module,
                    generation,
                },
            );

            let path = shader_dir.join(file);
            if path.exists() {
                cache.watch(&path, key);
            }
        }

        cache
    }

    /// Look up a program. `None` for unregistered keys — callers check.
    pub fn get(&self, key: &str) -> Option<&ShaderProgram> {
        self.entries.get(key)
    }

    fn watch(&mut self, path: &PathBuf, key: &'static str) {
        let canonical = match path.canonicalize() {
            Ok(p) => p,
            Err(e) => {
                log::warn!("Cannot watch shader '{}': {e}", path.display());
                return;
            }
        };
        if let Some(watcher) = &mut self.watcher {
            if let Err(e) = watcher.watch(&canonical, RecursiveMode::NonRecursive) {
                log::warn!("Failed to watch shader '{}': {e}", canonical.display());
                return;
            }
        }
        self.watched.insert(canonical, key);
    }

    /// Poll for file changes and recompile what settled. Call once per
    /// frame (the renderer does this from its `update`).
    pub fn update(&mut self, device: &wgpu::Device) {
        self.poll();
        for (path, key) in self.drain_ready() {
            self.reload(device, &path, key);
        }
    }

    fn poll(&mut self) {
        if self.rx_disconnected {
            return;
        }
        let rx = self.rx.get_mut().expect("ShaderCache rx mutex poisoned");
        loop {
            match rx.try_recv() {
                Ok(Ok(event)) => {
                    use notify::EventKind;
                    if matches!(event.kind, EventKind::Modify(_) | EventKind::Create(_)) {
                        for path in &event.paths {
                            let canonical = path.canonicalize().unwrap_or_else(|_| path.clone());
                            if self.watched.contains_key(&canonical) {
                                self.pending.insert(canonical, Instant::now());
                            }
                        }
                    }
                }
                Ok(Err(e)) => log::warn!("Shader watcher error: {e}"),
                Err(mpsc::TryRecvError::Empty) => break,
                Err(mpsc::TryRecvError::Disconnected) => {
                    log::warn!("Shader watcher disconnected. Hot-reload disabled.");
                    self.rx_disconnected = true;
                    break;
                }
            }
        }
    }

    fn drain_ready(&mut self) -> Vec<(PathBuf, &'static str)> {
        let now = Instant::now();
        let watched = &self.watched;
        let mut ready = Vec::new();
        self.pending.retain(|path, timestamp| {
            if now.duration_since(*timestamp) >= DEBOUNCE_DURATION {
                if let Some(key) = watched.get(path) {
                    ready.push((path.clone(), *key));
                }
                false
            } else {
                true
            }
        });
        ready
    }

    fn reload(&mut self, device: &wgpu::Device, path: &PathBuf, key: &'static str) {
        let source = match std::fs::read_to_string(path) {
            Ok(s) => s,
            Err(e) => {
                log::warn!("Hot-reload failed for shader '{}': {e}", path.display());
                return;
            }
        };

        match compile(device, key, &source) {
            Some(module) => {
                let entry = self.entries.get_mut(key).expect("manifest key missing");
                entry.module = Some(module);
                entry.generation += 1;
                log::info!("Hot-reloaded shader '{key}' from {}", path.display());
            }
            None => {
                // compile() already logged; the candidate module is gone and
                // the last-good module stays bound.
                log::warn!("Keeping previous '{key}' program");
            }
        }
    }
}

/// Compile WGSL inside a validation error scope. Returns `None` (candidate
/// dropped) if validation failed.
fn compile(device: &wgpu::Device, key: &str, source: &str) -> Option<wgpu::ShaderModule> {
    device.push_error_scope(wgpu::ErrorFilter::Validation);
    let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some(key),
        source: wgpu::ShaderSource::Wgsl(source.into()),
    });
    let error = pollster::block_on(device.pop_error_scope());
    match error {
        Some(err) => {
            log::warn!("Shader '{key}' failed to compile: {err}");
            None
        }
        None => Some(module),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_key_has_no_source() {
        assert!(manifest_source("does_not_exist").is_none());
    }

    #[test]
    fn registered_keys_have_sources() {
        for key in [
            "depth_prepass",
            "light_culling",
            "shading",
            "shading_fallback",
            "light_debug",
            "present",
            "text",
            "ui",
        ] {
            let source = manifest_source(key).unwrap_or_else(|| panic!("missing '{key}'"));
            assert!(!source.is_empty());
        }
    }

    #[test]
    fn manifest_keys_are_unique() {
        let mut seen = std::collections::HashSet::new();
        for (key, _, _) in SHADER_MANIFEST {
            assert!(seen.insert(*key), "duplicate shader key '{key}'");
        }
    }

    #[test]
    fn entry_points_match_pipeline_expectations() {
        assert!(manifest_source("light_culling").unwrap().contains("fn cs_main"));
        assert!(manifest_source("depth_prepass").unwrap().contains("fn vs_main"));
        for key in ["shading", "shading_fallback", "light_debug", "present", "text", "ui"] {
            let source = manifest_source(key).unwrap();
            assert!(source.contains("fn vs_main"), "'{key}' missing vs_main");
            assert!(source.contains("fn fs_main"), "'{key}' missing fs_main");
        }
    }
}
