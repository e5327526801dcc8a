//! Content-addressed store for compiled artifacts.
//!
//! Keyed by (component identity, target, source fingerprint). Identical
//! fingerprint means the stored artifact is reused and the compiler is not
//! invoked again. Entries for superseded fingerprints are left in place:
//! the corpus of components is small and edit-driven, so an old entry
//! simply becomes unreachable once the identity's source changes
//! (generational replacement, not LRU).

use std::sync::{Arc, Mutex};

use dashmap::DashMap;
use sha2::{Digest, Sha256};

use crate::compiler::{CompileTarget, CompilerAdapter, MarkerRequirement};
use crate::error::CompileError;

/// Content hash of a component source, the variable part of the cache key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn of(source: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(source.as_bytes());
        Self(hex::encode(hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Truncated for log lines; the full digest stays in the key.
        f.write_str(&self.0[..12.min(self.0.len())])
    }
}

/// Immutable compiled artifact. A changed fingerprint produces a new
/// artifact, never an edit of this one.
#[derive(Debug)]
pub struct CompiledArtifact {
    pub identity: String,
    pub target: CompileTarget,
    pub fingerprint: Fingerprint,
    pub code: String,
    pub style: String,
    pub component_name: String,
    pub marker: Option<MarkerRequirement>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    identity: String,
    target: CompileTarget,
    fingerprint: Fingerprint,
}

type Slot = Arc<Mutex<Option<Arc<CompiledArtifact>>>>;

/// The one resource mutated by concurrent renders. Each key owns a slot
/// whose mutex serializes the compile: at most one compile is in flight per
/// (identity, target, fingerprint), and concurrent callers for the same key
/// block on it and share the result. Reads of an inserted artifact are
/// plain `Arc` clones.
#[derive(Default)]
pub struct ArtifactCache {
    entries: DashMap<CacheKey, Slot>,
}

impl ArtifactCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up (identity, target, fingerprint-of-source); compile and store
    /// on miss. Compiler errors propagate unmasked and are not cached, so a
    /// later render with the same source re-attempts the compile.
    pub fn get_or_compile(
        &self,
        identity: &str,
        target: CompileTarget,
        source: &str,
        adapter: &CompilerAdapter,
        dev: bool,
    ) -> Result<Arc<CompiledArtifact>, CompileError> {
        let fingerprint = Fingerprint::of(source);
        let key = CacheKey {
            identity: identity.to_string(),
            target,
            fingerprint: fingerprint.clone(),
        };

        let slot: Slot = self.entries.entry(key).or_default().clone();
        let mut guard = slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner());

        if let Some(artifact) = guard.as_ref() {
            tracing::debug!(%identity, %target, %fingerprint, "artifact cache hit");
            return Ok(Arc::clone(artifact));
        }

        tracing::debug!(%identity, %target, %fingerprint, "artifact cache miss, compiling");
        let normalized = adapter.compile(source, identity, target, dev)?;
        let artifact = Arc::new(CompiledArtifact {
            identity: identity.to_string(),
            target,
            fingerprint,
            code: normalized.code,
            style: normalized.style,
            component_name: normalized.component_name,
            marker: normalized.marker,
        });
        *guard = Some(Arc::clone(&artifact));
        Ok(artifact)
    }

    /// Number of stored artifacts, superseded generations included.
    pub fn len(&self) -> usize {
        self.entries
            .iter()
            .filter(|entry| entry.value().lock().map(|g| g.is_some()).unwrap_or(false))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::{CompilerBackend, RawCompileOutput};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Counts invocations through a handle the test keeps; optionally
    /// fails every compile or sleeps to widen race windows.
    struct CountingBackend {
        calls: Arc<AtomicUsize>,
        fail: bool,
        delay: Option<Duration>,
    }

    impl CompilerBackend for CountingBackend {
        fn compile(
            &self,
            _source: &str,
            identity: &str,
            target: CompileTarget,
            _dev: bool,
        ) -> Result<RawCompileOutput, CompileError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(delay) = self.delay {
                std::thread::sleep(delay);
            }
            if self.fail {
                return Err(CompileError {
                    identity: identity.to_string(),
                    target,
                    message: "syntax error".into(),
                    line: Some(1),
                    column: None,
                });
            }
            Ok(RawCompileOutput {
                code: "function App($$payload, $$props) {}".into(),
                style: String::new(),
            })
        }
    }

    fn counting_adapter(fail: bool, delay: Option<Duration>) -> (CompilerAdapter, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let adapter = CompilerAdapter::new(Box::new(CountingBackend {
            calls: Arc::clone(&calls),
            fail,
            delay,
        }));
        (adapter, calls)
    }

    #[test]
    fn test_second_compile_hits_cache() {
        let (adapter, calls) = counting_adapter(false, None);
        let cache = ArtifactCache::new();

        let first = cache
            .get_or_compile("home.svelte", CompileTarget::Server, "<h1/>", &adapter, false)
            .unwrap();
        let second = cache
            .get_or_compile("home.svelte", CompileTarget::Server, "<h1/>", &adapter, false)
            .unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 1, "identical fingerprint must not recompile");
        assert!(Arc::ptr_eq(&first, &second), "cache hit shares the artifact");
    }

    #[test]
    fn test_targets_cached_independently() {
        let (adapter, calls) = counting_adapter(false, None);
        let cache = ArtifactCache::new();

        cache
            .get_or_compile("home.svelte", CompileTarget::Server, "<h1/>", &adapter, false)
            .unwrap();
        cache
            .get_or_compile("home.svelte", CompileTarget::Client, "<h1/>", &adapter, false)
            .unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 2, "each target compiles once");
    }

    #[test]
    fn test_source_edit_changes_fingerprint_and_recompiles() {
        let (adapter, calls) = counting_adapter(false, None);
        let cache = ArtifactCache::new();

        let old = cache
            .get_or_compile("home.svelte", CompileTarget::Server, "<h1>a</h1>", &adapter, false)
            .unwrap();
        let new = cache
            .get_or_compile("home.svelte", CompileTarget::Server, "<h1>b</h1>", &adapter, false)
            .unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 2, "one-character edit forces a recompile");
        assert_ne!(old.fingerprint, new.fingerprint);

        // The superseded generation is still served for an identity that
        // references the old source.
        let other = cache
            .get_or_compile("other.svelte", CompileTarget::Server, "<h1>a</h1>", &adapter, false)
            .unwrap();
        assert_eq!(other.fingerprint, old.fingerprint);
        assert_eq!(calls.load(Ordering::SeqCst), 3);

        let old_again = cache
            .get_or_compile("home.svelte", CompileTarget::Server, "<h1>a</h1>", &adapter, false)
            .unwrap();
        assert!(Arc::ptr_eq(&old, &old_again), "old generation was not evicted");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_errors_are_not_cached() {
        let (adapter, calls) = counting_adapter(true, None);
        let cache = ArtifactCache::new();

        for _ in 0..2 {
            let err = cache
                .get_or_compile("bad.svelte", CompileTarget::Server, "<h1", &adapter, false)
                .unwrap_err();
            assert!(err.message.contains("syntax error"));
        }
        assert_eq!(calls.load(Ordering::SeqCst), 2, "each render re-attempts the compile");
    }

    #[test]
    fn test_concurrent_same_key_single_flight() {
        use std::sync::Barrier;

        let (adapter, calls) = counting_adapter(false, Some(Duration::from_millis(25)));
        let adapter = Arc::new(adapter);
        let cache = Arc::new(ArtifactCache::new());
        let barrier = Arc::new(Barrier::new(4));

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let adapter = Arc::clone(&adapter);
                let cache = Arc::clone(&cache);
                let barrier = Arc::clone(&barrier);
                std::thread::spawn(move || {
                    barrier.wait();
                    cache
                        .get_or_compile("app.svelte", CompileTarget::Server, "<p/>", &adapter, false)
                        .unwrap()
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1, "one compile in flight per key");
    }
}
