use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Local, SecondsFormat};
use tokio::sync::Mutex as AsyncMutex;

use crate::{FrameError, RenderEngine, Result};

/// Fallback layout when the request does not name one.
pub const DEFAULT_LAYOUT: &str = "default";
/// Fallback theme when the request does not name one.
pub const DEFAULT_THEME: &str = "ink";

/// Cache key for rendered previews.
///
/// Only the render parameters participate in the key; the identity of the
/// displayed item is tracked through the freshness check instead, so repeated
/// polls during the same displayed item reuse a single entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PreviewKey {
    layout: String,
    theme: String,
}

impl PreviewKey {
    /// Builds a key from raw request parameters, normalising case and
    /// whitespace and substituting defaults for missing values.
    pub fn new(layout: Option<&str>, theme: Option<&str>) -> Self {
        Self {
            layout: normalise(layout, DEFAULT_LAYOUT),
            theme: normalise(theme, DEFAULT_THEME),
        }
    }

    pub fn layout(&self) -> &str {
        &self.layout
    }

    pub fn theme(&self) -> &str {
        &self.theme
    }
}

fn normalise(value: Option<&str>, default: &str) -> String {
    let candidate = value.unwrap_or("").trim().to_ascii_lowercase();
    if candidate.is_empty() {
        default.to_string()
    } else {
        candidate
    }
}

/// Whether a preview was served from the cache or freshly rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheOutcome {
    Hit,
    Miss,
}

impl CacheOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            CacheOutcome::Hit => "hit",
            CacheOutcome::Miss => "miss",
        }
    }
}

#[derive(Debug, Clone)]
struct CacheEntry {
    bytes: Arc<Vec<u8>>,
    generated_at: DateTime<Local>,
    source: Option<String>,
}

impl CacheEntry {
    fn into_frame(
        self,
        key: &PreviewKey,
        stale: bool,
        cache: CacheOutcome,
        render_error: Option<String>,
    ) -> PreviewFrame {
        PreviewFrame {
            bytes: self.bytes,
            generated_at: self.generated_at,
            source: self.source,
            layout: key.layout.clone(),
            theme: key.theme.clone(),
            stale,
            cache,
            render_error,
        }
    }
}

/// Snapshot of a rendered preview handed out to callers.
///
/// Owns (shared, immutable) copies of everything, so readers never observe a
/// half-updated cache entry.
#[derive(Debug, Clone)]
pub struct PreviewFrame {
    pub bytes: Arc<Vec<u8>>,
    pub generated_at: DateTime<Local>,
    /// Item that produced the frame; `None` for a placeholder render.
    pub source: Option<String>,
    pub layout: String,
    pub theme: String,
    /// True when the frame was served without a fresh render backing it.
    pub stale: bool,
    pub cache: CacheOutcome,
    /// Render failure that forced the stale fallback, if any.
    pub render_error: Option<String>,
}

impl PreviewFrame {
    /// Timestamp of the backing render in the wire format used by the API.
    pub fn iso_timestamp(&self) -> String {
        self.generated_at.to_rfc3339_opts(SecondsFormat::Secs, false)
    }
}

/// Memoizing wrapper around the render engine.
///
/// Keeps at most one entry per [`PreviewKey`], re-renders only when the entry
/// is stale or a refresh is forced, and falls back to the last known good
/// frame when a re-render fails. Renders for distinct keys run independently;
/// a per-key lock guarantees a single render in flight per key.
pub struct PreviewCache {
    engine: Arc<dyn RenderEngine>,
    entries: Mutex<HashMap<PreviewKey, CacheEntry>>,
    render_locks: Mutex<HashMap<PreviewKey, Arc<AsyncMutex<()>>>>,
}

impl PreviewCache {
    pub fn new(engine: Arc<dyn RenderEngine>) -> Self {
        Self {
            engine,
            entries: Mutex::new(HashMap::new()),
            render_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the cached preview for `key`, rendering a fresh one when the
    /// entry is missing, was produced for a different item than
    /// `current_item`, or `force_refresh` is set.
    ///
    /// Failure semantics: a render failure with a prior entry yields that
    /// entry marked stale (with the error attached as metadata); a render
    /// failure with no prior entry is a hard [`FrameError::RenderUnavailable`].
    ///
    /// Concurrent calls for the same key while a render is in flight return
    /// the existing entry immediately when one exists (the in-flight render
    /// populates the cache for the next poll); when none exists they wait for
    /// that render instead of starting a duplicate.
    pub async fn get_or_render(
        &self,
        current_item: Option<&str>,
        key: &PreviewKey,
        force_refresh: bool,
    ) -> Result<PreviewFrame> {
        if !force_refresh {
            if let Some(entry) = self.lookup(key)? {
                if entry.source.as_deref() == current_item {
                    return Ok(entry.into_frame(key, false, CacheOutcome::Hit, None));
                }
            }
        }

        let render_lock = self.render_lock(key)?;
        let _guard = match render_lock.clone().try_lock_owned() {
            Ok(guard) => guard,
            Err(_) => {
                // A render for this key is already in flight. Serve the
                // existing entry straight away so polling stays responsive;
                // it will be refreshed by the in-flight render.
                if let Some(entry) = self.lookup(key)? {
                    let stale = entry.source.as_deref() != current_item;
                    return Ok(entry.into_frame(key, stale, CacheOutcome::Hit, None));
                }
                // Nothing to fall back on: wait for the in-flight render.
                render_lock.lock_owned().await
            }
        };

        // The lock may have been handed over by a render that just finished.
        if !force_refresh {
            if let Some(entry) = self.lookup(key)? {
                if entry.source.as_deref() == current_item {
                    return Ok(entry.into_frame(key, false, CacheOutcome::Hit, None));
                }
            }
        }

        let engine = self.engine.clone();
        let item = current_item.map(str::to_owned);
        let rendered = {
            let item = item.clone();
            let layout = key.layout.clone();
            let theme = key.theme.clone();
            tokio::task::spawn_blocking(move || engine.render(item.as_deref(), &layout, &theme))
                .await
                .map_err(|err| FrameError::msg(format!("render task failed: {err}")))?
        };

        match rendered {
            Ok(bytes) => {
                let entry = CacheEntry {
                    bytes: Arc::new(bytes),
                    generated_at: Local::now(),
                    source: item,
                };
                self.store(key, entry.clone())?;
                Ok(entry.into_frame(key, false, CacheOutcome::Miss, None))
            }
            Err(err) => {
                tracing::warn!(
                    error = %err,
                    layout = %key.layout,
                    theme = %key.theme,
                    "preview render failed"
                );
                match self.lookup(key)? {
                    Some(entry) => {
                        Ok(entry.into_frame(key, true, CacheOutcome::Miss, Some(err.to_string())))
                    }
                    None => Err(FrameError::RenderUnavailable(err)),
                }
            }
        }
    }

    /// Drops every cached entry. The next request per key re-renders.
    pub fn clear(&self) -> Result<()> {
        self.lock_entries()?.clear();
        Ok(())
    }

    fn lookup(&self, key: &PreviewKey) -> Result<Option<CacheEntry>> {
        Ok(self.lock_entries()?.get(key).cloned())
    }

    fn store(&self, key: &PreviewKey, entry: CacheEntry) -> Result<()> {
        self.lock_entries()?.insert(key.clone(), entry);
        Ok(())
    }

    fn render_lock(&self, key: &PreviewKey) -> Result<Arc<AsyncMutex<()>>> {
        let mut locks = self
            .render_locks
            .lock()
            .map_err(|_| FrameError::msg("preview render locks have been poisoned"))?;
        Ok(locks
            .entry(key.clone())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone())
    }

    fn lock_entries(&self) -> Result<MutexGuard<'_, HashMap<PreviewKey, CacheEntry>>> {
        self.entries
            .lock()
            .map_err(|_| FrameError::msg("preview cache has been poisoned"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RenderError;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Condvar;

    /// Engine that replays a scripted sequence of render results.
    struct ScriptEngine {
        responses: Mutex<VecDeque<std::result::Result<Vec<u8>, RenderError>>>,
        calls: AtomicUsize,
    }

    impl ScriptEngine {
        fn new(
            responses: Vec<std::result::Result<Vec<u8>, RenderError>>,
        ) -> Arc<Self> {
            Arc::new(Self {
                responses: Mutex::new(responses.into()),
                calls: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl RenderEngine for ScriptEngine {
        fn render(
            &self,
            _item: Option<&str>,
            _layout: &str,
            _theme: &str,
        ) -> std::result::Result<Vec<u8>, RenderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(RenderError::new("script exhausted")))
        }

        fn is_ready(&self) -> std::result::Result<bool, RenderError> {
            Ok(true)
        }

        fn target_size(&self) -> (u32, u32) {
            (800, 480)
        }
    }

    /// Engine whose renders block until released, for in-flight tests.
    struct GatedEngine {
        started: AtomicBool,
        gate: Mutex<bool>,
        release: Condvar,
    }

    impl GatedEngine {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                started: AtomicBool::new(false),
                gate: Mutex::new(false),
                release: Condvar::new(),
            })
        }

        fn open(&self) {
            *self.gate.lock().unwrap() = true;
            self.release.notify_all();
        }

        async fn wait_until_rendering(&self) {
            while !self.started.load(Ordering::SeqCst) {
                tokio::time::sleep(std::time::Duration::from_millis(5)).await;
            }
        }
    }

    impl RenderEngine for GatedEngine {
        fn render(
            &self,
            item: Option<&str>,
            _layout: &str,
            _theme: &str,
        ) -> std::result::Result<Vec<u8>, RenderError> {
            self.started.store(true, Ordering::SeqCst);
            let mut open = self.gate.lock().unwrap();
            while !*open {
                open = self.release.wait(open).unwrap();
            }
            Ok(format!("frame:{}", item.unwrap_or("placeholder")).into_bytes())
        }

        fn is_ready(&self) -> std::result::Result<bool, RenderError> {
            Ok(true)
        }

        fn target_size(&self) -> (u32, u32) {
            (800, 480)
        }
    }

    fn key() -> PreviewKey {
        PreviewKey::new(None, None)
    }

    #[test]
    fn key_normalises_parameters() {
        assert_eq!(PreviewKey::new(None, None), PreviewKey::new(Some(""), Some("  ")));
        assert_eq!(
            PreviewKey::new(Some(" Grid "), Some("DARK")),
            PreviewKey::new(Some("grid"), Some("dark"))
        );
        let key = PreviewKey::new(None, Some("Paper"));
        assert_eq!(key.layout(), "default");
        assert_eq!(key.theme(), "paper");
    }

    #[tokio::test]
    async fn second_request_for_same_item_hits_the_cache() {
        let engine = ScriptEngine::new(vec![Ok(b"one".to_vec())]);
        let cache = PreviewCache::new(engine.clone());

        let first = cache.get_or_render(Some("a.jpg"), &key(), false).await.unwrap();
        assert_eq!(first.cache, CacheOutcome::Miss);
        assert!(!first.stale);

        let second = cache.get_or_render(Some("a.jpg"), &key(), false).await.unwrap();
        assert_eq!(second.cache, CacheOutcome::Hit);
        assert!(!second.stale);
        assert_eq!(second.bytes, first.bytes);
        assert_eq!(engine.calls(), 1);
    }

    #[tokio::test]
    async fn item_change_invalidates_the_entry() {
        let engine = ScriptEngine::new(vec![Ok(b"one".to_vec()), Ok(b"two".to_vec())]);
        let cache = PreviewCache::new(engine.clone());

        cache.get_or_render(Some("a.jpg"), &key(), false).await.unwrap();
        let frame = cache.get_or_render(Some("b.jpg"), &key(), false).await.unwrap();

        assert_eq!(frame.cache, CacheOutcome::Miss);
        assert_eq!(frame.source.as_deref(), Some("b.jpg"));
        assert_eq!(*frame.bytes, b"two".to_vec());
        assert_eq!(engine.calls(), 2);
    }

    #[tokio::test]
    async fn force_refresh_rerenders_a_fresh_entry() {
        let engine = ScriptEngine::new(vec![Ok(b"one".to_vec()), Ok(b"two".to_vec())]);
        let cache = PreviewCache::new(engine.clone());

        cache.get_or_render(Some("a.jpg"), &key(), false).await.unwrap();
        let frame = cache.get_or_render(Some("a.jpg"), &key(), true).await.unwrap();

        assert_eq!(frame.cache, CacheOutcome::Miss);
        assert_eq!(*frame.bytes, b"two".to_vec());
        assert_eq!(engine.calls(), 2);
    }

    #[tokio::test]
    async fn render_failure_falls_back_to_stale_entry() {
        let engine = ScriptEngine::new(vec![
            Ok(b"good".to_vec()),
            Err(RenderError::new("display wedged")),
        ]);
        let cache = PreviewCache::new(engine.clone());

        let first = cache.get_or_render(Some("a.jpg"), &key(), false).await.unwrap();
        let fallback = cache.get_or_render(Some("b.jpg"), &key(), false).await.unwrap();

        assert!(fallback.stale);
        assert_eq!(fallback.cache, CacheOutcome::Miss);
        assert_eq!(fallback.bytes, first.bytes);
        assert_eq!(fallback.source.as_deref(), Some("a.jpg"));
        assert_eq!(fallback.render_error.as_deref(), Some("display wedged"));
    }

    #[tokio::test]
    async fn render_failure_without_prior_entry_is_hard() {
        let engine = ScriptEngine::new(vec![Err(RenderError::new("no display"))]);
        let cache = PreviewCache::new(engine);

        let err = cache.get_or_render(Some("a.jpg"), &key(), false).await.unwrap_err();
        assert!(matches!(err, FrameError::RenderUnavailable(_)));
    }

    #[tokio::test]
    async fn distinct_keys_keep_independent_entries() {
        let engine = ScriptEngine::new(vec![Ok(b"ink".to_vec()), Ok(b"dark".to_vec())]);
        let cache = PreviewCache::new(engine.clone());
        let ink = PreviewKey::new(None, Some("ink"));
        let dark = PreviewKey::new(None, Some("dark"));

        cache.get_or_render(Some("a.jpg"), &ink, false).await.unwrap();
        cache.get_or_render(Some("a.jpg"), &dark, false).await.unwrap();

        let hit = cache.get_or_render(Some("a.jpg"), &ink, false).await.unwrap();
        assert_eq!(hit.cache, CacheOutcome::Hit);
        assert_eq!(*hit.bytes, b"ink".to_vec());
        assert_eq!(engine.calls(), 2);
    }

    #[tokio::test]
    async fn clear_forces_a_rerender() {
        let engine = ScriptEngine::new(vec![Ok(b"one".to_vec()), Ok(b"two".to_vec())]);
        let cache = PreviewCache::new(engine.clone());

        cache.get_or_render(Some("a.jpg"), &key(), false).await.unwrap();
        cache.clear().unwrap();
        let frame = cache.get_or_render(Some("a.jpg"), &key(), false).await.unwrap();

        assert_eq!(frame.cache, CacheOutcome::Miss);
        assert_eq!(engine.calls(), 2);
    }

    #[tokio::test]
    async fn in_flight_render_serves_stale_entry_immediately() {
        let engine = GatedEngine::new();
        let cache = Arc::new(PreviewCache::new(engine.clone()));

        // Prime the cache with a completed render for the old item.
        engine.open();
        let primed = cache.get_or_render(Some("a.jpg"), &key(), false).await.unwrap();
        *engine.gate.lock().unwrap() = false;
        engine.started.store(false, Ordering::SeqCst);

        // Kick off a slow refresh for the new item.
        let refresh = {
            let cache = cache.clone();
            tokio::spawn(async move { cache.get_or_render(Some("b.jpg"), &key(), false).await })
        };
        engine.wait_until_rendering().await;

        // A concurrent poll gets the prior frame without waiting.
        let polled = cache.get_or_render(Some("b.jpg"), &key(), false).await.unwrap();
        assert!(polled.stale);
        assert_eq!(polled.cache, CacheOutcome::Hit);
        assert_eq!(polled.bytes, primed.bytes);

        engine.open();
        let refreshed = refresh.await.unwrap().unwrap();
        assert!(!refreshed.stale);
        assert_eq!(refreshed.source.as_deref(), Some("b.jpg"));

        // The in-flight render populated the cache for the next poll.
        let next = cache.get_or_render(Some("b.jpg"), &key(), false).await.unwrap();
        assert_eq!(next.cache, CacheOutcome::Hit);
        assert_eq!(next.bytes, refreshed.bytes);
    }

    #[tokio::test]
    async fn waiter_without_fallback_reuses_the_in_flight_render() {
        let engine = GatedEngine::new();
        let cache = Arc::new(PreviewCache::new(engine.clone()));

        let first = {
            let cache = cache.clone();
            tokio::spawn(async move { cache.get_or_render(Some("a.jpg"), &key(), false).await })
        };
        engine.wait_until_rendering().await;

        let second = {
            let cache = cache.clone();
            tokio::spawn(async move { cache.get_or_render(Some("a.jpg"), &key(), false).await })
        };
        tokio::task::yield_now().await;

        engine.open();
        let first = first.await.unwrap().unwrap();
        let second = second.await.unwrap().unwrap();

        assert_eq!(first.cache, CacheOutcome::Miss);
        assert_eq!(second.cache, CacheOutcome::Hit);
        assert_eq!(second.bytes, first.bytes);
    }
}
