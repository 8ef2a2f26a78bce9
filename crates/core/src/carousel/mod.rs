use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Local, SecondsFormat};
use serde::Serialize;
use tokio::sync::Notify;
use tokio::time::Instant;

use crate::{CarouselConfig, FrameError, Gallery, Result};

/// Serialisable view of the carousel state.
///
/// `current_index` is the position of the current item in the gallery
/// listing, or `-1` when nothing is selected; the dashboard uses it to show
/// the image position.
#[derive(Debug, Clone, Serialize)]
pub struct CarouselSnapshot {
    pub running: bool,
    /// Rotation interval in whole minutes, rounded up. Sub-minute intervals
    /// set through the library API therefore report as `1`.
    pub minutes: u64,
    pub current_index: i64,
    pub current_file: Option<String>,
    pub next_switch_at: Option<String>,
}

#[derive(Debug)]
struct CarouselState {
    running: bool,
    interval: Duration,
    current: Option<String>,
    next_switch_at: Option<DateTime<Local>>,
    deadline: Option<Instant>,
    shutdown: bool,
}

struct Shared {
    state: Mutex<CarouselState>,
    wake: Notify,
    gallery: Arc<dyn Gallery>,
}

/// Scheduler that rotates the displayed image on a wall-clock interval.
///
/// All state lives behind a single mutex; a background task is the only
/// caller of the advance step, while command methods mutate the state and
/// wake the task. Commands return as soon as the mutation is committed and
/// never wait for a render.
pub struct Carousel {
    inner: Arc<Shared>,
}

impl Carousel {
    /// Creates the scheduler in the stopped state and spawns its timer task.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(gallery: Arc<dyn Gallery>, config: &CarouselConfig) -> Self {
        let inner = Arc::new(Shared {
            state: Mutex::new(CarouselState {
                running: false,
                interval: config.interval(),
                current: None,
                next_switch_at: None,
                deadline: None,
                shutdown: false,
            }),
            wake: Notify::new(),
            gallery,
        });
        tokio::spawn(run(inner.clone()));
        Self { inner }
    }

    /// Starts (or restarts) the rotation.
    ///
    /// Fails with [`FrameError::EmptyGallery`] when nothing can be rotated.
    /// Calling this while already running only updates the interval and
    /// recomputes the switch deadline.
    pub fn start(&self, interval: Option<Duration>) -> Result<()> {
        if let Some(interval) = interval {
            if interval.is_zero() {
                return Err(FrameError::InvalidInterval);
            }
        }
        let items = self.inner.gallery.list()?;
        if items.is_empty() {
            return Err(FrameError::EmptyGallery);
        }

        let mut state = self.inner.lock_state()?;
        if let Some(interval) = interval {
            state.interval = interval;
        }
        state.running = true;
        state.deadline = Some(deadline_after(state.interval));
        state.next_switch_at = Some(wall_deadline(state.interval));
        if state.current.is_none() {
            state.current = Some(items[0].clone());
        }
        let interval = state.interval;
        drop(state);

        self.inner.wake.notify_one();
        tracing::info!(interval_secs = interval.as_secs(), "carousel started");
        Ok(())
    }

    /// Stops the rotation. Idempotent no-op when already stopped.
    pub fn stop(&self) -> Result<()> {
        let mut state = self.inner.lock_state()?;
        state.running = false;
        state.deadline = None;
        state.next_switch_at = None;
        drop(state);

        self.inner.wake.notify_one();
        tracing::info!("carousel stopped");
        Ok(())
    }

    /// Out-of-band selection of the displayed item.
    ///
    /// Leaves the running flag, interval and the next switch deadline exactly
    /// as they are; an explicit selection does not count as an advance.
    pub fn display_now(&self, item: &str) -> Result<()> {
        let mut state = self.inner.lock_state()?;
        state.current = Some(item.to_string());
        drop(state);

        tracing::info!(item, "display override");
        Ok(())
    }

    /// Applies a new configuration snapshot.
    ///
    /// Only the default interval is affected, and only while the carousel is
    /// stopped; a running rotation keeps the interval it was started with.
    pub fn apply_config(&self, config: &CarouselConfig) -> Result<()> {
        let mut state = self.inner.lock_state()?;
        if !state.running {
            state.interval = config.interval();
        }
        Ok(())
    }

    /// Returns a consistent snapshot of the carousel state.
    ///
    /// Pure read apart from self-healing: when the stored current item is no
    /// longer part of the gallery listing the snapshot falls back to the
    /// first available item (or none when the gallery is empty) and persists
    /// that choice.
    pub fn snapshot(&self) -> Result<CarouselSnapshot> {
        let items = match self.inner.gallery.list() {
            Ok(items) => Some(items),
            Err(err) => {
                tracing::warn!(error = %err, "gallery listing failed; skipping current-item validation");
                None
            }
        };

        let mut state = self.inner.lock_state()?;
        if let Some(items) = &items {
            heal_current(&mut state, items);
        }

        let current_index = match (&state.current, &items) {
            (Some(current), Some(items)) => items
                .iter()
                .position(|item| item == current)
                .map(|index| index as i64)
                .unwrap_or(-1),
            _ => -1,
        };

        Ok(CarouselSnapshot {
            running: state.running,
            minutes: state.interval.as_secs().div_ceil(60).max(1),
            current_index,
            current_file: state.current.clone(),
            next_switch_at: state
                .next_switch_at
                .map(|at| at.to_rfc3339_opts(SecondsFormat::Secs, false)),
        })
    }

    /// Asks the timer task to exit. Used on process shutdown so no advance is
    /// left half-applied.
    pub fn shutdown(&self) {
        if let Ok(mut state) = self.inner.lock_state() {
            state.shutdown = true;
        }
        self.inner.wake.notify_one();
    }
}

impl Drop for Carousel {
    /// The timer task holds its own `Arc<Shared>`; without this it would park
    /// on the next wake-up forever once the last handle is gone.
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl Shared {
    fn lock_state(&self) -> Result<MutexGuard<'_, CarouselState>> {
        self.state
            .lock()
            .map_err(|_| FrameError::msg("carousel state has been poisoned"))
    }

    /// Timer-driven advance. Never fails outward: an emptied gallery stops
    /// the rotation and every other problem is logged and retried on the
    /// next cycle.
    fn advance(&self) {
        let Ok(mut state) = self.lock_state() else {
            return;
        };
        if !state.running {
            return;
        }
        // A command may have pushed the deadline forward between the timer
        // firing and this lock being taken.
        match state.deadline {
            Some(at) if at <= Instant::now() => {}
            _ => return,
        }

        let items = match self.gallery.list() {
            Ok(items) => items,
            Err(err) => {
                tracing::warn!(error = %err, "gallery listing failed during advance; retrying next cycle");
                state.deadline = Some(deadline_after(state.interval));
                state.next_switch_at = Some(wall_deadline(state.interval));
                return;
            }
        };

        if items.is_empty() {
            tracing::info!("gallery is empty; stopping carousel");
            state.running = false;
            state.deadline = None;
            state.next_switch_at = None;
            state.current = None;
            return;
        }

        let next = next_item(&items, state.current.as_deref());
        tracing::debug!(item = %next, "carousel advanced");
        state.current = Some(next);

        // The new deadline counts from now, not from the missed one, so a
        // long suspension yields a single advance instead of a burst.
        state.deadline = Some(deadline_after(state.interval));
        state.next_switch_at = Some(wall_deadline(state.interval));
    }
}

/// Timer loop: waits for whichever comes first, the switch deadline or a
/// command wake-up, then re-derives everything from the shared state.
async fn run(shared: Arc<Shared>) {
    loop {
        let deadline = {
            let Ok(state) = shared.lock_state() else {
                tracing::error!("carousel state poisoned; timer task exiting");
                return;
            };
            if state.shutdown {
                return;
            }
            if state.running {
                state.deadline
            } else {
                None
            }
        };

        match deadline {
            Some(at) => {
                tokio::select! {
                    _ = shared.wake.notified() => {}
                    _ = tokio::time::sleep_until(at) => shared.advance(),
                }
            }
            None => shared.wake.notified().await,
        }
    }
}

fn next_item(items: &[String], current: Option<&str>) -> String {
    match current.and_then(|current| items.iter().position(|item| item == current)) {
        Some(index) => items[(index + 1) % items.len()].clone(),
        // Unknown or vanished item: restart from the head of the listing.
        None => items[0].clone(),
    }
}

fn heal_current(state: &mut CarouselState, items: &[String]) {
    let valid = state
        .current
        .as_deref()
        .map(|current| items.iter().any(|item| item == current))
        .unwrap_or(true);
    if valid {
        return;
    }
    state.current = items.first().cloned();
    if let Some(item) = &state.current {
        tracing::debug!(item = %item, "current item vanished; healed to first available");
    }
}

/// Switch deadline for an interval starting now. Intervals too large for
/// `Instant` arithmetic are capped to a deadline that never fires in practice.
fn deadline_after(interval: Duration) -> Instant {
    const FAR_FUTURE: Duration = Duration::from_secs(60 * 60 * 24 * 365 * 30);
    let now = Instant::now();
    now.checked_add(interval).unwrap_or(now + FAR_FUTURE)
}

fn wall_deadline(interval: Duration) -> DateTime<Local> {
    Local::now() + chrono::Duration::from_std(interval).unwrap_or_else(|_| chrono::Duration::zero())
}
