use std::sync::Arc;

use serde::Serialize;

use crate::{Carousel, CarouselSnapshot, Gallery, RenderEngine, Result};

/// One immutable status snapshot for API consumers.
#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub ok: bool,
    pub display_ready: bool,
    pub target_size: (u32, u32),
    pub image_count: usize,
    pub carousel: CarouselSnapshot,
}

/// Composes scheduler state, display readiness and gallery size into a single
/// consistent snapshot. Never mutates the scheduler or the cache.
pub struct StatusFacade {
    carousel: Arc<Carousel>,
    gallery: Arc<dyn Gallery>,
    engine: Arc<dyn RenderEngine>,
}

impl StatusFacade {
    pub fn new(
        carousel: Arc<Carousel>,
        gallery: Arc<dyn Gallery>,
        engine: Arc<dyn RenderEngine>,
    ) -> Self {
        Self {
            carousel,
            gallery,
            engine,
        }
    }

    /// Builds the status snapshot.
    ///
    /// A failing readiness probe is reported as `display_ready = false`
    /// rather than raised, so the dashboard keeps polling through hardware
    /// hiccups.
    pub fn report(&self) -> Result<StatusReport> {
        let display_ready = match self.engine.is_ready() {
            Ok(ready) => ready,
            Err(err) => {
                tracing::warn!(error = %err, "display readiness probe failed");
                false
            }
        };

        let image_count = match self.gallery.list() {
            Ok(items) => items.len(),
            Err(err) => {
                tracing::warn!(error = %err, "gallery listing failed during status report");
                0
            }
        };

        Ok(StatusReport {
            ok: true,
            display_ready,
            target_size: self.engine.target_size(),
            image_count,
            carousel: self.carousel.snapshot()?,
        })
    }
}
