//! Core library for the inkframe e-ink photo frame server.
//!
//! The crate owns the two subsystems with real design pressure — the
//! carousel scheduler that rotates the displayed image on a wall-clock
//! interval, and the preview cache that memoizes rendered frames and shields
//! the dashboard from render failures — plus the status facade that composes
//! both into one snapshot. Storage and rendering stay behind the [`Gallery`]
//! and [`RenderEngine`] collaborator traits so the HTTP layer and the
//! hardware glue can live elsewhere.

pub mod carousel;
pub mod config;
pub mod error;
pub mod gallery;
pub mod preview;
pub mod render;
pub mod status;

pub use carousel::{Carousel, CarouselSnapshot};
pub use config::{CarouselConfig, FrameConfig, PreviewConfig};
pub use error::{FrameError, RenderError, Result};
pub use gallery::Gallery;
pub use preview::{CacheOutcome, PreviewCache, PreviewFrame, PreviewKey};
pub use render::RenderEngine;
pub use status::{StatusFacade, StatusReport};
