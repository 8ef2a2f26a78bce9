/// Result alias that carries the custom [`FrameError`] type.
pub type Result<T> = std::result::Result<T, FrameError>;

/// Failure reported by a render engine collaborator.
///
/// Render failures are usually surfaced to callers as staleness metadata
/// rather than hard errors; they only become a [`FrameError`] when no cached
/// frame exists to fall back on.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{message}")]
pub struct RenderError {
    message: String,
}

impl RenderError {
    /// Creates a render error wrapping the provided message.
    pub fn new<T: Into<String>>(message: T) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// Returns the human readable failure description.
    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Common error type for the core crate.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The carousel was asked to start while the gallery listed no images.
    #[error("no images available to rotate")]
    EmptyGallery,
    /// A carousel interval must be a positive duration.
    #[error("carousel interval must be positive")]
    InvalidInterval,
    /// A preview render failed and no previously cached frame exists.
    #[error("preview unavailable: {0}")]
    RenderUnavailable(#[source] RenderError),
    /// Wrapper around standard IO errors (gallery listing, sockets, files).
    #[error("{0}")]
    Io(#[from] std::io::Error),
    /// Catch-all for internal failures such as poisoned state containers.
    #[error("{0}")]
    Message(String),
}

impl FrameError {
    /// Creates a new error that simply wraps the provided message.
    pub fn msg<T: Into<String>>(msg: T) -> Self {
        Self::Message(msg.into())
    }
}
