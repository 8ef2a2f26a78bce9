use crate::error::RenderError;

/// External collaborator that composes a display frame for an item and a set
/// of style parameters.
///
/// Implementations may be slow or flaky; the preview cache wraps every call
/// and shields the dashboard from individual failures.
pub trait RenderEngine: Send + Sync {
    /// Renders `item` with the given layout and theme, returning encoded
    /// image bytes.
    ///
    /// `None` means the gallery is currently empty; the engine should produce
    /// its placeholder frame so the dashboard still has something to show.
    fn render(
        &self,
        item: Option<&str>,
        layout: &str,
        theme: &str,
    ) -> std::result::Result<Vec<u8>, RenderError>;

    /// Probes whether the physical display is reachable.
    fn is_ready(&self) -> std::result::Result<bool, RenderError>;

    /// Pixel dimensions of the target display.
    fn target_size(&self) -> (u32, u32);
}
