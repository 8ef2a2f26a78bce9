use crate::Result;

/// Collaborator that owns the stored images.
///
/// The core only ever needs the ordered list of item identifiers; uploads,
/// deletion and on-disk layout stay behind this trait.
pub trait Gallery: Send + Sync {
    /// Returns the gallery items in stable display order.
    ///
    /// The order must be deterministic across calls (the carousel rotates by
    /// walking this list and wrapping at the end).
    fn list(&self) -> Result<Vec<String>>;
}
