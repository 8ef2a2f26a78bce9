use std::ffi::OsStr;
use std::path::{Path, PathBuf};

use inkframe_core::{Gallery, Result};

/// Image file extensions the gallery accepts.
const ALLOWED_EXT: [&str; 5] = ["jpg", "jpeg", "png", "gif", "webp"];

/// Gallery backed by a flat directory of image files.
///
/// Items are file names, ordered case-insensitively so the rotation order is
/// stable regardless of upload order.
pub struct FsGallery {
    image_dir: PathBuf,
}

impl FsGallery {
    pub fn new(image_dir: impl Into<PathBuf>) -> Self {
        Self {
            image_dir: image_dir.into(),
        }
    }
}

impl Gallery for FsGallery {
    fn list(&self) -> Result<Vec<String>> {
        if !self.image_dir.is_dir() {
            return Ok(Vec::new());
        }

        let mut items = Vec::new();
        for entry in std::fs::read_dir(&self.image_dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let name = match entry.file_name().into_string() {
                Ok(name) => name,
                // Non-UTF-8 names cannot travel through the JSON API.
                Err(_) => continue,
            };
            if is_allowed(&name) {
                items.push(name);
            }
        }

        items.sort_by_key(|name| name.to_lowercase());
        Ok(items)
    }
}

fn is_allowed(name: &str) -> bool {
    Path::new(name)
        .extension()
        .and_then(OsStr::to_str)
        .map(|ext| ALLOWED_EXT.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}
