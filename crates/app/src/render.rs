use std::io::Cursor;
use std::path::PathBuf;

use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use inkframe_core::{RenderError, RenderEngine};

const BORDER_PX: u32 = 4;

/// Software render engine for the dashboard preview.
///
/// Loads the requested gallery image, resizes it to the display dimensions
/// and encodes it as PNG. When the gallery is empty it produces a themed
/// placeholder frame instead, so the dashboard always has something to show.
pub struct FrameRenderer {
    image_dir: PathBuf,
    target: (u32, u32),
}

impl FrameRenderer {
    pub fn new(image_dir: impl Into<PathBuf>, target: (u32, u32)) -> Self {
        Self {
            image_dir: image_dir.into(),
            target,
        }
    }

    fn resolve(&self, item: &str) -> Result<PathBuf, RenderError> {
        // Item names come from user input; only bare file names are valid.
        if item.contains(['/', '\\']) || item.contains("..") {
            return Err(RenderError::new(format!("invalid image name: {item}")));
        }
        let path = self.image_dir.join(item);
        if !path.is_file() {
            return Err(RenderError::new(format!("image not found: {item}")));
        }
        Ok(path)
    }

    fn render_item(&self, item: &str) -> Result<DynamicImage, RenderError> {
        let path = self.resolve(item)?;
        let image = image::open(&path)
            .map_err(|err| RenderError::new(format!("failed to load {item}: {err}")))?;

        let (width, height) = self.target;
        if image.width() == width && image.height() == height {
            Ok(image)
        } else {
            Ok(image.resize_exact(width, height, FilterType::Lanczos3))
        }
    }

    fn render_placeholder(&self, theme: &str) -> DynamicImage {
        let (bg, fg) = theme_palette(theme);
        let (width, height) = self.target;
        let mut frame = RgbImage::from_pixel(width, height, bg);

        // A border and a centre rule make the empty frame recognisable on
        // the actual panel without needing font rendering.
        for x in 0..width {
            for t in 0..BORDER_PX.min(height) {
                frame.put_pixel(x, t, fg);
                frame.put_pixel(x, height - 1 - t, fg);
            }
        }
        for y in 0..height {
            for t in 0..BORDER_PX.min(width) {
                frame.put_pixel(t, y, fg);
                frame.put_pixel(width - 1 - t, y, fg);
            }
        }
        if height > 2 && width > 2 {
            let mid = height / 2;
            for x in (width / 4)..(3 * width / 4) {
                frame.put_pixel(x, mid, fg);
            }
        }

        DynamicImage::ImageRgb8(frame)
    }
}

impl RenderEngine for FrameRenderer {
    fn render(
        &self,
        item: Option<&str>,
        _layout: &str,
        theme: &str,
    ) -> Result<Vec<u8>, RenderError> {
        let image = match item {
            Some(item) => self.render_item(item)?,
            None => self.render_placeholder(theme),
        };

        let mut bytes = Vec::new();
        image
            .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .map_err(|err| RenderError::new(format!("failed to encode preview: {err}")))?;
        Ok(bytes)
    }

    fn is_ready(&self) -> Result<bool, RenderError> {
        Ok(self.image_dir.is_dir())
    }

    fn target_size(&self) -> (u32, u32) {
        self.target
    }
}

/// Background and foreground colours for a theme name.
fn theme_palette(theme: &str) -> (Rgb<u8>, Rgb<u8>) {
    match theme {
        "dark" => (hex_color("#0b0b0b"), hex_color("#f5f5f2")),
        "paper" | "ink" | "light" => (hex_color("#f2f1ec"), hex_color("#111111")),
        _ => (hex_color("#ffffff"), hex_color("#111111")),
    }
}

fn hex_color(value: &str) -> Rgb<u8> {
    parse_hex_color(value).unwrap_or(Rgb([255, 255, 255]))
}

fn parse_hex_color(value: &str) -> Option<Rgb<u8>> {
    let value = value.trim_start_matches('#');
    let expanded: String = if value.len() == 3 {
        value.chars().flat_map(|ch| [ch, ch]).collect()
    } else {
        value.to_string()
    };
    if expanded.len() != 6 {
        return None;
    }
    let parse = |range: std::ops::Range<usize>| u8::from_str_radix(&expanded[range], 16).ok();
    Some(Rgb([parse(0..2)?, parse(2..4)?, parse(4..6)?]))
}
