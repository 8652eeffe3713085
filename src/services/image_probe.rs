use image::{ImageFormat, ImageReader};
use std::io::Cursor;

/// Format and pixel size read from an image's header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ImageInfo {
    pub format: Option<ImageFormat>,
    pub dimensions: Option<(u32, u32)>,
}

/// Inspect image bytes without decoding pixel data.
///
/// Unknown formats and formats without a compiled-in decoder yield `None`
/// fields rather than errors.
pub fn probe(bytes: &[u8]) -> ImageInfo {
    let format = image::guess_format(bytes).ok();
    let dimensions = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .ok()
        .and_then(|reader| reader.into_dimensions().ok());

    ImageInfo { format, dimensions }
}

impl ImageInfo {
    /// Short format name, falling back to the subtype of the source MIME type.
    pub fn format_name(&self, fallback_mime: &str) -> String {
        match self.format.and_then(|f| f.extensions_str().first().copied()) {
            Some(ext) => ext.to_string(),
            None => fallback_mime
                .rsplit_once('/')
                .map(|(_, subtype)| subtype)
                .unwrap_or(fallback_mime)
                .to_string(),
        }
    }

    pub fn content_type(&self, fallback_mime: &str) -> String {
        match self.format {
            Some(format) => format.to_mime_type().to_string(),
            None if !fallback_mime.is_empty() => fallback_mime.to_string(),
            None => "application/octet-stream".to_string(),
        }
    }

    pub fn width(&self) -> Option<i32> {
        self.dimensions.and_then(|(w, _)| i32::try_from(w).ok())
    }

    pub fn height(&self) -> Option<i32> {
        self.dimensions.and_then(|(_, h)| i32::try_from(h).ok())
    }
}
