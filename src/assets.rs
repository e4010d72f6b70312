use std::path::Path;

use base64::Engine as _;
use image::DynamicImage;

use crate::error::ContextError;

/// Resolves the image sources stored in a letter into decoded images.
pub trait AssetLoader {
    fn load_image(&self, source: &str) -> Result<DynamicImage, ContextError>;
}

/// Decodes data URLs (`data:image/png;base64,...`), `file://` URLs and plain file paths.
/// Remote URLs cannot be fetched and always fail to load.
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalAssetLoader;

impl AssetLoader for LocalAssetLoader {
    fn load_image(&self, source: &str) -> Result<DynamicImage, ContextError> {
        let source = source.trim();
        if let Some(data_url) = source.strip_prefix("data:") {
            let image_bytes = decode_data_url(data_url)?;
            return image::load_from_memory(&image_bytes).map_err(|error| {
                ContextError::with_error("Failed to decode the image embedded in the letter", &error)
            });
        }
        if source.starts_with("http://") || source.starts_with("https://") {
            return Err(ContextError::with_context(format!(
                "Unable to fetch the remote image {:?}",
                source
            )));
        }

        let image_path = Path::new(source.strip_prefix("file://").unwrap_or(source));
        image::open(image_path).map_err(|error| {
            ContextError::with_error(format!("Failed to load the image {:?}", image_path), &error)
        })
    }
}

/// Decodes the payload of a data URL whose `data:` prefix has already been stripped.
fn decode_data_url(data_url: &str) -> Result<Vec<u8>, ContextError> {
    let (header, payload) = data_url.split_once(',').ok_or(ContextError::with_context(
        "The data URL has no payload separator",
    ))?;
    if !header.split(';').any(|parameter| parameter == "base64") {
        return Err(ContextError::with_context(format!(
            "Only base64 data URLs are supported, found {:?}",
            header
        )));
    }

    // Data URLs pasted around sometimes carry line breaks inside the payload
    let payload: String = payload.chars().filter(|character| !character.is_whitespace()).collect();
    base64::engine::general_purpose::STANDARD
        .decode(payload)
        .map_err(|error| ContextError::with_error("Failed to decode the base64 payload", &error))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use image::{ImageFormat, Rgb, RgbImage};
    use std::io::Cursor;

    /// Encodes a single-colour PNG into a data URL.
    pub(crate) fn png_data_url(width: u32, height: u32, color: [u8; 3]) -> String {
        let image = RgbImage::from_pixel(width, height, Rgb(color));
        let mut png_bytes = Vec::new();
        image
            .write_to(&mut Cursor::new(&mut png_bytes), ImageFormat::Png)
            .unwrap();
        format!(
            "data:image/png;base64,{}",
            base64::engine::general_purpose::STANDARD.encode(png_bytes)
        )
    }

    #[test]
    fn data_urls_are_decoded() {
        let image = LocalAssetLoader
            .load_image(&png_data_url(3, 2, [200, 10, 10]))
            .unwrap();
        assert_eq!((image.width(), image.height()), (3, 2));
        assert_eq!(image.to_rgb8().get_pixel(1, 1), &Rgb([200, 10, 10]));
    }

    #[test]
    fn broken_sources_fail_to_load() {
        let loader = LocalAssetLoader;
        assert!(loader.load_image("data:image/png;base64,not-base64!").is_err());
        assert!(loader.load_image("data:image/png,raw").is_err());
        assert!(loader.load_image("data:image/png;base64").is_err());
        assert!(loader.load_image("https://example.com/missing.png").is_err());
        assert!(loader.load_image("/nonexistent/front.png").is_err());
    }
}
