use image::{imageops, DynamicImage, GenericImageView as _, Rgb, RgbImage, Rgba};
use nalgebra_glm as glm;
use rusttype::point;
use unicode_normalization::UnicodeNormalization as _;

use crate::{
    configuration::ExportConfiguration,
    error::ContextError,
    fonts::FontBook,
    surface::{Color, DrawCommand, Rect, Surface, TextRun},
};

/// Bitmaps beyond this size in either dimension are refused instead of being allocated.
const MAXIMUM_BITMAP_DIMENSION: u32 = 16_384;

/// How a surface gets captured into a bitmap.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RasterOptions {
    /// Oversampling factor between surface pixels and bitmap pixels.
    pub scale: f32,
    /// Paints the bitmap with this colour instead of the surface background when set.
    pub background_color: Option<Color>,
    /// Quality of the JPEG encoding, between 1 and 100.
    pub jpeg_quality: u8,
}

impl RasterOptions {
    pub fn from_configuration(configuration: &ExportConfiguration) -> Self {
        RasterOptions {
            scale: configuration.oversample_scale,
            background_color: None,
            jpeg_quality: configuration.jpeg_quality_percent(),
        }
    }
}

/// A page captured as a JPEG image.
#[derive(Debug, Clone, PartialEq)]
pub struct RasterizedPage {
    pub width: u32,
    pub height: u32,
    pub jpeg_bytes: Vec<u8>,
}

/// Captures a rendered surface into an encoded bitmap.
pub trait Rasterizer {
    fn rasterize(
        &mut self,
        surface: &Surface,
        options: &RasterOptions,
    ) -> Result<RasterizedPage, ContextError>;
}

/// Paints the display list of a surface in memory, glyphs included when their font is known.
pub struct CpuRasterizer<'a> {
    fonts: &'a FontBook,
}

impl<'a> CpuRasterizer<'a> {
    pub fn new(fonts: &'a FontBook) -> Self {
        CpuRasterizer { fonts }
    }

    /// Paints every command of the surface, in order, onto a fresh bitmap.
    pub fn paint(&self, surface: &Surface, options: &RasterOptions) -> Result<RgbImage, ContextError> {
        let scale = options.scale;
        if !(scale.is_finite() && scale > 0.0) {
            return Err(ContextError::with_context(format!(
                "Invalid oversampling scale {}",
                scale
            )));
        }
        let width = (surface.width() * scale).round();
        let height = (surface.height() * scale).round();
        if !(width >= 1.0 && height >= 1.0)
            || width > MAXIMUM_BITMAP_DIMENSION as f32
            || height > MAXIMUM_BITMAP_DIMENSION as f32
        {
            return Err(ContextError::with_context(format!(
                "Unable to allocate a bitmap of {}x{} pixels",
                width, height
            )));
        }

        let background = options.background_color.unwrap_or(surface.background());
        let mut bitmap = RgbImage::from_pixel(width as u32, height as u32, Rgb(background.0));

        for command in surface.commands() {
            match command {
                DrawCommand::Image { image, frame, zoom } => {
                    paint_image(&mut bitmap, image, frame, *zoom, scale)?
                }
                DrawCommand::Text {
                    runs,
                    font_family,
                    font_size,
                    color,
                } => match self.fonts.font_face(font_family) {
                    Some(font_face) => paint_text(
                        &mut bitmap,
                        runs,
                        font_face.drawing_font(),
                        font_size * scale,
                        *color,
                        scale,
                    ),
                    None => log::debug!(
                        "No font file for {:?}, skipping the glyphs of {} runs",
                        font_family,
                        runs.len()
                    ),
                },
            }
        }

        Ok(bitmap)
    }
}

impl Rasterizer for CpuRasterizer<'_> {
    fn rasterize(
        &mut self,
        surface: &Surface,
        options: &RasterOptions,
    ) -> Result<RasterizedPage, ContextError> {
        let bitmap = self.paint(surface, options)?;

        let mut jpeg_bytes = Vec::new();
        image::codecs::jpeg::JpegEncoder::new_with_quality(
            &mut jpeg_bytes,
            options.jpeg_quality.clamp(1, 100),
        )
        .encode_image(&bitmap)
        .map_err(|error| ContextError::with_error("Failed to encode the page as JPEG", &error))?;
        log::debug!(
            "Rasterized a page of {}x{} pixels into {} bytes",
            bitmap.width(),
            bitmap.height(),
            jpeg_bytes.len()
        );

        Ok(RasterizedPage {
            width: bitmap.width(),
            height: bitmap.height(),
            jpeg_bytes,
        })
    }
}

fn scale_rect(rect: &Rect, scale: f32) -> Rect {
    Rect::new(rect.x * scale, rect.y * scale, rect.width * scale, rect.height * scale)
}

/// The pixels covered by `rect`, clipped to the bitmap, as `(x0, y0, x1, y1)` with exclusive ends.
fn pixel_bounds(bitmap: &RgbImage, rect: &Rect) -> (u32, u32, u32, u32) {
    let clip = |value: f32, limit: u32| value.round().clamp(0.0, limit as f32) as u32;
    (
        clip(rect.x, bitmap.width()),
        clip(rect.y, bitmap.height()),
        clip(rect.x + rect.width, bitmap.width()),
        clip(rect.y + rect.height, bitmap.height()),
    )
}

/// The transform taking image pixels to surface pixels: the image covers the frame, centred,
/// and is then scaled by `zoom` about the centre of the frame.
pub fn cover_transform(image_width: f32, image_height: f32, frame: &Rect, zoom: f32) -> glm::Mat3 {
    let zoom = if zoom.is_finite() && zoom > 0.0 { zoom } else { 1.0 };
    let cover_scale = (frame.width / image_width).max(frame.height / image_height);
    let frame_center = glm::vec2(frame.x + frame.width / 2.0, frame.y + frame.height / 2.0);

    glm::translation2d(&frame_center)
        * glm::scaling2d(&glm::vec2(cover_scale * zoom, cover_scale * zoom))
        * glm::translation2d(&glm::vec2(-image_width / 2.0, -image_height / 2.0))
}

fn transform_point(transform: &glm::Mat3, x: f32, y: f32) -> glm::Vec2 {
    let transformed = transform * glm::vec3(x, y, 1.0);
    glm::vec2(transformed.x, transformed.y)
}

fn paint_image(
    bitmap: &mut RgbImage,
    image: &DynamicImage,
    frame: &Rect,
    zoom: f32,
    scale: f32,
) -> Result<(), ContextError> {
    let (image_width, image_height) = image.dimensions();
    if image_width == 0 || image_height == 0 {
        log::warn!("Skipping an empty image");
        return Ok(());
    }

    let frame_pixels = scale_rect(frame, scale);
    let transform = cover_transform(image_width as f32, image_height as f32, &frame_pixels, zoom);
    let inverse_transform = glm::inverse(&transform);

    // Only the part of the image which lands inside the frame is resampled
    let visible_start = transform_point(&inverse_transform, frame_pixels.x, frame_pixels.y);
    let visible_end = transform_point(
        &inverse_transform,
        frame_pixels.x + frame_pixels.width,
        frame_pixels.y + frame_pixels.height,
    );
    let source_x0 = visible_start.x.floor().clamp(0.0, image_width as f32) as u32;
    let source_y0 = visible_start.y.floor().clamp(0.0, image_height as f32) as u32;
    let source_x1 = visible_end.x.ceil().clamp(0.0, image_width as f32) as u32;
    let source_y1 = visible_end.y.ceil().clamp(0.0, image_height as f32) as u32;
    if source_x1 <= source_x0 || source_y1 <= source_y0 {
        return Ok(());
    }

    let destination_start = transform_point(&transform, source_x0 as f32, source_y0 as f32);
    let destination_end = transform_point(&transform, source_x1 as f32, source_y1 as f32);
    let destination_width = (destination_end.x - destination_start.x).round();
    let destination_height = (destination_end.y - destination_start.y).round();
    if destination_width < 1.0 || destination_height < 1.0 {
        return Ok(());
    }
    if destination_width > (4 * MAXIMUM_BITMAP_DIMENSION) as f32
        || destination_height > (4 * MAXIMUM_BITMAP_DIMENSION) as f32
    {
        return Err(ContextError::with_context(format!(
            "The image is zoomed too far to be resampled ({}x{} pixels)",
            destination_width, destination_height
        )));
    }

    let visible_part = image
        .crop_imm(
            source_x0,
            source_y0,
            source_x1 - source_x0,
            source_y1 - source_y0,
        )
        .to_rgba8();
    let resampled = imageops::resize(
        &visible_part,
        destination_width as u32,
        destination_height as u32,
        imageops::FilterType::Triangle,
    );

    let offset_x = destination_start.x.round() as i64;
    let offset_y = destination_start.y.round() as i64;
    let (x0, y0, x1, y1) = pixel_bounds(bitmap, &frame_pixels);
    for (x, y, pixel) in resampled.enumerate_pixels() {
        let target_x = offset_x + i64::from(x);
        let target_y = offset_y + i64::from(y);
        if target_x < i64::from(x0)
            || target_y < i64::from(y0)
            || target_x >= i64::from(x1)
            || target_y >= i64::from(y1)
        {
            continue;
        }
        let Rgba([red, green, blue, alpha]) = *pixel;
        let coverage = f32::from(alpha) / 255.0;
        blend_pixel(bitmap, target_x as u32, target_y as u32, [red, green, blue], coverage);
    }

    Ok(())
}

fn paint_text(
    bitmap: &mut RgbImage,
    runs: &[TextRun],
    font: &rusttype::Font<'static>,
    pixel_size: f32,
    color: Color,
    scale: f32,
) {
    let glyph_scale = rusttype::Scale::uniform(pixel_size);

    for run in runs {
        let mut caret = point(run.x * scale, run.baseline_y * scale);
        for character in run.text.nfc() {
            let glyph = font.glyph(character).scaled(glyph_scale);
            let advance_width = glyph.h_metrics().advance_width;
            let glyph = glyph.positioned(caret);
            caret.x += advance_width;

            let Some(bounding_box) = glyph.pixel_bounding_box() else {
                continue;
            };
            // Draw the glyph into the bitmap per-pixel, turning the coverage into an alpha value
            glyph.draw(|x, y, coverage| {
                let target_x = bounding_box.min.x + x as i32;
                let target_y = bounding_box.min.y + y as i32;
                if target_x < 0
                    || target_y < 0
                    || target_x >= bitmap.width() as i32
                    || target_y >= bitmap.height() as i32
                {
                    return;
                }
                blend_pixel(bitmap, target_x as u32, target_y as u32, color.0, coverage);
            });
        }
    }
}

fn blend_pixel(bitmap: &mut RgbImage, x: u32, y: u32, color: [u8; 3], coverage: f32) {
    let coverage = coverage.clamp(0.0, 1.0);
    let pixel = bitmap.get_pixel_mut(x, y);
    for (channel, source) in pixel.0.iter_mut().zip(color) {
        *channel = (f32::from(source) * coverage + f32::from(*channel) * (1.0 - coverage)).round() as u8;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GenericImageView, RgbaImage};
    use std::sync::Arc;

    const RED: [u8; 3] = [220, 20, 20];
    const BACKGROUND: Color = Color([0xef, 0xf6, 0xff]);

    fn options(scale: f32) -> RasterOptions {
        RasterOptions {
            scale,
            background_color: None,
            jpeg_quality: 90,
        }
    }

    fn surface_with_image(zoom: f32) -> Surface {
        let mut surface = Surface::acquire(100.0, 140.0);
        surface.clear(BACKGROUND);
        let image = RgbaImage::from_pixel(10, 10, Rgba([RED[0], RED[1], RED[2], 255]));
        surface.push(DrawCommand::Image {
            image: Arc::new(DynamicImage::ImageRgba8(image)),
            frame: surface.bounds(),
            zoom,
        });
        surface
    }

    fn assert_close(pixel: &Rgb<u8>, expected: [u8; 3]) {
        for (channel, expected_channel) in pixel.0.iter().zip(expected) {
            assert!(
                (i16::from(*channel) - i16::from(expected_channel)).abs() <= 2,
                "{:?} != {:?}",
                pixel.0,
                expected
            );
        }
    }

    #[test]
    fn covered_images_fill_the_whole_frame() {
        let fonts = FontBook::empty();
        let bitmap = CpuRasterizer::new(&fonts)
            .paint(&surface_with_image(1.0), &options(1.0))
            .unwrap();

        assert_eq!(bitmap.dimensions(), (100, 140));
        for (x, y) in [(0, 0), (99, 0), (0, 139), (99, 139), (50, 70)] {
            assert_close(bitmap.get_pixel(x, y), RED);
        }
    }

    #[test]
    fn zooming_out_reveals_the_background() {
        let fonts = FontBook::empty();
        let bitmap = CpuRasterizer::new(&fonts)
            .paint(&surface_with_image(0.5), &options(1.0))
            .unwrap();

        // The image covers 70x70 pixels around the centre of the frame
        assert_close(bitmap.get_pixel(50, 70), RED);
        assert_close(bitmap.get_pixel(16, 36), RED);
        assert_eq!(bitmap.get_pixel(0, 0).0, BACKGROUND.0);
        assert_eq!(bitmap.get_pixel(10, 70).0, BACKGROUND.0);
        assert_eq!(bitmap.get_pixel(50, 120).0, BACKGROUND.0);
    }

    #[test]
    fn the_cover_transform_centres_the_image() {
        let frame = Rect::new(0.0, 0.0, 100.0, 140.0);
        let transform = cover_transform(10.0, 10.0, &frame, 1.0);

        let center = transform_point(&transform, 5.0, 5.0);
        assert!((center.x - 50.0).abs() < 1e-4 && (center.y - 70.0).abs() < 1e-4);
        // The height is the limiting side, the image is scaled 14 times
        let corner = transform_point(&transform, 0.0, 0.0);
        assert!((corner.x + 20.0).abs() < 1e-4 && corner.y.abs() < 1e-4);

        let invalid_zoom = cover_transform(10.0, 10.0, &frame, f32::NAN);
        assert_eq!(invalid_zoom, transform);
    }

    #[test]
    fn text_without_a_font_leaves_the_page_untouched() {
        let fonts = FontBook::empty();
        let mut surface = Surface::acquire(50.0, 50.0);
        surface.clear(Color::WHITE);
        surface.push(DrawCommand::Text {
            runs: vec![TextRun {
                text: "Front Cover".into(),
                x: 5.0,
                baseline_y: 25.0,
            }],
            font_family: "Dancing Script".into(),
            font_size: 12.0,
            color: Color([0, 0, 0]),
        });

        let bitmap = CpuRasterizer::new(&fonts).paint(&surface, &options(1.0)).unwrap();
        assert!(bitmap.pixels().all(|pixel| pixel.0 == [255, 255, 255]));
    }

    #[test]
    fn glyphs_are_drawn_where_their_runs_start() {
        let fonts = crate::fonts::tests::fixture_font_book();
        let mut surface = Surface::acquire(100.0, 50.0);
        surface.clear(Color::WHITE);
        surface.push(DrawCommand::Text {
            runs: vec![TextRun {
                text: "Hi".into(),
                x: 5.0,
                baseline_y: 35.0,
            }],
            font_family: "Dancing Script".into(),
            font_size: 24.0,
            color: Color([0, 0, 0]),
        });

        let bitmap = CpuRasterizer::new(&fonts).paint(&surface, &options(2.0)).unwrap();
        // Two glyphs of 0.6 em, from x = 10 to x = 68 once oversampled
        let is_inked = |x: u32, y: u32| bitmap.get_pixel(x, y).0[0] < 128;
        assert!((10..68).any(|x| (30..72).any(|y| is_inked(x, y))));
        assert!((0..8).all(|x| (0..100).all(|y| !is_inked(x, y))));
        assert!((72..200).all(|x| (0..100).all(|y| !is_inked(x, y))));
        assert!((0..200).all(|x| (74..100).all(|y| !is_inked(x, y))));
    }

    #[test]
    fn pages_are_encoded_as_jpeg() {
        let fonts = FontBook::empty();
        let page = CpuRasterizer::new(&fonts)
            .rasterize(&surface_with_image(1.0), &options(2.0))
            .unwrap();

        assert_eq!((page.width, page.height), (200, 280));
        let decoded = image::load_from_memory_with_format(&page.jpeg_bytes, image::ImageFormat::Jpeg)
            .unwrap();
        assert_eq!(decoded.dimensions(), (200, 280));
    }

    #[test]
    fn invalid_scales_are_refused() {
        let fonts = FontBook::empty();
        let mut rasterizer = CpuRasterizer::new(&fonts);
        let surface = Surface::acquire(100.0, 140.0);

        assert!(rasterizer.rasterize(&surface, &options(0.0)).is_err());
        assert!(rasterizer.rasterize(&surface, &options(f32::INFINITY)).is_err());
        assert!(rasterizer.rasterize(&surface, &options(1000.0)).is_err());
    }
}
