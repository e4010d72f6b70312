use std::sync::Arc;

use unicode_normalization::UnicodeNormalization as _;

use crate::{
    assets::AssetLoader,
    configuration::ExportConfiguration,
    error::ContextError,
    fonts::{FontBook, Typeface},
    letter::{ImageSource, LetterStyle, PageDescriptor, COLOPHON_GLYPH, COVER_TITLE},
    measure::{self, FittedText, TextLine},
    surface::{Color, DrawCommand, Rect, Surface, TextRun},
};

// The looks of the four pages, lengths given for a canvas 1200 pixels wide
const COVER_BACKGROUND: Color = Color([0xef, 0xf6, 0xff]);
const COVER_TITLE_COLOR: Color = Color([0x63, 0x66, 0xf1]);
const COVER_TITLE_SIZE: f32 = 48.0;
const INSET_BACKGROUND: Color = Color::WHITE;
const MESSAGE_BACKGROUND: Color = Color([0xfd, 0xfb, 0xf7]);
const MESSAGE_COLOR: Color = Color([0x1e, 0x29, 0x3b]);
const MESSAGE_PADDING: f32 = 40.0;
const SIGNATURE_COLOR: Color = Color([0x47, 0x55, 0x69]);
const SIGNATURE_MARGIN: f32 = 24.0;
const COLOPHON_BACKGROUND: Color = Color([0xf3, 0xf4, 0xf6]);
const COLOPHON_GLYPH_COLOR: Color = Color([0x1f, 0x29, 0x37]);
const COLOPHON_GLYPH_SIZE: f32 = 72.0;
/// Line height of the single line glyphs, as a multiple of their size.
const SINGLE_LINE_HEIGHT: f32 = 1.2;

/// The signature is always set smaller than the message, by a ratio within these bounds.
const SIGNATURE_RATIO_BOUNDS: (f32, f32) = (0.9, 0.95);
const DEFAULT_SIGNATURE_RATIO: f32 = 0.92;

/// Records the drawing of one page onto the shared surface.
pub struct PageRenderer<'a> {
    fonts: &'a FontBook,
    assets: &'a dyn AssetLoader,
    configuration: &'a ExportConfiguration,
}

impl<'a> PageRenderer<'a> {
    pub fn new(
        fonts: &'a FontBook,
        assets: &'a dyn AssetLoader,
        configuration: &'a ExportConfiguration,
    ) -> Self {
        PageRenderer {
            fonts,
            assets,
            configuration,
        }
    }

    /// Clears the surface and records the page described by `descriptor` onto it.
    ///
    /// Images are decoded before returning. An image which fails to load does not fail the
    /// page: the cover shows its title instead, the inset stays blank.
    pub fn render_page(
        &self,
        descriptor: &PageDescriptor,
        style: &LetterStyle,
        surface: &mut Surface,
    ) -> Result<(), ContextError> {
        let (width, height) = (surface.width(), surface.height());
        if !(width.is_finite() && height.is_finite() && width >= 1.0 && height >= 1.0) {
            return Err(ContextError::with_context(format!(
                "Unable to render the {} page on a surface of {}x{} pixels",
                descriptor.name(),
                width,
                height
            )));
        }
        log::debug!("Rendering the {} page", descriptor.name());

        match descriptor {
            PageDescriptor::Cover { image } => {
                surface.clear(COVER_BACKGROUND);
                let image_placed = image
                    .as_ref()
                    .map(|image| self.place_image(image, surface))
                    .unwrap_or(false);
                if !image_placed {
                    let font_size = COVER_TITLE_SIZE * self.configuration.layout_scale();
                    self.place_centered_glyphs(COVER_TITLE, font_size, COVER_TITLE_COLOR, style, surface);
                }
            }
            PageDescriptor::Inset { image } => {
                surface.clear(INSET_BACKGROUND);
                if let Some(image) = image {
                    self.place_image(image, surface);
                }
            }
            PageDescriptor::Message { text, signature } => {
                surface.clear(MESSAGE_BACKGROUND);
                self.place_message(text.as_deref(), signature.as_deref(), style, surface);
            }
            PageDescriptor::Colophon => {
                surface.clear(COLOPHON_BACKGROUND);
                let typeface = self.fonts.typeface(&style.font_family);
                let glyph_missing = COLOPHON_GLYPH
                    .chars()
                    .any(|character| !typeface.metrics().has_glyph(character));
                if glyph_missing {
                    log::warn!(
                        "The font for {:?} has no glyph for {:?}, leaving the back cover blank",
                        style.font_family,
                        COLOPHON_GLYPH
                    );
                } else {
                    let font_size = COLOPHON_GLYPH_SIZE * self.configuration.layout_scale();
                    self.place_centered_glyphs(
                        COLOPHON_GLYPH,
                        font_size,
                        COLOPHON_GLYPH_COLOR,
                        style,
                        surface,
                    );
                }
            }
        }

        Ok(())
    }

    /// Lays out the message and its signature into the padded box of the message page.
    ///
    /// # Arguments
    ///
    /// * `text` - The message, `None` when the letter has none.
    /// * `signature` - The signature set right aligned below the message.
    /// * `style` - The typography of the letter.
    /// * `box_width` - The width of the padded content box.
    /// * `box_height` - The height of the padded content box.
    pub fn layout_message(
        &self,
        text: Option<&str>,
        signature: Option<&str>,
        style: &LetterStyle,
        box_width: f32,
        box_height: f32,
    ) -> FittedText {
        let fit_configuration = &self.configuration.fit;
        let line_height = fit_configuration.line_height;
        let signature_ratio = signature_ratio(style);
        let signature_margin = SIGNATURE_MARGIN * self.configuration.layout_scale();
        let typeface = self.fonts.typeface(&style.font_family);
        let metrics = typeface.metrics();

        let text = text.map(|text| text.nfc().collect::<String>());
        let signature = signature.map(|signature| signature.nfc().collect::<String>());
        let signature_height = |font_size: f32| match &signature {
            Some(signature) => {
                let signature_font_size = font_size * signature_ratio;
                let lines = measure::wrap_lines(metrics, signature, signature_font_size, box_width);
                signature_margin + lines.len() as f32 * signature_font_size * line_height
            }
            None => 0.0,
        };

        let Some(text) = text else {
            // Nothing to fit, the signature takes the size a very short message would start from
            let font_size = measure::clamp_font_size(measure::seed_font_size(0), fit_configuration);
            return FittedText {
                font_size,
                lines: Vec::new(),
                signature_font_size: font_size * signature_ratio,
            };
        };

        let font_size = measure::fit_font_size_with(
            |font_size| {
                measure::wrap_lines(metrics, &text, font_size, box_width).len() as f32
                    * font_size
                    * line_height
                    + signature_height(font_size)
            },
            measure::seed_font_size(text.chars().count()),
            box_height,
            fit_configuration,
        );
        log::debug!(
            "The message of {} characters is set at {} pixels",
            text.chars().count(),
            font_size
        );

        FittedText {
            font_size,
            lines: measure::wrap_lines(metrics, &text, font_size, box_width),
            signature_font_size: font_size * signature_ratio,
        }
    }

    fn place_message(
        &self,
        text: Option<&str>,
        signature: Option<&str>,
        style: &LetterStyle,
        surface: &mut Surface,
    ) {
        if text.is_none() && signature.is_none() {
            return;
        }

        let scale = self.configuration.layout_scale();
        let padding = MESSAGE_PADDING * scale;
        let content_box = Rect::new(
            padding,
            padding,
            (surface.width() - 2.0 * padding).max(1.0),
            (surface.height() - 2.0 * padding).max(1.0),
        );
        let line_height = self.configuration.fit.line_height;
        let typeface = self.fonts.typeface(&style.font_family);
        let fitted = self.layout_message(text, signature, style, content_box.width, content_box.height);

        if !fitted.lines.is_empty() {
            let runs = justified_runs(&fitted.lines, &content_box, fitted.font_size, line_height, &typeface);
            surface.push(DrawCommand::Text {
                runs,
                font_family: style.font_family.clone(),
                font_size: fitted.font_size,
                color: MESSAGE_COLOR,
            });
        }

        if let Some(signature) = signature {
            let signature = signature.nfc().collect::<String>();
            let signature_font_size = fitted.signature_font_size;
            let signature_lines = measure::wrap_lines(
                typeface.metrics(),
                &signature,
                signature_font_size,
                content_box.width,
            );
            let signature_line_height = signature_font_size * line_height;
            let signature_block_height = signature_lines.len() as f32 * signature_line_height;
            // The message grows to fill the box, which pushes the signature to its bottom
            let top = if fitted.lines.is_empty() {
                content_box.y + SIGNATURE_MARGIN * scale
            } else {
                content_box.y + content_box.height - signature_block_height
            };

            let baseline_offset = typeface.baseline_offset(signature_font_size, line_height);
            let runs = signature_lines
                .iter()
                .enumerate()
                .map(|(index, line)| TextRun {
                    text: line.text(),
                    x: content_box.x + content_box.width - line.natural_width(),
                    baseline_y: top + index as f32 * signature_line_height + baseline_offset,
                })
                .collect();
            surface.push(DrawCommand::Text {
                runs,
                font_family: style.font_family.clone(),
                font_size: signature_font_size,
                color: SIGNATURE_COLOR,
            });
        }
    }

    /// Places an image filling the whole surface. Returns whether the image could be loaded.
    fn place_image(&self, image: &ImageSource, surface: &mut Surface) -> bool {
        match self.assets.load_image(&image.source) {
            Ok(decoded_image) => {
                surface.push(DrawCommand::Image {
                    image: Arc::new(decoded_image),
                    frame: surface.bounds(),
                    zoom: image.zoom,
                });
                true
            }
            Err(error) => {
                log::warn!("{}, leaving its frame empty", error);
                false
            }
        }
    }

    fn place_centered_glyphs(
        &self,
        text: &str,
        font_size: f32,
        color: Color,
        style: &LetterStyle,
        surface: &mut Surface,
    ) {
        let typeface = self.fonts.typeface(&style.font_family);
        let text_width = measure::text_width(typeface.metrics(), text, font_size);
        let line_box_height = font_size * SINGLE_LINE_HEIGHT;
        let top = (surface.height() - line_box_height) / 2.0;

        surface.push(DrawCommand::Text {
            runs: vec![TextRun {
                text: text.to_string(),
                x: (surface.width() - text_width) / 2.0,
                baseline_y: top + typeface.baseline_offset(font_size, SINGLE_LINE_HEIGHT),
            }],
            font_family: style.font_family.clone(),
            font_size,
            color,
        });
    }
}

/// The ratio between the signature and the message sizes, derived from the sizes the sender picked.
pub fn signature_ratio(style: &LetterStyle) -> f32 {
    if style.font_size > 0.0 && style.signature_font_size > 0.0 {
        (style.signature_font_size / style.font_size)
            .clamp(SIGNATURE_RATIO_BOUNDS.0, SIGNATURE_RATIO_BOUNDS.1)
    } else {
        DEFAULT_SIGNATURE_RATIO
    }
}

/// One run per word, the lines inside a paragraph being stretched to the full box width.
fn justified_runs(
    lines: &[TextLine],
    content_box: &Rect,
    font_size: f32,
    line_height: f32,
    typeface: &Typeface<'_>,
) -> Vec<TextRun> {
    let baseline_offset = typeface.baseline_offset(font_size, line_height);
    let mut runs = Vec::new();

    for (index, line) in lines.iter().enumerate() {
        let baseline_y = content_box.y + index as f32 * font_size * line_height + baseline_offset;
        let gaps = line.words.len().saturating_sub(1);
        let word_spacing = if line.ends_paragraph || gaps == 0 {
            line.space_width
        } else {
            let words_width: f32 = line.words.iter().map(|word| word.width).sum();
            ((content_box.width - words_width) / gaps as f32).max(line.space_width)
        };

        let mut x = content_box.x;
        for word in line.words.iter() {
            runs.push(TextRun {
                text: word.text.clone(),
                x,
                baseline_y,
            });
            x += word.width + word_spacing;
        }
    }

    runs
}
