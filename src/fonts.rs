use std::{collections::BTreeMap, path::Path, sync::Arc};

use owned_ttf_parser::{AsFaceRef as _, Face, OwnedFace};

use crate::{configuration::FontsConfiguration, error::ContextError};

/// The horizontal metrics text layout needs: how far the caret moves after each character.
pub trait TextMetrics {
    /// The advance width of `character` when set at `font_size` pixels.
    fn advance_width(&self, character: char, font_size: f32) -> f32;

    /// Whether the typeface has an actual glyph for `character`.
    fn has_glyph(&self, _character: char) -> bool {
        true
    }
}

/// Metrics where every character advances by the same fraction of the font size. It stands in
/// for a family which has no font file associated and makes the layout fully predictable.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct UniformMetrics {
    pub advance_ratio: f32,
}

impl Default for UniformMetrics {
    fn default() -> Self {
        UniformMetrics { advance_ratio: 0.5 }
    }
}

impl TextMetrics for UniformMetrics {
    fn advance_width(&self, character: char, font_size: f32) -> f32 {
        if character.is_control() {
            0.0
        } else {
            self.advance_ratio * font_size
        }
    }
}

/// The (insofar) relevant vertical metrics of a font.
#[derive(Clone, Copy, Debug, Default)]
pub struct FontMetrics {
    /// The ascent of the font.
    pub ascent: i16,
    /// The descent of the font.
    pub descent: i16,
    /// The number of units per em of the font.
    pub units_per_em: u16,
}

/// A font loaded from a TTF file: parsed once for its metrics and once for drawing its glyphs.
#[derive(Clone)]
pub struct FontFace {
    /// The name of the family the face was registered under.
    pub family: String,
    /// The underlying font face which is represented through the `ttf_parser` crate.
    inner: Arc<OwnedFace>,
    /// The number of units per em of the font face.
    units_per_em: u16,
    /// The same font data, ready to be rasterized.
    drawing_font: rusttype::Font<'static>,
}

impl std::fmt::Debug for FontFace {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("FontFace")
            .field("family", &self.family)
            .field("units_per_em", &self.units_per_em)
            .finish()
    }
}

impl FontFace {
    /// Constructs a font face from the raw data of a TTF (or OTF wrapping TTF outlines) file.
    pub fn from_bytes(family: &str, data: Vec<u8>) -> Result<Self, ContextError> {
        let face = OwnedFace::from_vec(data.clone(), 0)
            .map_err(|error| ContextError::with_error("Failed to parse font", &error))?;
        let units_per_em = face.as_face_ref().units_per_em();
        let drawing_font = rusttype::Font::try_from_vec(data).ok_or(ContextError::with_context(
            "Failed to load the font for rasterization",
        ))?;

        Ok(Self {
            family: family.to_string(),
            inner: Arc::new(face),
            units_per_em,
            drawing_font,
        })
    }

    pub fn from_path(family: &str, font_path: &Path) -> Result<Self, ContextError> {
        let font_bytes = std::fs::read(font_path).map_err(|error| {
            ContextError::with_error(format!("Failed to read the font {:?}", font_path), &error)
        })?;
        Self::from_bytes(family, font_bytes)
    }

    /// Retrieve the vertical metrics of the font face.
    pub fn font_metrics(&self) -> FontMetrics {
        FontMetrics {
            ascent: self.face().ascender(),
            descent: self.face().descender(),
            units_per_em: self.units_per_em,
        }
    }

    /// The distance from the top of a line box to its baseline, for a given font size and line height.
    pub fn baseline_offset(&self, font_size: f32, line_height: f32) -> f32 {
        let metrics = self.font_metrics();
        let units_per_em = f32::from(metrics.units_per_em.max(1));
        let ascent = f32::from(metrics.ascent) / units_per_em * font_size;
        let descent = f32::from(metrics.descent) / units_per_em * font_size;
        // The half-leading is split evenly above and below the glyphs, as browsers do
        let half_leading = (font_size * line_height - (ascent - descent)) / 2.0;
        half_leading + ascent
    }

    pub fn drawing_font(&self) -> &rusttype::Font<'static> {
        &self.drawing_font
    }

    /// Retrieve the underlying font face as a reference.
    fn face(&self) -> &Face<'_> {
        self.inner.as_face_ref()
    }
}

impl TextMetrics for FontFace {
    fn advance_width(&self, character: char, font_size: f32) -> f32 {
        if character.is_control() {
            return 0.0;
        }
        // Characters missing from the font fall back to the advance of the `.notdef` glyph
        let glyph_id = self
            .face()
            .glyph_index(character)
            .unwrap_or(owned_ttf_parser::GlyphId(0));
        let advance = self.face().glyph_hor_advance(glyph_id).unwrap_or(0);
        f32::from(advance) / f32::from(self.units_per_em.max(1)) * font_size
    }

    fn has_glyph(&self, character: char) -> bool {
        self.face().glyph_index(character).is_some()
    }
}

/// The fonts available to an export, looked up by family name.
#[derive(Debug, Default, Clone)]
pub struct FontBook {
    faces: BTreeMap<String, FontFace>,
    default_family: Option<String>,
    fallback_metrics: UniformMetrics,
}

/// How the text of a family gets measured and drawn.
#[derive(Debug, Clone, Copy)]
pub enum Typeface<'a> {
    /// A real font: measured through its advance widths and rasterized glyph by glyph.
    Font(&'a FontFace),
    /// No font file is known: the layout is approximated and no glyph is drawn.
    Approximate(UniformMetrics),
}

impl Typeface<'_> {
    pub fn metrics(&self) -> &dyn TextMetrics {
        match self {
            Typeface::Font(font_face) => *font_face,
            Typeface::Approximate(metrics) => metrics,
        }
    }

    pub fn baseline_offset(&self, font_size: f32, line_height: f32) -> f32 {
        match self {
            Typeface::Font(font_face) => font_face.baseline_offset(font_size, line_height),
            // Roughly what a Latin script face with an ascent of 0.8 em gives
            Typeface::Approximate(_) => (font_size * line_height - font_size) / 2.0 + 0.8 * font_size,
        }
    }
}

impl FontBook {
    /// A font book without any font file, every family is laid out with approximate metrics.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Loads every font associated in the configuration. A font which fails to load is an error.
    pub fn from_configuration(configuration: &FontsConfiguration) -> Result<Self, ContextError> {
        let mut font_book = FontBook::empty();
        for font_association in configuration.font_associations.iter() {
            let font_face =
                FontFace::from_path(&font_association.font_family, &font_association.font_file_path)
                    .map_err(|error| {
                        error.within(format!(
                            "Unable to load the font family {:?}",
                            font_association.font_family
                        ))
                    })?;
            log::debug!(
                "Loaded the font family {:?} from {:?}",
                font_association.font_family,
                font_association.font_file_path
            );
            font_book.insert(font_face);
        }
        font_book.default_family = configuration
            .default_font_family
            .clone()
            .or_else(|| font_book.faces.keys().next().cloned());

        Ok(font_book)
    }

    pub fn insert(&mut self, font_face: FontFace) {
        if self.default_family.is_none() {
            self.default_family = Some(font_face.family.clone());
        }
        self.faces.insert(font_face.family.clone(), font_face);
    }

    /// The typeface to use for a family: its own font, else the default font, else approximate metrics.
    pub fn typeface(&self, font_family: &str) -> Typeface<'_> {
        if let Some(font_face) = self.faces.get(font_family) {
            return Typeface::Font(font_face);
        }
        let default_face = self
            .default_family
            .as_ref()
            .and_then(|default_family| self.faces.get(default_family));
        match default_face {
            Some(font_face) => {
                log::debug!(
                    "The font family {:?} is not registered, using {:?} instead",
                    font_family,
                    font_face.family
                );
                Typeface::Font(font_face)
            }
            None => Typeface::Approximate(self.fallback_metrics),
        }
    }

    pub fn font_face(&self, font_family: &str) -> Option<&FontFace> {
        match self.typeface(font_family) {
            Typeface::Font(font_face) => Some(font_face),
            Typeface::Approximate(_) => None,
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// DejaVu Sans Mono: every glyph advances by 1233 units out of 2048.
    pub(crate) const FIXTURE_FONT_FAMILY: &str = "DejaVu Sans Mono";
    pub(crate) const FIXTURE_ADVANCE_RATIO: f32 = 1233.0 / 2048.0;

    pub(crate) fn fixture_font_face() -> FontFace {
        FontFace::from_bytes(
            FIXTURE_FONT_FAMILY,
            include_bytes!("../tests/fonts/DejaVuSansMono.ttf").to_vec(),
        )
        .unwrap()
    }

    pub(crate) fn fixture_font_book() -> FontBook {
        let mut font_book = FontBook::empty();
        font_book.insert(fixture_font_face());
        font_book
    }

    #[test]
    fn uniform_metrics_scale_with_the_font_size() {
        let metrics = UniformMetrics { advance_ratio: 0.6 };
        assert_eq!(metrics.advance_width('a', 10.0), 6.0);
        assert_eq!(metrics.advance_width('W', 20.0), 12.0);
        assert_eq!(metrics.advance_width('\n', 20.0), 0.0);
    }

    #[test]
    fn an_empty_font_book_approximates_every_family() {
        let font_book = FontBook::empty();
        assert!(matches!(
            font_book.typeface("Dancing Script"),
            Typeface::Approximate(_)
        ));
        assert!(font_book.font_face("Dancing Script").is_none());
    }

    #[test]
    fn invalid_font_data_is_rejected() {
        let error = FontFace::from_bytes("Broken", vec![0, 1, 2, 3]).unwrap_err();
        assert!(error.to_string().starts_with("Failed to parse font"));
    }

    #[test]
    fn missing_font_files_are_reported() {
        let configuration: FontsConfiguration = serde_json::from_str(
            r#"{ "fontAssociations": [
                { "fontFamily": "Caveat", "fontFilePath": "/nonexistent/Caveat.ttf" }
            ] }"#,
        )
        .unwrap();

        let error = FontBook::from_configuration(&configuration).unwrap_err();
        assert!(error.context.contains("Caveat"));
    }

    #[test]
    fn fonts_advance_by_their_horizontal_metrics() {
        let font_face = fixture_font_face();
        assert_eq!(font_face.advance_width('a', 2048.0), 1233.0);
        assert!((font_face.advance_width('W', 100.0) - FIXTURE_ADVANCE_RATIO * 100.0).abs() < 1e-4);
        assert_eq!(font_face.advance_width('\n', 100.0), 0.0);

        assert!(font_face.has_glyph('a'));
        assert!(font_face.has_glyph('é'));
        assert!(!font_face.has_glyph('✨'));
        // Missing characters still advance by the width of the replacement glyph
        assert!((font_face.advance_width('✨', 100.0) - FIXTURE_ADVANCE_RATIO * 100.0).abs() < 1e-4);
    }

    #[test]
    fn baselines_sit_below_the_half_leading_and_the_ascent() {
        let font_face = fixture_font_face();
        let metrics = font_face.font_metrics();
        assert_eq!((metrics.ascent, metrics.descent, metrics.units_per_em), (1901, -483, 2048));

        // (120 - (92.82 + 23.58)) / 2 + 92.82
        let baseline_offset = font_face.baseline_offset(100.0, 1.2);
        assert!((baseline_offset - 94.619).abs() < 1e-2, "{}", baseline_offset);
    }

    #[test]
    fn unknown_families_use_the_default_font() {
        let font_book = fixture_font_book();
        assert!(matches!(
            font_book.typeface(FIXTURE_FONT_FAMILY),
            Typeface::Font(font_face) if font_face.family == FIXTURE_FONT_FAMILY
        ));
        assert_eq!(
            font_book.font_face("Dancing Script").map(|font_face| font_face.family.as_str()),
            Some(FIXTURE_FONT_FAMILY)
        );
        let baseline_offset = font_book.typeface("Caveat").baseline_offset(100.0, 1.2);
        assert!((baseline_offset - 94.619).abs() < 1e-2);
    }
}
