use std::path::{Path, PathBuf};

use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::error::ContextError;

/// Width in pixels of the layout every page constant is expressed against.
pub const REFERENCE_CANVAS_WIDTH: f32 = 1200.0;

/// The settings of one export: the resolution of the off-screen surface, the oversampling
/// and compression of the rasterized pages, the paper format and the text fitting constants.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct ExportConfiguration {
    /// Width of the virtual canvas in pixels, its height follows from the page ratio.
    pub virtual_canvas_width_px: f32,
    /// Oversampling factor applied when rasterizing the virtual canvas.
    pub oversample_scale: f32,
    /// JPEG quality of the rasterized pages, between 0 and 1.
    pub jpeg_quality: f32,
    pub page_format: PageFormat,
    pub fit: FitConfiguration,
}

impl Default for ExportConfiguration {
    fn default() -> Self {
        ExportConfiguration {
            virtual_canvas_width_px: REFERENCE_CANVAS_WIDTH,
            oversample_scale: 2.0,
            jpeg_quality: 0.95,
            page_format: PageFormat::default(),
            fit: FitConfiguration::default(),
        }
    }
}

impl ExportConfiguration {
    pub fn from_path(configuration_file_path: &Path) -> Result<Self, ContextError> {
        read_json_file(configuration_file_path, "export configuration")
    }

    /// Size in pixels of the virtual canvas, portrait with the height being the width times √2.
    pub fn canvas_size(&self) -> (f32, f32) {
        let width = self.virtual_canvas_width_px.max(1.0);
        (width, (width * std::f32::consts::SQRT_2).round())
    }

    /// The factor converting lengths of the reference layout into canvas pixels.
    pub fn layout_scale(&self) -> f32 {
        self.canvas_size().0 / REFERENCE_CANVAS_WIDTH
    }

    /// The JPEG quality as expected by the encoder, clamped into its accepted range.
    pub fn jpeg_quality_percent(&self) -> u8 {
        if !self.jpeg_quality.is_finite() {
            return 95;
        }
        (self.jpeg_quality * 100.0).round().clamp(1.0, 100.0) as u8
    }
}

/// The paper size of the output document, expressed in millimeters.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PageFormat {
    pub width: f32,
    pub height: f32,
}

impl PageFormat {
    /// ISO A4 in portrait orientation.
    pub const A4: PageFormat = PageFormat {
        width: 210.0,
        height: 297.0,
    };
}

impl Default for PageFormat {
    fn default() -> Self {
        PageFormat::A4
    }
}

/// The constants steering the font size search. They have been tuned by eye, none of
/// them is required for correctness beyond the bounds being ordered.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct FitConfiguration {
    pub min_font_size: f32,
    pub max_font_size: f32,
    /// Fraction of the available height below which the text is grown.
    pub grow_threshold: f32,
    pub grow_step: f32,
    pub max_grow_steps: u32,
    pub shrink_step: f32,
    pub max_shrink_steps: u32,
    pub fine_step: f32,
    /// Line height as a multiple of the font size.
    pub line_height: f32,
}

impl Default for FitConfiguration {
    fn default() -> Self {
        FitConfiguration {
            min_font_size: 10.0,
            max_font_size: 240.0,
            grow_threshold: 0.9,
            grow_step: 4.0,
            max_grow_steps: 60,
            shrink_step: 1.5,
            max_shrink_steps: 120,
            fine_step: 0.5,
            line_height: 1.6,
        }
    }
}

/// Which TTF file backs each font family a letter may be styled with.
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FontsConfiguration {
    /// The family used whenever a letter asks for one which is not associated to a file.
    #[serde(default)]
    pub default_font_family: Option<String>,
    #[serde(default)]
    pub font_associations: Vec<FontAssociation>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FontAssociation {
    pub font_family: String,
    pub font_file_path: PathBuf,
}

impl FontsConfiguration {
    pub fn from_path(fonts_configuration_file_path: &Path) -> Result<Self, ContextError> {
        let mut configuration: FontsConfiguration =
            read_json_file(fonts_configuration_file_path, "font configuration")?;

        // Relative font paths are resolved against the directory of the configuration file
        if let Some(configuration_directory) = fonts_configuration_file_path.parent() {
            for font_association in configuration.font_associations.iter_mut() {
                if font_association.font_file_path.is_relative() {
                    font_association.font_file_path =
                        configuration_directory.join(&font_association.font_file_path);
                }
            }
        }

        Ok(configuration)
    }
}

fn read_json_file<T: DeserializeOwned>(path: &Path, description: &str) -> Result<T, ContextError> {
    let file_contents = std::fs::read_to_string(path).map_err(|error| {
        ContextError::with_error(format!("Failed to read the {} file {:?}", description, path), &error)
    })?;
    serde_json::from_str(&file_contents).map_err(|error| {
        ContextError::with_error(format!("Failed to parse the {} file {:?}", description, path), &error)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_configurations_fall_back_to_the_defaults() {
        let configuration: ExportConfiguration =
            serde_json::from_str(r#"{ "oversampleScale": 3, "fit": { "maxFontSize": 120 } }"#)
                .unwrap();

        assert_eq!(configuration.oversample_scale, 3.0);
        assert_eq!(configuration.virtual_canvas_width_px, 1200.0);
        assert_eq!(configuration.page_format, PageFormat::A4);
        assert_eq!(configuration.fit.max_font_size, 120.0);
        assert_eq!(configuration.fit.min_font_size, 10.0);
        assert_eq!(configuration.fit.shrink_step, 1.5);
    }

    #[test]
    fn the_canvas_follows_the_iso_ratio() {
        let configuration = ExportConfiguration {
            virtual_canvas_width_px: 2100.0,
            ..Default::default()
        };

        assert_eq!(configuration.canvas_size(), (2100.0, 2970.0));
        assert_eq!(ExportConfiguration::default().canvas_size(), (1200.0, 1697.0));
        assert_eq!(configuration.layout_scale(), 1.75);
    }

    #[test]
    fn jpeg_quality_is_converted_to_a_percentage() {
        let mut configuration = ExportConfiguration::default();
        assert_eq!(configuration.jpeg_quality_percent(), 95);
        configuration.jpeg_quality = 4.0;
        assert_eq!(configuration.jpeg_quality_percent(), 100);
        configuration.jpeg_quality = -1.0;
        assert_eq!(configuration.jpeg_quality_percent(), 1);
    }

    #[test]
    fn relative_font_paths_are_resolved_against_the_configuration() {
        let configuration_directory = std::env::temp_dir().join("letterfold-font-configuration");
        std::fs::create_dir_all(&configuration_directory).unwrap();
        let configuration_file_path = configuration_directory.join("fonts.json");
        std::fs::write(
            &configuration_file_path,
            r#"{
                "defaultFontFamily": "Caveat",
                "fontAssociations": [
                    { "fontFamily": "Caveat", "fontFilePath": "fonts/Caveat.ttf" },
                    { "fontFamily": "Dancing Script", "fontFilePath": "/fonts/DancingScript.ttf" }
                ]
            }"#,
        )
        .unwrap();

        let configuration = FontsConfiguration::from_path(&configuration_file_path).unwrap();
        assert_eq!(configuration.default_font_family.as_deref(), Some("Caveat"));
        assert_eq!(
            configuration.font_associations[0].font_file_path,
            configuration_directory.join("fonts/Caveat.ttf")
        );
        assert_eq!(
            configuration.font_associations[1].font_file_path,
            PathBuf::from("/fonts/DancingScript.ttf")
        );
    }
}
