use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ContextError;

/// The title glyph written on the cover when the letter has no front image.
pub const COVER_TITLE: &str = "Front Cover";
/// The decorative glyph centred on the back of the letter.
pub const COLOPHON_GLYPH: &str = "✨";

/// A foldable letter as it is stored by the backend: the content written by the sender,
/// the typography chosen for it and the bookkeeping of who sent it to whom.
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Letter {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default)]
    pub content: LetterContent,
    #[serde(default)]
    pub style: LetterStyle,
    /// Creation time in seconds since the UNIX epoch, stamped by the store.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<i64>,
    #[serde(default)]
    pub is_read: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recipient_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recipient_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recipient_email: Option<String>,
    #[serde(default)]
    pub deleted: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub hidden_for: Vec<String>,
}

/// What the sender wrote and uploaded. Images are either data URLs or paths to image files.
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LetterContent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub front_image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub front_image_zoom: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub left_image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub left_image_zoom: Option<f32>,
    /// The message, written on the inside right face of the folded letter.
    #[serde(default, alias = "message", skip_serializing_if = "Option::is_none")]
    pub right_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Only kept so that older letters still deserialize, it is never rendered.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub back_image: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct LetterStyle {
    /// Not used by the export, the interactive preview tints its chrome with it.
    pub theme_color: String,
    pub font_family: String,
    pub font_size: f32,
    pub signature_font_size: f32,
}

impl Default for LetterStyle {
    fn default() -> Self {
        LetterStyle {
            theme_color: "#6366f1".into(),
            font_family: "Dancing Script".into(),
            font_size: 24.0,
            signature_font_size: 24.0,
        }
    }
}

impl Letter {
    pub fn from_path(letter_path: &Path) -> Result<Letter, ContextError> {
        let letter_content = std::fs::read_to_string(letter_path).map_err(|error| {
            ContextError::with_error(format!("Unable to read the letter {:?}", letter_path), &error)
        })?;
        let letter: Letter = serde_json::from_str(&letter_content).map_err(|error| {
            ContextError::with_error(format!("Unable to parse the letter {:?}", letter_path), &error)
        })?;

        Ok(letter)
    }

    /// Derives the four pages of the exported document, always in the order cover, inset,
    /// message and colophon, whatever fields of the letter are filled in.
    pub fn page_descriptors(&self) -> [PageDescriptor; 4] {
        let content = &self.content;
        [
            PageDescriptor::Cover {
                image: ImageSource::from_field(&content.front_image, content.front_image_zoom),
            },
            PageDescriptor::Inset {
                image: ImageSource::from_field(&content.left_image, content.left_image_zoom),
            },
            PageDescriptor::Message {
                text: non_empty(&content.right_text),
                signature: non_empty(&content.signature),
            },
            PageDescriptor::Colophon,
        ]
    }
}

/// An image to be placed on a page, zoomed about the centre of its frame.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageSource {
    pub source: String,
    pub zoom: f32,
}

impl ImageSource {
    fn from_field(source: &Option<String>, zoom: Option<f32>) -> Option<ImageSource> {
        non_empty(source).map(|source| ImageSource {
            source,
            zoom: zoom.unwrap_or(1.0),
        })
    }
}

/// One of the four logical pages of an exported letter.
#[derive(Debug, Clone, PartialEq)]
pub enum PageDescriptor {
    Cover { image: Option<ImageSource> },
    Inset { image: Option<ImageSource> },
    Message {
        text: Option<String>,
        signature: Option<String>,
    },
    Colophon,
}

impl PageDescriptor {
    pub fn name(&self) -> &'static str {
        match self {
            PageDescriptor::Cover { .. } => "cover",
            PageDescriptor::Inset { .. } => "inset",
            PageDescriptor::Message { .. } => "message",
            PageDescriptor::Colophon => "colophon",
        }
    }
}

fn non_empty(field: &Option<String>) -> Option<String> {
    field
        .as_ref()
        .filter(|value| !value.trim().is_empty())
        .cloned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page_names(letter: &Letter) -> Vec<&'static str> {
        letter.page_descriptors().iter().map(PageDescriptor::name).collect()
    }

    #[test]
    fn pages_keep_their_order_whatever_is_filled_in() {
        let empty_letter = Letter::default();
        let full_letter = Letter {
            content: LetterContent {
                front_image: Some("data:image/png;base64,AAAA".into()),
                front_image_zoom: Some(1.4),
                left_image: Some("photos/inside.jpg".into()),
                right_text: Some("Dear Zoe,".into()),
                signature: Some("Me".into()),
                title: Some("Birthday".into()),
                ..Default::default()
            },
            ..Default::default()
        };

        let expected = vec!["cover", "inset", "message", "colophon"];
        similar_asserts::assert_eq!(page_names(&empty_letter), expected);
        similar_asserts::assert_eq!(page_names(&full_letter), expected);
    }

    #[test]
    fn missing_and_blank_fields_become_absent() {
        let letter = Letter {
            content: LetterContent {
                front_image: Some("   ".into()),
                right_text: Some(String::new()),
                signature: Some("Me".into()),
                ..Default::default()
            },
            ..Default::default()
        };

        let [cover, inset, message, colophon] = letter.page_descriptors();
        assert_eq!(cover, PageDescriptor::Cover { image: None });
        assert_eq!(inset, PageDescriptor::Inset { image: None });
        assert_eq!(
            message,
            PageDescriptor::Message {
                text: None,
                signature: Some("Me".into())
            }
        );
        assert_eq!(colophon, PageDescriptor::Colophon);
    }

    #[test]
    fn zoom_defaults_to_one() {
        let letter = Letter {
            content: LetterContent {
                left_image: Some("inside.png".into()),
                ..Default::default()
            },
            ..Default::default()
        };

        let [_, inset, _, _] = letter.page_descriptors();
        assert_eq!(
            inset,
            PageDescriptor::Inset {
                image: Some(ImageSource {
                    source: "inside.png".into(),
                    zoom: 1.0
                })
            }
        );
    }

    #[test]
    fn letters_are_parsed_from_the_stored_json_format() {
        let letter: Letter = serde_json::from_str(
            r##"{
                "id": "abc",
                "content": {
                    "frontImage": "data:image/png;base64,AAAA",
                    "frontImageZoom": 1.2,
                    "rightText": "Hello",
                    "signature": "Me"
                },
                "style": {
                    "themeColor": "#ff0000",
                    "fontFamily": "Caveat",
                    "fontSize": 20,
                    "signatureFontSize": 18
                },
                "isRead": true,
                "recipientId": "user-2"
            }"##,
        )
        .unwrap();

        assert_eq!(letter.id.as_deref(), Some("abc"));
        assert_eq!(letter.content.front_image_zoom, Some(1.2));
        assert_eq!(letter.content.right_text.as_deref(), Some("Hello"));
        assert_eq!(letter.style.font_family, "Caveat");
        assert_eq!(letter.style.signature_font_size, 18.0);
        assert!(letter.is_read);
        assert_eq!(letter.recipient_id.as_deref(), Some("user-2"));
        assert!(!letter.deleted);
    }
}
