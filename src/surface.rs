use std::sync::Arc;

use image::DynamicImage;

/// An sRGB colour.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Color(pub [u8; 3]);

impl Color {
    pub const WHITE: Color = Color([0xff, 0xff, 0xff]);
}

/// An axis aligned rectangle in surface pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Rect {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Rect {
            x,
            y,
            width,
            height,
        }
    }
}

/// A run of text starting at `x` on the baseline `baseline_y`.
#[derive(Debug, Clone, PartialEq)]
pub struct TextRun {
    pub text: String,
    pub x: f32,
    pub baseline_y: f32,
}

/// One drawing operation of the display list, painted in order.
#[derive(Debug, Clone)]
pub enum DrawCommand {
    /// An image covering `frame` (cropped to keep its aspect ratio), then scaled by `zoom`
    /// about the centre of the frame and clipped to it.
    Image {
        image: Arc<DynamicImage>,
        frame: Rect,
        zoom: f32,
    },
    Text {
        runs: Vec<TextRun>,
        font_family: String,
        font_size: f32,
        color: Color,
    },
}

/// The off-screen page every page of an export is rendered on, one after the other.
///
/// It is a display list at the resolution of the virtual canvas: rendering a page records
/// what to paint, the rasterizer paints it.
#[derive(Debug)]
pub struct Surface {
    width: f32,
    height: f32,
    background: Color,
    commands: Vec<DrawCommand>,
}

impl Surface {
    /// Acquires the surface for the duration of an export.
    pub fn acquire(width: f32, height: f32) -> Self {
        log::debug!("Acquired an off-screen surface of {}x{} pixels", width, height);
        Surface {
            width,
            height,
            background: Color::WHITE,
            commands: Vec::new(),
        }
    }

    pub fn width(&self) -> f32 {
        self.width
    }

    pub fn height(&self) -> f32 {
        self.height
    }

    pub fn background(&self) -> Color {
        self.background
    }

    pub fn commands(&self) -> &[DrawCommand] {
        &self.commands
    }

    /// Wipes whatever the previous page left and paints the whole surface with `background`.
    pub fn clear(&mut self, background: Color) {
        self.background = background;
        self.commands.clear();
    }

    pub fn push(&mut self, command: DrawCommand) {
        self.commands.push(command);
    }

    pub fn bounds(&self) -> Rect {
        Rect::new(0.0, 0.0, self.width, self.height)
    }
}

impl Drop for Surface {
    fn drop(&mut self) {
        log::debug!("Released the off-screen surface");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clearing_forgets_the_previous_page() {
        let mut surface = Surface::acquire(120.0, 170.0);
        surface.push(DrawCommand::Text {
            runs: vec![TextRun {
                text: "Front Cover".into(),
                x: 10.0,
                baseline_y: 80.0,
            }],
            font_family: "Caveat".into(),
            font_size: 24.0,
            color: Color([0, 0, 0]),
        });
        surface.clear(Color([1, 2, 3]));

        assert!(surface.commands().is_empty());
        assert_eq!(surface.background(), Color([1, 2, 3]));
    }
}
