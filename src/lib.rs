//! Letterfold turns a foldable digital letter into a printable PDF document of four pages:
//! the front cover, the inside left face, the message with its signature and the back cover.
//!
//! Every page is laid out on an off-screen surface, rasterized into a JPEG bitmap and placed
//! edge to edge on an A4 page. The entry point is the `Exporter` struct of the `export`
//! module, which drives one export at a time and reports how it went.

/// This module contains the `ContextError` type which is the error type used throughout this library.
///
/// The reason why this type has been implemented is to uniform the error reporting without delving too deep
/// into specific error codes. Whenever a function fails because of a failure propagated from somewhere else,
/// the message of that failure is kept after the context, so that the whole chain can be printed out.
pub mod error;

/// The letter as it is stored, and the four page descriptors an export is made of.
pub mod letter;

/// The JSON configurations of the exports and of the fonts.
pub mod configuration;

/// Font faces loaded from TTF files, exposing the metrics needed for laying out text and the glyphs
/// needed for drawing it. When a font family has no file associated to it, approximate metrics are
/// used instead and no glyph is drawn.
pub mod fonts;

/// The measurement of wrapped text and the search for the largest font size fitting a box.
///
/// # Introduction
///
/// Measuring is a pure function of the text, the font size, the width of the box and the text metrics:
/// the text is wrapped greedily on whitespace and the height is the number of lines times the line height.
/// The search starts from a seed depending on the length of the text, grows while the text leaves
/// too much room and shrinks while it overflows, always staying within the configured bounds.
pub mod measure;

/// Loading of the images of a letter, given either as data URLs or as paths.
pub mod assets;

/// The off-screen surface the pages are rendered on, as a display list.
pub mod surface;

/// Rendering of each of the four pages onto the surface.
pub mod render;

/// Rasterization of the surface into JPEG encoded bitmaps.
pub mod raster;

/// The module where the `PdfDocument` interface for working with PDF documents is presented.
///
/// # Introduction
///
/// The main component of this module is the struct `PdfDocument`, which collects the rasterized pages
/// and only builds the underlying `lopdf::Document` when `write_all` is called. Each page receives its
/// bitmap as an image `XObject` which is stored as-is, the JPEG data being decoded by the PDF reader.
pub mod pdf;

/// The sequential assembly of the rendered pages into a document.
pub mod assembler;

/// The export of a letter, from its page descriptors to the saved document.
pub mod export;

/// The persistence of the letters and of the users they are sent to, and the identity of who is using them.
pub mod store;
