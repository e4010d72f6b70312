use crate::{
    error::ContextError,
    letter::{LetterStyle, PageDescriptor},
    pdf::{ImagePlacement, PaginatedDocument},
    raster::{RasterOptions, Rasterizer},
    render::PageRenderer,
    surface::Surface,
};

/// Turns the page descriptors of a letter into the pages of a document, one page after the
/// other: a page is rendered, rasterized and placed before the next one is started.
pub struct DocumentAssembler<'a> {
    renderer: &'a PageRenderer<'a>,
    raster_options: RasterOptions,
}

impl<'a> DocumentAssembler<'a> {
    pub fn new(renderer: &'a PageRenderer<'a>, raster_options: RasterOptions) -> Self {
        DocumentAssembler {
            renderer,
            raster_options,
        }
    }

    /// Assembles the given pages into `document`, each one as a full-bleed image.
    /// The first error aborts the pages which have not been started yet.
    ///
    /// # Arguments
    ///
    /// * `pages` - The pages to assemble, in order.
    /// * `style` - The typography of the letter.
    /// * `surface` - The surface every page is rendered on in turn.
    /// * `rasterizer` - Captures the surface once a page has been rendered.
    /// * `document` - The document receiving the pages, owning its first page already.
    pub fn assemble(
        &self,
        pages: &[PageDescriptor],
        style: &LetterStyle,
        surface: &mut Surface,
        rasterizer: &mut dyn Rasterizer,
        document: &mut dyn PaginatedDocument,
        placement: ImagePlacement,
    ) -> Result<(), ContextError> {
        for (index, page) in pages.iter().enumerate() {
            let page_number = index + 1;

            self.renderer
                .render_page(page, style, surface)
                .map_err(|error| {
                    error.within(format!("Failed to render page {} ({})", page_number, page.name()))
                })?;
            let rasterized_page = rasterizer
                .rasterize(surface, &self.raster_options)
                .map_err(|error| {
                    error.within(format!(
                        "Failed to rasterize page {} ({})",
                        page_number,
                        page.name()
                    ))
                })?;

            // The document owns its first page, every other page has to be added beforehand
            let page_index = if index == 0 { 0 } else { document.add_page() };
            document
                .add_image(page_index, &rasterized_page, placement)
                .map_err(|error| error.within(format!("Failed to place page {}", page_number)))?;
            log::info!(
                "Placed page {} of {} ({}, {}x{} pixels)",
                page_number,
                pages.len(),
                page.name(),
                rasterized_page.width,
                rasterized_page.height
            );
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        assets::LocalAssetLoader,
        configuration::{ExportConfiguration, PageFormat},
        fonts::FontBook,
        letter::Letter,
        raster::RasterizedPage,
    };

    /// Records the order of the calls made against it.
    #[derive(Default)]
    struct RecordingDocument {
        events: Vec<String>,
        pages: usize,
    }

    impl PaginatedDocument for RecordingDocument {
        fn add_page(&mut self) -> usize {
            self.pages += 1;
            self.events.push("add_page".into());
            self.pages
        }

        fn add_image(
            &mut self,
            page_index: usize,
            page: &RasterizedPage,
            placement: ImagePlacement,
        ) -> Result<(), ContextError> {
            assert_eq!(placement, ImagePlacement::full_bleed(&PageFormat::A4));
            self.events
                .push(format!("add_image {} {}", page_index, page.jpeg_bytes[0]));
            Ok(())
        }

        fn to_bytes(&mut self) -> Result<Vec<u8>, ContextError> {
            Ok(Vec::new())
        }
    }

    /// Stamps every page with the number of commands found on the surface, failing on demand.
    struct CountingRasterizer {
        calls: usize,
        failing_call: Option<usize>,
    }

    impl Rasterizer for CountingRasterizer {
        fn rasterize(
            &mut self,
            surface: &Surface,
            _options: &RasterOptions,
        ) -> Result<RasterizedPage, ContextError> {
            self.calls += 1;
            if Some(self.calls) == self.failing_call {
                return Err(ContextError::with_context("Out of memory"));
            }
            Ok(RasterizedPage {
                width: surface.width() as u32,
                height: surface.height() as u32,
                jpeg_bytes: vec![self.calls as u8],
            })
        }
    }

    fn assemble(
        failing_call: Option<usize>,
    ) -> (Result<(), ContextError>, RecordingDocument, usize) {
        let fonts = FontBook::empty();
        let configuration = ExportConfiguration::default();
        let renderer = PageRenderer::new(&fonts, &LocalAssetLoader, &configuration);
        let assembler =
            DocumentAssembler::new(&renderer, RasterOptions::from_configuration(&configuration));

        let letter = Letter::default();
        let (width, height) = configuration.canvas_size();
        let mut surface = Surface::acquire(width, height);
        let mut rasterizer = CountingRasterizer {
            calls: 0,
            failing_call,
        };
        let mut document = RecordingDocument::default();
        let result = assembler.assemble(
            &letter.page_descriptors(),
            &letter.style,
            &mut surface,
            &mut rasterizer,
            &mut document,
            ImagePlacement::full_bleed(&PageFormat::A4),
        );

        (result, document, rasterizer.calls)
    }

    #[test]
    fn pages_are_placed_in_order() {
        let (result, document, calls) = assemble(None);

        assert!(result.is_ok());
        assert_eq!(calls, 4);
        assert_eq!(
            document.events,
            vec![
                "add_image 0 1",
                "add_page",
                "add_image 1 2",
                "add_page",
                "add_image 2 3",
                "add_page",
                "add_image 3 4",
            ]
        );
    }

    #[test]
    fn a_failing_page_aborts_the_following_ones() {
        let (result, document, calls) = assemble(Some(2));

        let error = result.unwrap_err();
        assert_eq!(
            error.to_string(),
            "Failed to rasterize page 2 (inset): out of memory"
        );
        assert_eq!(calls, 2);
        assert_eq!(document.events, vec!["add_image 0 1"]);
    }
}
