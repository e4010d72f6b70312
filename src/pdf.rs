use std::{io::BufWriter, mem};

use lopdf::{content::Operation, Object};
use rand::{distributions::Alphanumeric, Rng as _};
use time::OffsetDateTime;

use crate::{configuration::PageFormat, error::ContextError, raster::RasterizedPage};

/// Where an image is drawn on a page, in millimeters from the top-left corner of the page.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ImagePlacement {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl ImagePlacement {
    /// The placement covering the whole page, edge to edge.
    pub fn full_bleed(page_format: &PageFormat) -> Self {
        ImagePlacement {
            x: 0.0,
            y: 0.0,
            width: page_format.width,
            height: page_format.height,
        }
    }
}

/// A document made of pages, each page receiving one or more bitmaps.
///
/// A freshly created document already owns its first page, every following page has to be
/// explicitly added before receiving its image.
pub trait PaginatedDocument {
    /// Appends an empty page and returns its index.
    fn add_page(&mut self) -> usize;

    fn add_image(
        &mut self,
        page_index: usize,
        page: &RasterizedPage,
        placement: ImagePlacement,
    ) -> Result<(), ContextError>;

    /// Finalizes the document and serializes it.
    fn to_bytes(&mut self) -> Result<Vec<u8>, ContextError>;
}

/// A JPEG bitmap embedded as-is in the document, the PDF reader does the decoding.
#[derive(Debug, Clone)]
pub struct ImageXObject {
    /// Width of the bitmap in pixels.
    pub width: u32,
    /// Height of the bitmap in pixels.
    pub height: u32,
    /// The JPEG encoded bitmap.
    pub jpeg_data: Vec<u8>,
}

impl From<ImageXObject> for lopdf::Stream {
    fn from(value: ImageXObject) -> Self {
        use lopdf::Object::*;

        let dictionary = lopdf::Dictionary::from_iter(vec![
            ("Type", Name("XObject".into())),
            ("Subtype", Name("Image".into())),
            ("Width", Integer(i64::from(value.width))),
            ("Height", Integer(i64::from(value.height))),
            ("ColorSpace", Name("DeviceRGB".into())),
            ("BitsPerComponent", Integer(8)),
            ("Filter", Name("DCTDecode".into())),
        ]);
        // The data is already compressed by the JPEG encoding
        lopdf::Stream::new(dictionary, value.jpeg_data).with_compression(false)
    }
}

/// Named reference to an `XObject` in the resources of a page.
#[derive(Debug, Clone, PartialEq, PartialOrd)]
pub struct XObjectReference(String);

impl XObjectReference {
    /// Creates a new reference for an `XObject` from a number.
    pub fn new(index: usize) -> Self {
        Self(format!("X{index}"))
    }
}

/// One page of the document together with the images drawn on it.
#[derive(Debug, Clone)]
pub struct PdfPage {
    /// The number of the page in the document, starting from 1.
    pub(crate) number: usize,
    /// Page width in points.
    pub width: f32,
    /// Page height in points.
    pub height: f32,
    /// The content stream operations of the page.
    pub(crate) operations: Vec<Operation>,
    pub(crate) xobjects: Vec<(XObjectReference, ImageXObject)>,
}

impl PdfPage {
    fn new(number: usize, page_format: &PageFormat) -> Self {
        PdfPage {
            number,
            // Convert millimeters to points because this is what `lopdf` expects
            width: millimeters_to_points(page_format.width),
            height: millimeters_to_points(page_format.height),
            operations: Vec::new(),
            xobjects: Vec::new(),
        }
    }

    /// Inserts the images of the page into the document, returning the resources dictionary
    /// referencing them and the content stream drawing them.
    fn collect_resources_and_stream(
        &self,
        inner_document: &mut lopdf::Document,
    ) -> Result<(lopdf::Dictionary, lopdf::Stream), ContextError> {
        let xobjects_dictionary: lopdf::Dictionary = self
            .xobjects
            .iter()
            .map(|(reference, xobject)| {
                let stream: lopdf::Stream = xobject.clone().into();
                let object_id = inner_document.add_object(stream);
                (reference.0.clone(), Object::Reference(object_id))
            })
            .collect();

        let mut resources_dictionary = lopdf::Dictionary::new();
        if !xobjects_dictionary.is_empty() {
            resources_dictionary.set("XObject", Object::Dictionary(xobjects_dictionary));
        }

        let content = lopdf::content::Content {
            operations: self.operations.clone(),
        };
        let encoded_content = content.encode().map_err(|error| {
            ContextError::with_error(
                format!("Failed to encode the content of page {}", self.number),
                &error,
            )
        })?;

        Ok((
            resources_dictionary,
            lopdf::Stream::new(lopdf::Dictionary::new(), encoded_content),
        ))
    }
}

/// Converts millimeters to points, the unit of every length in a PDF file.
pub fn millimeters_to_points(millimeters: f32) -> f32 {
    millimeters * 2.834646
}

/// The PDF document the rasterized pages are collected into. It is an interface to the
/// underlying `lopdf::Document`, which only gets populated when the document is written.
pub struct PdfDocument {
    /// The underlying PDF document, it is only meaningful after `write_all` has been called.
    pub inner_document: lopdf::Document,
    /// The identifier of the document, used for the first half of the PDF `ID` tag.
    pub identifier: String,
    /// The title recorded in the document information.
    pub title: Option<String>,
    /// The creation date recorded in the document information.
    pub creation_date: OffsetDateTime,
    page_format: PageFormat,
    pub(crate) pages: Vec<PdfPage>,
    written: bool,
}

impl PdfDocument {
    /// Creates a new `PdfDocument` following version 1.5 of the PDF specification, made of
    /// a single empty page of the given format.
    ///
    /// # Arguments
    ///
    /// * `pdf_document_identifier` - The identifier to be given to the PDF document.
    /// * `page_format` - The size of every page of the document.
    pub fn new(pdf_document_identifier: String, page_format: PageFormat) -> Self {
        PdfDocument {
            inner_document: lopdf::Document::with_version("1.5"),
            identifier: pdf_document_identifier,
            title: None,
            creation_date: OffsetDateTime::UNIX_EPOCH,
            page_format,
            pages: vec![PdfPage::new(1, &page_format)],
            written: false,
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_creation_date(mut self, creation_date: OffsetDateTime) -> Self {
        self.creation_date = creation_date;
        self
    }

    /// Write the pages so far collected into the underlying PDF document and finalize it.
    ///
    /// # Arguments
    ///
    /// * `instance_id` - The second half of the PDF `ID` tag, which changes with every save.
    pub fn write_all(&mut self, instance_id: String) -> Result<(), ContextError> {
        use lopdf::Object::*;
        use lopdf::StringFormat::*;

        if self.written {
            return Err(ContextError::with_context(
                "The PDF document has already been written",
            ));
        }

        let literal = |text: &str| String(text.as_bytes().to_vec(), Literal);
        let creation_date = literal(&to_pdf_timestamp_format(&self.creation_date));
        let document_info = lopdf::Dictionary::from_iter(vec![
            ("Trapped", "False".into()),
            ("CreationDate", creation_date.clone()),
            ("ModDate", creation_date),
            ("Title", to_pdf_text_string(self.title.as_deref().unwrap_or("Letter"))),
            ("Creator", literal(env!("CARGO_PKG_NAME"))),
            ("Producer", literal(env!("CARGO_PKG_NAME"))),
            ("Identifier", literal(&self.identifier)),
        ]);
        let document_info_id = self.inner_document.add_object(Dictionary(document_info));

        // Construct the catalog, required by the PDF specification
        let pages_id = self.inner_document.new_object_id();
        let catalog = lopdf::Dictionary::from_iter(vec![
            ("Type", "Catalog".into()),
            ("PageLayout", "OneColumn".into()),
            ("PageMode", "UseNone".into()),
            ("Pages", Reference(pages_id)),
        ]);
        let catalog_id = self.inner_document.add_object(catalog);

        self.inner_document.trailer.set("Root", Reference(catalog_id));
        self.inner_document.trailer.set("Info", Reference(document_info_id));
        self.inner_document.trailer.set(
            "ID",
            Array(vec![
                literal(&self.identifier),
                String(instance_id.into_bytes(), Literal),
            ]),
        );

        let mut page_ids = Vec::<lopdf::Object>::new();
        for page in self.pages.iter() {
            let media_box: lopdf::Object =
                vec![0.into(), 0.into(), page.width.into(), page.height.into()].into();
            let mut page_dictionary = lopdf::Dictionary::from_iter(vec![
                ("Type", "Page".into()),
                ("Rotate", Integer(0)),
                ("MediaBox", media_box.clone()),
                ("TrimBox", media_box.clone()),
                ("CropBox", media_box),
                ("Parent", Reference(pages_id)),
            ]);

            let (resources_dictionary, content_stream) =
                page.collect_resources_and_stream(&mut self.inner_document)?;
            let resources_id = self
                .inner_document
                .add_object(Dictionary(resources_dictionary));
            page_dictionary.set("Resources", Reference(resources_id));
            let content_id = self.inner_document.add_object(content_stream);
            page_dictionary.set("Contents", Reference(content_id));

            let page_id = self.inner_document.add_object(page_dictionary);
            page_ids.push(Reference(page_id));
        }

        let pages = lopdf::Dictionary::from_iter(vec![
            ("Type", "Pages".into()),
            ("Count", Integer(self.pages.len() as i64)),
            ("Kids", Array(page_ids)),
        ]);
        self.inner_document.objects.insert(pages_id, Dictionary(pages));
        self.written = true;

        Ok(())
    }

    /// Optimize the PDF document (only superficially).
    pub fn optimize(&mut self) {
        self.inner_document.prune_objects();
        self.inner_document.delete_zero_length_streams();
        self.inner_document.renumber_objects();
        self.inner_document.compress();
    }

    /// Save the `PdfDocument` to bytes in order for it to be written to a file or further processed.
    pub fn save_to_bytes(&mut self) -> Result<Vec<u8>, ContextError> {
        let mut pdf_document_bytes = Vec::new();
        let mut writer = BufWriter::new(&mut pdf_document_bytes);
        self.inner_document.save_to(&mut writer).map_err(|error| {
            ContextError::with_error("Error while saving the PDF document to bytes", &error)
        })?;
        mem::drop(writer);

        Ok(pdf_document_bytes)
    }

    // Retrieve the page at the given index.
    fn get_mut_page(&mut self, page_index: usize) -> Result<&mut PdfPage, ContextError> {
        self.pages
            .get_mut(page_index)
            .ok_or(ContextError::with_context(format!(
                "Failed to find the page with index {}",
                page_index
            )))
    }
}

impl PaginatedDocument for PdfDocument {
    fn add_page(&mut self) -> usize {
        let page = PdfPage::new(self.pages.len() + 1, &self.page_format);
        self.pages.push(page);
        self.pages.len() - 1
    }

    fn add_image(
        &mut self,
        page_index: usize,
        page: &RasterizedPage,
        placement: ImagePlacement,
    ) -> Result<(), ContextError> {
        use lopdf::Object::*;

        if self.written {
            return Err(ContextError::with_context(
                "Unable to add an image to a PDF document which has already been written",
            ));
        }
        let pdf_page = self.get_mut_page(page_index)?;
        let reference = XObjectReference::new(pdf_page.xobjects.len());

        // The origin of the PDF coordinates is the bottom-left corner of the page
        let width = millimeters_to_points(placement.width);
        let height = millimeters_to_points(placement.height);
        let x = millimeters_to_points(placement.x);
        let y = pdf_page.height - millimeters_to_points(placement.y) - height;

        // Draw the image in its own graphics state, the unit square being stretched over the placement
        pdf_page.operations.extend([
            Operation::new("q", vec![]),
            Operation::new(
                "cm",
                vec![
                    width.into(),
                    0.into(),
                    0.into(),
                    height.into(),
                    x.into(),
                    y.into(),
                ],
            ),
            Operation::new("Do", vec![Name(reference.0.clone().into_bytes())]),
            Operation::new("Q", vec![]),
        ]);
        pdf_page.xobjects.push((
            reference,
            ImageXObject {
                width: page.width,
                height: page.height,
                jpeg_data: page.jpeg_bytes.clone(),
            },
        ));

        Ok(())
    }

    fn to_bytes(&mut self) -> Result<Vec<u8>, ContextError> {
        let instance_id: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(32)
            .map(char::from)
            .collect();
        self.write_all(instance_id)?;
        self.optimize();
        self.save_to_bytes()
    }
}

/// Formats the given time so that it matches what the PDF specification expects.
/// An example of it is the following: D:20170505150224+02'00'.
pub fn to_pdf_timestamp_format(date: &OffsetDateTime) -> String {
    let offset = date.offset();
    let offset_sign = if offset.is_negative() { '-' } else { '+' };
    format!(
        "D:{:04}{:02}{:02}{:02}{:02}{:02}{offset_sign}{:02}'{:02}'",
        date.year(),
        u8::from(date.month()),
        date.day(),
        date.hour(),
        date.minute(),
        date.second(),
        offset.whole_hours().abs(),
        offset.minutes_past_hour().abs(),
    )
}

/// Converts `text` into a PDF text string: ASCII text is kept as a literal string, anything
/// else is encoded as UTF-16BE behind a byte order mark.
pub fn to_pdf_text_string(text: &str) -> lopdf::Object {
    if text.is_ascii() {
        return lopdf::Object::String(text.as_bytes().to_vec(), lopdf::StringFormat::Literal);
    }

    let mut encoded_text = vec![0xfe, 0xff];
    encoded_text.extend(text.encode_utf16().flat_map(u16::to_be_bytes));
    lopdf::Object::String(encoded_text, lopdf::StringFormat::Hexadecimal)
}
