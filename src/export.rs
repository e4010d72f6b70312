use std::path::PathBuf;

use time::{Date, OffsetDateTime};

use crate::{
    assembler::DocumentAssembler,
    assets::AssetLoader,
    configuration::ExportConfiguration,
    error::ContextError,
    fonts::FontBook,
    letter::Letter,
    pdf::{ImagePlacement, PaginatedDocument, PdfDocument},
    raster::{RasterOptions, Rasterizer},
    render::PageRenderer,
    surface::Surface,
};

/// The number of pages of every exported letter.
pub const PAGE_COUNT: usize = 4;
/// The name given to exports of letters without a usable title.
pub const DEFAULT_FILE_STEM: &str = "letter";

/// Where the exporter stands. A new export can be started from any state.
#[derive(Debug, Clone, PartialEq)]
pub enum ExportState {
    Idle,
    Rendering,
    Success { path: PathBuf },
    Failed { message: String },
}

/// A message for the user about the progress of an export.
#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    Loading(String),
    Success(String),
    Failure(String),
}

pub trait Notifier {
    fn notify(&mut self, notification: Notification);
}

/// Reports the notifications through the logger.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&mut self, notification: Notification) {
        match notification {
            Notification::Loading(message) => log::info!("{}", message),
            Notification::Success(message) => log::info!("{}", message),
            Notification::Failure(message) => log::error!("{}", message),
        }
    }
}

/// Receives the finished document.
pub trait OutputSink {
    /// Saves `bytes` under `file_name`, returning where they ended up.
    fn save(&mut self, file_name: &str, bytes: &[u8]) -> Result<PathBuf, ContextError>;
}

/// Writes the documents into a directory, creating it when needed.
#[derive(Debug, Clone)]
pub struct DirectorySink {
    directory: PathBuf,
}

impl DirectorySink {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        DirectorySink {
            directory: directory.into(),
        }
    }
}

impl OutputSink for DirectorySink {
    fn save(&mut self, file_name: &str, bytes: &[u8]) -> Result<PathBuf, ContextError> {
        std::fs::create_dir_all(&self.directory).map_err(|error| {
            ContextError::with_error(
                format!("Failed to create the output directory {:?}", self.directory),
                &error,
            )
        })?;

        let file_path = self.directory.join(file_name);
        std::fs::write(&file_path, bytes).map_err(|error| {
            ContextError::with_error(format!("Failed to write the document {:?}", file_path), &error)
        })?;
        log::debug!("Saved {} bytes to {:?}", bytes.len(), file_path);

        Ok(file_path)
    }
}

/// The name of the exported document: the title with every character which is not
/// alphanumeric replaced by an underscore, followed by the ISO date of the export.
pub fn file_name(title: Option<&str>, date: Date) -> String {
    let sanitized_title: String = title
        .unwrap_or_default()
        .chars()
        .map(|character| if character.is_alphanumeric() { character } else { '_' })
        .collect();
    let stem = match sanitized_title.trim_matches('_') {
        "" => DEFAULT_FILE_STEM,
        stem => stem,
    };

    format!(
        "{}-{:04}-{:02}-{:02}.pdf",
        stem,
        date.year(),
        u8::from(date.month()),
        date.day()
    )
}

/// Runs exports of letters to PDF documents, one at a time, and keeps track of how the
/// last one went.
pub struct Exporter<'a, R: Rasterizer, N: Notifier, S: OutputSink> {
    fonts: &'a FontBook,
    assets: &'a dyn AssetLoader,
    configuration: &'a ExportConfiguration,
    rasterizer: R,
    notifier: N,
    sink: S,
    state: ExportState,
    export_time: Option<OffsetDateTime>,
}

impl<'a, R: Rasterizer, N: Notifier, S: OutputSink> Exporter<'a, R, N, S> {
    pub fn new(
        fonts: &'a FontBook,
        assets: &'a dyn AssetLoader,
        configuration: &'a ExportConfiguration,
        rasterizer: R,
        notifier: N,
        sink: S,
    ) -> Self {
        Exporter {
            fonts,
            assets,
            configuration,
            rasterizer,
            notifier,
            sink,
            state: ExportState::Idle,
            export_time: None,
        }
    }

    /// Pins the time the exports are dated with instead of reading the clock.
    pub fn with_export_time(mut self, export_time: OffsetDateTime) -> Self {
        self.export_time = Some(export_time);
        self
    }

    pub fn state(&self) -> &ExportState {
        &self.state
    }

    pub fn notifier(&self) -> &N {
        &self.notifier
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Exports `letter` to a four pages PDF document handed to the output sink.
    ///
    /// Nothing happens while no letter is loaded. Otherwise exactly one outcome
    /// notification is emitted, and nothing is saved unless every page succeeded.
    pub fn export(&mut self, letter: Option<&Letter>) -> &ExportState {
        let Some(letter) = letter else {
            log::debug!("No letter is loaded, there is nothing to export");
            return &self.state;
        };

        self.state = ExportState::Rendering;
        self.notifier.notify(Notification::Loading(format!(
            "Generating PDF ({} pages)...",
            PAGE_COUNT
        )));

        let export_time = self.export_time.unwrap_or_else(OffsetDateTime::now_utc);
        self.state = match self.export_letter(letter, export_time) {
            Ok(path) => {
                self.notifier.notify(Notification::Success(format!(
                    "PDF with {} pages downloaded!",
                    PAGE_COUNT
                )));
                ExportState::Success { path }
            }
            Err(error) => {
                log::error!("Error generating PDF: {}", error);
                self.notifier.notify(Notification::Failure(
                    "Failed to generate PDF. Please try again.".into(),
                ));
                ExportState::Failed {
                    message: error.to_string(),
                }
            }
        };

        &self.state
    }

    fn export_letter(
        &mut self,
        letter: &Letter,
        export_time: OffsetDateTime,
    ) -> Result<PathBuf, ContextError> {
        let renderer = PageRenderer::new(self.fonts, self.assets, self.configuration);
        let assembler = DocumentAssembler::new(
            &renderer,
            RasterOptions::from_configuration(self.configuration),
        );
        let page_format = self.configuration.page_format;

        let identifier = letter
            .id
            .clone()
            .unwrap_or_else(|| DEFAULT_FILE_STEM.to_string());
        let mut document =
            PdfDocument::new(identifier, page_format).with_creation_date(export_time);
        if let Some(title) = letter.content.title.as_deref().filter(|title| !title.trim().is_empty()) {
            document = document.with_title(title);
        }

        // The surface lives for this export only and is released whatever the outcome
        let (canvas_width, canvas_height) = self.configuration.canvas_size();
        let mut surface = Surface::acquire(canvas_width, canvas_height);
        assembler.assemble(
            &letter.page_descriptors(),
            &letter.style,
            &mut surface,
            &mut self.rasterizer,
            &mut document,
            ImagePlacement::full_bleed(&page_format),
        )?;
        drop(surface);

        let document_bytes = document
            .to_bytes()
            .map_err(|error| error.within("Failed to finalize the PDF document"))?;
        let file_name = file_name(letter.content.title.as_deref(), export_time.date());
        self.sink.save(&file_name, &document_bytes)
    }
}
