//! Rasterisation: turn input files into an ordered list of page images.
//!
//! Image inputs pass through untouched. PDFs are rendered page by page via
//! pdfium into PNG files inside a temporary directory; the directory lives
//! as long as the returned [`RasterizedPages`] and is removed on drop, so
//! the orchestrator releases every rendered page as soon as a file is done.
//!
//! ## Why spawn_blocking?
//!
//! `pdfium-render` wraps the pdfium C++ library, which keeps thread-local
//! state and is CPU-bound. Rendering runs on the blocking pool so the tokio
//! workers keep streaming fragments meanwhile.

use crate::config::ConversionConfig;
use crate::error::Doc2MdError;
use crate::pipeline::input::{classify, MediaKind};
use async_trait::async_trait;
use pdfium_render::prelude::*;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::{debug, info};

/// One rasterised page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageImage {
    pub path: PathBuf,
    /// 1-indexed position in the rasteriser's output.
    pub page_num: usize,
}

/// Page images produced by a [`Rasterizer`], plus whatever keeps them alive.
#[derive(Debug, Default)]
pub struct RasterizedPages {
    pages: Vec<PageImage>,
    _temp_dirs: Vec<TempDir>,
}

impl RasterizedPages {
    /// Wrap existing image paths (no temporary storage to clean up).
    pub fn from_paths(paths: impl IntoIterator<Item = PathBuf>) -> Self {
        Self {
            pages: paths
                .into_iter()
                .enumerate()
                .map(|(i, path)| PageImage {
                    path,
                    page_num: i + 1,
                })
                .collect(),
            _temp_dirs: Vec::new(),
        }
    }

    pub fn pages(&self) -> &[PageImage] {
        &self.pages
    }

    pub fn len(&self) -> usize {
        self.pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }
}

/// Produces page images for the VLM path.
#[async_trait]
pub trait Rasterizer: Send + Sync {
    /// Rasterise `files` in order. `size_bound` caps the longest edge of a
    /// rendered PDF page in pixels; image inputs are returned unchanged.
    async fn rasterize(
        &self,
        files: &[PathBuf],
        size_bound: u32,
    ) -> Result<RasterizedPages, Doc2MdError>;
}

/// The default rasteriser, backed by pdfium.
#[derive(Debug, Clone, Default)]
pub struct PdfiumRasterizer {
    library_path: Option<PathBuf>,
}

impl PdfiumRasterizer {
    /// Bind a specific pdfium library instead of the system one.
    pub fn with_library(path: impl Into<PathBuf>) -> Self {
        Self {
            library_path: Some(path.into()),
        }
    }

    pub fn from_config(config: &ConversionConfig) -> Self {
        Self {
            library_path: config.pdfium_library_path.clone(),
        }
    }
}

#[async_trait]
impl Rasterizer for PdfiumRasterizer {
    async fn rasterize(
        &self,
        files: &[PathBuf],
        size_bound: u32,
    ) -> Result<RasterizedPages, Doc2MdError> {
        let files = files.to_vec();
        let library = self.library_path.clone();

        tokio::task::spawn_blocking(move || rasterize_blocking(&files, size_bound, library.as_deref()))
            .await
            .map_err(|e| Doc2MdError::Internal(format!("Render task panicked: {}", e)))?
    }
}

fn rasterize_blocking(
    files: &[PathBuf],
    size_bound: u32,
    library: Option<&Path>,
) -> Result<RasterizedPages, Doc2MdError> {
    let mut out = RasterizedPages::default();
    let mut pdfium: Option<Pdfium> = None;

    for file in files {
        if !file.is_file() {
            return Err(Doc2MdError::RasterizationFailed {
                path: file.clone(),
                detail: "file does not exist".to_string(),
            });
        }
        let kind = classify(file).map_err(|e| Doc2MdError::RasterizationFailed {
            path: file.clone(),
            detail: e.to_string(),
        })?;

        match kind {
            MediaKind::Image(_) => {
                debug!("Passing image through: {}", file.display());
                let page_num = out.pages.len() + 1;
                out.pages.push(PageImage {
                    path: file.clone(),
                    page_num,
                });
            }
            MediaKind::Pdf => {
                if pdfium.is_none() {
                    pdfium = Some(bind_pdfium(file, library)?);
                }
                if let Some(pdfium) = pdfium.as_ref() {
                    render_pdf(pdfium, file, size_bound, &mut out)?;
                }
            }
        }
    }

    Ok(out)
}

fn bind_pdfium(file: &Path, library: Option<&Path>) -> Result<Pdfium, Doc2MdError> {
    let bindings = match library {
        Some(path) => Pdfium::bind_to_library(path),
        None => Pdfium::bind_to_system_library(),
    }
    .map_err(|e| Doc2MdError::RasterizationFailed {
        path: file.to_path_buf(),
        detail: format!(
            "could not bind pdfium ({e:?}); set PDFIUM_LIB_PATH to an existing libpdfium"
        ),
    })?;
    Ok(Pdfium::new(bindings))
}

fn render_pdf(
    pdfium: &Pdfium,
    pdf_path: &Path,
    size_bound: u32,
    out: &mut RasterizedPages,
) -> Result<(), Doc2MdError> {
    let failed = |detail: String| Doc2MdError::RasterizationFailed {
        path: pdf_path.to_path_buf(),
        detail,
    };

    let document = pdfium
        .load_pdf_from_file(pdf_path, None)
        .map_err(|e| failed(format!("{:?}", e)))?;

    let temp_dir = tempfile::Builder::new()
        .prefix("doc2md-pages-")
        .tempdir()
        .map_err(|e| failed(format!("temp dir: {e}")))?;

    let render_config = PdfRenderConfig::new()
        .set_target_width(size_bound as i32)
        .set_maximum_height(size_bound as i32);

    let pages = document.pages();
    info!("Rendering {}: {} pages", pdf_path.display(), pages.len());

    for (idx, page) in pages.iter().enumerate() {
        let bitmap = page
            .render_with_config(&render_config)
            .map_err(|e| failed(format!("page {}: {:?}", idx + 1, e)))?;
        let image = bitmap.as_image();

        let target = temp_dir.path().join(format!("page_{:04}.png", idx + 1));
        image
            .save_with_format(&target, image::ImageFormat::Png)
            .map_err(|e| failed(format!("page {}: {}", idx + 1, e)))?;
        debug!(
            "Rendered page {} → {}x{} px",
            idx + 1,
            image.width(),
            image.height()
        );

        let page_num = out.pages.len() + 1;
        out.pages.push(PageImage {
            path: target,
            page_num,
        });
    }

    out._temp_dirs.push(temp_dir);
    Ok(())
}
