//! PDF assembly from downloaded page images.
//!
//! Each JPEG becomes one page sized to the image's pixel dimensions. The JPEG
//! bytes are embedded unchanged as a `DCTDecode` image XObject, so assembly
//! never re-encodes and never loses quality.

use std::io::Cursor;
use std::path::{Path, PathBuf};

use image::ImageDecoder;
use image::codecs::jpeg::JpegDecoder;
use lopdf::content::{Content, Operation};
use lopdf::{Dictionary, Document, Object, ObjectId, Stream, StringFormat, dictionary};
use tokio::io::AsyncWriteExt;
use tracing::{debug, instrument, warn};

use super::{AssemblyError, PdfMetadata};
use crate::download::create_unique_file;

/// Resource name of the page image inside each page's content stream.
const IMAGE_NAME: &[u8] = b"Im0";

/// Turns ordered page images into a single document.
pub trait Assembler: Send + Sync {
    /// Builds the document bytes.
    ///
    /// Paths whose files are missing are skipped: they are pages that failed
    /// to download.
    ///
    /// # Errors
    ///
    /// [`AssemblyError::NoPages`] when none of the files exist, other
    /// [`AssemblyError`] variants when a page cannot be read or embedded.
    fn assemble(&self, pages: &[PathBuf], metadata: &PdfMetadata)
    -> Result<Vec<u8>, AssemblyError>;
}

/// [`Assembler`] writing a PDF with `lopdf`.
#[derive(Debug, Clone, Copy, Default)]
pub struct PdfAssembler;

struct JpegPage {
    width: u32,
    height: u32,
    color_space: &'static str,
    inverted: bool,
    data: Vec<u8>,
}

/// Colour layout from the JPEG frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FrameColor {
    components: u8,
    adobe: bool,
}

/// Reads the component count of the first frame header and whether an Adobe
/// `APP14` segment precedes it. `None` when the marker stream is malformed.
fn scan_frame_color(data: &[u8]) -> Option<FrameColor> {
    if !data.starts_with(&[0xFF, 0xD8]) {
        return None;
    }
    let mut adobe = false;
    let mut pos = 2;
    while pos + 4 <= data.len() {
        if data[pos] != 0xFF {
            return None;
        }
        let marker = data[pos + 1];
        if marker == 0xFF {
            pos += 1;
            continue;
        }
        let len = usize::from(u16::from_be_bytes([data[pos + 2], data[pos + 3]]));
        let segment = data.get(pos + 4..pos + 2 + len)?;
        match marker {
            0xEE if segment.starts_with(b"Adobe") => adobe = true,
            // SOF0..SOF15 without DHT, JPG and DAC
            0xC0..=0xCF if !matches!(marker, 0xC4 | 0xC8 | 0xCC) => {
                return Some(FrameColor {
                    components: *segment.get(5)?,
                    adobe,
                });
            }
            _ => {}
        }
        pos += 2 + len;
    }
    None
}

impl Assembler for PdfAssembler {
    #[instrument(level = "debug", skip(self, pages, metadata), fields(pages = pages.len()))]
    fn assemble(
        &self,
        pages: &[PathBuf],
        metadata: &PdfMetadata,
    ) -> Result<Vec<u8>, AssemblyError> {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();

        let mut kids: Vec<Object> = Vec::with_capacity(pages.len());
        for path in pages {
            let Some(page) = read_jpeg(path)? else {
                warn!(path = %path.display(), "page image missing, skipped");
                continue;
            };
            kids.push(add_page(&mut doc, pages_id, page)?.into());
        }
        if kids.is_empty() {
            return Err(AssemblyError::NoPages {
                expected: pages.len(),
            });
        }

        let count = i64::try_from(kids.len()).unwrap_or(i64::MAX);
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => count,
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);
        let info_id = doc.add_object(info_dictionary(metadata));
        doc.trailer.set("Info", info_id);

        let mut bytes = Vec::new();
        doc.save_to(&mut bytes).map_err(AssemblyError::pdf)?;
        debug!(pages = count, bytes = bytes.len(), "pdf assembled");
        Ok(bytes)
    }
}

/// Writes `bytes` as `<title>.pdf` in `dir` without overwriting an existing
/// file: `<title>(1).pdf`, `<title>(2).pdf`, ... are used instead.
///
/// # Errors
///
/// Returns [`AssemblyError::Io`] if the directory or file cannot be written.
pub async fn save_artifact(bytes: &[u8], dir: &Path, title: &str) -> Result<PathBuf, AssemblyError> {
    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|e| AssemblyError::io(dir, e))?;
    let (path, mut file) = create_unique_file(dir, title, "pdf")
        .await
        .map_err(|e| AssemblyError::io(dir, e))?;
    let written = match file.write_all(bytes).await {
        Ok(()) => file.flush().await,
        Err(e) => Err(e),
    };
    if let Err(e) = written {
        drop(file);
        let _ = tokio::fs::remove_file(&path).await;
        return Err(AssemblyError::io(&path, e));
    }
    Ok(path)
}

/// PDF colour space for a frame, and whether its samples need a `Decode`
/// inversion. Adobe CMYK JPEGs store inverted samples.
fn pdf_color(frame: FrameColor) -> Option<(&'static str, bool)> {
    match frame.components {
        1 => Some(("DeviceGray", false)),
        3 => Some(("DeviceRGB", false)),
        4 => Some(("DeviceCMYK", frame.adobe)),
        _ => None,
    }
}

fn read_jpeg(path: &Path) -> Result<Option<JpegPage>, AssemblyError> {
    let data = match std::fs::read(path) {
        Ok(data) => data,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(AssemblyError::io(path, e)),
    };

    let image_error = |reason: String| AssemblyError::Image {
        path: path.to_path_buf(),
        reason,
    };
    let (width, height) = JpegDecoder::new(Cursor::new(data.as_slice()))
        .map_err(|e| image_error(e.to_string()))?
        .dimensions();

    let frame = scan_frame_color(&data)
        .ok_or_else(|| image_error("no frame header found".to_string()))?;
    let (color_space, inverted) = pdf_color(frame).ok_or_else(|| {
        image_error(format!(
            "unsupported colour component count {}",
            frame.components
        ))
    })?;

    Ok(Some(JpegPage {
        width,
        height,
        color_space,
        inverted,
        data,
    }))
}

fn add_page(
    doc: &mut Document,
    pages_id: ObjectId,
    page: JpegPage,
) -> Result<ObjectId, AssemblyError> {
    let width = i64::from(page.width);
    let height = i64::from(page.height);

    let mut image = dictionary! {
        "Type" => "XObject",
        "Subtype" => "Image",
        "Width" => width,
        "Height" => height,
        "ColorSpace" => page.color_space,
        "BitsPerComponent" => 8_i64,
        "Filter" => "DCTDecode",
    };
    if page.inverted {
        image.set("Decode", [1_i64, 0, 1, 0, 1, 0, 1, 0].map(Object::from).to_vec());
    }
    let image_id = doc.add_object(Stream::new(image, page.data));

    let content = Content {
        operations: vec![
            Operation::new("q", vec![]),
            Operation::new(
                "cm",
                vec![
                    width.into(),
                    0_i64.into(),
                    0_i64.into(),
                    height.into(),
                    0_i64.into(),
                    0_i64.into(),
                ],
            ),
            Operation::new("Do", vec![Object::Name(IMAGE_NAME.to_vec())]),
            Operation::new("Q", vec![]),
        ],
    };
    let content_id = doc.add_object(Stream::new(
        Dictionary::new(),
        content.encode().map_err(AssemblyError::pdf)?,
    ));

    let mut xobjects = Dictionary::new();
    xobjects.set(IMAGE_NAME, image_id);

    Ok(doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "MediaBox" => vec![0_i64.into(), 0_i64.into(), width.into(), height.into()],
        "Contents" => content_id,
        "Resources" => dictionary! { "XObject" => xobjects },
    }))
}

fn info_dictionary(metadata: &PdfMetadata) -> Dictionary {
    let mut info = Dictionary::new();
    info.set(
        "Producer",
        text_string(concat!("book-downloader ", env!("CARGO_PKG_VERSION"))),
    );
    if let Some(title) = &metadata.title {
        info.set("Title", text_string(title));
    }
    if let Some(author) = &metadata.author {
        info.set("Author", text_string(author));
    }
    if !metadata.keywords.is_empty() {
        info.set("Keywords", text_string(&metadata.keywords.join(", ")));
    }
    if let Some(year) = metadata.creation_year {
        info.set(
            "CreationDate",
            Object::string_literal(format!("D:{year:04}0101000000Z")),
        );
    }
    info
}

/// PDF text string: literal for ASCII, UTF-16BE with BOM otherwise.
fn text_string(text: &str) -> Object {
    if text.is_ascii() {
        return Object::string_literal(text);
    }
    let mut bytes = vec![0xFE, 0xFF];
    for unit in text.encode_utf16() {
        bytes.extend_from_slice(&unit.to_be_bytes());
    }
    Object::String(bytes, StringFormat::Hexadecimal)
}
