//! Document loading: one file in, ordered `(text, page)` segments out.
//!
//! | Extension | Segments |
//! |-----------|----------|
//! | `txt`, `md`, `markdown` | whole file, page 0 (invalid UTF-8 decoded lossily) |
//! | `docx` | `<w:t>` runs of `word/document.xml`, paragraphs on separate lines, page 0 |
//! | `pptx` | `<a:t>` runs, one segment per slide, page = slide number − 1 |
//! | `pdf` | one segment per page, page index from 0 |
//!
//! Extensions are matched case-insensitively. Every failure is scoped to the
//! one file being loaded.

use std::io::Read;
use std::path::Path;

use docsync_core::models::TextSegment;
use quick_xml::events::Event;

use crate::error::SyncError;

/// Maximum decompressed bytes to read from a single ZIP entry (zip-bomb protection).
const MAX_XML_ENTRY_BYTES: u64 = 50 * 1024 * 1024;

/// Document formats the loader understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentFormat {
    PlainText,
    Markdown,
    Docx,
    Pptx,
    Pdf,
}

impl DocumentFormat {
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "txt" => Some(Self::PlainText),
            "md" | "markdown" => Some(Self::Markdown),
            "docx" => Some(Self::Docx),
            "pptx" => Some(Self::Pptx),
            "pdf" => Some(Self::Pdf),
            _ => None,
        }
    }
}

/// Loads supported documents from disk.
#[derive(Debug, Clone, Default)]
pub struct DocumentLoader;

impl DocumentLoader {
    pub fn new() -> Self {
        Self
    }

    /// Load `path` into segments.
    ///
    /// Errors: [`SyncError::UnsupportedFormat`] for an unknown extension,
    /// [`SyncError::TransientIo`] when the file cannot be read, and
    /// [`SyncError::Parse`] when its contents cannot be decoded.
    pub fn load(&self, path: &Path) -> Result<Vec<TextSegment>, SyncError> {
        let format = DocumentFormat::from_path(path)
            .ok_or_else(|| SyncError::UnsupportedFormat(path.to_path_buf()))?;

        let bytes = std::fs::read(path).map_err(|source| SyncError::TransientIo {
            path: path.to_path_buf(),
            source,
        })?;

        let parse_err = |message: String| SyncError::parse(path, message);
        match format {
            DocumentFormat::PlainText | DocumentFormat::Markdown => Ok(vec![TextSegment::new(
                String::from_utf8_lossy(&bytes).into_owned(),
                0,
            )]),
            DocumentFormat::Docx => load_docx(&bytes).map_err(parse_err),
            DocumentFormat::Pptx => load_pptx(&bytes).map_err(parse_err),
            DocumentFormat::Pdf => load_pdf(&bytes).map_err(parse_err),
        }
    }
}

fn load_pdf(bytes: &[u8]) -> Result<Vec<TextSegment>, String> {
    // The extractor can panic on malformed input; treat that as a parse error.
    let pages = std::panic::catch_unwind(|| pdf_extract::extract_text_from_mem_by_pages(bytes))
        .map_err(|_| "PDF parser panicked".to_string())?
        .map_err(|e| e.to_string())?;
    Ok(pages
        .into_iter()
        .enumerate()
        .map(|(i, text)| TextSegment::new(text, i as u32))
        .collect())
}

type Archive<'a> = zip::ZipArchive<std::io::Cursor<&'a [u8]>>;

fn open_archive(bytes: &[u8]) -> Result<Archive<'_>, String> {
    zip::ZipArchive::new(std::io::Cursor::new(bytes)).map_err(|e| e.to_string())
}

fn read_zip_entry_bounded(archive: &mut Archive<'_>, name: &str) -> Result<Vec<u8>, String> {
    let entry = archive.by_name(name).map_err(|e| format!("{}: {}", name, e))?;
    let mut out = Vec::new();
    entry
        .take(MAX_XML_ENTRY_BYTES)
        .read_to_end(&mut out)
        .map_err(|e| e.to_string())?;
    if out.len() as u64 >= MAX_XML_ENTRY_BYTES {
        return Err(format!(
            "ZIP entry {} exceeds size limit ({} bytes)",
            name, MAX_XML_ENTRY_BYTES
        ));
    }
    Ok(out)
}

fn load_docx(bytes: &[u8]) -> Result<Vec<TextSegment>, String> {
    let mut archive = open_archive(bytes)?;
    let xml = read_zip_entry_bounded(&mut archive, "word/document.xml")?;
    let text = collect_text_runs(&xml, b"p")?;
    Ok(vec![TextSegment::new(text, 0)])
}

fn load_pptx(bytes: &[u8]) -> Result<Vec<TextSegment>, String> {
    let mut archive = open_archive(bytes)?;
    let mut slides: Vec<(u32, String)> = archive
        .file_names()
        .filter_map(|n| {
            let number = n
                .strip_prefix("ppt/slides/slide")?
                .strip_suffix(".xml")?
                .parse::<u32>()
                .ok()?;
            Some((number, n.to_string()))
        })
        .collect();
    slides.sort();

    let mut segments = Vec::with_capacity(slides.len());
    for (number, name) in slides {
        let xml = read_zip_entry_bounded(&mut archive, &name)?;
        let text = collect_text_runs(&xml, b"p")?;
        segments.push(TextSegment::new(text, number.saturating_sub(1)));
    }
    Ok(segments)
}

/// Concatenate the text of every `<t>` element (any namespace prefix),
/// starting a new line whenever a `paragraph` element closes.
fn collect_text_runs(xml: &[u8], paragraph: &[u8]) -> Result<String, String> {
    let mut out = String::new();
    let mut reader = quick_xml::Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut in_text = false;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) if e.local_name().as_ref() == b"t" => in_text = true,
            Ok(Event::Text(te)) if in_text => {
                let text = te.unescape().map_err(|e| e.to_string())?;
                out.push_str(&text);
            }
            Ok(Event::End(e)) => {
                let name = e.local_name();
                if name.as_ref() == b"t" {
                    in_text = false;
                } else if name.as_ref() == paragraph && !out.is_empty() && !out.ends_with('\n') {
                    out.push('\n');
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(e.to_string()),
            _ => {}
        }
        buf.clear();
    }

    let trimmed_len = out.trim_end().len();
    out.truncate(trimmed_len);
    Ok(out)
}
