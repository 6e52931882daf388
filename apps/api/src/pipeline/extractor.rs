//! Extractor: converts an uploaded CV into plain text plus basic metadata.
//!
//! PDFs are parsed from a scoped temp file on the blocking pool; DOCX is read
//! from the in-memory archive. All parsing runs under the configured timeout.

use std::io::{Read, Write};
use std::time::Duration;

use bytes::Bytes;
use thiserror::Error;
use tracing::debug;

use crate::models::document::{
    ExtractedDocument, FileKind, MIME_DOC, MIME_DOCX, MIME_MARKDOWN, MIME_OCTET_STREAM, MIME_PDF,
    MIME_TEXT,
};

/// Maximum decompressed bytes read from `word/document.xml`.
const MAX_DOCX_XML_BYTES: u64 = 50 * 1024 * 1024;
/// How far into the file a `%PDF-` header may appear.
const PDF_HEADER_WINDOW: usize = 1024;

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("corrupt file: {0}")]
    CorruptFile(String),

    #[error("extraction timed out after {}s", .0.as_secs())]
    ExtractionTimeout(Duration),

    #[error("payload of {size} bytes exceeds limit of {limit} bytes")]
    PayloadTooLarge { size: usize, limit: usize },

    #[error("temp storage error: {0}")]
    TempStorage(#[from] std::io::Error),
}

#[derive(Debug, Clone)]
pub struct Extractor {
    max_bytes: usize,
    timeout: Duration,
}

impl Extractor {
    pub fn new(max_bytes: usize, timeout: Duration) -> Self {
        Self { max_bytes, timeout }
    }

    pub fn max_bytes(&self) -> usize {
        self.max_bytes
    }

    /// Cheap checks that do not parse the document. Used at intake so bad
    /// uploads are rejected before a job is created.
    pub fn precheck(
        &self,
        bytes: &[u8],
        mime_hint: Option<&str>,
        filename: Option<&str>,
    ) -> Result<FileKind, ExtractError> {
        if bytes.len() > self.max_bytes {
            return Err(ExtractError::PayloadTooLarge {
                size: bytes.len(),
                limit: self.max_bytes,
            });
        }
        if bytes.is_empty() {
            return Err(ExtractError::CorruptFile("file is empty".to_string()));
        }
        resolve_kind(bytes, mime_hint, filename)
    }

    pub async fn extract(
        &self,
        bytes: Bytes,
        mime_hint: Option<&str>,
        filename: Option<&str>,
    ) -> Result<ExtractedDocument, ExtractError> {
        let kind = self.precheck(&bytes, mime_hint, filename)?;
        let byte_len = bytes.len();

        let (text, section_count) = match kind {
            FileKind::PlainText => {
                let text = std::str::from_utf8(&bytes)
                    .map_err(|_| ExtractError::CorruptFile("text is not valid UTF-8".to_string()))?
                    .to_string();
                let sections = count_text_blocks(&text);
                (text, sections)
            }
            FileKind::Pdf => {
                let pages = count_pdf_pages(&bytes);
                let text = self.run_blocking(move || extract_pdf(&bytes)).await?;
                (text, pages)
            }
            FileKind::Docx => self.run_blocking(move || extract_docx(&bytes)).await?,
        };

        if text.trim().is_empty() {
            return Err(ExtractError::CorruptFile(
                "document contains no extractable text".to_string(),
            ));
        }

        debug!(
            "Extracted {} chars from {:?} ({} bytes, {} sections)",
            text.len(),
            kind,
            byte_len,
            section_count
        );

        Ok(ExtractedDocument {
            text,
            file_kind: kind,
            byte_len,
            section_count: section_count.max(1),
        })
    }

    /// Runs a parser on the blocking pool under the extraction timeout.
    /// A parser panic is reported as a corrupt file.
    async fn run_blocking<T, F>(&self, f: F) -> Result<T, ExtractError>
    where
        F: FnOnce() -> Result<T, ExtractError> + Send + 'static,
        T: Send + 'static,
    {
        let handle = tokio::task::spawn_blocking(f);
        match tokio::time::timeout(self.timeout, handle).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_err)) if join_err.is_panic() => Err(ExtractError::CorruptFile(
                "parser panicked on malformed input".to_string(),
            )),
            Ok(Err(join_err)) => Err(ExtractError::CorruptFile(join_err.to_string())),
            Err(_) => Err(ExtractError::ExtractionTimeout(self.timeout)),
        }
    }
}

/// Decides the file type from the declared MIME hint, falling back to magic
/// bytes and then the filename extension.
pub fn resolve_kind(
    bytes: &[u8],
    mime_hint: Option<&str>,
    filename: Option<&str>,
) -> Result<FileKind, ExtractError> {
    let mime = mime_hint
        .map(|m| m.split(';').next().unwrap_or("").trim().to_ascii_lowercase())
        .filter(|m| !m.is_empty() && m != MIME_OCTET_STREAM);

    let kind = match mime.as_deref() {
        Some(MIME_PDF) => FileKind::Pdf,
        Some(MIME_DOCX) => FileKind::Docx,
        Some(MIME_TEXT) | Some(MIME_MARKDOWN) => FileKind::PlainText,
        Some(MIME_DOC) => {
            return Err(ExtractError::UnsupportedFormat(
                "legacy Word (.doc) files are not supported; upload PDF or DOCX".to_string(),
            ))
        }
        Some(other) => return Err(ExtractError::UnsupportedFormat(other.to_string())),
        None => sniff_kind(bytes, filename)?,
    };

    match kind {
        FileKind::Pdf if !has_pdf_header(bytes) => Err(ExtractError::CorruptFile(
            "declared PDF has no %PDF header".to_string(),
        )),
        FileKind::Docx if !bytes.starts_with(b"PK\x03\x04") => Err(ExtractError::CorruptFile(
            "declared DOCX is not a zip archive".to_string(),
        )),
        _ => Ok(kind),
    }
}

fn sniff_kind(bytes: &[u8], filename: Option<&str>) -> Result<FileKind, ExtractError> {
    if has_pdf_header(bytes) {
        return Ok(FileKind::Pdf);
    }
    if bytes.starts_with(b"PK\x03\x04") {
        return Ok(FileKind::Docx);
    }
    let ext = filename
        .and_then(|f| f.rsplit_once('.'))
        .map(|(_, ext)| ext.to_ascii_lowercase());
    match ext.as_deref() {
        Some("txt") | Some("md") => Ok(FileKind::PlainText),
        Some("doc") => Err(ExtractError::UnsupportedFormat(
            "legacy Word (.doc) files are not supported; upload PDF or DOCX".to_string(),
        )),
        _ if std::str::from_utf8(bytes).is_ok() => Ok(FileKind::PlainText),
        _ => Err(ExtractError::UnsupportedFormat(
            "could not determine file type".to_string(),
        )),
    }
}

fn has_pdf_header(bytes: &[u8]) -> bool {
    let window = &bytes[..bytes.len().min(PDF_HEADER_WINDOW)];
    window.windows(5).any(|w| w == b"%PDF-")
}

fn extract_pdf(bytes: &[u8]) -> Result<String, ExtractError> {
    // pdf-extract reads from a path; the temp file is removed when `tmp` drops.
    let mut tmp = tempfile::Builder::new()
        .prefix("cv-ingest-")
        .suffix(".pdf")
        .tempfile()?;
    tmp.write_all(bytes)?;
    tmp.flush()?;
    pdf_extract::extract_text(tmp.path()).map_err(|e| ExtractError::CorruptFile(e.to_string()))
}

/// Counts `/Type /Page` objects. Falls back to 1 when page objects are
/// hidden in compressed object streams.
pub fn count_pdf_pages(bytes: &[u8]) -> usize {
    let mut count = 0;
    for needle in [&b"/Type /Page"[..], &b"/Type/Page"[..]] {
        let mut i = 0;
        while i + needle.len() <= bytes.len() {
            if &bytes[i..i + needle.len()] == needle {
                // `/Type /Pages` is the page tree node, not a page.
                if bytes.get(i + needle.len()) != Some(&b's') {
                    count += 1;
                }
                i += needle.len();
            } else {
                i += 1;
            }
        }
    }
    count.max(1)
}

fn extract_docx(bytes: &[u8]) -> Result<(String, usize), ExtractError> {
    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes))
        .map_err(|e| ExtractError::CorruptFile(e.to_string()))?;
    let entry = archive
        .by_name("word/document.xml")
        .map_err(|_| ExtractError::CorruptFile("word/document.xml not found".to_string()))?;
    let mut xml = Vec::new();
    entry
        .take(MAX_DOCX_XML_BYTES)
        .read_to_end(&mut xml)
        .map_err(|e| ExtractError::CorruptFile(e.to_string()))?;
    if xml.len() as u64 >= MAX_DOCX_XML_BYTES {
        return Err(ExtractError::CorruptFile(
            "word/document.xml exceeds size limit".to_string(),
        ));
    }
    docx_paragraphs(&xml)
}

/// Collects `w:t` runs, one output line per non-empty `w:p` paragraph.
fn docx_paragraphs(xml: &[u8]) -> Result<(String, usize), ExtractError> {
    use quick_xml::events::Event;

    let mut reader = quick_xml::Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut out = String::new();
    let mut paragraph = String::new();
    let mut paragraphs = 0;
    let mut in_text = false;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) if e.local_name().as_ref() == b"t" => in_text = true,
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"t" => in_text = false,
                b"p" => {
                    let line = paragraph.trim();
                    if !line.is_empty() {
                        out.push_str(line);
                        out.push('\n');
                        paragraphs += 1;
                    }
                    paragraph.clear();
                }
                _ => {}
            },
            Ok(Event::Empty(e)) => match e.local_name().as_ref() {
                b"tab" => paragraph.push(' '),
                b"br" => paragraph.push('\n'),
                _ => {}
            },
            Ok(Event::Text(t)) if in_text => {
                let text = t
                    .unescape()
                    .map_err(|e| ExtractError::CorruptFile(e.to_string()))?;
                paragraph.push_str(&text);
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(ExtractError::CorruptFile(e.to_string())),
            _ => {}
        }
        buf.clear();
    }

    Ok((out, paragraphs))
}

fn count_text_blocks(text: &str) -> usize {
    text.split("\n\n").filter(|b| !b.trim().is_empty()).count()
}
