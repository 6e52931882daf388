use serde::{Deserialize, Serialize};

pub const MIME_PDF: &str = "application/pdf";
pub const MIME_DOCX: &str =
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document";
pub const MIME_DOC: &str = "application/msword";
pub const MIME_TEXT: &str = "text/plain";
pub const MIME_MARKDOWN: &str = "text/markdown";
pub const MIME_OCTET_STREAM: &str = "application/octet-stream";

/// Detected file type of an uploaded CV.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FileKind {
    Pdf,
    Docx,
    PlainText,
}

impl FileKind {
    pub fn mime(self) -> &'static str {
        match self {
            FileKind::Pdf => MIME_PDF,
            FileKind::Docx => MIME_DOCX,
            FileKind::PlainText => MIME_TEXT,
        }
    }
}

/// Output of the extractor. Immutable and never persisted on its own.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractedDocument {
    pub text: String,
    pub file_kind: FileKind,
    pub byte_len: usize,
    /// Pages for PDFs, paragraphs for DOCX, blank-line separated blocks for text.
    pub section_count: usize,
}

/// PII values lifted out of a document. Travels with the job, never to the LLM.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PiiFields {
    pub names: Vec<String>,
    pub emails: Vec<String>,
    pub phones: Vec<String>,
    pub national_ids: Vec<String>,
    pub addresses: Vec<String>,
}

impl PiiFields {
    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
            && self.emails.is_empty()
            && self.phones.is_empty()
            && self.national_ids.is_empty()
            && self.addresses.is_empty()
    }

    pub fn total(&self) -> usize {
        self.names.len()
            + self.emails.len()
            + self.phones.len()
            + self.national_ids.len()
            + self.addresses.len()
    }
}

/// Redacted working copy plus the PII side-channel.
#[derive(Debug, Clone)]
pub struct RedactedPayload {
    pub text: String,
    pub pii: PiiFields,
}
