use std::collections::HashMap;

use axum::{
    extract::{Multipart, Path, State},
    http::StatusCode,
    Json,
};
use bytes::{Bytes, BytesMut};
use serde::Serialize;
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::job::{Applicant, IntakeChannel, Stage};
use crate::pipeline::orchestrator::IntakeRequest;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct IntakeAccepted {
    pub job_id: Uuid,
    pub stage: Stage,
}

struct UploadedFile {
    bytes: Bytes,
    filename: Option<String>,
    content_type: Option<String>,
}

#[derive(Default)]
struct IntakeForm {
    file: Option<UploadedFile>,
    fields: HashMap<String, String>,
}

impl IntakeForm {
    /// Trimmed text field; blank counts as absent.
    fn field(&self, name: &str) -> Option<String> {
        self.fields
            .get(name)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn require(&self, name: &str) -> Result<String, AppError> {
        self.field(name)
            .ok_or_else(|| AppError::Validation(format!("missing '{name}' field")))
    }

    fn into_request(mut self, channel: IntakeChannel) -> Result<IntakeRequest, AppError> {
        let mime = self.field("mime");
        let file = self
            .file
            .take()
            .ok_or_else(|| AppError::Validation("missing 'file' field".to_string()))?;
        Ok(IntakeRequest {
            bytes: file.bytes,
            mime_hint: mime.or(file.content_type),
            filename: file.filename,
            channel,
        })
    }
}

/// Reads the form, streaming the file part so an oversized upload is
/// rejected as soon as it crosses `max_bytes`.
async fn read_form(mut multipart: Multipart, max_bytes: usize) -> Result<IntakeForm, AppError> {
    let mut form = IntakeForm::default();
    while let Some(mut field) = multipart.next_field().await? {
        let name = field.name().unwrap_or("").to_string();
        if name == "file" {
            let filename = field.file_name().map(str::to_string);
            let content_type = field.content_type().map(str::to_string);
            let mut buf = BytesMut::new();
            while let Some(chunk) = field.chunk().await? {
                if buf.len() + chunk.len() > max_bytes {
                    return Err(AppError::PayloadTooLarge(format!(
                        "file exceeds limit of {max_bytes} bytes"
                    )));
                }
                buf.extend_from_slice(&chunk);
            }
            form.file = Some(UploadedFile {
                bytes: buf.freeze(),
                filename,
                content_type,
            });
        } else {
            let value = field.text().await?;
            form.fields.insert(name, value);
        }
    }
    Ok(form)
}

/// POST /api/v1/cv/upload
pub async fn handle_upload(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<(StatusCode, Json<IntakeAccepted>), AppError> {
    let form = read_form(multipart, state.orchestrator.max_upload_bytes()).await?;
    let request = form.into_request(IntakeChannel::Direct)?;
    let job_id = state.orchestrator.submit(request)?;
    Ok((
        StatusCode::ACCEPTED,
        Json(IntakeAccepted {
            job_id,
            stage: Stage::Queued,
        }),
    ))
}

/// POST /api/v1/postings/:posting_id/applications
pub async fn handle_application(
    State(state): State<AppState>,
    Path(posting_id): Path<String>,
    multipart: Multipart,
) -> Result<(StatusCode, Json<IntakeAccepted>), AppError> {
    let form = read_form(multipart, state.orchestrator.max_upload_bytes()).await?;
    let applicant = Applicant {
        name: form.require("name")?,
        email: form.require("email")?,
        phone: form.field("phone"),
        cover_letter: form.field("cover_letter"),
    };
    let request = form.into_request(IntakeChannel::JobApplication {
        applicant,
        posting_id,
    })?;
    let job_id = state.orchestrator.submit(request)?;
    Ok((
        StatusCode::ACCEPTED,
        Json(IntakeAccepted {
            job_id,
            stage: Stage::Queued,
        }),
    ))
}
