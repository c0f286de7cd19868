//! # Anonymize Endpoint
//!
//! `POST /anonymize` takes a multipart upload, runs it through the anonymization
//! pipeline and sends back the resulting WAV file.
//!
//! ## Request Lifecycle:
//! 1. Read the multipart body and pick out the `audio` file field
//! 2. Reject missing uploads and empty filenames (400)
//! 3. Reserve a scratch pair (`input_<id>.<ext>`, `output_<id>.wav`) and save the upload
//! 4. Run the pipeline on the blocking thread pool (CPU-bound work must not stall the
//!    async workers)
//! 5. Return the output as an attachment, or `{success:false, error}` on failure
//! 6. The scratch pair goes out of scope and deletes the input file, whatever happened,
//!    including when the client disconnects while the pipeline is still running

use crate::audio;
use crate::error::{AppError, AppResult};
use crate::state::AppState;
use actix_multipart::Multipart;
use actix_web::http::header::{ContentDisposition, DispositionParam, DispositionType};
use actix_web::{web, HttpResponse};
use futures_util::stream::StreamExt;
use tracing::{error, info};

/// Name of the multipart field that carries the recording.
pub const UPLOAD_FIELD: &str = "audio";

/// Filename the client is told to save the result as.
pub const DOWNLOAD_FILENAME: &str = "anonymized_report.wav";

/// An uploaded file, fully buffered.
struct Upload {
    filename: String,
    bytes: Vec<u8>,
}

/// Handle `POST /anonymize`.
///
/// ## Request:
/// `multipart/form-data` with a file field named `audio`.
///
/// ## Response:
/// - **200**: WAV bytes, `Content-Disposition: attachment; filename="anonymized_report.wav"`
/// - **400**: `{"success": false, "error": "No audio file provided"}` (or "Empty filename")
/// - **500**: `{"success": false, "error": "<what went wrong>"}`
pub async fn anonymize(
    state: web::Data<AppState>,
    mut payload: Multipart,
) -> AppResult<HttpResponse> {
    let upload = read_upload(&mut payload, state.config.max_upload_bytes()).await?;

    if upload.filename.is_empty() {
        return Err(AppError::BadRequest("Empty filename".to_string()));
    }

    // From here on, every exit path drops `scratch`, which removes the input file
    let scratch = state.scratch.allocate(&upload.filename);
    let request_id = scratch.id;

    info!(
        request_id = %request_id,
        filename = %upload.filename,
        size_bytes = upload.bytes.len(),
        "Anonymization requested"
    );

    tokio::fs::write(&scratch.input, &upload.bytes)
        .await
        .map_err(|e| AppError::Internal(format!("Failed to save upload: {}", e)))?;
    drop(upload);

    // The job guard and the scratch pair move into the worker: if this request is
    // abandoned mid-flight, the job is still closed and the input still removed once
    // the pipeline stops
    let job = state.start_job();
    let outcome = web::block(move || {
        let result = audio::anonymize_file(&scratch.input, &scratch.output);
        let elapsed_ms = job.finish(result.is_ok());
        (scratch, result, elapsed_ms)
    })
    .await;

    let (scratch, report, elapsed_ms) = match outcome {
        Ok((scratch, Ok(report), elapsed_ms)) => (scratch, report, elapsed_ms),
        Ok((_, Err(e), _)) => {
            error!(request_id = %request_id, error = %format!("{:#}", e), "Anonymization failed");
            return Err(e.into());
        }
        Err(e) => {
            error!(request_id = %request_id, error = %e, "Anonymization worker failed");
            return Err(AppError::Internal(format!("Processing worker failed: {}", e)));
        }
    };

    let body = tokio::fs::read(&scratch.output)
        .await
        .map_err(|e| AppError::Internal(format!("Failed to read anonymized audio: {}", e)))?;

    info!(
        request_id = %request_id,
        output_samples = report.output_samples,
        sample_rate = report.sample_rate,
        output_peak = report.output_peak,
        size_bytes = body.len(),
        elapsed_ms,
        "Anonymization complete"
    );

    Ok(HttpResponse::Ok()
        .content_type("audio/wav")
        .insert_header(ContentDisposition {
            disposition: DispositionType::Attachment,
            parameters: vec![DispositionParam::Filename(DOWNLOAD_FILENAME.to_string())],
        })
        .body(body))
}

/// Pull the first `audio` file part out of the multipart stream.
///
/// ## Rules:
/// - only a part named `audio` that carries a `filename` parameter counts as an upload;
///   an `audio` part without one is an ordinary form value
/// - every other part is read and discarded
/// - uploads larger than `max_bytes` are rejected while streaming, before they are
///   fully buffered
async fn read_upload(payload: &mut Multipart, max_bytes: usize) -> AppResult<Upload> {
    let mut upload: Option<Upload> = None;

    while let Some(item) = payload.next().await {
        let mut field =
            item.map_err(|e| AppError::BadRequest(format!("Multipart error: {}", e)))?;

        let (name, filename) = match field.content_disposition() {
            Some(cd) => (
                cd.get_name().map(str::to_owned),
                cd.get_filename().map(str::to_owned),
            ),
            None => (None, None),
        };

        let wanted = upload.is_none() && name.as_deref() == Some(UPLOAD_FIELD);
        let filename = match filename {
            Some(filename) if wanted => filename,
            _ => {
                // Not ours: drain it so the stream can advance
                while let Some(chunk) = field.next().await {
                    chunk.map_err(|e| AppError::BadRequest(format!("Chunk error: {}", e)))?;
                }
                continue;
            }
        };

        let mut bytes = Vec::new();
        while let Some(chunk) = field.next().await {
            let chunk = chunk.map_err(|e| AppError::BadRequest(format!("Chunk error: {}", e)))?;
            if bytes.len() + chunk.len() > max_bytes {
                return Err(AppError::BadRequest(format!(
                    "File too large (max: {} bytes)",
                    max_bytes
                )));
            }
            bytes.extend_from_slice(&chunk);
        }

        upload = Some(Upload { filename, bytes });
    }

    upload.ok_or_else(|| AppError::BadRequest("No audio file provided".to_string()))
}
