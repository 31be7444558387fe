//! Stock fill upload handler

use axum::{
    extract::{Multipart, State},
    http::{header, HeaderName},
    response::{IntoResponse, Response},
};
use shared::{FillRequest, DEFAULT_OUTPUT_NAME};
use validator::Validate;

use crate::error::{AppError, AppResult};
use crate::services::{stock_fill::FillInputs, StockFillService};
use crate::AppState;

pub const XLSX_CONTENT_TYPE: &str =
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";

/// Response header carrying the run summary as JSON
pub const FILL_SUMMARY_HEADER: HeaderName = HeaderName::from_static("x-fill-summary");

/// Fill the uploaded template from the uploaded reports.
///
/// Multipart fields: `template`, `report` and `damages` (files), and the
/// optional text fields `output_name` and `seed`.
pub async fn fill_stock_template(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> AppResult<Response> {
    let mut template = None;
    let mut report = None;
    let mut damages = None;
    let mut output_name = None;
    let mut seed = None;

    while let Some(field) = multipart.next_field().await? {
        let Some(name) = field.name().map(str::to_string) else {
            continue;
        };
        match name.as_str() {
            "template" => template = non_empty(field.bytes().await?.to_vec()),
            "report" => report = non_empty(field.bytes().await?.to_vec()),
            "damages" => damages = non_empty(field.bytes().await?.to_vec()),
            "output_name" => output_name = Some(field.text().await?),
            "seed" => seed = parse_seed(&field.text().await?)?,
            other => tracing::debug!(field = %other, "ignoring unknown upload field"),
        }
    }

    let template = template.ok_or(AppError::MissingFile("template"))?;
    let movement_report = report.ok_or(AppError::MissingFile("report"))?;
    let damages_report = damages.ok_or(AppError::MissingFile("damages"))?;

    let request = FillRequest {
        output_name: output_name
            .filter(|name| !name.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_OUTPUT_NAME.to_string()),
        seed,
    };
    request.validate()?;

    tracing::info!(
        template_bytes = template.len(),
        report_bytes = movement_report.len(),
        damages_bytes = damages_report.len(),
        output_name = %request.output_name,
        "stock fill requested"
    );

    let service = StockFillService::new(state.config.fill.clone());
    let inputs = FillInputs {
        template,
        movement_report,
        damages_report,
        request,
    };
    let output = tokio::task::spawn_blocking(move || service.fill(&inputs))
        .await
        .map_err(|err| AppError::Internal(format!("fill task failed: {err}")))??;

    let summary = serde_json::to_string(&output.summary)
        .map_err(|err| AppError::Internal(err.to_string()))?;
    let disposition = format!("attachment; filename=\"{}\"", output.file_name);

    Ok((
        [
            (header::CONTENT_TYPE, XLSX_CONTENT_TYPE.to_string()),
            (header::CONTENT_DISPOSITION, disposition),
            (FILL_SUMMARY_HEADER, summary),
        ],
        output.bytes,
    )
        .into_response())
}

fn non_empty(bytes: Vec<u8>) -> Option<Vec<u8>> {
    (!bytes.is_empty()).then_some(bytes)
}

fn parse_seed(raw: &str) -> AppResult<Option<u64>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(None);
    }
    raw.parse().map(Some).map_err(|_| AppError::Validation {
        field: "seed".to_string(),
        message: "Seed must be a non-negative integer".to_string(),
    })
}
