use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::Json;
use divel_ledger::ValidationResult;
use divel_types::{
    AppendReceipt, CaseId, EvidenceId, EvidenceSubmission, FileType, FingerprintRecord,
    UploaderRole,
};
use divel_verify::VerificationVerdict;
use serde_json::{json, Value};
use tracing::info;

use crate::error::{ServerError, ServerResult};
use crate::state::AppState;

pub const FILE_TYPE_HEADER: &str = "x-file-type";
pub const UPLOADER_ROLE_HEADER: &str = "x-uploader-role";

fn header<'a>(headers: &'a HeaderMap, name: &str) -> ServerResult<Option<&'a str>> {
    headers
        .get(name)
        .map(|v| {
            v.to_str()
                .map(str::trim)
                .map_err(|_| ServerError::BadRequest(format!("{name} is not valid text")))
        })
        .transpose()
}

/// Accepts either a tag name (`video`) or a MIME type (`video/mp4`).
fn parse_file_type(value: &str) -> FileType {
    if value.contains('/') {
        FileType::from_mime(value)
    } else {
        value.parse().unwrap_or(FileType::Other)
    }
}

/// Health check handler.
pub async fn health_handler(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "backend": state.ledger.backend_name(),
        "hash_algorithm": state.fingerprinter.algorithm(),
    }))
}

/// Fingerprint the request body and ledger it under the case.
pub async fn append_handler(
    State(state): State<AppState>,
    Path((case_id, evidence_id)): Path<(String, String)>,
    headers: HeaderMap,
    body: Bytes,
) -> ServerResult<(StatusCode, Json<AppendReceipt>)> {
    let case_id = CaseId::new(case_id)?;
    let evidence_id = EvidenceId::new(evidence_id)?;
    let file_type = header(&headers, FILE_TYPE_HEADER)?
        .map(parse_file_type)
        .unwrap_or(FileType::Other);
    let uploader_role = header(&headers, UPLOADER_ROLE_HEADER)?
        .filter(|role| !role.is_empty())
        .map(UploaderRole::from)
        .ok_or_else(|| ServerError::BadRequest(format!("missing {UPLOADER_ROLE_HEADER} header")))?;

    let hash = state.fingerprinter.fingerprint(&body);
    let receipt = state
        .ledger
        .append(EvidenceSubmission::new(
            case_id,
            evidence_id,
            hash,
            file_type,
            uploader_role,
        ))
        .await?;

    info!(
        case = %receipt.case_id,
        evidence = %receipt.evidence_id,
        sequence = receipt.sequence,
        bytes = body.len(),
        provenance = %receipt.provenance,
        "evidence ledgered"
    );
    Ok((StatusCode::CREATED, Json(receipt)))
}

pub async fn get_record_handler(
    State(state): State<AppState>,
    Path(evidence_id): Path<String>,
) -> ServerResult<Json<FingerprintRecord>> {
    let evidence_id = EvidenceId::new(evidence_id)?;
    Ok(Json(state.ledger.get(&evidence_id).await?))
}

/// Verify the request body against the ledger. Every verdict is a 200.
pub async fn verify_handler(
    State(state): State<AppState>,
    Path(evidence_id): Path<String>,
    body: Bytes,
) -> ServerResult<Json<VerificationVerdict>> {
    let evidence_id = EvidenceId::new(evidence_id)?;
    Ok(Json(state.verifier.verify_bytes(&evidence_id, &body).await?))
}

pub async fn chain_handler(
    State(state): State<AppState>,
    Path(case_id): Path<String>,
) -> ServerResult<Json<Vec<FingerprintRecord>>> {
    let case_id = CaseId::new(case_id)?;
    Ok(Json(state.ledger.chain(&case_id).await?))
}

pub async fn validate_handler(
    State(state): State<AppState>,
    Path(case_id): Path<String>,
) -> ServerResult<Json<ValidationResult>> {
    let case_id = CaseId::new(case_id)?;
    Ok(Json(state.custody.validate(&case_id).await?))
}
