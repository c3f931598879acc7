use axum::{
    Router,
    extract::{Path, State},
    http::{HeaderValue, header},
    response::{IntoResponse, Response},
    routing::get,
};
use db::models::activity_log::ActivityEntity;
use deployment::Deployment;
use serde_json::json;
use services::services::documents::DocumentKind;
use uuid::Uuid;

use crate::{DeploymentImpl, error::ApiError};

fn content_disposition(file_name: &str) -> Result<HeaderValue, ApiError> {
    HeaderValue::from_str(&format!("attachment; filename=\"{file_name}\""))
        .map_err(|_| ApiError::BadRequest(format!("invalid file name: {file_name}")))
}

/// Streams a freshly rendered PDF for the lead
pub async fn download_document(
    State(deployment): State<DeploymentImpl>,
    Path((lead_id, kind)): Path<(Uuid, String)>,
) -> Result<Response, ApiError> {
    let kind: DocumentKind = kind
        .parse()
        .map_err(|_| ApiError::BadRequest(format!("unknown document kind: {kind}")))?;

    let (file_name, bytes) = deployment.documents().generate(lead_id, kind).await?;

    deployment
        .record_activity(
            ActivityEntity::Document,
            Some(lead_id),
            "generated",
            json!({ "kind": kind.to_string(), "file_name": file_name, "size": bytes.len() }),
        )
        .await;

    Ok((
        [
            (header::CONTENT_TYPE, HeaderValue::from_static("application/pdf")),
            (header::CONTENT_DISPOSITION, content_disposition(&file_name)?),
        ],
        bytes,
    )
        .into_response())
}

pub fn router(_deployment: &DeploymentImpl) -> Router<DeploymentImpl> {
    Router::new().route("/leads/{lead_id}/documents/{kind}", get(download_document))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attachment_header_quotes_the_name() {
        let value = content_disposition("facture-dupont-elodie.pdf").unwrap();
        assert_eq!(
            value.to_str().unwrap(),
            "attachment; filename=\"facture-dupont-elodie.pdf\""
        );
    }

    #[test]
    fn header_rejects_control_characters() {
        assert!(content_disposition("bad\nname.pdf").is_err());
    }
}
