use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use crm_core::errors::CrmError;

#[derive(Debug)]
pub struct CrmAxumError(pub anyhow::Error);

impl From<anyhow::Error> for CrmAxumError {
    fn from(e: anyhow::Error) -> Self {
        Self(e)
    }
}

impl From<CrmError> for CrmAxumError {
    fn from(e: CrmError) -> Self {
        Self(e.into_anyhow())
    }
}

impl IntoResponse for CrmAxumError {
    fn into_response(self) -> Response {
        // CrmError and policy denials keep their status; anything else is a GeneralError
        let err = CrmError::normalize(self.0);
        if err.code() >= 500 {
            tracing::error!(error = %err, source = ?err.source, "request failed");
        }

        let safe = err.sanitize_for_client();
        let status =
            StatusCode::from_u16(safe.code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(safe.to_json())).into_response()
    }
}
