use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use services::services::{
    accounting::AccountingError, chat_report::ChatError, documents::DocumentError,
    formation_dates::FormationDateError, leads::LeadError, llm::LlmError,
    messaging::MessagingError, planning::PlanningError,
};
use thiserror::Error;
use utils::response::ApiResponse;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Database(#[from] sqlx::Error),
    #[error(transparent)]
    Lead(#[from] LeadError),
    #[error(transparent)]
    Accounting(#[from] AccountingError),
    #[error(transparent)]
    Planning(#[from] PlanningError),
    #[error(transparent)]
    FormationDate(#[from] FormationDateError),
    #[error(transparent)]
    Messaging(#[from] MessagingError),
    #[error(transparent)]
    Chat(#[from] ChatError),
    #[error(transparent)]
    Document(#[from] DocumentError),
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    NotFound(String),
}

fn database_status(e: &sqlx::Error) -> StatusCode {
    match e {
        sqlx::Error::RowNotFound => StatusCode::NOT_FOUND,
        sqlx::Error::Database(db) if db.is_unique_violation() => StatusCode::CONFLICT,
        sqlx::Error::Database(db) if db.is_foreign_key_violation() || db.is_check_violation() => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Database(e) => database_status(e),
            ApiError::Lead(e) => match e {
                LeadError::Database(e) => database_status(e),
                LeadError::NotFound => StatusCode::NOT_FOUND,
                LeadError::CloserNotFound
                | LeadError::NotACloser(_)
                | LeadError::PriceBelowPaid { .. } => {
                    StatusCode::UNPROCESSABLE_ENTITY
                }
                LeadError::Validation(_) => StatusCode::BAD_REQUEST,
            },
            ApiError::Accounting(e) => match e {
                AccountingError::Database(e) => database_status(e),
                AccountingError::LeadNotFound | AccountingError::EntryNotFound => {
                    StatusCode::NOT_FOUND
                }
                AccountingError::FixedPriceRequired(_) | AccountingError::ExceedsFixedPrice { .. } => {
                    StatusCode::UNPROCESSABLE_ENTITY
                }
                AccountingError::EntryLocked => StatusCode::CONFLICT,
                AccountingError::InvalidAmount(_) => StatusCode::BAD_REQUEST,
            },
            ApiError::Planning(e) => match e {
                PlanningError::Database(e) => database_status(e),
                PlanningError::InvalidDates(_) | PlanningError::Validation(_) => {
                    StatusCode::BAD_REQUEST
                }
                PlanningError::NotFound | PlanningError::LeadNotFound => StatusCode::NOT_FOUND,
            },
            ApiError::FormationDate(_) => StatusCode::BAD_REQUEST,
            ApiError::Messaging(e) => match e {
                MessagingError::Database(e) => database_status(e),
                MessagingError::LeadNotFound => StatusCode::NOT_FOUND,
                MessagingError::ChannelNotConfigured(_) => StatusCode::SERVICE_UNAVAILABLE,
                MessagingError::NoRecipient(_) => StatusCode::UNPROCESSABLE_ENTITY,
                MessagingError::Validation(_) => StatusCode::BAD_REQUEST,
                MessagingError::Delivery(_) => StatusCode::BAD_GATEWAY,
            },
            ApiError::Chat(e) => match e {
                ChatError::NotConfigured => StatusCode::SERVICE_UNAVAILABLE,
                ChatError::Validation(_) => StatusCode::BAD_REQUEST,
                ChatError::Database(e) => database_status(e),
                ChatError::Llm(LlmError::RateLimited) => StatusCode::TOO_MANY_REQUESTS,
                ChatError::Llm(_) => StatusCode::BAD_GATEWAY,
            },
            ApiError::Document(e) => match e {
                DocumentError::LeadNotFound => StatusCode::NOT_FOUND,
                DocumentError::NoSession(_) => StatusCode::UNPROCESSABLE_ENTITY,
                DocumentError::Database(e) => database_status(e),
                DocumentError::Pdf(_) | DocumentError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
        }
    }

    /// Message sent to the client. Server-side failures get a generic text.
    fn client_message(&self, status: StatusCode) -> String {
        match status {
            StatusCode::CONFLICT if matches!(self, ApiError::Database(_)) => {
                "A record with the same unique value already exists".to_string()
            }
            s if s.is_server_error() && s != StatusCode::SERVICE_UNAVAILABLE && s != StatusCode::BAD_GATEWAY => {
                "Internal server error".to_string()
            }
            _ => self.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(status = status.as_u16(), error = %self, "Request failed");
        } else {
            tracing::debug!(status = status.as_u16(), error = %self, "Request rejected");
        }

        let message = self.client_message(status);
        (status, Json(ApiResponse::<()>::error(&message))).into_response()
    }
}
