use application::ApplicationError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

/// 错误响应的信封格式
///
/// 查询接口返回 `{"error": "error", "message": ...}`，
/// 写入接口返回 `{"result": "error", "message": ...}`。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Envelope {
    Read,
    Write,
}

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    envelope: Envelope,
    message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, envelope: Envelope, message: impl Into<String>) -> Self {
        Self {
            status,
            envelope,
            message: message.into(),
        }
    }

    /// 查询接口的错误
    pub fn read(error: ApplicationError) -> Self {
        Self::from_application(error, Envelope::Read)
    }

    /// 写入接口的错误
    pub fn write(error: ApplicationError) -> Self {
        Self::from_application(error, Envelope::Write)
    }

    /// 请求提取失败（请求体、路径或查询参数格式错误）
    pub fn rejected(envelope: Envelope, message: impl Into<String>) -> Self {
        ApiError::new(StatusCode::BAD_REQUEST, envelope, message)
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    fn from_application(error: ApplicationError, envelope: Envelope) -> Self {
        use application::ApplicationError as AppErr;
        use domain::{DomainError, RepositoryError};

        match error {
            AppErr::Domain(DomainError::ValidationError { field, message }) => ApiError::new(
                StatusCode::BAD_REQUEST,
                envelope,
                format!("{}: {}", field, message),
            ),
            AppErr::Domain(DomainError::ResourceAlreadyExists { .. })
            | AppErr::Repository(RepositoryError::Conflict) => ApiError::new(
                StatusCode::CONFLICT,
                envelope,
                "a node with this name already exists",
            ),
            AppErr::Domain(DomainError::ResourceNotFound { .. })
            | AppErr::Repository(RepositoryError::NotFound) => {
                ApiError::new(StatusCode::NOT_FOUND, envelope, "node not found")
            }
            AppErr::Repository(RepositoryError::InvalidReference { message }) => {
                ApiError::new(StatusCode::BAD_REQUEST, envelope, message)
            }
            AppErr::Repository(RepositoryError::Storage { kind, message }) => {
                tracing::error!(kind = %kind, error = %message, "storage failure");
                ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, envelope, kind)
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = match self.envelope {
            Envelope::Read => json!({ "error": "error", "message": self.message }),
            Envelope::Write => json!({ "result": "error", "message": self.message }),
        };
        (self.status, Json(body)).into_response()
    }
}
