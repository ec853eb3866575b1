use axum::http::StatusCode;

use crate::models::Identifier;

pub type StoryResult<T> = Result<T, StoryError>;

/// Every way a story request can fail. The first error aborts the request.
#[derive(Debug, thiserror::Error)]
pub enum StoryError {
    #[error("Description unavailable for image '{reference}': {reason}")]
    DescriptionUnavailable { reference: String, reason: String },

    #[error("Story generation unavailable: {0}")]
    GenerationUnavailable(String),

    #[error("Story generation returned malformed output: {0}")]
    MalformedGenerationOutput(String),

    #[error("Could not resolve profile for user {user_id}: {reason}")]
    ProfileResolutionFailure { user_id: Identifier, reason: String },

    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl StoryError {
    pub fn description_unavailable(reference: &str, reason: impl Into<String>) -> Self {
        StoryError::DescriptionUnavailable {
            reference: reference.to_string(),
            reason: reason.into(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            StoryError::DescriptionUnavailable { .. } => "description_unavailable",
            StoryError::GenerationUnavailable(_) => "generation_unavailable",
            StoryError::MalformedGenerationOutput(_) => "malformed_generation_output",
            StoryError::ProfileResolutionFailure { .. } => "profile_resolution_failure",
            StoryError::InvalidRequest(_) => "invalid_request",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            StoryError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_invalid_requests_are_client_errors() {
        let errors = [
            StoryError::description_unavailable("a.jpg", "timeout"),
            StoryError::GenerationUnavailable("connect refused".into()),
            StoryError::MalformedGenerationOutput("not an array".into()),
            StoryError::ProfileResolutionFailure {
                user_id: Identifier::Int(7),
                reason: "db locked".into(),
            },
        ];
        for error in &errors {
            assert_eq!(error.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        }
        assert_eq!(
            StoryError::InvalidRequest("duplicate id".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn messages_name_the_failing_image() {
        let error = StoryError::description_unavailable("b.jpg", "status 503");
        assert_eq!(
            error.to_string(),
            "Description unavailable for image 'b.jpg': status 503"
        );
    }
}
