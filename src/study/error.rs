use thiserror::Error;

#[derive(Debug, Error)]
pub enum StudyError {
    #[error("completion request failed: {0}")]
    Transport(#[from] chatgpt::err::Error),
    #[error("completion service error: {0}")]
    Service(String),
    #[error("model response is not valid JSON: {0}")]
    MalformedResponse(String),
    #[error("model response does not match the quiz schema: {0}")]
    SchemaViolation(String),
    /// A free-form reply (summary, explanation or chat) that came back blank.
    #[error("model returned an empty {0}")]
    EmptyReply(String),
    #[error("{0}")]
    Input(String),
}

pub type StudyResult<T> = Result<T, StudyError>;

impl StudyError {
    /// Whether re-issuing the same completion could succeed.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, StudyError::Input(_))
    }

    /// Text shown to the learner. The session stays usable after any of these.
    pub fn user_message(&self) -> String {
        match self {
            StudyError::Transport(_) | StudyError::Service(_) => {
                "Genie could not reach the study service right now 🍃 Please try the same action again in a moment.".to_string()
            }
            StudyError::MalformedResponse(_) | StudyError::SchemaViolation(_) => {
                "Could not generate a structured quiz; try again.".to_string()
            }
            StudyError::EmptyReply(_) => {
                "Genie came back empty-handed this time 🍃 Please try again.".to_string()
            }
            StudyError::Input(reason) => reason.clone(),
        }
    }
}
