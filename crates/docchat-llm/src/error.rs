/// Errors from language-model calls.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("API request failed: {message}")]
    ApiRequest { message: String },

    #[error("API response parse error: {message}")]
    ResponseParse { message: String },

    #[error("Streaming error: {message}")]
    Streaming { message: String },

    #[error("Request timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    #[error("Provider connection failed: {message}")]
    Connection { message: String },

    #[error("Model returned an empty response")]
    EmptyResponse,
}

impl LlmError {
    pub(crate) fn from_reqwest(e: reqwest::Error) -> Self {
        if e.is_connect() {
            LlmError::Connection { message: e.to_string() }
        } else if e.is_decode() {
            LlmError::ResponseParse { message: e.to_string() }
        } else {
            LlmError::ApiRequest { message: e.to_string() }
        }
    }
}
