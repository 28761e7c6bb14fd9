use thiserror::Error;

#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("http error: {0}")]
    Http(String),

    #[error("gateway API error (status {status_code}): {message}")]
    Api { status_code: u16, message: String },

    #[error("parse error: {0}")]
    Parse(String),

    #[error("webhook signature verification failed")]
    WebhookVerificationFailed,
}

impl GatewayError {
    /// 4xx responses: the request itself is wrong, retrying won't help.
    pub fn is_client_error(&self) -> bool {
        matches!(self, GatewayError::Api { status_code, .. } if (400..500).contains(status_code))
    }

    /// 5xx and transport failures: recoverable, the next poll retries.
    pub fn is_retryable(&self) -> bool {
        matches!(self, GatewayError::Http(_))
            || matches!(self, GatewayError::Api { status_code, .. } if (500..600).contains(status_code))
    }
}
