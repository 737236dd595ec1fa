use posture_vision::ChannelError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LinkError {
    #[error("alert endpoint {url} answered {status}")]
    Status { url: String, status: reqwest::StatusCode },

    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },
}

impl From<LinkError> for ChannelError {
    fn from(err: LinkError) -> Self {
        ChannelError::Delivery(err.to_string())
    }
}
