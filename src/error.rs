use thiserror::Error;

/// Errors coming back from the REST API.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Non-2xx response. `message` is the body's `error` field when the server sent one.
    #[error("request failed ({status}): {message}")]
    Request { status: u16, message: String },

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// 2xx response whose body does not have the expected shape.
    #[error("unexpected response body: {0}")]
    Decode(#[from] serde_json::Error),
}

impl ApiError {
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Request { status, .. } => Some(*status),
            ApiError::Http(e) => e.status().map(|s| s.as_u16()),
            ApiError::Decode(_) => None,
        }
    }
}

/// Problems on the push socket. None of these are fatal; they are logged and broadcast.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum TransportError {
    #[error("dropped malformed push frame: {0}")]
    Parse(String),

    #[error("push connection error: {0}")]
    Connection(String),
}

#[derive(Debug, Error)]
pub enum ChatError {
    #[error(transparent)]
    Api(#[from] ApiError),

    #[error("no active conversation")]
    NoActiveConversation,

    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("encoding error: {0}")]
    Encode(#[from] serde_json::Error),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("no config directory available")]
    NoConfigDir,

    #[error("config io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("could not serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("invalid url in config: {0}")]
    Url(#[from] url::ParseError),
}
