use thiserror::Error;

#[derive(Error, Debug)]
pub enum SnagError {
    #[error("API error: {0}")]
    Api(String),

    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("No open issue in the loaded list")]
    NoOpenIssue,

    #[error("No issues loaded yet")]
    NoPaging,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<reqwest::Error> for SnagError {
    fn from(err: reqwest::Error) -> Self {
        SnagError::Api(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, SnagError>;
