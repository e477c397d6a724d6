use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("{0} not found! Did you create the .env file?")]
    MissingCredential(&'static str),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Provider error: {0}")]
    Provider(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
