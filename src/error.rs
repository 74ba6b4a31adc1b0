pub type Result<T> = std::result::Result<T, Error>;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] crate::config::Error),

    #[error("Assembly error: {0}")]
    Graph(#[from] crate::graph::Error),

    #[error("Write error: {0}")]
    Writer(#[from] crate::writer::Error),

    #[error("Deployment error: {0}")]
    Deploy(#[from] crate::deploy::Error),

    #[error("{0}")]
    Refused(String),
}
