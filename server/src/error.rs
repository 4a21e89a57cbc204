use shared::PlayerId;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("player {0} is already registered")]
    DuplicatePlayer(PlayerId),
}

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("socket error: {0}")]
    Io(#[from] std::io::Error),
    #[error("packet encoding error: {0}")]
    Codec(#[from] bincode::Error),
}
