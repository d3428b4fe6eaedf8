use thiserror::Error;

use crate::config::ConfigError;
use crate::source::TransportError;
use crate::stages::StageTableError;

/// Errors surfaced by the stagewatch core crate
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    StageTable(#[from] StageTableError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Transport(#[from] TransportError),
}

pub type Result<T> = core::result::Result<T, Error>;
