use thiserror::Error;

use lumen_resources::SceneError;
use lumen_rhi::RhiError;

/// Errors raised while setting up or running the renderer.
#[derive(Error, Debug)]
pub enum RendererError {
    #[error(transparent)]
    Rhi(#[from] RhiError),

    #[error("invalid scene: {0}")]
    Scene(#[from] SceneError),

    #[error(transparent)]
    Platform(#[from] lumen_core::Error),
}

pub type RendererResult<T> = std::result::Result<T, RendererError>;
