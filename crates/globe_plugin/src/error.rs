//! Central error type for the tile engine.
//!
//! Only genuinely fatal or caller-visible failures become errors. Expected
//! outcomes along the hot paths (missing tile on disk, cache miss, ray miss)
//! are expressed as `Option`s or discriminated results instead.

/// Errors surfaced by dataset access and cache admission.
#[derive(thiserror::Error, Debug)]
pub enum GlobeError {
  #[error("i/o error: {0}")]
  Io(#[from] std::io::Error),

  #[error("format error: {0}")]
  Format(String),

  /// No stream buffer satisfies the eviction rule this frame. The request
  /// fails; nothing needed by the current frame is ever evicted.
  #[error("cache saturated: no stream buffer available")]
  CacheSaturated,

  /// A patch root could not be made resident at startup. Fatal.
  #[error("root load failed for patch {patch}: {reason}")]
  RootLoad { patch: u8, reason: String },
}

impl GlobeError {
  pub fn format<T: ToString>(msg: T) -> Self {
    GlobeError::Format(msg.to_string())
  }

  pub fn root_load<T: ToString>(patch: u8, reason: T) -> Self {
    GlobeError::RootLoad {
      patch,
      reason: reason.to_string(),
    }
  }
}

pub type Result<T> = std::result::Result<T, GlobeError>;
