//! Placement error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PlacementError {
    #[error("malformed cluster reference: {0}")]
    MalformedName(String),

    #[error("placement expression resolved to no clusters")]
    Unresolved,

    #[error("cluster catalog error: {0}")]
    Catalog(#[from] orbit_state::StateError),
}

pub type PlacementResult<T> = Result<T, PlacementError>;
