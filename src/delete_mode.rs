//! Resolution of API delete modes to data store deletion policies.

use thiserror::Error;

use crate::datastore::DeleteBundleMode;
use crate::types::DeleteMode;

/// The requested delete mode is not one this service knows.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("unhandled delete mode \"{0}\"")]
pub struct DeleteModeError(pub i32);

impl TryFrom<i32> for DeleteMode {
    type Error = DeleteModeError;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Restrict),
            1 => Ok(Self::Dissociate),
            2 => Ok(Self::Delete),
            other => Err(DeleteModeError(other)),
        }
    }
}

impl From<DeleteMode> for DeleteBundleMode {
    fn from(mode: DeleteMode) -> Self {
        match mode {
            DeleteMode::Restrict => Self::Restrict,
            DeleteMode::Dissociate => Self::Dissociate,
            DeleteMode::Delete => Self::Delete,
        }
    }
}

/// Maps the wire value of a [`DeleteMode`] to the data store policy.
///
/// # Errors
///
/// Returns [`DeleteModeError`] for any value other than `RESTRICT`, `DISSOCIATE` or
/// `DELETE`.
pub fn parse_delete_mode(mode: i32) -> Result<DeleteBundleMode, DeleteModeError> {
    DeleteMode::try_from(mode).map(DeleteBundleMode::from)
}
