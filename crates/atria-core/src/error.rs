//! Error types for the ATRIA scheduler.

use thiserror::Error;

/// Result type for scheduler operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors reported by the scheduler.
///
/// Unschedulable links are not errors: they resolve to
/// [`CellCoord::UNSCHEDULABLE`](crate::CellCoord::UNSCHEDULABLE).
#[derive(Debug, Error)]
pub enum Error {
    /// The configuration cannot describe a usable slotframe.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// The host MAC rejected a slotframe or cell operation.
    #[error("host MAC error: {0}")]
    Host(String),

    /// An event arrived before the rule was initialized.
    #[error("unicast rule used before init")]
    NotInitialized,
}
