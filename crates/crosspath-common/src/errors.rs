//! Error taxonomy shared across the workspace.
//!
//! Not-found is not an error anywhere in this system — repository lookups
//! return `Ok(None)` so callers can route it as a valid outcome. Only
//! transport failures and lost CAS races are errors.

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The backing store could not be reached or refused the operation.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// A versioned write lost a race with a concurrent writer.
    #[error("conflicting write: {0}")]
    Conflict(String),
}
