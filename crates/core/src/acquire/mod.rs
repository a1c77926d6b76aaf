//! Acquisition: search a book, pick a candidate, dispatch it, import it.

mod acquirer;
mod types;

pub use acquirer::Acquirer;
pub use types::{AcquireError, AcquireOutcome, AcquireSettings};
