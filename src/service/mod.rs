//! RecordService: validated CRUD over a `RecordStore`.

mod crud;
mod validation;
pub use crud::{RecordService, UpdateMode};
pub use validation::RecordValidator;
