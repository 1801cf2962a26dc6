//! Hotel records: schema-validated CRUD over JSON records (people, menu items) with an HTTP API.

pub mod config;
pub mod error;
pub mod response;
pub mod state;
pub mod store;
pub mod service;
pub mod handlers;
pub mod routes;

pub use config::{builtin, load_from_path, resolve, FullConfig, ResolvedCollection, ResolvedModel, Settings, StoreBackend};
pub use error::{AppError, ConfigError, Violation};
pub use routes::{app, common_routes, record_routes};
pub use service::{RecordService, RecordValidator, UpdateMode};
pub use state::AppState;
pub use store::{ensure_database_exists, Filter, MemoryStore, PgStore, Record, RecordStore};
