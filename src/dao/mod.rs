/// Movie metadata lookups.
pub mod metadata;
/// Database model definitions.
pub mod models;
/// Session, title and status persistence.
pub mod session_store;
/// Backend-neutral storage errors.
pub mod storage;
