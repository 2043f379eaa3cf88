//! SQLite persistence helpers shared by the stores.

mod versioned_schema;

pub use versioned_schema::{
    open_in_memory, open_versioned, Table, VersionedSchema, BASE_DB_VERSION,
};
