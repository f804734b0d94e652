mod sqlite;

pub use sqlite::{Store, StoreError};
