//! File-backed session storage.
//!
//! Layout under the base directory:
//! - `sessions/<identifier>.json` - one record per session
//! - `logs/<identifier>.log` - append-only output log

mod error;
mod sessions;

pub use error::StoreError;
pub use sessions::SessionStore;
