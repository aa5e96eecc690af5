//! Filesystem-backed hierarchical resource store.
//!
//! Every Nimbus service persists its resources through a
//! [`ServiceStorage`] instead of hand-rolling file I/O. Documents are
//! JSON, laid out so the directory tree mirrors the resource
//! hierarchy and the whole emulator state can be inspected (or reset)
//! with ordinary filesystem tools:
//!
//! ```text
//! <root>/<service>/<resource>/metadata.json
//! <root>/<service>/<resource>/data/                      (blob area)
//! <root>/<service>/<resource>/<subresourceType>/<subresource>/metadata.json
//! ```
//!
//! All operations are synchronous filesystem calls; callers hosted on
//! an async runtime run them on the blocking pool. The store does not
//! serialize concurrent writers itself — control planes wrap each
//! read-modify-write sequence in [`ServiceStorage::write_lock`].

mod store;

pub use store::{ServiceStorage, StoreError};
