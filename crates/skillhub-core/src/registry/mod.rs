//! Registry boundary: wire types, client trait, and HTTP implementation.

pub mod client;
pub mod http;
pub mod schema;

pub use client::{Registry, with_retry};
pub use http::HttpRegistry;
pub use schema::{
    ManifestFile, PublishReceipt, PublishRequest, RemoteFile, RemoteVersionRef, SearchHit,
    UploadSlot, UploadTarget, VersionSelector,
};
