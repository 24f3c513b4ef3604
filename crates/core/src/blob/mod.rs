//! Blob upload clients for tenant destinations.
//!
//! Supported destinations:
//! - Cloudinary (signed multipart upload over HTTPS)
//! - S3-compatible object storage via Apache OpenDAL
//!
//! `DestinationUploader` picks the client matching the destination's provider.

mod cloudinary;
mod error;
mod object_store;
mod uploader;

pub use cloudinary::CloudinaryUploader;
pub use error::BlobError;
pub use object_store::ObjectStoreUploader;
pub use uploader::{BlobUploader, DestinationUploader};
