//! Core relay logic for Ferry.
//!
//! This crate has no database or web-framework dependencies. The credential
//! store is a trait implemented by the db crate; blob destinations and the
//! local staging area are implemented here.
//!
//! # Modules
//!
//! - `credential` - Tenant credential records, store traits and API keys
//! - `staging` - Local staging area for inbound payloads
//! - `blob` - Upload clients for Cloudinary and S3-compatible storage
//! - `relay` - Concurrent upload orchestration under one deadline

pub mod blob;
pub mod credential;
pub mod relay;
pub mod staging;
