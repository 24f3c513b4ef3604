//! `SeaORM` entity definitions.

pub mod tenants;
pub mod upload_destinations;
