//! Repository traits for metadata operations.

pub mod accounts;
pub mod files;

pub use accounts::AccountRepo;
pub use files::FileRepo;
