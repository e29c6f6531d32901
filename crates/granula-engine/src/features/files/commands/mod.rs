//! File commands

pub mod register;

pub use register::{RegisterUploadCommand, RegisterUploadResponse};
