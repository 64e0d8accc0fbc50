//! Small shared utilities

pub mod base64;
