//! Core functionality: configuration, the document model and persisted storage

pub mod config;
pub mod document;
pub mod storage;
pub mod validator;
