//! Durable chat sessions with ordered message history.
//!
//! [`storage::Storage`] is the entry point: build one with
//! [`storage::create_backend`] from a [`config::TanyaConfig`] and drive it
//! through [`storage::StorageBackend`]. [`chat`] and [`transfer`] sit on top
//! of any backend.

pub mod chat;
pub mod config;
pub mod error;
pub mod model;
pub mod storage;
pub mod transfer;
