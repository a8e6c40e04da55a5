//! Common library for the notable application
//!
//! This crate provides shared functionality used across the auth and api
//! services, including database connectivity, the Redis cache handle, and
//! the shared error taxonomy.

pub mod cache;
pub mod database;
pub mod error;
