//! Datasource - a backend-agnostic SQL execution layer.
//!
//! This library exposes the core modules for applications and integration
//! tests.

pub mod config;
pub mod db;
pub mod error;
pub mod logging;
pub mod stopwords;
