//! Integration tests for the datasource managers.

pub mod embedded_test;
pub mod generic_test;
pub mod stopwords_test;
