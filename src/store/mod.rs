//! Storage: the catalog entity, the SQLite engine, and the repository façade.

pub mod db;
pub mod entry;
pub mod repository;
