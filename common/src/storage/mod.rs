pub mod archive;
pub mod db;
pub mod graph;
pub mod mapping;
pub mod store;
pub mod types;
