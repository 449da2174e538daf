pub mod config;
pub mod db;
pub mod library;
pub mod models;
pub mod parser;
pub mod render;
pub mod sync;
