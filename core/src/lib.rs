pub mod aggregate;
pub mod conversion;
pub mod db;
pub mod error;
pub mod models;
pub mod scale;
pub mod service;
