pub mod api;
pub mod balance;
pub mod config;
pub mod domain;
pub mod error;
pub mod meter;
pub mod readings;
pub mod repo;
pub mod scanner;
pub mod telemetry;
