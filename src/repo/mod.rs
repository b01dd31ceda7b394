pub mod config_file;

pub use config_file::ConfigRepository;
