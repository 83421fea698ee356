pub mod analysis;
pub mod audio;
pub mod cli;
pub mod config;
pub mod store;
pub mod types;
