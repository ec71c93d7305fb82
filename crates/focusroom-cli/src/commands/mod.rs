pub mod config;
mod lease;
pub mod stats;
pub mod timer;
