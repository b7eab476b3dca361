// Public API for integration tests and potential library usage

pub mod config;
pub mod persist;
pub mod protocol;
pub mod registry;
pub mod state;
pub mod token;
pub mod types;
pub mod ws;
