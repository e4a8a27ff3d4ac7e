// Frameworks: process bootstrap and env-backed configuration.

pub mod client;
pub mod config;
