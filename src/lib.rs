pub mod config;
pub mod global;
pub mod http;
pub mod news;
pub mod scheduler;
pub mod sources;
