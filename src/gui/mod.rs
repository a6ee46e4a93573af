pub mod application;
pub mod executor;
pub mod types;
