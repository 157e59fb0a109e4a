//! Infrastructure adapters and runtime bootstrap.

pub mod db;
pub mod error;
pub mod ghost;
pub mod github;
pub mod integrations;
pub mod openai;
pub mod shutdown;
pub mod telemetry;
