//! Job pipeline logic and the collaborator seams it depends on.

pub mod document;
pub mod error;
pub mod generation;
pub mod images;
pub mod jobs;
pub mod publish;
pub mod repos;
