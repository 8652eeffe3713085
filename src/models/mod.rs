pub mod asset;
pub mod import;
pub mod job;
