pub mod drive;
pub mod folder_ref;
pub mod image_probe;
pub mod orchestrator;
pub mod queue;
pub mod status;
pub mod storage;
pub mod worker_pool;
