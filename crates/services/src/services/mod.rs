pub mod clock;
pub mod config;
pub mod descriptor_source;
pub mod navigator;
pub mod prompt;
pub mod storage;
pub mod update_executor;
pub mod update_reconciler;
pub mod version_descriptor;
pub mod visibility;
