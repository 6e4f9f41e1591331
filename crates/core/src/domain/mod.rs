pub mod error;
pub mod event;
pub mod install;
pub mod job;
pub mod settings;
pub mod snapshot;
pub mod task;
