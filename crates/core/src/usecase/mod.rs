pub mod controller_handle;
pub mod task_controller;

pub use controller_handle::ControllerHandle;
pub use task_controller::TaskController;
