mod handler;
mod scheduler;
mod space;

pub use handler::DataNodeHandler;
pub use space::Space;
pub use space::SpaceError;

pub(crate) use scheduler::start_ec_scheduler;
pub(crate) use scheduler::start_partition_scheduler;
