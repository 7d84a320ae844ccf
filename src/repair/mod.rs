mod engine;
mod task;

pub use engine::RepairEngine;
pub use engine::RepairError;
pub use engine::RepairOutcome;
pub use task::compute_repair_tasks;
pub use task::ExtentRepairMode;
pub use task::RepairTask;
pub use task::ReplicaInventory;
