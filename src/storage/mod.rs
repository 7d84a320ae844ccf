mod disk_error;
mod extent;
mod in_memory;
mod store;

pub use disk_error::is_disk_error;
pub use extent::default_tiny_extent_ids;
pub use extent::ExtentCrc;
pub use extent::ExtentId;
pub use extent::ExtentInfo;
pub use extent::TINY_EXTENT_COUNT;
pub use extent::TINY_EXTENT_START_ID;
pub use in_memory::InMemoryExtentStore;
pub use in_memory::InMemoryStoreFactory;
pub use store::ExtentFilter;
pub use store::ExtentStore;
pub use store::ExtentStoreFactory;
