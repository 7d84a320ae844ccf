mod data_partition;
mod disk;
mod meta;
mod status;

pub use data_partition::DataPartition;
pub use data_partition::DataPartitionConfig;
pub use data_partition::PartitionContext;
pub use data_partition::PartitionError;
pub use disk::Disk;
pub use meta::read_meta_file;
pub use meta::write_meta_file;
pub use meta::DataPartitionMeta;
pub use meta::MetaFileError;
pub use meta::META_FILE_NAME;
pub use meta::TEMP_META_FILE_NAME;
pub use status::LoadExtentHeaderStatus;
pub use status::PartitionStatus;

pub(crate) use data_partition::parse_partition_dir_name;
pub(crate) use meta::create_time_now;
pub(crate) use status::status_from_usage;
