mod partition;
mod stripe;

pub use partition::EcPartition;
pub use partition::EcPartitionMeta;
pub use stripe::plan_stripe_reads;
pub use stripe::stripe_read;
pub use stripe::StripeGeometry;
pub use stripe::StripePiece;
pub use stripe::StripeReadError;
