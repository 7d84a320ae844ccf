use crate::ec::EcPartition;
use crate::rpc::{PeerClient, RpcError};
use crate::storage::ExtentId;
use crate::util::{join_supervised, TaskPanicked};
use bytes::Bytes;
use std::cmp;
use std::io;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[derive(Debug, thiserror::Error)]
pub enum StripeReadError {
    #[error("Local stripe block read failed: {0}")]
    Io(#[from] io::Error),

    #[error("Stripe block read from {addr} failed: {source}")]
    Remote { addr: String, source: RpcError },

    #[error("Node index {0} is outside the data node list")]
    NodeIndexOutOfRange(u32),

    #[error("Expected {expected} bytes at offset {offset}, got {actual}")]
    ShortRead { offset: u64, expected: u32, actual: usize },

    // A sibling piece failed first.
    #[error("Stripe read cancelled")]
    Cancelled,

    #[error(transparent)]
    Panicked(#[from] TaskPanicked),
}

/// Layout of data across the data nodes of an erasure-coded partition: consecutive blocks of
/// `stripe_block_size` bytes go round-robin to the `data_node_num` data nodes.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct StripeGeometry {
    pub stripe_block_size: u64,
    pub data_node_num: u32,
}

impl StripeGeometry {
    pub fn stripe_size(&self) -> u64 {
        self.stripe_block_size * self.data_node_num as u64
    }

    /// Data node holding the byte at `offset`.
    pub fn node_index(&self, offset: u64) -> u32 {
        ((offset % self.stripe_size()) / self.stripe_block_size) as u32
    }

    /// Whether serving `size` bytes at `offset` needs blocks that `local_index` does not hold.
    pub fn is_stripe_read(&self, local_index: u32, offset: u64, size: u32) -> bool {
        if size as u64 > self.stripe_block_size {
            return true;
        }
        let last = offset.saturating_add(cmp::max(size, 1) as u64 - 1);
        self.node_index(offset) != local_index || self.node_index(last) != local_index
    }
}

/// A part of a stripe read that lies within a single stripe block.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct StripePiece {
    pub node_index: u32,
    pub offset: u64,
    pub size: u32,
    /// Where the piece lands in the caller's buffer.
    pub dest_offset: usize,
}

/// Splits `[offset, offset + size)` at stripe block boundaries.
pub fn plan_stripe_reads(geometry: &StripeGeometry, offset: u64, size: u32) -> Vec<StripePiece> {
    let mut pieces = Vec::new();
    let mut offset = offset;
    let mut remaining = size as u64;
    let mut dest_offset = 0usize;

    while remaining > 0 {
        let to_boundary = geometry.stripe_block_size - offset % geometry.stripe_block_size;
        let piece_size = cmp::min(remaining, to_boundary);
        pieces.push(StripePiece {
            node_index: geometry.node_index(offset),
            offset,
            size: piece_size as u32,
            dest_offset,
        });

        remaining -= piece_size;
        dest_offset += piece_size as usize;
        // Nothing is addressable past the end of the offset space.
        offset = match offset.checked_add(piece_size) {
            Some(next) => next,
            None => break,
        };
    }

    pieces
}

/// Reads every piece concurrently, locally or from the owning data node, and assembles them in
/// order. The first failing piece cancels the ones still in flight; all pieces are awaited
/// before the error is returned.
pub async fn stripe_read(
    partition: &Arc<EcPartition>,
    peers: &Arc<dyn PeerClient>,
    extent_id: ExtentId,
    offset: u64,
    size: u32,
) -> Result<Bytes, StripeReadError> {
    let pieces = plan_stripe_reads(&partition.geometry(), offset, size);
    let cancel = CancellationToken::new();

    let mut handles = Vec::with_capacity(pieces.len());
    for piece in pieces.iter().copied() {
        let partition = partition.clone();
        let peers = peers.clone();
        let cancel = cancel.clone();
        handles.push(tokio::spawn(async move {
            let read = async {
                if piece.node_index == partition.node_index() {
                    partition.local_read(extent_id, piece.offset, piece.size)
                } else {
                    partition
                        .remote_read(peers.as_ref(), piece.node_index, extent_id, piece.offset, piece.size)
                        .await
                }
            };

            let result = tokio::select! {
                _ = cancel.cancelled() => Err(StripeReadError::Cancelled),
                result = read => result,
            };
            if result.is_err() {
                cancel.cancel();
            }
            result
        }));
    }

    let mut buffer = vec![0u8; size as usize];
    let mut first_error: Option<StripeReadError> = None;
    for (piece, handle) in pieces.iter().zip(handles) {
        let outcome = match join_supervised(partition.logger(), "StripeReadPiece", handle).await {
            Ok(result) => result,
            Err(panicked) => {
                cancel.cancel();
                Err(panicked.into())
            }
        };

        match outcome {
            Ok(data) if data.len() == piece.size as usize => {
                buffer[piece.dest_offset..piece.dest_offset + data.len()].copy_from_slice(&data);
            }
            Ok(data) => {
                cancel.cancel();
                keep_first(
                    &mut first_error,
                    StripeReadError::ShortRead {
                        offset: piece.offset,
                        expected: piece.size,
                        actual: data.len(),
                    },
                );
            }
            Err(e) => keep_first(&mut first_error, e),
        }
    }

    match first_error {
        Some(e) => {
            slog::warn!(partition.logger(), "Stripe read of extent {} failed: {}", extent_id, e);
            Err(e)
        }
        None => Ok(Bytes::from(buffer)),
    }
}

// A real failure wins over the cancellations it caused in its siblings.
fn keep_first(slot: &mut Option<StripeReadError>, error: StripeReadError) {
    match slot {
        None => *slot = Some(error),
        Some(StripeReadError::Cancelled) if !matches!(error, StripeReadError::Cancelled) => *slot = Some(error),
        Some(_) => {}
    }
}
