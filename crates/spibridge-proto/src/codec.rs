//! Wire encoding for batches of event bundles.
//!
//! A batch is serialized with rkyv and sent as a single frame: a 4-byte
//! big-endian length prefix followed by the payload.

use rkyv::util::AlignedVec;
use rkyv::{Archive, Deserialize, Serialize};

use crate::event::EventBundle;
use crate::Error;

/// Maximum frame payload size (16 MB).
pub const MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

/// Size of the length prefix in bytes.
pub const LENGTH_PREFIX_SIZE: usize = 4;

/// Bundles drained in one poll, as sent to a remote consumer.
#[derive(Debug, Clone, PartialEq, Archive, Serialize, Deserialize)]
pub struct BundleBatch {
    /// Protocol version of the sender.
    pub protocol_version: u32,
    /// Bundles in delivery order.
    pub bundles: Vec<EventBundle>,
}

impl BundleBatch {
    /// Wrap bundles with the current protocol version.
    pub fn new(bundles: Vec<EventBundle>) -> Self {
        Self {
            protocol_version: crate::PROTOCOL_VERSION,
            bundles,
        }
    }
}

/// Serialize bundles into one length-prefixed frame.
pub fn encode_bundles(bundles: Vec<EventBundle>) -> Result<Vec<u8>, Error> {
    let batch = BundleBatch::new(bundles);
    let payload = rkyv::to_bytes::<rkyv::rancor::Error>(&batch)
        .map_err(|e| Error::Serialization(e.to_string()))?;
    let len = u32::try_from(payload.len())
        .ok()
        .filter(|&len| len as usize <= MAX_FRAME_SIZE)
        .ok_or_else(|| {
            Error::InvalidMessage(format!("{} bundle(s) exceed the frame limit", batch.bundles.len()))
        })?;

    let mut frame = len.to_be_bytes().to_vec();
    frame.extend_from_slice(&payload);
    Ok(frame)
}

/// Deserialize bundles from one frame.
pub fn decode_bundles(frame: &[u8]) -> Result<Vec<EventBundle>, Error> {
    let prefix = frame
        .get(..LENGTH_PREFIX_SIZE)
        .ok_or_else(|| Error::InvalidMessage("bundle frame without length prefix".to_string()))?;
    let len = declared_len(prefix);
    if len > MAX_FRAME_SIZE {
        return Err(Error::InvalidMessage(format!("bundle frame of {} bytes is too large", len)));
    }
    let payload = frame
        .get(LENGTH_PREFIX_SIZE..LENGTH_PREFIX_SIZE + len)
        .ok_or_else(|| Error::InvalidMessage(format!("bundle frame truncated at {} bytes", frame.len())))?;

    // the payload sits behind the length prefix, so realign before access
    let mut aligned = AlignedVec::<16>::with_capacity(payload.len());
    aligned.extend_from_slice(payload);

    let archived = rkyv::access::<ArchivedBundleBatch, rkyv::rancor::Error>(&aligned)
        .map_err(|e| Error::Deserialization(e.to_string()))?;
    let batch = rkyv::deserialize::<BundleBatch, rkyv::rancor::Error>(archived)
        .map_err(|e| Error::Deserialization(e.to_string()))?;

    if batch.protocol_version != crate::PROTOCOL_VERSION {
        return Err(Error::VersionMismatch {
            expected: crate::PROTOCOL_VERSION,
            actual: batch.protocol_version,
        });
    }
    Ok(batch.bundles)
}

fn declared_len(prefix: &[u8]) -> usize {
    let mut bytes = [0u8; LENGTH_PREFIX_SIZE];
    bytes.copy_from_slice(&prefix[..LENGTH_PREFIX_SIZE]);
    u32::from_be_bytes(bytes) as usize
}
