//! IR Blaster GATT Protocol
//!
//! Wire-level definitions for the infrared service and the chunked upload
//! used to hand a waveform to the device.
//!
//! # Upload Sequence
//!
//! ```text
//! samples (i16 LE) ──► 20-byte chunks, last one zero-padded
//!
//! 114b0000-...  chunk 0        (write without response)
//! 114b0001-...  chunk 1
//! ...
//! 114b00NN-...  chunk NN       (NN = decimal two-digit index)
//! 114b00d0-...  sample count   (u16 LE)
//! 114b00d1-...  0x00           (send trigger)
//! 114b00d2-...  status         (read, one i8)
//! ```

use crate::domain::error::{decode_status, IrError};
use crate::infrastructure::bluetooth::session::CharacteristicTable;
use crate::infrastructure::bluetooth::transport::GattEndpoint;
use tracing::{debug, trace};
use uuid::{uuid, Uuid};

/// Infrared blaster service
pub const IR_SERVICE_UUID: Uuid = uuid!("114b0000-0866-e4c2-fb93-7da2e0dfa398");

/// Standard Firmware Revision String characteristic
pub const FIRMWARE_VERSION_UUID: Uuid = uuid!("00002a26-0000-1000-8000-00805f9b34fb");

/// Sample count, written after all chunks
pub const IR_DATA_SIZE_UUID: Uuid = uuid!("114b00d0-0866-e4c2-fb93-7da2e0dfa398");

/// Send trigger, written last
pub const IR_SEND_UUID: Uuid = uuid!("114b00d1-0866-e4c2-fb93-7da2e0dfa398");

/// Status code, read after the trigger
pub const IR_STATUS_UUID: Uuid = uuid!("114b00d2-0866-e4c2-fb93-7da2e0dfa398");

/// Bytes per chunk write
pub const CHUNK_SIZE: usize = 20;

/// Largest waveform the client will hand to the device
pub const MAX_SAMPLES: usize = 600;

/// Byte written to the send characteristic
pub const SEND_TRIGGER: [u8; 1] = [0x00];

/// Chunk characteristics only carry a two-digit index
const MAX_CHUNK_INDEX: usize = 99;

/// UUID of the characteristic receiving chunk `index`.
///
/// The index is rendered in decimal into the last two digits of the first
/// UUID group, so chunk 12 lands on `114b0012-...`. Returns `None` past 99.
pub fn chunk_uuid(index: usize) -> Option<Uuid> {
    if index > MAX_CHUNK_INDEX {
        return None;
    }
    let digits = (((index / 10) << 4) | (index % 10)) as u128;
    Some(Uuid::from_u128(IR_SERVICE_UUID.as_u128() | (digits << 96)))
}

/// Number of chunk writes needed for `sample_count` samples
pub fn chunk_count(sample_count: usize) -> usize {
    (sample_count * 2).div_ceil(CHUNK_SIZE)
}

/// Serialize samples little-endian into `out`, zero-padding to a whole number of chunks.
pub fn serialize_samples(samples: &[i16], out: &mut Vec<u8>) {
    out.clear();
    out.reserve(chunk_count(samples.len()) * CHUNK_SIZE);
    for sample in samples {
        out.extend_from_slice(&sample.to_le_bytes());
    }
    let padded = out.len().div_ceil(CHUNK_SIZE) * CHUNK_SIZE;
    out.resize(padded, 0);
}

/// Sample count record for the data-size characteristic
pub fn encode_data_size(sample_count: usize) -> [u8; 2] {
    (sample_count as u16).to_le_bytes()
}

/// Reject waveforms the device will not accept, before any I/O.
pub fn validate_length(samples: &[i16]) -> Result<(), IrError> {
    if samples.len() > MAX_SAMPLES {
        return Err(IrError::DataTooLong {
            samples: samples.len(),
            max: MAX_SAMPLES,
        });
    }
    Ok(())
}

/// Push `samples` to the device and arm it to transmit.
///
/// Not atomic: if a chunk write fails the device may hold a partial buffer,
/// and only a full resend is safe.
pub async fn upload<E: GattEndpoint>(
    table: &CharacteristicTable<E>,
    samples: &[i16],
    scratch: &mut Vec<u8>,
) -> Result<(), IrError> {
    validate_length(samples)?;

    serialize_samples(samples, scratch);
    let chunks = scratch.len() / CHUNK_SIZE;
    debug!(
        "Uploading {} samples in {} chunks of {} bytes",
        samples.len(),
        chunks,
        CHUNK_SIZE
    );

    for (index, chunk) in scratch.chunks_exact(CHUNK_SIZE).enumerate() {
        // validate_length keeps the index within two digits
        let uuid = chunk_uuid(index).ok_or(IrError::DataTooLong {
            samples: samples.len(),
            max: MAX_SAMPLES,
        })?;
        trace!("Chunk {:02}: {:02X?}", index, chunk);
        table.ir(uuid)?.write_without_response(chunk).await?;
    }

    table
        .ir(IR_DATA_SIZE_UUID)?
        .write_without_response(&encode_data_size(samples.len()))
        .await?;
    table
        .ir(IR_SEND_UUID)?
        .write_without_response(&SEND_TRIGGER)
        .await?;

    Ok(())
}

/// Read the status characteristic into `scratch` and decode its first byte.
pub async fn read_status<E: GattEndpoint>(
    table: &CharacteristicTable<E>,
    scratch: &mut Vec<u8>,
) -> Result<(), IrError> {
    scratch.clear();
    table.ir(IR_STATUS_UUID)?.read_into(scratch).await?;

    let code = match scratch.first() {
        Some(byte) => *byte as i8,
        None => return Err(anyhow::anyhow!("status characteristic returned no data").into()),
    };
    debug!("Device status code: {}", code);

    decode_status(code).map_err(IrError::from)
}
