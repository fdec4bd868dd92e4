//! In-band encryption header carried in front of encrypted sample payloads.
//!
//! Layout, big-endian:
//!
//! ```text
//! signal   u8       bit 7 = subsample encryption, bits 0..7 = IV size
//! iv       [u8; n]  n = IV size, at most 16
//! count    u16      only with subsample encryption
//! entries  count * (clear: u16, encrypted: u32)
//! ```
//!
//! Without subsample encryption the whole remaining payload is one encrypted
//! subsample with no clear bytes.

use td_core::{CryptoData, CryptoMode, Error, Result};

use crate::data_queue::SampleDataQueue;

const SUBSAMPLE_ENCRYPTION_FLAG: u8 = 0x80;
const IV_SIZE_MASK: u8 = 0x7F;
const MAX_IV_SIZE: usize = 16;

/// Decryption parameters for one sample, handed to the consumer unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CryptoInfo {
    pub mode: CryptoMode,
    pub key_id: Vec<u8>,
    /// IV zero-padded to 16 bytes.
    pub iv: [u8; MAX_IV_SIZE],
    pub iv_size: usize,
    pub clear_bytes: Vec<u16>,
    pub encrypted_bytes: Vec<u32>,
    pub encrypted_blocks: u32,
    pub clear_blocks: u32,
}

impl CryptoInfo {
    pub fn subsample_count(&self) -> usize {
        self.clear_bytes.len()
    }
}

/// Serialize an encryption header as a producer would place it before the payload.
///
/// `subsamples` holds `(clear, encrypted)` byte counts; `None` means the whole
/// payload is encrypted.
pub fn encode_encryption_header(iv: &[u8], subsamples: Option<&[(u16, u32)]>) -> Vec<u8> {
    assert!(iv.len() <= MAX_IV_SIZE, "IV longer than {MAX_IV_SIZE} bytes");
    let mut header = Vec::with_capacity(1 + iv.len() + 2);
    let mut signal = iv.len() as u8;
    if subsamples.is_some() {
        signal |= SUBSAMPLE_ENCRYPTION_FLAG;
    }
    header.push(signal);
    header.extend_from_slice(iv);
    if let Some(entries) = subsamples {
        header.extend_from_slice(&(entries.len() as u16).to_be_bytes());
        for (clear, encrypted) in entries {
            header.extend_from_slice(&clear.to_be_bytes());
            header.extend_from_slice(&encrypted.to_be_bytes());
        }
    }
    header
}

/// Parse the encryption header of the sample at `offset` spanning `size` bytes.
///
/// Returns the decryption parameters and the header length; the caller skips
/// that many bytes before copying the payload.
pub(crate) fn read_encryption_header(
    data: &mut SampleDataQueue,
    track: u32,
    offset: u64,
    size: usize,
    crypto_data: Option<&CryptoData>,
) -> Result<(CryptoInfo, usize)> {
    let Some(crypto_data) = crypto_data else {
        return Err(Error::malformed(track, "encrypted sample without key data"));
    };

    let mut cursor = HeaderCursor {
        data,
        track,
        position: offset,
        remaining: size,
    };

    let [signal] = cursor.read::<1>()?;
    let subsample_encryption = signal & SUBSAMPLE_ENCRYPTION_FLAG != 0;
    let iv_size = (signal & IV_SIZE_MASK) as usize;
    if iv_size > MAX_IV_SIZE {
        return Err(Error::malformed(track, format!("IV size {iv_size} exceeds 16 bytes")));
    }

    let mut info = CryptoInfo {
        mode: crypto_data.mode,
        key_id: crypto_data.key_id.clone(),
        iv_size,
        encrypted_blocks: crypto_data.encrypted_blocks,
        clear_blocks: crypto_data.clear_blocks,
        ..CryptoInfo::default()
    };
    cursor.read_into(&mut info.iv[..iv_size])?;

    if subsample_encryption {
        let count = u16::from_be_bytes(cursor.read::<2>()?) as usize;
        info.clear_bytes.reserve(count);
        info.encrypted_bytes.reserve(count);
        for _ in 0..count {
            let clear = u16::from_be_bytes(cursor.read::<2>()?);
            let encrypted = u32::from_be_bytes(cursor.read::<4>()?);
            info.clear_bytes.push(clear);
            info.encrypted_bytes.push(encrypted);
        }
    } else {
        info.clear_bytes.push(0);
        info.encrypted_bytes.push(cursor.remaining as u32);
    }

    Ok((info, size - cursor.remaining))
}

struct HeaderCursor<'a> {
    data: &'a mut SampleDataQueue,
    track: u32,
    position: u64,
    remaining: usize,
}

impl HeaderCursor<'_> {
    fn read<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut out = [0u8; N];
        self.read_into(&mut out)?;
        Ok(out)
    }

    fn read_into(&mut self, dest: &mut [u8]) -> Result<()> {
        if dest.len() > self.remaining {
            return Err(Error::malformed(
                self.track,
                "encryption header truncated by sample size",
            ));
        }
        self.data.read_to_slice(self.position, dest);
        self.position += dest.len() as u64;
        self.remaining -= dest.len();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::allocator::Allocator;
    use std::sync::Arc;

    fn queue_with(bytes: &[u8]) -> SampleDataQueue {
        let mut q = SampleDataQueue::new(Arc::new(Allocator::new(8)));
        q.append(bytes);
        q
    }

    fn key() -> CryptoData {
        CryptoData::new(CryptoMode::AesCtr, vec![0xAB; 16])
    }

    #[test]
    fn full_sample_encryption() {
        let iv = [7u8; 8];
        let mut bytes = encode_encryption_header(&iv, None);
        let header_len = bytes.len();
        bytes.extend_from_slice(&[1, 2, 3, 4, 5]);
        let mut q = queue_with(&bytes);

        let (info, len) = read_encryption_header(&mut q, 0, 0, bytes.len(), Some(&key())).unwrap();
        assert_eq!(len, header_len);
        assert_eq!(info.iv_size, 8);
        assert_eq!(&info.iv[..8], &iv);
        assert_eq!(&info.iv[8..], &[0u8; 8]);
        assert_eq!(info.clear_bytes, vec![0]);
        assert_eq!(info.encrypted_bytes, vec![5]);
        assert_eq!(info.mode, CryptoMode::AesCtr);
    }

    #[test]
    fn subsample_encryption() {
        let iv = [3u8; 16];
        let subsamples = [(4u16, 16u32), (2, 0)];
        let mut bytes = encode_encryption_header(&iv, Some(&subsamples));
        assert_eq!(bytes.len(), 1 + 16 + 2 + 12);
        bytes.extend_from_slice(&[0u8; 22]);
        let mut q = queue_with(&bytes);

        let (info, len) = read_encryption_header(&mut q, 0, 0, bytes.len(), Some(&key())).unwrap();
        assert_eq!(len, 31);
        assert_eq!(info.subsample_count(), 2);
        assert_eq!(info.clear_bytes, vec![4, 2]);
        assert_eq!(info.encrypted_bytes, vec![16, 0]);
    }

    #[test]
    fn truncated_header_is_malformed() {
        let bytes = encode_encryption_header(&[1u8; 16], Some(&[(1, 1)]));
        let mut q = queue_with(&bytes);
        // Claim the sample is shorter than its own header.
        let err = read_encryption_header(&mut q, 3, 0, 10, Some(&key())).unwrap_err();
        assert!(matches!(err, Error::Malformed { track: 3, .. }));
    }

    #[test]
    fn missing_key_data_is_malformed() {
        let bytes = encode_encryption_header(&[], None);
        let mut q = queue_with(&bytes);
        let err = read_encryption_header(&mut q, 1, 0, 1, None).unwrap_err();
        assert!(matches!(err, Error::Malformed { .. }));
    }
}
