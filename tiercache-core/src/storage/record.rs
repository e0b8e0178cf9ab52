//! On-disk envelope around encoded values
//!
//! Each row carries a CRC32 of the stored bytes so a corrupt payload is
//! detected before it reaches the decoder. Large payloads are zstd-compressed.

use crate::error::CodecError;
use chrono::{DateTime, TimeZone, Utc};

/// Compression settings applied when sealing a record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordOptions {
    /// Compress payloads of at least this many bytes
    pub compression_threshold: Option<usize>,
    /// zstd level
    pub compression_level: i32,
}

impl Default for RecordOptions {
    fn default() -> Self {
        Self {
            compression_threshold: None,
            compression_level: 3,
        }
    }
}

/// A sealed value as stored in a row
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredRecord {
    /// Stored bytes (compressed when `compressed` is set)
    pub payload: Vec<u8>,
    /// CRC32 of `payload`
    pub checksum: u32,
    pub compressed: bool,
    /// Absolute expiration time
    pub expires_at: Option<DateTime<Utc>>,
}

impl StoredRecord {
    /// Seal an encoded value
    pub fn seal(
        encoded: Vec<u8>,
        expires_at: Option<DateTime<Utc>>,
        options: &RecordOptions,
    ) -> Result<Self, CodecError> {
        let compress = options
            .compression_threshold
            .map_or(false, |threshold| encoded.len() >= threshold);

        let (payload, compressed) = if compress {
            let packed = zstd::encode_all(encoded.as_slice(), options.compression_level)
                .map_err(|e| CodecError::Compression(e.to_string()))?;
            // Keep the raw bytes when compression does not pay off
            if packed.len() < encoded.len() {
                (packed, true)
            } else {
                (encoded, false)
            }
        } else {
            (encoded, false)
        };

        Ok(Self {
            checksum: crc32fast::hash(&payload),
            payload,
            compressed,
            expires_at,
        })
    }

    /// Verify the checksum and return the encoded value
    pub fn open(&self) -> Result<Vec<u8>, CodecError> {
        let actual = crc32fast::hash(&self.payload);
        if actual != self.checksum {
            return Err(CodecError::ChecksumMismatch {
                expected: self.checksum,
                actual,
            });
        }

        if self.compressed {
            zstd::decode_all(self.payload.as_slice())
                .map_err(|e| CodecError::Compression(e.to_string()))
        } else {
            Ok(self.payload.clone())
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.map_or(false, |at| at <= now)
    }
}

/// Convert a timestamp to the unix milliseconds stored in SQLite
pub fn to_millis(at: DateTime<Utc>) -> i64 {
    at.timestamp_millis()
}

/// Convert stored unix milliseconds back to a timestamp
pub fn from_millis(millis: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_millis_opt(millis).single()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_small_payload_is_stored_raw() {
        let options = RecordOptions {
            compression_threshold: Some(1024),
            compression_level: 3,
        };
        let record = StoredRecord::seal(b"small".to_vec(), None, &options).unwrap();

        assert!(!record.compressed);
        assert_eq!(record.payload, b"small");
        assert_eq!(record.open().unwrap(), b"small");
    }

    #[test]
    fn test_large_payload_is_compressed() {
        let options = RecordOptions {
            compression_threshold: Some(1024),
            compression_level: 3,
        };
        let encoded = vec![b'x'; 64 * 1024];
        let record = StoredRecord::seal(encoded.clone(), None, &options).unwrap();

        assert!(record.compressed);
        assert!(record.payload.len() < encoded.len());
        assert_eq!(record.open().unwrap(), encoded);
    }

    #[test]
    fn test_corruption_is_detected() {
        let mut record =
            StoredRecord::seal(b"payload".to_vec(), None, &RecordOptions::default()).unwrap();
        record.payload[0] ^= 0xFF;

        assert!(matches!(
            record.open(),
            Err(CodecError::ChecksumMismatch { .. })
        ));
    }

    #[test]
    fn test_expiry() {
        let now = Utc::now();
        let past = StoredRecord::seal(
            vec![1],
            Some(now - chrono::Duration::seconds(1)),
            &RecordOptions::default(),
        )
        .unwrap();
        let forever = StoredRecord::seal(vec![1], None, &RecordOptions::default()).unwrap();

        assert!(past.is_expired(now));
        assert!(!forever.is_expired(now));
    }

    #[test]
    fn test_millis_conversion() {
        let at = from_millis(1_700_000_000_123).unwrap();
        assert_eq!(to_millis(at), 1_700_000_000_123);
    }
}
