use ring::digest::{Context, SHA256};

use crate::error::{BlockchainError, Result};
use std::time::{SystemTime, UNIX_EPOCH};

/// Length in bytes of every digest used by the ledger.
pub const HASH_LEN: usize = 32;

/// A SHA-256 digest: block hashes and transaction ids.
pub type Digest = [u8; HASH_LEN];

pub fn current_timestamp() -> Result<i64> {
    let duration = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|e| BlockchainError::Io(format!("System time error: {e}")))?
        .as_millis();

    if duration > i64::MAX as u128 {
        return Err(BlockchainError::Io("Timestamp overflow".to_string()));
    }

    Ok(duration as i64)
}

pub fn sha256_digest(data: &[u8]) -> Digest {
    let mut context = Context::new(&SHA256);
    context.update(data);
    finish(context)
}

/// Hash several byte slices as if they were concatenated.
pub fn sha256_concat(parts: &[&[u8]]) -> Digest {
    let mut context = Context::new(&SHA256);
    for part in parts {
        context.update(part);
    }
    finish(context)
}

fn finish(context: Context) -> Digest {
    let mut out = [0u8; HASH_LEN];
    out.copy_from_slice(context.finish().as_ref());
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use data_encoding::HEXLOWER;

    #[test]
    fn test_sha256_known_vector() {
        let digest = sha256_digest(b"abc");
        assert_eq!(
            HEXLOWER.encode(&digest),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_concat_matches_single_buffer() {
        let joined = sha256_digest(b"hello world");
        let parts = sha256_concat(&[b"hello".as_slice(), b" ".as_slice(), b"world".as_slice()]);
        assert_eq!(joined, parts);
    }

    #[test]
    fn test_timestamp_is_positive() {
        assert!(current_timestamp().unwrap() > 0);
    }
}
