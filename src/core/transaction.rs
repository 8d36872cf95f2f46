use crate::error::Result;
use crate::utils::{deserialize, serialize, sha256_digest, Digest};
use data_encoding::HEXLOWER;
use serde::{Deserialize, Serialize};

/// An opaque payload identified by its SHA-256 digest.
///
/// No signature or validity checking is performed on transactions; two
/// submissions with the same bytes are the same transaction.
#[derive(
    Debug, Clone, PartialEq, Eq, Serialize, Deserialize, bincode::Encode, bincode::Decode,
)]
pub struct Transaction {
    id: Digest,
    payload: Vec<u8>,
}

impl Transaction {
    pub fn new(payload: Vec<u8>) -> Transaction {
        Transaction {
            id: sha256_digest(&payload),
            payload,
        }
    }

    pub fn get_id(&self) -> &Digest {
        &self.id
    }

    pub fn id_hex(&self) -> String {
        HEXLOWER.encode(&self.id)
    }

    pub fn get_payload(&self) -> &[u8] {
        &self.payload
    }

    /// Whether `id` is the digest of `payload`.
    pub fn verify_id(&self) -> bool {
        sha256_digest(&self.payload) == self.id
    }

    pub fn serialize(&self) -> Result<Vec<u8>> {
        serialize(self)
    }

    pub fn deserialize(bytes: &[u8]) -> Result<Transaction> {
        deserialize(bytes)
    }

    /// Encode a transaction set as a block payload.
    pub fn serialize_set(transactions: &[Transaction]) -> Result<Vec<u8>> {
        serialize(&transactions.to_vec())
    }

    /// Decode a block payload produced by [`Transaction::serialize_set`].
    pub fn deserialize_set(bytes: &[u8]) -> Result<Vec<Transaction>> {
        deserialize(bytes)
    }
}
