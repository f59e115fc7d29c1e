//! Key encoding utilities for `RocksDB`.
//!
//! The controller manages exactly one registration and one configuration,
//! so keys are fixed.

/// Key of the current registration record in the `registration` column family.
pub const CURRENT_REGISTRATION: &[u8] = b"current";

/// Key of the current configuration in the `config` column family.
pub const CURRENT_CONFIG: &[u8] = b"current";

/// Key of the schema version in the `meta` column family.
pub const SCHEMA_VERSION: &[u8] = b"schema_version";

/// Encode a schema version value.
#[must_use]
pub fn encode_version(version: u32) -> [u8; 4] {
    version.to_be_bytes()
}

/// Decode a schema version value.
///
/// Returns `None` if the value is not exactly four bytes.
#[must_use]
pub fn decode_version(bytes: &[u8]) -> Option<u32> {
    let arr: [u8; 4] = bytes.try_into().ok()?;
    Some(u32::from_be_bytes(arr))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_decoding_rejects_bad_length() {
        assert_eq!(decode_version(&encode_version(7)), Some(7));
        assert_eq!(decode_version(&[1, 2, 3]), None);
    }
}
