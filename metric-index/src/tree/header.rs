//! Persisted tree header.
//!
//! The header records the geometry every node in a file was sized with. It is
//! encoded as fixed-width little-endian integers, in this order: page size,
//! directory capacity, leaf capacity, directory minimum, leaf minimum, byte
//! length of the trailing free-page list, highest used page id.

use serde::{Deserialize, Serialize};

use super::tree_types::{IndexError, IndexResult, PageId};

/// Number of bytes an encoded header occupies.
pub const HEADER_ENCODED_SIZE: usize = 6 * 4 + 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeIndexHeader {
    pub page_size: u32,
    pub directory_capacity: u32,
    pub leaf_capacity: u32,
    pub directory_minimum: u32,
    pub leaf_minimum: u32,
    pub free_list_byte_length: u32,
    pub highest_used_page_id: PageId,
}

impl TreeIndexHeader {
    pub fn new(
        page_size: usize,
        directory_capacity: usize,
        leaf_capacity: usize,
        directory_minimum: usize,
        leaf_minimum: usize,
    ) -> IndexResult<Self> {
        Ok(Self {
            page_size: to_u32("page_size", page_size)?,
            directory_capacity: to_u32("directory_capacity", directory_capacity)?,
            leaf_capacity: to_u32("leaf_capacity", leaf_capacity)?,
            directory_minimum: to_u32("directory_minimum", directory_minimum)?,
            leaf_minimum: to_u32("leaf_minimum", leaf_minimum)?,
            free_list_byte_length: 0,
            highest_used_page_id: 0,
        })
    }

    pub fn to_bytes(&self) -> IndexResult<Vec<u8>> {
        bincode::serde::encode_to_vec(self, bincode::config::legacy())
            .map_err(|e| IndexError::Serialization(e.to_string()))
    }

    pub fn from_bytes(bytes: &[u8]) -> IndexResult<Self> {
        if bytes.len() < HEADER_ENCODED_SIZE {
            return Err(IndexError::Serialization(format!(
                "header needs {} bytes, got {}",
                HEADER_ENCODED_SIZE,
                bytes.len()
            )));
        }
        bincode::serde::decode_from_slice(bytes, bincode::config::legacy())
            .map(|(header, _)| header)
            .map_err(|e| IndexError::Serialization(e.to_string()))
    }

    /// Checks that a stored header describes the same node geometry as
    /// `expected`. Free-list length and highest page id are runtime state and
    /// are not compared.
    pub fn validate_geometry(&self, expected: &TreeIndexHeader) -> IndexResult<()> {
        let fields = [
            ("page_size", self.page_size, expected.page_size),
            (
                "directory_capacity",
                self.directory_capacity,
                expected.directory_capacity,
            ),
            ("leaf_capacity", self.leaf_capacity, expected.leaf_capacity),
            (
                "directory_minimum",
                self.directory_minimum,
                expected.directory_minimum,
            ),
            ("leaf_minimum", self.leaf_minimum, expected.leaf_minimum),
        ];
        for (field, stored, wanted) in fields {
            if stored != wanted {
                return Err(IndexError::HeaderMismatch {
                    field,
                    stored: stored as u64,
                    expected: wanted as u64,
                });
            }
        }
        Ok(())
    }
}

fn to_u32(field: &str, value: usize) -> IndexResult<u32> {
    u32::try_from(value)
        .map_err(|_| IndexError::InvalidArgument(format!("{} = {} does not fit in 32 bits", field, value)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> TreeIndexHeader {
        let mut header = TreeIndexHeader::new(4096, 107, 194, 42, 77).unwrap();
        header.free_list_byte_length = 24;
        header.highest_used_page_id = 913;
        header
    }

    #[test]
    fn test_header_round_trip() {
        let header = sample();
        let bytes = header.to_bytes().unwrap();
        assert_eq!(bytes.len(), HEADER_ENCODED_SIZE);

        let decoded = TreeIndexHeader::from_bytes(&bytes).unwrap();
        assert_eq!(decoded.page_size, 4096);
        assert_eq!(decoded.directory_capacity, 107);
        assert_eq!(decoded.leaf_capacity, 194);
        assert_eq!(decoded.directory_minimum, 42);
        assert_eq!(decoded.leaf_minimum, 77);
        assert_eq!(decoded.free_list_byte_length, 24);
        assert_eq!(decoded.highest_used_page_id, 913);
    }

    #[test]
    fn test_header_field_order() {
        let bytes = sample().to_bytes().unwrap();
        assert_eq!(&bytes[0..4], &4096u32.to_le_bytes());
        assert_eq!(&bytes[4..8], &107u32.to_le_bytes());
        assert_eq!(&bytes[8..12], &194u32.to_le_bytes());
        assert_eq!(&bytes[20..24], &24u32.to_le_bytes());
        assert_eq!(&bytes[24..32], &913u64.to_le_bytes());
    }

    #[test]
    fn test_header_decoding_ignores_padding() {
        let mut bytes = sample().to_bytes().unwrap();
        bytes.resize(4096, 0);
        assert_eq!(TreeIndexHeader::from_bytes(&bytes).unwrap(), sample());
    }

    #[test]
    fn test_header_truncated() {
        let bytes = sample().to_bytes().unwrap();
        let result = TreeIndexHeader::from_bytes(&bytes[..10]);
        assert!(matches!(result, Err(IndexError::Serialization(_))));
    }

    #[test]
    fn test_validate_geometry() {
        let stored = sample();
        let mut expected = sample();
        expected.free_list_byte_length = 0;
        expected.highest_used_page_id = 0;
        assert!(stored.validate_geometry(&expected).is_ok());

        expected.leaf_capacity = 200;
        match stored.validate_geometry(&expected) {
            Err(IndexError::HeaderMismatch {
                field,
                stored,
                expected,
            }) => {
                assert_eq!(field, "leaf_capacity");
                assert_eq!(stored, 194);
                assert_eq!(expected, 200);
            }
            other => panic!("expected header mismatch, got {:?}", other),
        }
    }
}
