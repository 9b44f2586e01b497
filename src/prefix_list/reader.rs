//! Prefix list reader with sort validation and binary search.

use super::decoder::{ListDecoder, PrefixListHeader, ProtobufListDecoder};
use super::iter::PrefixIter;
use sha2::{Digest, Sha256};
use std::cmp::Ordering;
use thiserror::Error;
use tracing::{debug, warn};

/// Reasons a prefix list blob is rejected.
///
/// Every variant is terminal for the given input; retrying requires a fresh
/// download.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ParseError {
    /// The protobuf envelope could not be decoded.
    #[error("invalid protobuf message")]
    InvalidProtobufMessage,
    /// Declared prefix width is not a supported size.
    #[error("invalid prefix size")]
    InvalidPrefixSize,
    /// Decompressed size does not match the declared size, or the payload is
    /// not a whole number of prefixes.
    #[error("invalid uncompressed size")]
    InvalidUncompressedSize,
    /// Compression tag is not recognised.
    #[error("unknown compression type")]
    UnknownCompressionType,
    /// The compressed payload could not be inflated.
    #[error("unable to decompress prefix payload")]
    UnableToDecompress,
    /// A prefix is smaller than its predecessor.
    #[error("prefixes are not sorted")]
    PrefixesNotSorted,
}

/// Parses publisher prefix lists and answers membership queries.
///
/// The reader is read-only between parses. A failed parse leaves the previous
/// list in place.
#[derive(Debug, Clone, Default)]
pub struct PrefixListReader {
    header: PrefixListHeader,
    prefixes: Vec<u8>,
}

impl PrefixListReader {
    /// Create an empty reader.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse `bytes` into a new reader.
    ///
    /// # Errors
    ///
    /// Returns the [`ParseError`] describing why the blob was rejected.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ParseError> {
        let mut reader = Self::new();
        reader.parse(bytes)?;
        Ok(reader)
    }

    /// Parse a blob with the default protobuf/zlib decoder.
    ///
    /// # Errors
    ///
    /// Returns the [`ParseError`] describing why the blob was rejected. The
    /// reader's contents are unchanged on error.
    pub fn parse(&mut self, bytes: &[u8]) -> Result<(), ParseError> {
        self.parse_with(&ProtobufListDecoder, bytes)
    }

    /// Parse a blob with a custom envelope decoder.
    ///
    /// # Errors
    ///
    /// Returns the [`ParseError`] describing why the blob was rejected. The
    /// reader's contents are unchanged on error.
    pub fn parse_with(&mut self, decoder: &dyn ListDecoder, bytes: &[u8]) -> Result<(), ParseError> {
        let decoded = decoder.decode(bytes).map_err(|e| {
            warn!("Rejected prefix list ({} bytes): {e}", bytes.len());
            e
        })?;

        let width = decoded.header.prefix_size;
        if width == 0 {
            return Err(ParseError::InvalidPrefixSize);
        }
        if decoded.payload.len() % width != 0 {
            warn!(
                "Prefix payload of {} bytes is not a multiple of {width}",
                decoded.payload.len()
            );
            return Err(ParseError::InvalidUncompressedSize);
        }

        // Duplicates are allowed; only a strict decrease is a violation.
        let mut previous: Option<&[u8]> = None;
        for prefix in decoded.payload.chunks_exact(width) {
            if previous.is_some_and(|p| p > prefix) {
                warn!("Prefix {} is out of order", hex::encode(prefix));
                return Err(ParseError::PrefixesNotSorted);
            }
            previous = Some(prefix);
        }

        self.header = decoded.header;
        self.prefixes = decoded.payload;

        debug!(
            "Loaded prefix list version {} with {} prefixes of {} bytes",
            self.header.version,
            self.len(),
            width
        );
        Ok(())
    }

    /// Header of the currently loaded list.
    #[must_use]
    pub fn header(&self) -> &PrefixListHeader {
        &self.header
    }

    /// Width of each prefix in bytes.
    #[must_use]
    pub fn prefix_size(&self) -> usize {
        self.header.prefix_size
    }

    /// Number of prefixes.
    #[must_use]
    pub fn len(&self) -> usize {
        match self.header.prefix_size {
            0 => 0,
            width => self.prefixes.len() / width,
        }
    }

    /// Whether no prefixes are loaded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Iterate all prefixes in ascending order.
    #[must_use]
    pub fn iter(&self) -> PrefixIter<'_> {
        self.iter_from(0)
    }

    /// Iterate prefixes starting at `index`.
    #[must_use]
    pub fn iter_from(&self, index: usize) -> PrefixIter<'_> {
        PrefixIter::new(&self.prefixes, self.header.prefix_size, index)
    }

    /// Prefix at `index`, if in range.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&[u8]> {
        self.iter_from(index).next()
    }

    /// Binary search for `target`.
    ///
    /// Returns `Ok(index)` of a matching prefix, or `Err(index)` where it
    /// would be inserted. With duplicates, any matching index may be returned.
    ///
    /// # Errors
    ///
    /// `Err` carries the insertion point when `target` is absent.
    pub fn binary_search(&self, target: &[u8]) -> Result<usize, usize> {
        let mut low = 0;
        let mut high = self.len();
        while low < high {
            let mid = low + (high - low) / 2;
            let Some(prefix) = self.get(mid) else {
                break;
            };
            match prefix.cmp(target) {
                Ordering::Less => low = mid + 1,
                Ordering::Greater => high = mid,
                Ordering::Equal => return Ok(mid),
            }
        }
        Err(low)
    }

    /// Whether `prefix` is present in the list.
    #[must_use]
    pub fn contains(&self, prefix: &[u8]) -> bool {
        self.binary_search(prefix).is_ok()
    }

    /// Whether the hashed prefix of `publisher_key` is present.
    ///
    /// A hit means the publisher is possibly registered; a miss is definitive.
    #[must_use]
    pub fn contains_publisher(&self, publisher_key: &str) -> bool {
        let prefix = publisher_prefix(publisher_key, self.prefix_size());
        self.contains(&prefix)
    }
}

impl<'a> IntoIterator for &'a PrefixListReader {
    type Item = &'a [u8];
    type IntoIter = PrefixIter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// First `width` bytes of the SHA-256 digest of `publisher_key`.
///
/// `width` is clamped to the digest length.
#[must_use]
pub fn publisher_prefix(publisher_key: &str, width: usize) -> Vec<u8> {
    let digest = Sha256::digest(publisher_key.as_bytes());
    digest[..width.min(digest.len())].to_vec()
}
