//! Envelope decoding for prefix list blobs.
//!
//! The decode step is kept behind [`ListDecoder`] so the wire schema and
//! compression algorithm can change without touching sort validation or
//! iteration in the reader.

use super::reader::ParseError;
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use prost::Message;
use std::io::{Read, Write};
use tracing::debug;

/// Smallest supported prefix width in bytes.
pub const MIN_PREFIX_SIZE: usize = 4;

/// Largest supported prefix width in bytes (a full SHA-256 digest).
pub const MAX_PREFIX_SIZE: usize = 32;

/// Protobuf envelope of a prefix list.
#[derive(Clone, PartialEq, Message)]
struct PublisherPrefixList {
    #[prost(uint32, tag = "1")]
    prefix_size: u32,
    #[prost(enumeration = "CompressionType", tag = "2")]
    compression_type: i32,
    #[prost(uint64, tag = "3")]
    uncompressed_size: u64,
    #[prost(bytes = "vec", tag = "4")]
    prefixes: Vec<u8>,
    #[prost(uint32, tag = "5")]
    version: u32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
#[repr(i32)]
enum CompressionType {
    NoCompression = 0,
    Zlib = 1,
}

/// Compression applied to the prefix payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CompressionKind {
    /// Payload is stored as-is.
    #[default]
    None,
    /// Payload is a zlib stream.
    Zlib,
}

impl From<CompressionType> for CompressionKind {
    fn from(value: CompressionType) -> Self {
        match value {
            CompressionType::NoCompression => Self::None,
            CompressionType::Zlib => Self::Zlib,
        }
    }
}

impl From<CompressionKind> for CompressionType {
    fn from(value: CompressionKind) -> Self {
        match value {
            CompressionKind::None => Self::NoCompression,
            CompressionKind::Zlib => Self::Zlib,
        }
    }
}

/// Header fields of a parsed prefix list. Immutable once parsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrefixListHeader {
    /// List format version as published by the server.
    pub version: u32,
    /// Width of every prefix in bytes.
    pub prefix_size: usize,
    /// Compression the payload was shipped with.
    pub compression: CompressionKind,
    /// Declared size of the decompressed payload.
    pub uncompressed_size: u64,
}

impl Default for PrefixListHeader {
    fn default() -> Self {
        Self {
            version: 0,
            prefix_size: MIN_PREFIX_SIZE,
            compression: CompressionKind::None,
            uncompressed_size: 0,
        }
    }
}

/// Output of a [`ListDecoder`]: the header and the decompressed payload.
#[derive(Debug, Clone)]
pub struct DecodedList {
    /// Parsed header.
    pub header: PrefixListHeader,
    /// Uncompressed prefix bytes, not yet checked for alignment or order.
    pub payload: Vec<u8>,
}

/// Decodes the outer envelope of a prefix list blob.
///
/// Implementations validate the header and undo compression. Alignment and
/// sort order are checked by the reader.
pub trait ListDecoder: Send + Sync {
    /// Decode `bytes` into a header and uncompressed payload.
    ///
    /// # Errors
    ///
    /// Returns the [`ParseError`] describing the first violation found.
    fn decode(&self, bytes: &[u8]) -> Result<DecodedList, ParseError>;
}

/// Default decoder: protobuf envelope with optional zlib payload.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProtobufListDecoder;

impl ListDecoder for ProtobufListDecoder {
    fn decode(&self, bytes: &[u8]) -> Result<DecodedList, ParseError> {
        let message =
            PublisherPrefixList::decode(bytes).map_err(|_| ParseError::InvalidProtobufMessage)?;

        let prefix_size = usize::try_from(message.prefix_size)
            .map_err(|_| ParseError::InvalidPrefixSize)?;
        if !(MIN_PREFIX_SIZE..=MAX_PREFIX_SIZE).contains(&prefix_size) {
            return Err(ParseError::InvalidPrefixSize);
        }

        let compression: CompressionKind = CompressionType::try_from(message.compression_type)
            .map_err(|_| ParseError::UnknownCompressionType)?
            .into();

        let payload = match compression {
            CompressionKind::None => {
                if message.uncompressed_size != message.prefixes.len() as u64 {
                    return Err(ParseError::InvalidUncompressedSize);
                }
                message.prefixes
            }
            CompressionKind::Zlib => {
                inflate_exact(&message.prefixes, message.uncompressed_size)?
            }
        };

        debug!(
            "Decoded prefix list envelope: version={}, prefix_size={}, compression={:?}, payload={} bytes",
            message.version,
            prefix_size,
            compression,
            payload.len()
        );

        Ok(DecodedList {
            header: PrefixListHeader {
                version: message.version,
                prefix_size,
                compression,
                uncompressed_size: message.uncompressed_size,
            },
            payload,
        })
    }
}

/// Inflate a zlib stream whose output must be exactly `expected` bytes.
///
/// At most `expected + 1` bytes are produced so an oversized stream is
/// detected without inflating all of it.
fn inflate_exact(compressed: &[u8], expected: u64) -> Result<Vec<u8>, ParseError> {
    let expected_len =
        usize::try_from(expected).map_err(|_| ParseError::InvalidUncompressedSize)?;
    let limit = expected.saturating_add(1);

    let mut output = Vec::with_capacity(expected_len.min(compressed.len().saturating_mul(8)));
    ZlibDecoder::new(compressed)
        .take(limit)
        .read_to_end(&mut output)
        .map_err(|_| ParseError::UnableToDecompress)?;

    if output.len() != expected_len {
        return Err(ParseError::InvalidUncompressedSize);
    }
    Ok(output)
}

/// Encode a prefix list blob in the format read by [`ProtobufListDecoder`].
///
/// `prefixes` is the flat payload; it is written as given, so callers are
/// responsible for sorting it.
///
/// # Errors
///
/// Returns an error if zlib compression fails.
pub fn encode_prefix_list(
    version: u32,
    prefix_size: u32,
    prefixes: &[u8],
    compression: CompressionKind,
) -> std::io::Result<Vec<u8>> {
    let payload = match compression {
        CompressionKind::None => prefixes.to_vec(),
        CompressionKind::Zlib => {
            let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
            encoder.write_all(prefixes)?;
            encoder.finish()?
        }
    };

    let message = PublisherPrefixList {
        prefix_size,
        compression_type: CompressionType::from(compression) as i32,
        uncompressed_size: prefixes.len() as u64,
        prefixes: payload,
        version,
    };
    Ok(message.encode_to_vec())
}
