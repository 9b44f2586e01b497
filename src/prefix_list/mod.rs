//! Publisher prefix lists.
//!
//! A prefix list is a bulk, sorted collection of fixed-width SHA-256 prefixes
//! of registered publisher keys. It is distributed as a protobuf envelope whose
//! payload may be zlib-compressed, and is used for cheap local membership
//! checks before any server lookup is attempted.
//!
//! # Format
//!
//! ```text
//! PublisherPrefixList {
//!   1: uint32 prefix_size        // 4..=32 bytes
//!   2: enum   compression_type   // 0 = none, 1 = zlib
//!   3: uint64 uncompressed_size  // exact length of the decompressed payload
//!   4: bytes  prefixes           // N * prefix_size bytes, non-decreasing
//!   5: uint32 version
//! }
//! ```
//!
//! A membership hit is coarse: two publishers may share a prefix, so a hit
//! only means "possibly registered". A miss is definitive.

mod decoder;
mod iter;
mod reader;

pub use decoder::{
    encode_prefix_list, CompressionKind, DecodedList, ListDecoder, PrefixListHeader,
    ProtobufListDecoder, MAX_PREFIX_SIZE, MIN_PREFIX_SIZE,
};
pub use iter::PrefixIter;
pub use reader::{publisher_prefix, ParseError, PrefixListReader};
