//! Hashing and zlib (RFC 1950) compression, including the streaming boundary
//! the pack decoder needs to know exactly how many input bytes a compressed
//! entry consumed.

use std::io::{self, Read, Write};

use flate2::{bufread::ZlibDecoder, write::ZlibEncoder, Compression};
use ring::digest::{digest, SHA1_FOR_LEGACY_USE_ONLY as SHA1};

pub const DIGEST_SIZE: usize = 20;

/// SHA-1 of `bytes`.
pub fn hash(bytes: &[u8]) -> [u8; DIGEST_SIZE] {
    let digest = digest(&SHA1, bytes);
    digest.as_ref().try_into().expect("SHA-1 digest is 20 bytes")
}

/// Compresses `bytes` at the teacher's loose-object level (`Compression::default`).
pub fn deflate(bytes: &[u8]) -> io::Result<Vec<u8>> {
    let mut writer = ZlibEncoder::new(Vec::new(), Compression::default());
    writer.write_all(bytes)?;
    writer.finish()
}

/// Inflates a complete zlib stream.
pub fn inflate(bytes: &[u8]) -> Result<Vec<u8>, Error> {
    let mut out = Vec::new();
    ZlibDecoder::new(bytes)
        .read_to_end(&mut out)
        .map_err(Error::CorruptStream)?;
    Ok(out)
}

/// Inflates a zlib stream that is a prefix of `bytes`, returning the inflated
/// payload and the unread tail that follows it in the containing buffer.
///
/// Pack entries are concatenated with no length field for the compressed
/// payload — the decompressor's own termination state is the only thing that
/// reveals where one entry ends and the next begins, so this reads through a
/// `ZlibDecoder` wrapping a `BufRead` over `bytes` and measures how many bytes
/// it actually consumed.
pub fn inflate_stream(bytes: &[u8]) -> Result<(Vec<u8>, &[u8]), Error> {
    let mut decoder = ZlibDecoder::new(bytes);
    let mut out = Vec::new();
    decoder.read_to_end(&mut out).map_err(Error::CorruptStream)?;
    let consumed = decoder.total_in() as usize;
    Ok((out, &bytes[consumed..]))
}

#[derive(Debug, thiserror::Error, displaydoc::Display)]
pub enum Error {
    /// Malformed zlib stream
    CorruptStream(#[source] io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips() {
        let data = b"The quick brown fox jumps over the lazy dog".repeat(20);
        let compressed = deflate(&data).unwrap();
        let decompressed = inflate(&compressed).unwrap();
        assert_eq!(data, decompressed);
    }

    #[test]
    fn streaming_boundary_reports_exact_consumption() {
        let a = b"first entry payload".to_vec();
        let b = b"second entry payload, different length".to_vec();

        let mut concatenated = deflate(&a).unwrap();
        concatenated.extend(deflate(&b).unwrap());

        let (out_a, tail) = inflate_stream(&concatenated).unwrap();
        assert_eq!(a, out_a);

        let (out_b, tail) = inflate_stream(tail).unwrap();
        assert_eq!(b, out_b);
        assert!(tail.is_empty());
    }

    #[test]
    fn empty_blob_hash_is_well_known() {
        let framed = b"blob 0\0";
        let oid = hash(framed);
        assert_eq!(hex::encode(oid), "e69de29bb2d1d6434b8b29ae775ad8c2e48c5391");
    }
}
