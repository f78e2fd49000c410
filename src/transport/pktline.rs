//! Packet-line framing (spec §6): `<4-hex-length><payload>`, where the
//! length covers the 4-byte header itself. A length of `0000` is a flush
//! packet with no payload; `0001` is a delimiter packet, also with no
//! payload, used by protocol v2 to separate command arguments from the
//! command line itself.

use std::fmt;

const HEADER_LEN: usize = 4;
pub const FLUSH: &[u8] = b"0000";
pub const DELIM: &[u8] = b"0001";

/// Appends `payload` to `out` as one pkt-line.
pub fn write(out: &mut Vec<u8>, payload: &[u8]) {
    let len = HEADER_LEN + payload.len();
    out.extend_from_slice(format!("{:04x}", len).as_bytes());
    out.extend_from_slice(payload);
}

/// Appends a flush packet (`0000`) to `out`.
pub fn write_flush(out: &mut Vec<u8>) {
    out.extend_from_slice(FLUSH);
}

/// Appends a delimiter packet (`0001`) to `out`.
pub fn write_delim(out: &mut Vec<u8>) {
    out.extend_from_slice(DELIM);
}

#[derive(Debug, Eq, PartialEq)]
pub enum Packet<'a> {
    Flush,
    Delim,
    Data(&'a [u8]),
}

/// Walks a byte buffer as a sequence of pkt-lines, in order.
pub struct Reader<'a> {
    rest: &'a [u8],
}

impl<'a> Reader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { rest: data }
    }

    pub fn remaining(&self) -> &'a [u8] {
        self.rest
    }
}

impl<'a> Iterator for Reader<'a> {
    type Item = Result<Packet<'a>, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.rest.is_empty() {
            return None;
        }

        if self.rest.len() < HEADER_LEN {
            return Some(Err(Error::Truncated));
        }

        let (len_hex, tail) = self.rest.split_at(HEADER_LEN);
        let len_str = match std::str::from_utf8(len_hex) {
            Ok(s) => s,
            Err(_) => return Some(Err(Error::MalformedLength(len_hex.to_vec()))),
        };
        let len = match usize::from_str_radix(len_str, 16) {
            Ok(len) => len,
            Err(_) => return Some(Err(Error::MalformedLength(len_hex.to_vec()))),
        };

        if len == 0 {
            self.rest = tail;
            return Some(Ok(Packet::Flush));
        }

        if len == 1 {
            self.rest = tail;
            return Some(Ok(Packet::Delim));
        }

        if len < HEADER_LEN {
            return Some(Err(Error::MalformedLength(len_hex.to_vec())));
        }

        let payload_len = len - HEADER_LEN;
        if tail.len() < payload_len {
            return Some(Err(Error::Truncated));
        }

        let (payload, rest) = tail.split_at(payload_len);
        self.rest = rest;
        Some(Ok(Packet::Data(payload)))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    Truncated,
    MalformedLength(Vec<u8>),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Truncated => write!(f, "pkt-line stream ends mid-packet"),
            Self::MalformedLength(bytes) => {
                write!(f, "pkt-line length prefix is not 4 hex digits: {bytes:?}")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_data_packet() {
        let mut buf = Vec::new();
        write(&mut buf, b"hello");
        assert_eq!(&buf, b"000ahello");

        let mut reader = Reader::new(&buf);
        assert_eq!(reader.next().unwrap().unwrap(), Packet::Data(b"hello"));
        assert!(reader.next().is_none());
    }

    #[test]
    fn reads_flush_packet() {
        let mut reader = Reader::new(b"0000");
        assert_eq!(reader.next().unwrap().unwrap(), Packet::Flush);
        assert!(reader.next().is_none());
    }

    #[test]
    fn reads_delim_packet() {
        let mut buf = Vec::new();
        write_delim(&mut buf);
        assert_eq!(&buf, b"0001");

        let mut reader = Reader::new(&buf);
        assert_eq!(reader.next().unwrap().unwrap(), Packet::Delim);
        assert!(reader.next().is_none());
    }

    #[test]
    fn reads_sequence_ending_in_flush() {
        let mut buf = Vec::new();
        write(&mut buf, b"# service=git-upload-pack\n");
        write_flush(&mut buf);
        write(&mut buf, b"first");
        write(&mut buf, b"second");
        write_flush(&mut buf);

        let packets: Vec<_> = Reader::new(&buf).map(Result::unwrap).collect();
        assert_eq!(
            packets,
            vec![
                Packet::Data(b"# service=git-upload-pack\n"),
                Packet::Flush,
                Packet::Data(b"first"),
                Packet::Data(b"second"),
                Packet::Flush,
            ]
        );
    }

    #[test]
    fn truncated_stream_is_an_error() {
        let mut reader = Reader::new(b"0010ab");
        assert!(matches!(reader.next(), Some(Err(Error::Truncated))));
    }
}
