//! Pack decoder (spec §4.4): parses the `PACK` container, inflates each
//! entry, and resolves the two delta flavors (offset-delta and ref-delta)
//! against either another entry in the same pack or an object already in
//! the store.

pub mod delta;
pub mod varint;

use std::collections::HashMap;

use byteorder::{BigEndian, ReadBytesExt};
use tracing::instrument;

use crate::{
    codec,
    db::{Db, Object, UntypedOid},
};

const MAGIC: &[u8; 4] = b"PACK";

const TYPE_COMMIT: u8 = 1;
const TYPE_TREE: u8 = 2;
const TYPE_BLOB: u8 = 3;
const TYPE_TAG: u8 = 4;
const TYPE_OFS_DELTA: u8 = 6;
const TYPE_REF_DELTA: u8 = 7;

fn type_name(code: u8) -> Option<&'static [u8]> {
    match code {
        TYPE_COMMIT => Some(crate::db::Commit::TYPE),
        TYPE_TREE => Some(crate::db::Tree::TYPE),
        TYPE_BLOB => Some(crate::db::Blob::TYPE),
        TYPE_TAG => Some(crate::db::Tag::TYPE),
        _ => None,
    }
}

enum RawEntry {
    Base {
        o_type: &'static [u8],
        payload: Vec<u8>,
    },
    OfsDelta {
        base_offset: usize,
        payload: Vec<u8>,
    },
    RefDelta {
        base_oid: UntypedOid,
        payload: Vec<u8>,
    },
}

/// Unpacks `data` (the concatenation of sideband pack-data payloads, see
/// `crate::transport::fetch`) into `db`, returning the oid of every object
/// written.
#[instrument(skip(db, data), err)]
pub fn unpack(db: &Db, data: &[u8]) -> Result<Vec<UntypedOid>, UnpackError> {
    if data.len() < 12 || &data[0..4] != MAGIC {
        return Err(UnpackError::BadMagic);
    }

    let mut header = &data[4..12];
    let version = header.read_u32::<BigEndian>().map_err(|_| UnpackError::TruncatedPack)?;
    if version != 2 && version != 3 {
        return Err(UnpackError::UnsupportedVersion(version));
    }
    let count = header.read_u32::<BigEndian>().map_err(|_| UnpackError::TruncatedPack)?;

    let mut cursor = 12usize;
    let mut entries = Vec::with_capacity(count as usize);
    let mut offset_index = HashMap::new();

    for _ in 0..count {
        let entry_start = cursor;
        offset_index.insert(entry_start, entries.len());

        let mut header_reader = &data[cursor..];
        let before = header_reader.len();
        let (type_code, _declared_size) =
            varint::read_entry_header(&mut header_reader).map_err(|_| UnpackError::TruncatedPack)?;
        cursor += before - header_reader.len();

        let entry = match type_code {
            TYPE_OFS_DELTA => {
                let base_offset = read_ofs_delta_offset(&data[cursor..], &mut cursor)?;
                let base_offset = entry_start
                    .checked_sub(base_offset)
                    .ok_or(UnpackError::CorruptObject("offset-delta base precedes pack start"))?;
                let (payload, tail) =
                    codec::inflate_stream(&data[cursor..]).map_err(UnpackError::Inflate)?;
                cursor = data.len() - tail.len();
                RawEntry::OfsDelta {
                    base_offset,
                    payload,
                }
            }
            TYPE_REF_DELTA => {
                if data.len() < cursor + codec::DIGEST_SIZE {
                    return Err(UnpackError::TruncatedPack);
                }
                let mut oid_bytes = [0u8; codec::DIGEST_SIZE];
                oid_bytes.copy_from_slice(&data[cursor..cursor + codec::DIGEST_SIZE]);
                cursor += codec::DIGEST_SIZE;
                let (payload, tail) =
                    codec::inflate_stream(&data[cursor..]).map_err(UnpackError::Inflate)?;
                cursor = data.len() - tail.len();
                RawEntry::RefDelta {
                    base_oid: UntypedOid::new(oid_bytes),
                    payload,
                }
            }
            other => {
                let o_type = type_name(other).ok_or(UnpackError::UnknownType(other))?;
                let (payload, tail) =
                    codec::inflate_stream(&data[cursor..]).map_err(UnpackError::Inflate)?;
                cursor = data.len() - tail.len();
                RawEntry::Base { o_type, payload }
            }
        };

        entries.push(entry);
    }

    if data.len() >= cursor + codec::DIGEST_SIZE {
        let trailer = &data[cursor..cursor + codec::DIGEST_SIZE];
        let computed = codec::hash(&data[..cursor]);
        if trailer != &computed[..] {
            return Err(UnpackError::CorruptObject("pack trailer checksum mismatch"));
        }
    }

    resolve_and_store(db, entries, &offset_index)
}

/// The offset-delta base offset uses its own encoding (distinct from the
/// plain delta-size varint): 7 bits per byte, continuation in the MSB, but
/// each continuation adds one before shifting, so `0` is not a representable
/// gap between consecutive encoded lengths.
fn read_ofs_delta_offset(bytes: &[u8], cursor: &mut usize) -> Result<usize, UnpackError> {
    let mut iter = bytes.iter();
    let first = *iter.next().ok_or(UnpackError::TruncatedPack)?;
    let mut value = u64::from(first & 0x7f);
    let mut consumed = 1;

    let mut more = first & 0x80 != 0;
    while more {
        let byte = *iter.next().ok_or(UnpackError::TruncatedPack)?;
        consumed += 1;
        value = (value + 1) << 7 | u64::from(byte & 0x7f);
        more = byte & 0x80 != 0;
    }

    *cursor += consumed;
    Ok(value as usize)
}

fn resolve_and_store(
    db: &Db,
    entries: Vec<RawEntry>,
    offset_index: &HashMap<usize, usize>,
) -> Result<Vec<UntypedOid>, UnpackError> {
    let mut resolved: Vec<Option<(&'static [u8], Vec<u8>)>> = (0..entries.len()).map(|_| None).collect();
    let mut oid_by_index: HashMap<usize, UntypedOid> = HashMap::new();
    let mut oid_to_index: HashMap<UntypedOid, usize> = HashMap::new();

    // Base objects resolve immediately without touching any delta logic.
    for (i, entry) in entries.iter().enumerate() {
        if let RawEntry::Base { o_type, payload } = entry {
            let oid = UntypedOid::for_bytes(framed(o_type, payload));
            resolved[i] = Some((*o_type, payload.clone()));
            oid_by_index.insert(i, oid);
            oid_to_index.insert(oid, i);
        }
    }

    let mut progressed = true;
    while progressed {
        progressed = false;

        for i in 0..entries.len() {
            if resolved[i].is_some() {
                continue;
            }

            let (base_bytes, delta_payload, o_type) = match &entries[i] {
                RawEntry::Base { .. } => unreachable!("base entries resolved above"),
                RawEntry::OfsDelta {
                    base_offset,
                    payload,
                } => {
                    let base_index = *offset_index
                        .get(base_offset)
                        .ok_or(UnpackError::CorruptObject("offset-delta base offset not at an entry boundary"))?;
                    match &resolved[base_index] {
                        Some((o_type, bytes)) => (bytes.clone(), payload, *o_type),
                        None => continue,
                    }
                }
                RawEntry::RefDelta { base_oid, payload } => {
                    if let Some(&base_index) = oid_to_index.get(base_oid) {
                        match &resolved[base_index] {
                            Some((o_type, bytes)) => (bytes.clone(), payload, *o_type),
                            None => continue,
                        }
                    } else if let Some((o_type, bytes)) = load_external_base(db, base_oid) {
                        (bytes, payload, o_type)
                    } else {
                        continue;
                    }
                }
            };

            let target = delta::apply(&base_bytes, delta_payload).map_err(UnpackError::Delta)?;
            let oid = UntypedOid::for_bytes(framed(o_type, &target));
            oid_by_index.insert(i, oid);
            oid_to_index.insert(oid, i);
            resolved[i] = Some((o_type, target));
            progressed = true;
        }
    }

    let mut written = Vec::with_capacity(entries.len());
    for (i, entry) in resolved.iter().enumerate() {
        let (o_type, bytes) = entry
            .as_ref()
            .ok_or(UnpackError::MissingBase(entry_label(&entries[i])))?;
        let oid = db
            .store_bytes_raw(o_type, bytes)
            .map_err(UnpackError::Store)?;
        written.push(oid);
    }

    Ok(written)
}

fn entry_label(entry: &RawEntry) -> &'static str {
    match entry {
        RawEntry::Base { .. } => "base",
        RawEntry::OfsDelta { .. } => "offset-delta",
        RawEntry::RefDelta { .. } => "ref-delta",
    }
}

/// Looks up an object already present in the store, for a ref-delta whose
/// base was fetched in an earlier clone/fetch rather than in this pack.
fn load_external_base(db: &Db, oid: &UntypedOid) -> Option<(&'static [u8], Vec<u8>)> {
    db.load_raw(oid)
}

fn framed(o_type: &[u8], payload: &[u8]) -> Vec<u8> {
    let mut out = Db::serialized_prefix(o_type, payload);
    out.extend_from_slice(payload);
    out
}

#[derive(Debug, thiserror::Error, displaydoc::Display)]
pub enum UnpackError {
    /// Pack does not start with the `PACK` magic
    BadMagic,
    /// Unsupported pack version {0}
    UnsupportedVersion(u32),
    /// Pack stream is shorter than its declared object count or an entry is incomplete
    TruncatedPack,
    /// Pack entry with unrecognized type code {0}
    UnknownType(u8),
    /// Corrupt pack: {0}
    CorruptObject(&'static str),
    /// Failed to inflate pack entry
    Inflate(#[source] codec::Error),
    /// Failed to apply delta
    Delta(#[source] delta::Error),
    /// Delta could not be resolved after exhausting all passes ({0})
    MissingBase(&'static str),
    /// Failed to store reconstructed object
    Store(std::io::Error),
}
