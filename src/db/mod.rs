//! The object store: persists and retrieves typed, content-addressed byte
//! blobs under a two-level fan-out directory (spec §4.2).

pub mod author;
pub mod blob;
mod cache;
pub mod commit;
pub mod object;
pub mod tag;
pub mod tree;

pub use author::Author;
pub use blob::Blob;
pub use commit::Commit;
pub use object::{Object, ObjectBuilder, Oid, OID_SIZE};
pub use tag::Tag;
pub use tree::Tree;

pub use object::UntypedOid;

use bstr::{BString, ByteSlice};
use flate2::{read::ZlibDecoder, write::ZlibEncoder, Compression};
use tempfile::NamedTempFile;

use std::{
    fs::{self, File},
    io::{self, BufRead, BufReader, BufWriter, ErrorKind, Read, Write},
    num::ParseIntError,
    path::{Path, PathBuf},
};

use self::cache::Cache;

/// Note: cloning doesn't keep the cache.
#[derive(Debug)]
pub struct Db {
    path: PathBuf,
    cache: Cache,
}

impl Db {
    pub fn new<P: Into<PathBuf>>(git_dir: P) -> Self {
        Self {
            path: git_dir.into().join("objects"),
            cache: Cache::new(),
        }
    }

    /// Creates `<git_dir>/objects` and `<git_dir>/refs`, and writes
    /// `<git_dir>/HEAD` pointing at `refs/heads/main`. The caller is
    /// responsible for creating `git_dir` itself — `Db::init` only
    /// populates it, matching `Repo::init`'s split between workspace and
    /// object-store setup.
    pub fn init(git_dir: impl AsRef<Path>) -> Result<Self, InitError> {
        let git_dir = git_dir.as_ref();

        for child in &["objects", "refs"] {
            let child = git_dir.join(child);
            fs::create_dir_all(&child).map_err(|e| InitError::Write(child, e))?;
        }

        fs::write(git_dir.join("HEAD"), b"ref: refs/heads/main\n")
            .map_err(|e| InitError::Write(git_dir.join("HEAD"), e))?;

        Ok(Self::new(git_dir))
    }

    pub fn load<O: Object>(&mut self, oid: Oid<O>) -> Result<O, LoadError<O>> {
        if let Some(cached) = self.cache.get(&oid) {
            return Ok(cached.clone());
        }

        let (len, bytes) = self.load_bytes(O::TYPE, &oid)?;
        let object = O::deserialize(oid, len, bytes).map_err(|e| LoadError::Deserialize(oid, e))?;
        self.cache.insert(oid, object.clone());

        Ok(object)
    }

    /// Doesn't cache.
    fn load_bytes<O: Object>(
        &self,
        expected_type: &[u8],
        oid: &Oid<O>,
    ) -> Result<(usize, impl BufRead), LoadBytesError<O>> {
        let path = self.oid_path(oid);
        let file = match File::open(&path) {
            Ok(file) => Ok(file),
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                Err(LoadBytesError::NotFound(*oid))
            }
            Err(err) => Err(LoadBytesError::Open(*oid, err)),
        }?;

        let mut bytes = BufReader::new(ZlibDecoder::new(file));

        let mut o_type = vec![0; expected_type.len() + 1];
        bytes
            .read_exact(&mut o_type)
            .map_err(|e| LoadBytesError::ReadPrefix(*oid, e))?;
        let sep = o_type.pop().unwrap();
        if sep != b' ' {
            return Err(LoadBytesError::Corrupt(*oid));
        }
        if o_type != expected_type {
            return Err(LoadBytesError::WrongType {
                oid: *oid,
                expected: expected_type.into(),
                actual: o_type.into(),
            });
        }

        let mut len = BString::from(Vec::new());
        bytes
            .read_until(b'\0', &mut len)
            .map_err(|e| LoadBytesError::ReadPrefix(*oid, e))?;
        len.pop().unwrap();
        let len = len
            .to_str()
            .map_err(|e| LoadBytesError::ParseLenToBytes(*oid, e))?;
        let len: usize = len
            .parse()
            .map_err(|e| LoadBytesError::ParseLenToInt(*oid, e))?;

        Ok((len, bytes))
    }

    /// Doesn't cache. Content-addressed, so a second store of the same
    /// bytes is a no-op rather than an error.
    pub fn store_bytes<OB: ObjectBuilder>(&self, content: &[u8]) -> StoreResult<OB::Object> {
        self.store_bytes_as::<OB::Object>(OB::Object::TYPE, content)
    }

    /// Used directly by the pack decoder, which knows the declared type of a
    /// reconstructed delta (the base object's type) without going through an
    /// `ObjectBuilder`.
    pub(crate) fn store_bytes_as<O: Object>(
        &self,
        o_type: &'static [u8],
        content: &[u8],
    ) -> StoreResult<O> {
        let mut framed = Self::serialized_prefix(o_type, content);
        framed.extend_from_slice(content);
        let oid = Oid::from_untyped(UntypedOid::for_bytes(&framed));

        self.store_bytes_raw(o_type, content)
            .map_err(|e| StoreError(oid, e))?;
        Ok(oid)
    }

    /// Type-erased store, used where the object type is only known at
    /// runtime (the pack decoder resolving a delta's base type).
    pub(crate) fn store_bytes_raw(&self, o_type: &[u8], content: &[u8]) -> io::Result<UntypedOid> {
        let mut bytes = Self::serialized_prefix(o_type, content);
        bytes.extend_from_slice(content);
        let oid = UntypedOid::for_bytes(&bytes);

        if self.raw_oid_path(&oid).exists() {
            return Ok(oid);
        }

        self.write_object_file(&oid, &bytes)?;
        Ok(oid)
    }

    fn write_object_file(&self, oid: &UntypedOid, bytes: &[u8]) -> io::Result<()> {
        let path = self.raw_oid_path(oid);

        let mut temp =
            NamedTempFile::new_in(path.parent().and_then(Path::parent).unwrap_or(&self.path))?;

        {
            let mut writer = BufWriter::new(&mut temp);
            let mut writer = ZlibEncoder::new(&mut writer, Compression::default());
            writer.write_all(bytes)?;
        }

        // We use a temp file to get an atomic write.
        temp.flush()?;

        match fs::rename(temp.path(), &path) {
            Err(err) if err.kind() == ErrorKind::NotFound => {
                fs::create_dir(path.parent().expect("has parent"))?;
                fs::rename(temp.path(), &path)?;
            }
            Err(err) => return Err(err),
            Ok(()) => (),
        }

        Ok(())
    }

    /// Reads an object without knowing its type ahead of time, matching the
    /// stored type tag against the four known object kinds. Used to resolve
    /// a ref-delta whose base was written by an earlier clone/fetch rather
    /// than appearing in the same pack.
    pub(crate) fn load_raw(&self, oid: &UntypedOid) -> Option<(&'static [u8], Vec<u8>)> {
        let file = File::open(self.raw_oid_path(oid)).ok()?;
        let mut buf = Vec::new();
        ZlibDecoder::new(file).read_to_end(&mut buf).ok()?;

        let sep = buf.iter().position(|&b| b == b' ')?;
        let o_type = match &buf[..sep] {
            b"commit" => Commit::TYPE,
            b"tree" => Tree::TYPE,
            b"blob" => Blob::TYPE,
            b"tag" => Tag::TYPE,
            _ => return None,
        };

        let nul = buf[sep + 1..].iter().position(|&b| b == 0)?;
        let payload_start = sep + 1 + nul + 1;
        Some((o_type, buf[payload_start..].to_vec()))
    }

    pub(crate) fn serialized_prefix(o_type: &[u8], serialized: &[u8]) -> Vec<u8> {
        let size = serialized.len().to_string();

        let mut ser = Vec::with_capacity(o_type.len() + 1 + size.len() + 1);

        ser.extend(o_type);
        ser.push(b' ');
        ser.extend(size.as_bytes());
        ser.push(b'\0');

        ser
    }

    pub(crate) fn oid_path<O: Object>(&self, oid: &Oid<O>) -> PathBuf {
        self.raw_oid_path(oid.as_untyped())
    }

    fn raw_oid_path(&self, oid: &UntypedOid) -> PathBuf {
        let oid = oid.to_hex();
        let dir = self.path.join(&oid[0..2]);
        let name = &oid[2..];
        dir.join(name)
    }
}

impl Clone for Db {
    fn clone(&self) -> Self {
        Self::new(self.path.parent().expect("objects dir has a parent"))
    }
}

pub type StoreResult<O> = Result<Oid<O>, StoreError<O>>;

#[derive(Debug, thiserror::Error, displaydoc::Display)]
/// Failed to store {0:?}
pub struct StoreError<O: Object>(pub Oid<O>, #[source] pub io::Error);

#[derive(Debug, thiserror::Error, displaydoc::Display)]
pub enum LoadError<O: Object + 'static> {
    /// Failed to load bytes of object {0:?}
    LoadBytes(#[from] LoadBytesError<O>),
    /// Failed to deserialize {0:?}
    Deserialize(Oid<O>, #[source] O::DeserializeError),
}

#[derive(Debug, thiserror::Error, displaydoc::Display)]
pub enum LoadBytesError<O: Object + 'static> {
    /// {0:?} not found in database
    NotFound(Oid<O>),
    /// Failed to open the file for {0:?} in the database
    Open(Oid<O>, #[source] io::Error),
    /// Failed to read the prefix from the file for {0:?} in the database
    ReadPrefix(Oid<O>, #[source] io::Error),
    /// Database entry for {0:?} is corrupt
    Corrupt(Oid<O>),
    /// Expected oid {oid:?} to have type {expected}, got {actual}
    WrongType {
        oid: Oid<O>,
        expected: BString,
        actual: BString,
    },
    /// Failed to parse bytes of length of {0:?} as utf-8
    ParseLenToBytes(Oid<O>, #[source] bstr::Utf8Error),
    /// Failed to parse length of {0:?}
    ParseLenToInt(Oid<O>, #[source] ParseIntError),
}

#[derive(Debug, thiserror::Error, displaydoc::Display)]
pub enum InitError {
    /// Failed to populate {0:?}
    Write(PathBuf, #[source] io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn store_then_load_round_trips() {
        let dir = tempdir().unwrap();
        let mut db = Db::init(dir.path()).unwrap();

        let oid = blob::Builder::new(*b"hello").store(&db).unwrap();
        assert_eq!(oid.to_hex(), "b6fc4c620b67d95f953a5c1c1230aaab5db5a1b0");

        let loaded = db.load::<Blob>(oid).unwrap();
        assert_eq!(loaded.bytes, "hello");
    }

    #[test]
    fn stored_object_inflates_to_expected_framing() {
        let dir = tempdir().unwrap();
        let db = Db::init(dir.path()).unwrap();

        let oid = blob::Builder::new(*b"hello").store(&db).unwrap();
        let hex = oid.to_hex();
        let path = dir.path().join("objects").join(&hex[0..2]).join(&hex[2..]);

        let raw = fs::read(path).unwrap();
        let inflated = crate::codec::inflate(&raw).unwrap();
        assert_eq!(inflated, b"blob 5\0hello");
    }

    #[test]
    fn init_creates_required_entries() {
        let dir = tempdir().unwrap();
        Db::init(dir.path()).unwrap();

        assert!(dir.path().join("objects").is_dir());
        assert!(dir.path().join("refs").is_dir());
        assert_eq!(
            fs::read_to_string(dir.path().join("HEAD")).unwrap(),
            "ref: refs/heads/main\n"
        );
    }

    #[test]
    fn storing_same_content_twice_is_a_no_op() {
        let dir = tempdir().unwrap();
        let db = Db::init(dir.path()).unwrap();

        let first = blob::Builder::new(*b"same").store(&db).unwrap();
        let second = blob::Builder::new(*b"same").store(&db).unwrap();
        assert_eq!(first, second);
    }
}
