//! Reference storage: `refs/heads/<name>` files holding a hex OID, and a
//! `HEAD` that is either a symbolic ref (`ref: refs/heads/main\n`) or a
//! direct OID, matching spec.md §3's `HEAD`/ref file layout.

use bstr::{BStr, BString, ByteSlice};

use crate::{db::Commit, locked_file, LockedFile, Oid};
use std::{
    ffi::OsStr,
    fs,
    io::{self, Write},
    os::unix::prelude::OsStrExt,
    path::PathBuf,
};

const SYMBOLIC_PREFIX: &[u8] = b"ref: ";

#[derive(Debug, Clone)]
pub struct Refs {
    /// The `.git` dir itself. `HEAD` lives directly under it; named refs
    /// live under `refs/`.
    git_dir: PathBuf,
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub enum HeadState {
    Detached(Oid<Commit>),
    Symbolic(BString),
    Unborn,
}

impl Refs {
    const HEAD: &'static str = "HEAD";

    pub fn new<P: Into<PathBuf>>(git_dir: P) -> Self {
        Self {
            git_dir: git_dir.into(),
        }
    }

    pub fn update_ref(&self, ref_name: &BStr, oid: Oid<Commit>) -> Result<(), UpdateError> {
        let path = self.ref_path(ref_name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| UpdateError::Write(ref_name.to_owned(), e))?;
        }

        let mut lock =
            LockedFile::acquire(path).map_err(|e| UpdateError::Lock(ref_name.to_owned(), e))?;

        lock.write_all(oid.to_hex().as_bytes())
            .map_err(|e| UpdateError::Write(ref_name.to_owned(), e))?;
        lock.write_all(b"\n")
            .map_err(|e| UpdateError::Write(ref_name.to_owned(), e))?;
        lock.commit()
            .map_err(|e| UpdateError::Write(ref_name.to_owned(), e))?;

        Ok(())
    }

    /// Updates whatever `HEAD` currently points at: if `HEAD` is symbolic,
    /// updates the ref it names; if detached, overwrites `HEAD` directly.
    /// An unborn `HEAD` (fresh `init`, no commits yet) is treated as
    /// symbolic, pointing at the branch its `ref:` line names.
    pub fn update_head(&self, oid: Oid<Commit>) -> Result<(), UpdateError> {
        match self.read_raw(Self::HEAD.as_bytes().as_bstr())? {
            Some(raw) if raw.starts_with(SYMBOLIC_PREFIX) => {
                let branch = raw[SYMBOLIC_PREFIX.len()..].trim().as_bstr().to_owned();
                self.update_ref(branch.as_bstr(), oid)
            }
            _ => self.update_ref(Self::HEAD.as_bytes().as_bstr(), oid),
        }
    }

    pub fn read_head(&self) -> Result<HeadState, ReadError> {
        let raw = match self.read_raw(Self::HEAD.as_bytes().as_bstr())? {
            Some(raw) => raw,
            None => return Ok(HeadState::Unborn),
        };

        if let Some(branch) = raw.strip_prefix(SYMBOLIC_PREFIX) {
            let branch = branch.trim().as_bstr().to_owned();
            Ok(HeadState::Symbolic(branch))
        } else {
            let oid = Oid::parse(raw.trim())
                .map_err(|e| ReadError(Self::HEAD.as_bytes().as_bstr().to_owned(), io_err(e)))?;
            Ok(HeadState::Detached(oid))
        }
    }

    /// Resolves `HEAD` all the way down to a commit oid, if one exists yet.
    pub fn read_head_oid(&self) -> Result<Option<Oid<Commit>>, ReadError> {
        match self.read_head()? {
            HeadState::Detached(oid) => Ok(Some(oid)),
            HeadState::Symbolic(branch) => self.read_ref(branch.as_bstr()),
            HeadState::Unborn => Ok(None),
        }
    }

    pub fn read_ref(&self, ref_name: &BStr) -> Result<Option<Oid<Commit>>, ReadError> {
        let raw = match self.read_raw(ref_name)? {
            Some(raw) => raw,
            None => return Ok(None),
        };
        let oid = Oid::parse(raw.trim())
            .map_err(|e| ReadError(ref_name.to_owned(), io_err(e)))?;
        Ok(Some(oid))
    }

    fn read_raw(&self, ref_name: &BStr) -> Result<Option<BString>, ReadError> {
        match fs::read(self.ref_path(ref_name)) {
            Ok(bytes) => Ok(Some(bytes.into())),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(ReadError(ref_name.to_owned(), err)),
        }
    }

    fn ref_path(&self, ref_name: &BStr) -> PathBuf {
        self.git_dir.join(OsStr::from_bytes(ref_name.as_bytes()))
    }
}

fn io_err(e: crate::db::object::ParseOidError) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, e)
}

/// Failed to read ref {0}
#[derive(Debug, displaydoc::Display, thiserror::Error)]
pub struct ReadError(pub BString, #[source] pub io::Error);

#[derive(Debug, displaydoc::Display, thiserror::Error)]
pub enum UpdateError {
    /// Error writing ref {0}
    Write(BString, #[source] io::Error),
    /// Error locking ref {0} for writing
    Lock(BString, #[source] locked_file::Error),
    /// Error reading current HEAD while updating
    ReadHead(#[from] ReadError),
}
