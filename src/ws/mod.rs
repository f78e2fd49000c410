//! The working directory: capturing its current state into a tree object
//! (spec §4.3). There is no index/staging area in this core — a commit
//! always captures the full working directory as it stands.

use crate::db::{self, Blob, Db, ObjectBuilder, Oid, Tree};

use bstr::{BString, ByteSlice};
use std::{
    fs, io,
    os::unix::ffi::OsStrExt,
    path::{Path, PathBuf},
};
use tracing::instrument;

#[derive(Debug, Clone)]
pub struct Workspace {
    path: PathBuf,
}

impl Workspace {
    const IGNORE: &'static [&'static [u8]] = &[b".git"];

    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Recursively builds and stores a tree object for the whole workspace,
    /// skipping `.git`. This is the capture half of spec §4.3: the
    /// workspace-walk / tree-build loop that the renderer in `checkout.rs`
    /// inverts.
    #[instrument(skip(db), err)]
    pub fn capture(&self, db: &Db) -> Result<Oid<Tree>, CaptureError> {
        self.capture_dir(db, &self.path)
    }

    fn capture_dir(&self, db: &Db, abs_dir: &Path) -> Result<Oid<Tree>, CaptureError> {
        let mut builder = db::tree::Builder::new();

        let mut entries: Vec<_> = abs_dir
            .read_dir()
            .map_err(|e| CaptureError::ReadDir(abs_dir.to_owned(), e))?
            .collect::<Result<Vec<_>, io::Error>>()
            .map_err(|e| CaptureError::ReadDir(abs_dir.to_owned(), e))?;
        entries.sort_by_key(std::fs::DirEntry::file_name);

        for entry in entries {
            let name = entry.file_name();
            if Self::IGNORE.iter().any(|&i| name.as_bytes() == i) {
                continue;
            }

            let child_path = entry.path();
            let meta = entry
                .metadata()
                .map_err(|e| CaptureError::GetMetadata(child_path.clone(), e))?;

            let name = BString::from(name.as_bytes().to_vec());

            if meta.is_dir() {
                let oid = self.capture_dir(db, &child_path)?;
                builder.add_dir(name, oid);
            } else if meta.is_file() {
                let bytes = fs::read(&child_path)
                    .map_err(|e| CaptureError::ReadFile(child_path.clone(), e))?;
                let oid = db::blob::Builder::new(bytes)
                    .store(db)
                    .map_err(|e| CaptureError::StoreBlob(child_path.clone(), e))?;
                builder.add_file(name, oid);
            } else {
                return Err(CaptureError::InvalidFileType(child_path));
            }
        }

        builder
            .store(db)
            .map_err(|e| CaptureError::StoreTree(abs_dir.to_owned(), e))
    }
}

#[derive(Debug, displaydoc::Display, thiserror::Error)]
pub enum CaptureError {
    /// {0:?} is neither a file nor a directory
    InvalidFileType(PathBuf),
    /// Failed to read directory {0:?}
    ReadDir(PathBuf, #[source] io::Error),
    /// Failed to get metadata of {0:?}
    GetMetadata(PathBuf, #[source] io::Error),
    /// Failed to read file {0:?}
    ReadFile(PathBuf, #[source] io::Error),
    /// Failed to store blob for {0:?}
    StoreBlob(PathBuf, #[source] db::StoreError<Blob>),
    /// Failed to store tree for {0:?}
    StoreTree(PathBuf, #[source] db::StoreError<Tree>),
}
