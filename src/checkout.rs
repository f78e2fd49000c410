//! Checkout renderer (spec §4.5): materializes a tree object recursively
//! into a target directory. The inverse of `ws::Workspace::capture` — that
//! walks a directory into a tree, this walks a tree back into a directory.

use std::{ffi::OsStr, fs, io, os::unix::ffi::OsStrExt, path::Path, path::PathBuf};

use tracing::instrument;

use crate::db::{
    self,
    tree::{FileNode, Node},
    Blob, Db, Object, Oid, Tree,
};

/// Creates `target_dir` and writes every file/subdirectory reachable from
/// `tree_oid` underneath it, recursing for nested trees.
#[instrument(skip(db), err)]
pub fn render(db: &mut Db, target_dir: &Path, tree_oid: Oid<Tree>) -> Result<(), RenderError> {
    fs::create_dir_all(target_dir)
        .map_err(|e| RenderError::CreateDir(target_dir.to_owned(), e))?;

    let tree = db.load(tree_oid).map_err(RenderError::LoadTree)?;
    let children: Vec<_> = tree.direct_children().cloned().collect();

    for node in children {
        match node {
            Node::File(FileNode { name, oid }) => {
                let path = target_dir.join(os_str_from_bytes(name.as_bytes()));
                let blob = db.load(oid).map_err(RenderError::LoadBlob)?;
                fs::write(&path, blob.bytes.as_bytes())
                    .map_err(|e| RenderError::WriteFile(path, e))?;
            }
            Node::Tree { name, oid } => {
                let path = target_dir.join(os_str_from_bytes(name.as_bytes()));
                render(db, &path, oid)?;
            }
        }
    }

    Ok(())
}

fn os_str_from_bytes(bytes: &[u8]) -> &OsStr {
    OsStr::from_bytes(bytes)
}

#[derive(Debug, thiserror::Error, displaydoc::Display)]
pub enum RenderError {
    /// Failed to create directory {0:?}
    CreateDir(PathBuf, #[source] io::Error),
    /// Failed to load tree during checkout
    LoadTree(#[source] db::LoadError<Tree>),
    /// Failed to load blob during checkout
    LoadBlob(#[source] db::LoadError<Blob>),
    /// Failed to write file {0:?}
    WriteFile(PathBuf, #[source] io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use bstr::ByteSlice;
    use tempfile::tempdir;

    #[test]
    fn renders_nested_tree() {
        let db_dir = tempdir().unwrap();
        let mut db = Db::init(db_dir.path()).unwrap();

        let file_oid = db::blob::Builder::new(*b"hi\n").store(&db).unwrap();
        let mut sub = db::tree::Builder::new();
        sub.add_file("README", file_oid);
        let sub_oid = sub.store(&db).unwrap();

        let mut root = db::tree::Builder::new();
        root.add_dir("docs", sub_oid);
        let root_oid = root.store(&db).unwrap();

        let out_dir = tempdir().unwrap();
        let target = out_dir.path().join("checkout");
        render(&mut db, &target, root_oid).unwrap();

        let contents = fs::read(target.join("docs").join("README")).unwrap();
        assert_eq!(contents.as_bstr(), b"hi\n".as_bstr());
    }

    #[test]
    fn renders_empty_tree_as_empty_directory() {
        let db_dir = tempdir().unwrap();
        let mut db = Db::init(db_dir.path()).unwrap();
        let oid = db::tree::Builder::new().store(&db).unwrap();

        let out_dir = tempdir().unwrap();
        let target = out_dir.path().join("checkout");
        render(&mut db, &target, oid).unwrap();

        assert!(target.is_dir());
        assert_eq!(fs::read_dir(&target).unwrap().count(), 0);
    }
}
