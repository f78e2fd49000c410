// TODO: Warn clippy::cargo
#![warn(clippy::all, clippy::pedantic)]
#![allow(
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::must_use_candidate
)]

pub mod checkout;
pub mod codec;
pub mod db;
pub mod locked_file;
pub mod pack;
pub mod refs;
mod repo;
pub mod transport;
pub mod ws;

pub use db::{Blob, Commit, Db, Object, ObjectBuilder, Oid, Tag, Tree, UntypedOid};
pub use locked_file::LockedFile;
pub use refs::Refs;
pub use repo::{CloneError, CommitError, InitError, Repo};
pub use ws::Workspace;
