//! The top-level entry point tying the workspace, object store, and refs
//! together: `init`, `clone` (driving the transport and pack decoder), and
//! a capture+commit operation. There is no staging area (see `ws/mod.rs`)
//! — a commit always captures the working directory exactly as it stands.

use std::{fmt, fs, io, path::PathBuf};

use bstr::ByteSlice;
use chrono::Local;
use tracing::instrument;

use crate::{
    checkout,
    db::{self, Author, Commit, ObjectBuilder, UntypedOid},
    pack,
    refs::{self, Refs},
    transport::{self, FetchError},
    ws::{self, Workspace},
    Db,
};

#[derive(Debug, Clone)]
pub struct Repo {
    git_dir: PathBuf,
    pub workspace: Workspace,
    pub db: Db,
    pub refs: Refs,
}

impl Repo {
    /// Creates `<workspace>/.git` with an empty object store and an unborn
    /// `HEAD` pointing at `refs/heads/main`.
    #[instrument(err)]
    pub fn init(workspace: impl Into<PathBuf> + fmt::Debug) -> Result<Self, InitError> {
        let workspace_dir = workspace.into();

        fs::create_dir_all(&workspace_dir)
            .map_err(|e| InitError::CreateWorkspace(workspace_dir.clone(), e))?;

        let git_dir = workspace_dir.join(".git");
        if git_dir
            .try_exists()
            .map_err(|e| InitError::Open(git_dir.clone(), e))?
        {
            return Err(InitError::Exists(git_dir));
        }

        fs::create_dir_all(&git_dir).map_err(|e| InitError::Write(git_dir.clone(), e))?;
        let db = Db::init(&git_dir)?;
        let refs = Refs::new(&git_dir);
        let workspace = Workspace::new(workspace_dir);

        Ok(Self {
            git_dir,
            workspace,
            db,
            refs,
        })
    }

    /// Clones `url` into a fresh working directory at `workspace`: discovers
    /// the server's refs and pack over smart-HTTP v2 (spec §6), unpacks
    /// every object into the store, writes one file per advertised ref
    /// (including `HEAD`, which the server reports directly rather than as
    /// a symbolic ref), and materializes whatever `HEAD` resolves to into
    /// the workspace.
    #[instrument(err)]
    pub fn clone(
        workspace: impl Into<PathBuf> + fmt::Debug,
        url: &str,
    ) -> Result<Self, CloneError> {
        let mut repo = Self::init(workspace)?;

        let fetched = transport::fetch(url)?;
        if fetched.refs.is_empty() {
            return Ok(repo);
        }

        pack::unpack(&repo.db, &fetched.pack)?;

        let mut head_oid = None;
        for r in &fetched.refs {
            if r.oid == UntypedOid::zero() {
                continue;
            }

            let oid = r.oid.to_typed::<Commit>();
            repo.refs.update_ref(r.name.as_bstr(), oid)?;

            if r.name == "HEAD" {
                head_oid = Some(oid);
            }
        }

        if let Some(oid) = head_oid {
            let commit = repo.db.load::<Commit>(oid)?;
            checkout::render(&mut repo.db, repo.workspace.path(), commit.tree())?;
        }

        Ok(repo)
    }

    /// Captures the full working directory into a tree, commits it with
    /// `HEAD` (if any) as the sole parent, and advances `HEAD`.
    #[instrument(err)]
    pub fn commit(
        &mut self,
        name: impl Into<String> + fmt::Debug,
        email: impl Into<String> + fmt::Debug,
        message: impl Into<String> + fmt::Debug,
    ) -> Result<db::Oid<Commit>, CommitError> {
        let mut message = message.into();
        if message.is_empty() {
            return Err(CommitError::EmptyMessage);
        }
        if !message.ends_with('\n') {
            message.push('\n');
        }

        let tree = self.workspace.capture(&self.db)?;
        let author = Author::new_local(name.into(), email.into(), Local::now());

        let mut builder = db::commit::Builder::new(tree, author.clone(), author, message);
        if let Some(parent) = self.refs.read_head_oid()? {
            builder.add_parent(parent);
        }

        let oid = builder.store(&self.db)?;
        self.refs.update_head(oid)?;

        Ok(oid)
    }
}

#[derive(Debug, thiserror::Error, displaydoc::Display)]
pub enum InitError {
    /// Directory {0:?} already exists
    Exists(PathBuf),
    /// Failed to create workspace directory {0:?}
    CreateWorkspace(PathBuf, #[source] io::Error),
    /// Failed to open directory {0:?} to initialize
    Open(PathBuf, #[source] io::Error),
    /// Failed to populate {0:?}
    Write(PathBuf, #[source] io::Error),
    /// Failed to initialize object store
    Db(#[from] db::InitError),
}

#[derive(Debug, thiserror::Error, displaydoc::Display)]
pub enum CloneError {
    /// Failed to initialize target repository
    Init(#[from] InitError),
    /// Failed to fetch refs and pack from server
    Fetch(#[from] FetchError),
    /// Failed to unpack fetched objects
    Unpack(#[from] pack::UnpackError),
    /// Failed to write a fetched ref
    UpdateRef(#[from] refs::UpdateError),
    /// Failed to load the commit HEAD points at
    LoadHeadCommit(#[from] db::LoadError<Commit>),
    /// Failed to materialize the checked-out tree
    Render(#[from] checkout::RenderError),
}

#[derive(Debug, thiserror::Error, displaydoc::Display)]
pub enum CommitError {
    /// Empty commit message
    EmptyMessage,
    /// Failed to capture workspace into a tree
    Capture(#[from] ws::CaptureError),
    /// Failed to store commit
    StoreCommit(#[from] db::StoreError<Commit>),
    /// Failed to read current HEAD
    ReadHead(#[from] refs::ReadError),
    /// Failed to update HEAD
    UpdateHead(#[from] refs::UpdateError),
}
