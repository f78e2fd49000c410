use std::{
    collections::BTreeMap,
    io::{self, BufRead},
};

use bstr::{BStr, BString, ByteSlice};

use crate::db::{self, object::OID_SIZE, Blob, Db, Object, ObjectBuilder, Oid, UntypedOid};

/// A single built tree: an ordered (by name) set of file and subdirectory
/// entries. Ordering follows the sort key in spec §4.3: a directory sorts
/// as though its name ended in `/`, so `foo` (file) sorts before
/// `foo-bar/` (dir) but after `foo-bar` (file).
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Tree {
    oid: Oid<Tree>,
    nodes: Vec<Node>,
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub enum Node {
    File(FileNode),
    Tree { name: BString, oid: Oid<Tree> },
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct FileNode {
    pub oid: Oid<Blob>,
    pub name: BString,
}

/// Tree entry mode. This core supports only regular files and
/// subdirectories — no symlinks, no executable bit (spec §4.3 edge cases).
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Mode {
    File,
    Dir,
}

impl Mode {
    const FILE: &'static [u8] = b"100644";
    const DIR: &'static [u8] = b"40000";

    pub fn as_octal_bytes(self) -> &'static BStr {
        match self {
            Self::File => Self::FILE.as_bstr(),
            Self::Dir => Self::DIR.as_bstr(),
        }
    }
}

/// The sort key spec §4.3 describes: a directory's key has a trailing `/`
/// appended so it sorts as if its name were one byte longer, splitting it
/// from same-prefix file names at the point where they actually diverge.
fn sort_key(name: &BStr, mode: Mode) -> BString {
    let mut key = name.to_owned();
    if mode == Mode::Dir {
        key.push(b'/');
    }
    key
}

impl Tree {
    pub fn direct_children(&self) -> impl Iterator<Item = &Node> {
        self.nodes.iter()
    }

    pub fn direct_child(&self, name: &BStr) -> Option<&Node> {
        self.nodes.iter().find(|node| node.name() == name)
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

impl Object for Tree {
    const TYPE: &'static [u8] = b"tree";

    type Builder = Builder;
    type DeserializeError = DeserializeError;

    fn oid(&self) -> Oid<Self> {
        self.oid
    }

    fn deserialize(
        oid: Oid<Self>,
        _len: usize,
        mut data: impl BufRead,
    ) -> Result<Self, Self::DeserializeError> {
        let mut nodes = Vec::new();

        while let Some(node) = Node::deserialize(&mut data)? {
            nodes.push(node);
        }

        Ok(Self { oid, nodes })
    }
}

impl Node {
    pub fn untyped_oid(&self) -> UntypedOid {
        match self {
            Self::File(FileNode { oid, .. }) => oid.into_untyped(),
            Self::Tree { oid, .. } => oid.into_untyped(),
        }
    }

    pub fn name(&self) -> &BStr {
        match self {
            Node::File(FileNode { name, .. }) | Node::Tree { name, .. } => name.as_bstr(),
        }
    }

    fn deserialize(mut data: impl BufRead) -> Result<Option<Self>, DeserializeError> {
        let mut mode = Vec::new();
        let bytes_read = data.read_until(b' ', &mut mode)?;
        if bytes_read == 0 {
            return Ok(None);
        }
        mode.pop().unwrap();

        let mut name = BString::from(Vec::new());
        data.read_until(b'\0', &mut name)?;
        name.pop().unwrap();

        let mut oid = [0; OID_SIZE];
        data.read_exact(&mut oid)?;
        let oid = UntypedOid::new(oid);

        let entry = if mode == Mode::DIR {
            Self::Tree {
                oid: oid.to_typed(),
                name,
            }
        } else if mode == Mode::FILE {
            Self::File(FileNode {
                oid: oid.to_typed(),
                name,
            })
        } else {
            return Err(DeserializeError::UnsupportedMode(mode.into()));
        };

        Ok(Some(entry))
    }
}

/// Builds a single directory level at a time, in the order `capture` (see
/// `crate::ws::Workspace::capture`) discovers children. A deep tree is built
/// bottom-up, one `Builder` per directory, so storing a directory's tree
/// never needs more than its direct children in memory.
#[derive(Debug, Clone, Default)]
pub struct Builder {
    nodes: BTreeMap<BString, SerializeNode>,
}

#[derive(Debug, Clone, Eq, PartialEq)]
struct SerializeNode {
    name: BString,
    mode: Mode,
    oid: UntypedOid,
}

impl Builder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_file(&mut self, name: impl Into<BString>, oid: Oid<Blob>) -> &mut Self {
        self.insert(name.into(), Mode::File, oid.into_untyped())
    }

    pub fn add_dir(&mut self, name: impl Into<BString>, oid: Oid<Tree>) -> &mut Self {
        self.insert(name.into(), Mode::Dir, oid.into_untyped())
    }

    fn insert(&mut self, name: BString, mode: Mode, oid: UntypedOid) -> &mut Self {
        let key = sort_key(name.as_bstr(), mode);
        self.nodes.insert(key, SerializeNode { name, mode, oid });
        self
    }
}

impl ObjectBuilder for Builder {
    type Object = Tree;

    fn store(self, db: &Db) -> db::StoreResult<Tree> {
        let mut out = BString::from(Vec::new());

        for entry in self.nodes.into_values() {
            out.extend_from_slice(entry.mode.as_octal_bytes());
            out.push(b' ');
            out.extend_from_slice(entry.name.as_bytes());
            out.push(b'\0');
            out.extend_from_slice(entry.oid.as_bytes());
        }

        db.store_bytes::<Self>(&out)
    }
}

#[derive(Debug, displaydoc::Display, thiserror::Error)]
pub enum DeserializeError {
    /// I/O error reading tree payload
    Io(#[from] io::Error),
    /// Unsupported tree entry mode {0:?}
    UnsupportedMode(BString),
}
