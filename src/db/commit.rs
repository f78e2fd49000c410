use std::io::{self, BufRead};

use bstr::{BString, ByteSlice};

use crate::db::{self, Author, Db, Object, ObjectBuilder, Oid, Tree};

/// Wire layout: `tree <hex>`, zero or more `parent <hex>` lines, a single
/// `timestamp <unix-seconds>` line, then bare `author <name> <email>` and
/// `committer <name> <email>` lines (no embedded timestamp or timezone —
/// both share the one `timestamp` line), a blank line, then the message
/// verbatim. This diverges from the name/email/unix-ts/tz format real git
/// embeds directly in the author/committer lines; the separate shared
/// `timestamp` line is this core's own on-disk contract, not git's. The
/// teacher's `Commit` only ever carried a single optional parent; this
/// carries any number, since nothing in the format limits it to one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Commit {
    oid: Oid<Commit>,
    tree: Oid<Tree>,
    parents: Vec<Oid<Commit>>,
    author: Author,
    committer: Author,
    message: BString,
}

impl Commit {
    pub fn tree(&self) -> Oid<Tree> {
        self.tree
    }

    pub fn parents(&self) -> &[Oid<Commit>] {
        &self.parents
    }

    pub fn author(&self) -> &Author {
        &self.author
    }

    pub fn committer(&self) -> &Author {
        &self.committer
    }

    pub fn message(&self) -> &BString {
        &self.message
    }
}

impl Object for Commit {
    const TYPE: &'static [u8] = b"commit";

    type Builder = Builder;
    type DeserializeError = DeserializeError;

    fn oid(&self) -> Oid<Self> {
        self.oid
    }

    fn deserialize(
        oid: Oid<Self>,
        len: usize,
        mut data: impl BufRead,
    ) -> Result<Self, Self::DeserializeError> {
        let mut bytes: BString = vec![0; len].into();
        data.read_exact(&mut bytes)?;

        let (header, message) = bytes
            .find("\n\n")
            .map(|at| (&bytes[..at], &bytes[at + 2..]))
            .ok_or(DeserializeError::MissingHeaderBody)?;

        let mut tree = None;
        let mut parents = Vec::new();
        let mut timestamp = None;
        let mut author_name_email = None;
        let mut committer_name_email = None;

        for line in header.lines() {
            let (key, value) = line
                .find_byte(b' ')
                .map(|at| (&line[..at], line[at + 1..].as_bstr()))
                .ok_or(DeserializeError::MalformedHeaderLine(line.to_owned()))?;

            match key {
                b"tree" => {
                    tree = Some(
                        Oid::parse(value)
                            .map_err(|e| DeserializeError::InvalidTreeOid(value.to_owned(), e))?,
                    );
                }
                b"parent" => {
                    parents.push(
                        Oid::parse(value)
                            .map_err(|e| DeserializeError::InvalidParentOid(value.to_owned(), e))?,
                    );
                }
                b"timestamp" => {
                    let text = value
                        .to_str()
                        .map_err(|e| DeserializeError::MalformedTimestamp(value.to_owned(), e))?;
                    timestamp = Some(
                        text.parse::<i64>()
                            .map_err(|e| DeserializeError::InvalidTimestamp(value.to_owned(), e))?,
                    );
                }
                b"author" => {
                    author_name_email = Some(
                        Author::parse_name_email(value).map_err(DeserializeError::InvalidAuthor)?,
                    );
                }
                b"committer" => {
                    committer_name_email = Some(
                        Author::parse_name_email(value)
                            .map_err(DeserializeError::InvalidCommitter)?,
                    );
                }
                _ => return Err(DeserializeError::UnknownHeaderKey(key.to_owned())),
            }
        }

        let timestamp = timestamp.ok_or(DeserializeError::MissingTimestamp)?;
        let (author_name, author_email) =
            author_name_email.ok_or(DeserializeError::MissingAuthor)?;
        let (committer_name, committer_email) =
            committer_name_email.ok_or(DeserializeError::MissingCommitter)?;

        Ok(Self {
            oid,
            tree: tree.ok_or(DeserializeError::MissingTree)?,
            parents,
            author: Author::from_name_email_and_timestamp(author_name, author_email, timestamp)
                .map_err(DeserializeError::InvalidAuthor)?,
            committer: Author::from_name_email_and_timestamp(
                committer_name,
                committer_email,
                timestamp,
            )
            .map_err(DeserializeError::InvalidCommitter)?,
            message: message.to_owned(),
        })
    }
}

#[derive(Debug, Clone)]
pub struct Builder {
    tree: Oid<Tree>,
    parents: Vec<Oid<Commit>>,
    author: Author,
    committer: Author,
    message: String,
}

impl Builder {
    pub fn new(tree: Oid<Tree>, author: Author, committer: Author, message: String) -> Self {
        Self {
            tree,
            parents: Vec::new(),
            author,
            committer,
            message,
        }
    }

    pub fn add_parent(&mut self, parent: Oid<Commit>) -> &mut Self {
        self.parents.push(parent);
        self
    }
}

impl ObjectBuilder for Builder {
    type Object = Commit;

    fn store(self, db: &Db) -> db::StoreResult<Commit> {
        let mut header = format!("tree {}\n", self.tree.to_hex());
        for parent in &self.parents {
            header.push_str(&format!("parent {}\n", parent.to_hex()));
        }
        header.push_str(&format!("timestamp {}\n", self.author.unix_timestamp()));
        header.push_str(&format!("author {}\n", self.author.serialize_name_email()));
        header.push_str(&format!(
            "committer {}\n",
            self.committer.serialize_name_email()
        ));

        let mut ser = BString::from(header);
        ser.push(b'\n');
        ser.extend_from_slice(self.message.as_bytes());

        db.store_bytes::<Self>(ser.as_bstr())
    }
}

#[derive(Debug, displaydoc::Display, thiserror::Error)]
pub enum DeserializeError {
    /// I/O error reading commit payload
    Io(#[from] io::Error),
    /// Commit has no blank line separating header from message
    MissingHeaderBody,
    /// Malformed commit header line: {0}
    MalformedHeaderLine(BString),
    /// Unknown commit header key: {0}
    UnknownHeaderKey(BString),
    /// Commit header has no `tree` line
    MissingTree,
    /// Invalid tree oid {0}
    InvalidTreeOid(BString, #[source] db::object::ParseOidError),
    /// Invalid parent oid {0}
    InvalidParentOid(BString, #[source] db::object::ParseOidError),
    /// Commit header has no `timestamp` line
    MissingTimestamp,
    /// Timestamp {0:?} is not valid utf8
    MalformedTimestamp(BString, #[source] bstr::Utf8Error),
    /// Invalid timestamp {0:?}
    InvalidTimestamp(BString, #[source] std::num::ParseIntError),
    /// Commit header has no `author` line
    MissingAuthor,
    /// Invalid author line
    InvalidAuthor(#[source] db::author::ParseError),
    /// Commit header has no `committer` line
    MissingCommitter,
    /// Invalid committer line
    InvalidCommitter(#[source] db::author::ParseError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::tempdir;

    fn author() -> Author {
        Author::new(
            "Ada Lovelace",
            "ada@example.com",
            chrono::FixedOffset::east(0).timestamp(1_600_000_000, 0),
        )
    }

    #[test]
    fn round_trips_with_no_parents() {
        let dir = tempdir().unwrap();
        let mut db = Db::init(dir.path()).unwrap();

        let tree_oid = crate::db::tree::Builder::new().store(&db).unwrap();
        let oid = Builder::new(tree_oid, author(), author(), "initial\n".to_owned())
            .store(&db)
            .unwrap();

        let commit = db.load::<Commit>(oid).unwrap();
        assert_eq!(commit.tree(), tree_oid);
        assert!(commit.parents().is_empty());
        assert_eq!(commit.message(), "initial\n");
    }

    #[test]
    fn round_trips_with_multiple_parents() {
        let dir = tempdir().unwrap();
        let mut db = Db::init(dir.path()).unwrap();

        let tree_oid = crate::db::tree::Builder::new().store(&db).unwrap();
        let p1 = Builder::new(tree_oid, author(), author(), "p1\n".to_owned())
            .store(&db)
            .unwrap();
        let p2 = Builder::new(tree_oid, author(), author(), "p2\n".to_owned())
            .store(&db)
            .unwrap();

        let mut builder = Builder::new(tree_oid, author(), author(), "merge\n".to_owned());
        builder.add_parent(p1);
        builder.add_parent(p2);
        let oid = builder.store(&db).unwrap();

        let commit = db.load::<Commit>(oid).unwrap();
        assert_eq!(commit.parents(), &[p1, p2]);
    }

    #[test]
    fn tree_oid_sits_at_byte_offset_five() {
        // the first header line is always `tree ` followed by a 40-char
        // hex oid, so parsing `bytes[5..45]` after the `<type> <len>\0`
        // framing prefix recovers the tree oid without a full header parse.
        let dir = tempdir().unwrap();
        let db = Db::init(dir.path()).unwrap();

        let tree_oid = crate::db::tree::Builder::new().store(&db).unwrap();
        let oid = Builder::new(tree_oid, author(), author(), "msg\n".to_owned())
            .store(&db)
            .unwrap();

        let hex = oid.to_hex();
        let path = dir
            .path()
            .join("objects")
            .join(&hex[0..2])
            .join(&hex[2..]);
        let raw = std::fs::read(path).unwrap();
        let inflated = crate::codec::inflate(&raw).unwrap();

        let header_end = inflated.iter().position(|&b| b == 0).unwrap();
        let body = &inflated[header_end + 1..];
        assert_eq!(&body[0..5], b"tree ");
        assert_eq!(&body[5..45], tree_oid.to_hex().as_bytes());
    }

    #[test]
    fn header_carries_a_shared_timestamp_line_and_bare_name_email_lines() {
        let dir = tempdir().unwrap();
        let mut db = Db::init(dir.path()).unwrap();

        let tree_oid = crate::db::tree::Builder::new().store(&db).unwrap();
        let oid = Builder::new(tree_oid, author(), author(), "msg\n".to_owned())
            .store(&db)
            .unwrap();

        let commit = db.load::<Commit>(oid).unwrap();
        assert_eq!(commit.author().unix_timestamp(), 1_600_000_000);
        assert_eq!(commit.author().name(), "Ada Lovelace");
        assert_eq!(commit.author().email(), "ada@example.com");
        assert_eq!(commit.committer().unix_timestamp(), 1_600_000_000);

        let hex = oid.to_hex();
        let path = dir.path().join("objects").join(&hex[0..2]).join(&hex[2..]);
        let raw = std::fs::read(path).unwrap();
        let inflated = crate::codec::inflate(&raw).unwrap();
        let header_end = inflated.iter().position(|&b| b == 0).unwrap();
        let body = &inflated[header_end + 1..];

        let expected_header = format!(
            "tree {}\ntimestamp 1600000000\nauthor Ada Lovelace <ada@example.com>\ncommitter Ada Lovelace <ada@example.com>\n\nmsg\n",
            tree_oid.to_hex()
        );
        assert_eq!(body, expected_header.as_bytes());
    }
}
