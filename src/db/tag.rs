use std::io::{self, BufRead};

use bstr::{BString, ByteSlice};

use crate::db::{self, Db, Object, ObjectBuilder, Oid};

/// Byte-identical passthrough: stored verbatim, never interpreted. Spec §3
/// only requires a tag round-trip through the store, not understanding its
/// internal structure.
#[derive(Debug, Clone)]
pub struct Tag {
    pub bytes: BString,
    pub oid: Oid<Tag>,
}

impl Object for Tag {
    const TYPE: &'static [u8] = b"tag";

    type Builder = Builder;

    type DeserializeError = io::Error;

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
        Ok(Self { bytes, oid })
    }
}

#[derive(Debug, Clone)]
pub struct Builder(BString);

impl Builder {
    pub fn new<B: Into<BString>>(bytes: B) -> Self {
        Self(bytes.into())
    }
}

impl ObjectBuilder for Builder {
    type Object = Tag;

    fn store(self, db: &Db) -> db::StoreResult<Tag> {
        db.store_bytes::<Self>(self.0.as_bstr())
    }
}
