use bstr::{BStr, BString, ByteSlice};
use chrono::{DateTime, FixedOffset, Local, TimeZone};
use lazy_static::lazy_static;
use regex::bytes::Regex;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Author {
    name: BString,
    email: BString,
    time: DateTime<FixedOffset>,
}

impl Author {
    pub fn new(
        name: impl Into<BString>,
        email: impl Into<BString>,
        time: DateTime<FixedOffset>,
    ) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
            time,
        }
    }

    pub fn new_local(
        name: impl Into<BString>,
        email: impl Into<BString>,
        time: DateTime<Local>,
    ) -> Self {
        let offset = time.offset();
        let time = time.with_timezone(offset);
        Self::new(name, email, time)
    }

    pub fn name(&self) -> &BStr {
        self.name.as_bstr()
    }

    pub fn email(&self) -> &BStr {
        self.email.as_bstr()
    }

    pub fn time(&self) -> DateTime<FixedOffset> {
        self.time
    }

    pub(crate) fn unix_timestamp(&self) -> i64 {
        self.time.timestamp()
    }

    /// The commit/tag body carries only `name <email>`, no timestamp or
    /// timezone: those live on their own `timestamp` line instead.
    pub(crate) fn serialize_name_email(&self) -> BString {
        format!("{} <{}>", &self.name, &self.email).into()
    }

    pub(crate) fn parse_name_email(serialized: &BStr) -> Result<(BString, BString), ParseError> {
        lazy_static! {
            static ref RE: Regex = Regex::new("^(?P<name>.*) <(?P<email>.*?)>$").unwrap();
        }

        let caps = RE
            .captures(serialized)
            .ok_or_else(|| ParseError::MatchFailed(serialized.to_owned()))?;

        let name = caps.name("name").unwrap().as_bytes().as_bstr().to_owned();
        let email = caps.name("email").unwrap().as_bytes().as_bstr().to_owned();

        Ok((name, email))
    }

    /// Rebuilds an `Author` from the bare `name <email>` line plus the
    /// unix timestamp found on the commit's separate `timestamp` line. The
    /// wire format carries no timezone, so the reconstructed time is UTC.
    pub(crate) fn from_name_email_and_timestamp(
        name: BString,
        email: BString,
        timestamp: i64,
    ) -> Result<Self, ParseError> {
        let time = FixedOffset::east(0)
            .timestamp_opt(timestamp, 0)
            .single()
            .ok_or(ParseError::InvalidTimestamp(timestamp))?;
        Ok(Self { name, email, time })
    }
}

#[derive(Debug, displaydoc::Display, thiserror::Error)]
pub enum ParseError {
    /// Failed to match expected pattern. Got: {0}
    MatchFailed(BString),
    /// Timestamp {0} is out of range
    InvalidTimestamp(i64),
}
