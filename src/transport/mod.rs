//! The collaborator spec §5/§6 carve out: byte-level framing is specified
//! here, but the HTTP/TLS transport itself is not reimplemented — it's
//! `reqwest`'s blocking client, the way
//! `examples/crywolf-codecrafters-git-rust` uses it for the same exchange.

pub mod fetch;
pub mod pktline;

pub use fetch::{fetch, AdvertisedRef, FetchError, FetchResult};
