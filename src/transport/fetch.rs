//! The smart-HTTP v2 clone exchange (spec §6): a ref advertisement GET
//! followed by a `command=fetch` POST, demuxing the pack bytes out of the
//! sideband-wrapped response. Grounded on
//! `examples/crywolf-codecrafters-git-rust/src/commands/clone.rs`'s use of
//! `reqwest::blocking` for the same two-request shape; this core targets
//! protocol v2 rather than that example's legacy v0 dialect, per spec §6.

use bstr::{BString, ByteSlice};

use crate::db::UntypedOid;

use super::pktline::{self, Packet};

const SERVICE: &str = "git-upload-pack";
const PACK_CHANNEL: u8 = 1;

#[derive(Debug, Clone)]
pub struct AdvertisedRef {
    pub name: BString,
    pub oid: UntypedOid,
}

#[derive(Debug, Clone)]
pub struct FetchResult {
    pub refs: Vec<AdvertisedRef>,
    pub pack: Vec<u8>,
}

/// Runs the full clone exchange: discovers refs, requests all of them, and
/// returns the advertised refs together with the raw pack bytes.
pub fn fetch(base_url: &str) -> Result<FetchResult, FetchError> {
    let base_url = base_url.trim_end_matches('/');
    let client = reqwest::blocking::Client::new();

    let refs = discover_refs(&client, base_url)?;
    if refs.is_empty() {
        return Ok(FetchResult {
            refs,
            pack: Vec::new(),
        });
    }

    let pack = request_pack(&client, base_url, &refs)?;
    Ok(FetchResult { refs, pack })
}

fn discover_refs(
    client: &reqwest::blocking::Client,
    base_url: &str,
) -> Result<Vec<AdvertisedRef>, FetchError> {
    let url = format!("{base_url}/info/refs?service={SERVICE}");
    let resp = client
        .get(&url)
        .header("Git-Protocol", "version=2")
        .send()
        .map_err(FetchError::Http)?;

    let status = resp.status();
    if !status.is_success() {
        return Err(FetchError::BadStatus(url, status.as_u16()));
    }

    let body = resp.bytes().map_err(FetchError::Http)?;

    let mut refs = Vec::new();
    for packet in pktline::Reader::new(&body) {
        match packet.map_err(FetchError::PktLine)? {
            Packet::Flush | Packet::Delim => continue,
            Packet::Data(payload) => {
                if payload.starts_with(b"#") {
                    continue;
                }
                if let Some(r) = parse_ref_line(payload)? {
                    refs.push(r);
                }
            }
        }
    }

    Ok(refs)
}

fn parse_ref_line(payload: &[u8]) -> Result<Option<AdvertisedRef>, FetchError> {
    let payload = payload.strip_suffix(b"\n").unwrap_or(payload);
    // the first ref line may carry a NUL-separated capability list
    let payload = payload.split(|&b| b == 0).next().unwrap_or(payload);

    if payload.len() < 40 {
        return Err(FetchError::MalformedRefLine(payload.as_bstr().to_owned()));
    }
    let (oid_hex, name) = payload.split_at(40);
    let name = name
        .strip_prefix(b" ")
        .ok_or_else(|| FetchError::MalformedRefLine(payload.as_bstr().to_owned()))?;

    if name.is_empty() {
        return Ok(None);
    }

    let oid = UntypedOid::parse(oid_hex)
        .map_err(|e| FetchError::MalformedRefOid(oid_hex.as_bstr().to_owned(), e))?;

    Ok(Some(AdvertisedRef {
        name: name.as_bstr().to_owned(),
        oid,
    }))
}

fn request_pack(
    client: &reqwest::blocking::Client,
    base_url: &str,
    refs: &[AdvertisedRef],
) -> Result<Vec<u8>, FetchError> {
    let url = format!("{base_url}/{SERVICE}");

    let mut body = Vec::new();
    pktline::write(&mut body, b"command=fetch");
    pktline::write_delim(&mut body);
    pktline::write(&mut body, b"no-progress");
    for r in refs {
        pktline::write(&mut body, format!("want {}\n", r.oid.to_hex()).as_bytes());
    }
    pktline::write(&mut body, b"done\n");
    pktline::write_flush(&mut body);

    let resp = client
        .post(&url)
        .header("Git-Protocol", "version=2")
        .header("Content-Type", "application/x-git-upload-pack-request")
        .body(body)
        .send()
        .map_err(FetchError::Http)?;

    let status = resp.status();
    if !status.is_success() {
        return Err(FetchError::BadStatus(url, status.as_u16()));
    }

    let response = resp.bytes().map_err(FetchError::Http)?;

    let mut pack = Vec::new();
    for packet in pktline::Reader::new(&response) {
        match packet.map_err(FetchError::PktLine)? {
            Packet::Flush | Packet::Delim => continue,
            Packet::Data(payload) => {
                let (&channel, rest) = payload
                    .split_first()
                    .ok_or(FetchError::EmptySidebandPacket)?;
                if channel == PACK_CHANNEL {
                    pack.extend_from_slice(rest);
                }
                // other channels (progress/error) are not surfaced by this core
            }
        }
    }

    Ok(pack)
}

#[derive(Debug, thiserror::Error, displaydoc::Display)]
pub enum FetchError {
    /// Underlying HTTP request failed
    Http(#[source] reqwest::Error),
    /// Request to {0} failed with status {1}
    BadStatus(String, u16),
    /// Malformed pkt-line in response
    PktLine(#[source] pktline::Error),
    /// Malformed ref advertisement line: {0:?}
    MalformedRefLine(BString),
    /// Malformed oid {0:?} in ref advertisement
    MalformedRefOid(BString, #[source] crate::db::object::ParseOidError),
    /// Sideband packet had no channel-tag byte
    EmptySidebandPacket,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_well_formed_ref_line() {
        let line =
            b"6c073b08f7987018cbb2cb9a5747c84913b3608e refs/heads/main\0some-capability\n";
        let parsed = parse_ref_line(line).unwrap().unwrap();
        assert_eq!(parsed.name, "refs/heads/main");
        assert_eq!(
            parsed.oid.to_hex(),
            "6c073b08f7987018cbb2cb9a5747c84913b3608e"
        );
    }

    #[test]
    fn parses_zero_oid_capabilities_line() {
        // an empty-repo server advertises a `capabilities^{}` pseudo-ref with
        // an all-zero oid instead of any real ref.
        let line = b"0000000000000000000000000000000000000000 capabilities^{}\0cap\n";
        let parsed = parse_ref_line(line).unwrap().unwrap();
        assert_eq!(parsed.oid, UntypedOid::zero());
    }

    #[test]
    fn fetch_request_body_matches_wire_framing() {
        let refs = vec![AdvertisedRef {
            name: "refs/heads/main".into(),
            oid: UntypedOid::zero(),
        }];

        let mut body = Vec::new();
        pktline::write(&mut body, b"command=fetch");
        pktline::write_delim(&mut body);
        pktline::write(&mut body, b"no-progress");
        for r in &refs {
            pktline::write(&mut body, format!("want {}\n", r.oid.to_hex()).as_bytes());
        }
        pktline::write(&mut body, b"done\n");
        pktline::write_flush(&mut body);

        assert_eq!(
            body,
            b"0011command=fetch0001000fno-progress0032want 0000000000000000000000000000000000000000\n0009done\n0000"
        );
    }
}
