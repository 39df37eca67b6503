//! Single-entry gzip container for persisted chunks.
//!
//! Each chunk file is one gzip member whose FNAME header field names the
//! entry `"data"`. The FEXTRA field optionally carries an RFC 1952 subfield
//! (id `DC`) holding the file's total chunk count, so a warm-started node can
//! assemble files without waiting for an authoritative put.

use std::io::{self, Read, Write};

use flate2::read::GzDecoder;
use flate2::{Compression, GzBuilder};

/// Name of the single archive entry.
pub const ENTRY_NAME: &str = "data";

/// Subfield id bytes for the total-chunks manifest.
const MANIFEST_ID: [u8; 2] = *b"DC";

/// Length of the manifest subfield payload.
const MANIFEST_PAYLOAD_LEN: usize = 4;

/// Compresses chunk data into the container. `total_chunks` is written into
/// the header manifest when given.
pub fn pack(data: &[u8], total_chunks: Option<u32>) -> io::Result<Vec<u8>> {
    let mut builder = GzBuilder::new().filename(ENTRY_NAME);
    if let Some(total) = total_chunks {
        builder = builder.extra(manifest_subfield(total));
    }
    let mut encoder = builder.write(Vec::new(), Compression::default());
    encoder.write_all(data)?;
    encoder.finish()
}

/// Decompresses a container, returning the chunk data and the manifest's
/// total chunk count when present.
pub fn unpack(bytes: &[u8]) -> io::Result<(Vec<u8>, Option<u32>)> {
    let mut decoder = GzDecoder::new(bytes);
    let mut data = Vec::new();
    decoder.read_to_end(&mut data)?;
    let total = decoder
        .header()
        .and_then(|h| h.extra())
        .and_then(parse_manifest);
    Ok((data, total))
}

/// RFC 1952 extra subfield: SI1 SI2, little-endian payload length, payload.
fn manifest_subfield(total_chunks: u32) -> Vec<u8> {
    let mut extra = Vec::with_capacity(4 + MANIFEST_PAYLOAD_LEN);
    extra.extend_from_slice(&MANIFEST_ID);
    extra.extend_from_slice(&(MANIFEST_PAYLOAD_LEN as u16).to_le_bytes());
    extra.extend_from_slice(&total_chunks.to_be_bytes());
    extra
}

fn parse_manifest(extra: &[u8]) -> Option<u32> {
    let mut rest = extra;
    while rest.len() >= 4 {
        let len = u16::from_le_bytes([rest[2], rest[3]]) as usize;
        let payload = rest.get(4..4 + len)?;
        if rest[..2] == MANIFEST_ID && len == MANIFEST_PAYLOAD_LEN {
            return Some(u32::from_be_bytes(payload.try_into().ok()?));
        }
        rest = &rest[4 + len..];
    }
    None
}
