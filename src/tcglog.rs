// CLASSIFICATION: COMMUNITY
// Filename: tcglog.rs v0.2
// Date Modified: 2026-07-22
// Author: Lukas Bower

//! TCG 2.0 measurement log parser.
//!
//! The kernel exposes the firmware's event log in the crypto-agile format:
//! one legacy-layout `EV_NO_ACTION` header event whose `Spec ID Event03`
//! payload declares which digest algorithms follow, then events carrying one
//! digest per declared algorithm. Only as much is parsed as the reseal
//! pipeline needs: PCR index, event type, the SHA-256 digest and, for
//! image-load events, the device path.

use thiserror::Error;

/// `EV_NO_ACTION`.
pub const EV_NO_ACTION: u32 = 0x0000_0003;
/// `EV_SEPARATOR`.
pub const EV_SEPARATOR: u32 = 0x0000_0004;
/// `EV_EFI_BOOT_SERVICES_APPLICATION`.
pub const EV_EFI_BOOT_SERVICES_APPLICATION: u32 = 0x8000_0003;

/// TPM algorithm identifier for SHA-1.
pub const ALG_SHA1: u16 = 0x0004;
/// TPM algorithm identifier for SHA-256.
pub const ALG_SHA256: u16 = 0x000b;

const SPEC_ID_SIGNATURE: &[u8; 16] = b"Spec ID Event03\0";
const SHA1_DIGEST_LEN: usize = 20;

/// Log parse failures.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TcgLogError {
    /// The log ended inside a structure.
    #[error("truncated measurement log")]
    Truncated,
    /// The first event is not a Spec ID Event03 header.
    #[error("measurement log lacks a crypto-agile header")]
    BadHeader,
    /// An event carries a digest whose algorithm the header did not declare.
    #[error("event digest uses undeclared algorithm {0:#06x}")]
    UndeclaredAlgorithm(u16),
}

/// One measured event.
#[derive(Clone, Debug)]
pub struct Event {
    /// PCR the event was extended into.
    pub pcr_index: u32,
    /// Event type.
    pub event_type: u32,
    /// Digests by TPM algorithm identifier.
    pub digests: Vec<(u16, Vec<u8>)>,
    /// Raw event data.
    pub data: Vec<u8>,
}

impl Event {
    /// The event's SHA-256 digest, when present.
    pub fn sha256_digest(&self) -> Option<&[u8]> {
        self.digests
            .iter()
            .find(|(alg, _)| *alg == ALG_SHA256)
            .map(|(_, digest)| digest.as_slice())
    }

    /// For image-load events, the device path carried in the
    /// `EFI_IMAGE_LOAD_EVENT` payload.
    pub fn image_load_device_path(&self) -> Option<&[u8]> {
        // UINT64 location, length, link-time address, device-path length.
        if self.data.len() < 32 {
            return None;
        }
        let path_len = u64::from_le_bytes(self.data[24..32].try_into().ok()?) as usize;
        self.data.get(32..32 + path_len)
    }
}

struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn is_empty(&self) -> bool {
        self.pos >= self.data.len()
    }

    fn bytes(&mut self, len: usize) -> Result<&'a [u8], TcgLogError> {
        let end = self.pos.checked_add(len).ok_or(TcgLogError::Truncated)?;
        if end > self.data.len() {
            return Err(TcgLogError::Truncated);
        }
        let out = &self.data[self.pos..end];
        self.pos = end;
        Ok(out)
    }

    fn u8(&mut self) -> Result<u8, TcgLogError> {
        Ok(self.bytes(1)?[0])
    }

    fn u16(&mut self) -> Result<u16, TcgLogError> {
        Ok(u16::from_le_bytes(self.bytes(2)?.try_into().unwrap()))
    }

    fn u32(&mut self) -> Result<u32, TcgLogError> {
        Ok(u32::from_le_bytes(self.bytes(4)?.try_into().unwrap()))
    }
}

/// Parse a crypto-agile measurement log. The header event is consumed and
/// not returned.
pub fn parse_log(data: &[u8]) -> Result<Vec<Event>, TcgLogError> {
    let mut reader = Reader::new(data);
    let digest_sizes = parse_header(&mut reader)?;

    let mut events = Vec::new();
    while !reader.is_empty() {
        events.push(parse_event(&mut reader, &digest_sizes)?);
    }
    Ok(events)
}

/// Read the legacy-layout header event and return the declared
/// (algorithm, digest size) table.
fn parse_header(reader: &mut Reader<'_>) -> Result<Vec<(u16, usize)>, TcgLogError> {
    let _pcr_index = reader.u32()?;
    let event_type = reader.u32()?;
    let _sha1_digest = reader.bytes(SHA1_DIGEST_LEN)?;
    let event_size = reader.u32()? as usize;
    let payload = reader.bytes(event_size)?;

    if event_type != EV_NO_ACTION {
        return Err(TcgLogError::BadHeader);
    }

    let mut spec = Reader::new(payload);
    let signature = spec.bytes(16)?;
    if signature != SPEC_ID_SIGNATURE {
        return Err(TcgLogError::BadHeader);
    }
    let _platform_class = spec.u32()?;
    let _version_minor = spec.u8()?;
    let _version_major = spec.u8()?;
    let _errata = spec.u8()?;
    let _uintn_size = spec.u8()?;
    let algorithm_count = spec.u32()? as usize;

    let mut digest_sizes = Vec::with_capacity(algorithm_count);
    for _ in 0..algorithm_count {
        let alg = spec.u16()?;
        let size = spec.u16()? as usize;
        digest_sizes.push((alg, size));
    }
    Ok(digest_sizes)
}

fn parse_event(
    reader: &mut Reader<'_>,
    digest_sizes: &[(u16, usize)],
) -> Result<Event, TcgLogError> {
    let pcr_index = reader.u32()?;
    let event_type = reader.u32()?;
    let digest_count = reader.u32()? as usize;

    let mut digests = Vec::with_capacity(digest_count);
    for _ in 0..digest_count {
        let alg = reader.u16()?;
        let size = digest_sizes
            .iter()
            .find(|(declared, _)| *declared == alg)
            .map(|(_, size)| *size)
            .ok_or(TcgLogError::UndeclaredAlgorithm(alg))?;
        digests.push((alg, reader.bytes(size)?.to_vec()));
    }

    let event_size = reader.u32()? as usize;
    let data = reader.bytes(event_size)?.to_vec();

    Ok(Event {
        pcr_index,
        event_type,
        digests,
        data,
    })
}

#[cfg(test)]
pub(crate) mod testutil {
    //! Builder producing the same byte layout the firmware writes.

    use super::*;
    use sha2::{Digest, Sha256};

    pub struct LogWriter {
        out: Vec<u8>,
    }

    impl LogWriter {
        pub fn new() -> Self {
            let mut out = Vec::new();
            // Legacy-layout header event declaring SHA-1 and SHA-256.
            out.extend_from_slice(&0u32.to_le_bytes());
            out.extend_from_slice(&EV_NO_ACTION.to_le_bytes());
            out.extend_from_slice(&[0u8; SHA1_DIGEST_LEN]);
            let mut payload = Vec::new();
            payload.extend_from_slice(SPEC_ID_SIGNATURE);
            payload.extend_from_slice(&0u32.to_le_bytes());
            payload.extend_from_slice(&[0, 2, 0, 2]); // minor, major, errata, uintn
            payload.extend_from_slice(&2u32.to_le_bytes());
            payload.extend_from_slice(&ALG_SHA1.to_le_bytes());
            payload.extend_from_slice(&(SHA1_DIGEST_LEN as u16).to_le_bytes());
            payload.extend_from_slice(&ALG_SHA256.to_le_bytes());
            payload.extend_from_slice(&32u16.to_le_bytes());
            payload.push(0); // vendor info size
            out.extend_from_slice(&(payload.len() as u32).to_le_bytes());
            out.extend_from_slice(&payload);
            Self { out }
        }

        /// Append an event whose digests measure `measured`.
        pub fn extend_event(&mut self, pcr: u32, event_type: u32, measured: &[u8], data: &[u8]) {
            self.out.extend_from_slice(&pcr.to_le_bytes());
            self.out.extend_from_slice(&event_type.to_le_bytes());
            self.out.extend_from_slice(&2u32.to_le_bytes());
            self.out.extend_from_slice(&ALG_SHA1.to_le_bytes());
            self.out.extend_from_slice(&[0u8; SHA1_DIGEST_LEN]);
            self.out.extend_from_slice(&ALG_SHA256.to_le_bytes());
            self.out
                .extend_from_slice(&<[u8; 32]>::from(Sha256::digest(measured)));
            self.out.extend_from_slice(&(data.len() as u32).to_le_bytes());
            self.out.extend_from_slice(data);
        }

        /// Append an image-load event for `device_path` measuring `pe`.
        pub fn image_load_event(&mut self, pcr: u32, pe: &[u8], device_path: &[u8]) {
            let mut data = Vec::new();
            data.extend_from_slice(&0x6556_c018u64.to_le_bytes());
            data.extend_from_slice(&(pe.len() as u64).to_le_bytes());
            data.extend_from_slice(&0u64.to_le_bytes());
            data.extend_from_slice(&(device_path.len() as u64).to_le_bytes());
            data.extend_from_slice(device_path);
            self.extend_event(pcr, EV_EFI_BOOT_SERVICES_APPLICATION, pe, &data);
        }

        pub fn finish(self) -> Vec<u8> {
            self.out
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testutil::LogWriter;
    use super::*;
    use efivar_wire::DevicePath;
    use sha2::{Digest, Sha256};

    #[test]
    fn parses_events_after_header() {
        let mut writer = LogWriter::new();
        writer.extend_event(7, EV_SEPARATOR, &[0, 0, 0, 0], &[0, 0, 0, 0]);
        let path = DevicePath::new_file("\\EFI\\ubuntu\\shimx64.efi");
        writer.image_load_event(4, b"mock shim PE", path.as_bytes());

        let events = parse_log(&writer.finish()).unwrap();
        assert_eq!(events.len(), 2);

        assert_eq!(events[0].pcr_index, 7);
        assert_eq!(events[0].event_type, EV_SEPARATOR);
        assert_eq!(events[0].image_load_device_path(), None);

        let load = &events[1];
        assert_eq!(load.event_type, EV_EFI_BOOT_SERVICES_APPLICATION);
        assert_eq!(
            load.sha256_digest().unwrap(),
            &<[u8; 32]>::from(Sha256::digest(b"mock shim PE"))[..]
        );
        let parsed = DevicePath::from_bytes(load.image_load_device_path().unwrap().to_vec())
            .unwrap();
        assert_eq!(parsed.file_path().unwrap(), "\\EFI\\ubuntu\\shimx64.efi");
    }

    #[test]
    fn rejects_logs_without_header() {
        assert!(matches!(parse_log(&[1, 2, 3]), Err(TcgLogError::Truncated)));

        let mut no_header = Vec::new();
        no_header.extend_from_slice(&4u32.to_le_bytes());
        no_header.extend_from_slice(&EV_SEPARATOR.to_le_bytes());
        no_header.extend_from_slice(&[0u8; SHA1_DIGEST_LEN]);
        no_header.extend_from_slice(&0u32.to_le_bytes());
        assert!(matches!(parse_log(&no_header), Err(TcgLogError::BadHeader)));
    }

    #[test]
    fn rejects_undeclared_digest_algorithms() {
        let writer = LogWriter::new();
        let mut raw = writer.finish();
        raw.extend_from_slice(&4u32.to_le_bytes());
        raw.extend_from_slice(&EV_SEPARATOR.to_le_bytes());
        raw.extend_from_slice(&1u32.to_le_bytes());
        raw.extend_from_slice(&0x0012u16.to_le_bytes());
        assert!(matches!(
            parse_log(&raw),
            Err(TcgLogError::UndeclaredAlgorithm(0x0012))
        ));
    }
}
