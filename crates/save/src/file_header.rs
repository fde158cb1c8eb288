// ---------------------------------------------------------------------------
// file_header – Lane store file header with magic bytes, version, checksum
// ---------------------------------------------------------------------------
//
// Header format (32 bytes, fixed-size, little-endian):
//   [0..4]   Magic bytes: "LANE" (0x4C414E45)
//   [4..8]   Format version (u32)
//   [8..12]  Flags (u32: bit 0 = payload is LZ4-compressed)
//   [12..20] Timestamp of the write (Unix epoch millis, u64)
//   [20..24] Uncompressed payload size (u32)
//   [24..28] xxHash32 checksum of the payload as stored
//   [28..32] Reserved, written as zero
//
// On write: encode StoreSnapshot -> optionally compress -> prepend header
// On read:  check magic -> check version -> validate checksum -> strip header
//           -> decompress if flagged -> decode StoreSnapshot

use allocation::StoreError;
use xxhash_rust::xxh32::xxh32;

/// Magic bytes identifying a lane store file.
pub const MAGIC: [u8; 4] = [0x4C, 0x41, 0x4E, 0x45]; // "LANE"

pub const HEADER_SIZE: usize = 32;

/// Version of the header layout plus payload encoding. Files with a higher
/// version were written by a newer build and are refused.
pub const HEADER_FORMAT_VERSION: u32 = 1;

/// Flag bit: the payload is LZ4-compressed with its size prepended.
pub const FLAG_COMPRESSED: u32 = 1;

const XXHASH_SEED: u32 = 0;

/// Parsed file header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileHeader {
    pub format_version: u32,
    pub flags: u32,
    pub timestamp: u64,
    pub uncompressed_size: u32,
    pub checksum: u32,
}

impl FileHeader {
    /// Header for `payload` as it will be stored on disk.
    fn new(payload: &[u8], flags: u32, uncompressed_size: usize) -> Self {
        let timestamp = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);

        Self {
            format_version: HEADER_FORMAT_VERSION,
            flags,
            timestamp,
            uncompressed_size: uncompressed_size as u32,
            checksum: xxh32(payload, XXHASH_SEED),
        }
    }

    pub fn is_compressed(&self) -> bool {
        self.flags & FLAG_COMPRESSED != 0
    }

    fn write_to(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&MAGIC);
        out.extend_from_slice(&self.format_version.to_le_bytes());
        out.extend_from_slice(&self.flags.to_le_bytes());
        out.extend_from_slice(&self.timestamp.to_le_bytes());
        out.extend_from_slice(&self.uncompressed_size.to_le_bytes());
        out.extend_from_slice(&self.checksum.to_le_bytes());
        out.extend_from_slice(&0u32.to_le_bytes());
    }
}

fn assemble(header: &FileHeader, payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(HEADER_SIZE + payload.len());
    header.write_to(&mut out);
    out.extend_from_slice(payload);
    out
}

/// Wrap an encoded payload with a header, stored as-is.
pub fn wrap_with_header(data: &[u8]) -> Vec<u8> {
    assemble(&FileHeader::new(data, 0, data.len()), data)
}

/// Wrap an encoded payload with a header, LZ4-compressing it first.
pub fn wrap_with_header_compressed(data: &[u8]) -> Vec<u8> {
    let compressed = lz4_flex::compress_prepend_size(data);
    assemble(
        &FileHeader::new(&compressed, FLAG_COMPRESSED, data.len()),
        &compressed,
    )
}

/// Parse and validate the header, returning it with the stored payload.
///
/// # Errors
///
/// Returns [`StoreError::Corrupt`] if:
/// - the magic bytes are missing or the file is shorter than a header
/// - the format version is newer than this build supports
/// - the checksum does not match the payload
pub fn unwrap_header(bytes: &[u8]) -> Result<(FileHeader, &[u8]), StoreError> {
    if bytes.len() < 4 || bytes[..4] != MAGIC {
        return Err(StoreError::Corrupt(
            "not a lane store file (missing LANE magic bytes)".into(),
        ));
    }
    if bytes.len() < HEADER_SIZE {
        return Err(StoreError::Corrupt(format!(
            "lane store file is too short ({} bytes, need at least {HEADER_SIZE} for header)",
            bytes.len()
        )));
    }

    let u32_at = |at: usize| u32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]]);
    let format_version = u32_at(4);
    let flags = u32_at(8);
    let timestamp = u64::from(u32_at(12)) | (u64::from(u32_at(16)) << 32);
    let uncompressed_size = u32_at(20);
    let checksum = u32_at(24);

    if format_version > HEADER_FORMAT_VERSION {
        return Err(StoreError::Corrupt(format!(
            "lane store file uses format version {format_version}, \
             this build supports up to version {HEADER_FORMAT_VERSION}"
        )));
    }

    let payload = &bytes[HEADER_SIZE..];
    let computed = xxh32(payload, XXHASH_SEED);
    if computed != checksum {
        return Err(StoreError::Corrupt(format!(
            "checksum mismatch (expected {checksum:#010X}, got {computed:#010X})"
        )));
    }

    Ok((
        FileHeader {
            format_version,
            flags,
            timestamp,
            uncompressed_size,
            checksum,
        },
        payload,
    ))
}

/// Undo [`wrap_with_header_compressed`] on a payload whose header carries
/// [`FLAG_COMPRESSED`].
pub fn decompress_payload(payload: &[u8]) -> Result<Vec<u8>, StoreError> {
    lz4_flex::decompress_size_prepended(payload)
        .map_err(|e| StoreError::Corrupt(format!("LZ4 decompression failed: {e}")))
}
