//! Render dumps: the sample buffer saved to disk so a render can resume.
//!
//! Layout, all integers and samples little-endian:
//!
//! ```text
//! "DUMP" | version u32 | width u32 | height u32 | spp u64 | render time ms u64
//! | flags u64 | "sam" | width * height * 3 f64 means | "dun"
//! ```

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;
use std::time::Duration;

use thiserror::Error;

use crate::Snapshot;

const MAGIC: &[u8; 4] = b"DUMP";
const SAMPLES_HEADER: &[u8; 3] = b"sam";
const END_MARKER: &[u8; 3] = b"dun";

/// Current dump format version.
pub const DUMP_VERSION: u32 = 1;

/// Largest canvas a dump may describe.
const MAX_PIXELS: u64 = 1 << 28;

/// Errors that can occur while saving or loading a render dump.
#[derive(Error, Debug)]
pub enum DumpError {
    #[error("Nothing to dump: the render has no samples")]
    NoData,

    #[error("Not a render dump")]
    BadMagic,

    #[error("Unsupported render dump version {0}")]
    UnsupportedVersion(u32),

    #[error("Render dump canvas {width}x{height} is too large")]
    TooLarge { width: u32, height: u32 },

    #[error("Render dump is corrupt: {0}")]
    Corrupt(&'static str),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type DumpResult<T> = Result<T, DumpError>;

/// Serialize a snapshot.
pub fn write_dump<W: Write>(writer: &mut W, snapshot: &Snapshot) -> DumpResult<()> {
    if snapshot.spp == 0 || snapshot.pixel_count() == 0 {
        return Err(DumpError::NoData);
    }
    if snapshot.samples.len() != snapshot.pixel_count() * 3 {
        return Err(DumpError::Corrupt("sample count does not match canvas"));
    }

    writer.write_all(MAGIC)?;
    writer.write_all(&DUMP_VERSION.to_le_bytes())?;
    writer.write_all(&snapshot.width.to_le_bytes())?;
    writer.write_all(&snapshot.height.to_le_bytes())?;
    writer.write_all(&snapshot.spp.to_le_bytes())?;
    let millis = u64::try_from(snapshot.render_time.as_millis()).unwrap_or(u64::MAX);
    writer.write_all(&millis.to_le_bytes())?;
    // Reserved for compressed formats.
    writer.write_all(&0u64.to_le_bytes())?;

    writer.write_all(SAMPLES_HEADER)?;
    if cfg!(target_endian = "little") {
        writer.write_all(bytemuck::cast_slice(snapshot.samples.as_slice()))?;
    } else {
        for value in &snapshot.samples {
            writer.write_all(&value.to_le_bytes())?;
        }
    }
    writer.write_all(END_MARKER)?;
    writer.flush()?;
    Ok(())
}

/// Deserialize a snapshot written by `write_dump`.
pub fn read_dump<R: Read>(reader: &mut R) -> DumpResult<Snapshot> {
    let mut magic = [0u8; 4];
    reader.read_exact(&mut magic)?;
    if &magic != MAGIC {
        return Err(DumpError::BadMagic);
    }

    let version = read_u32(reader)?;
    if version != DUMP_VERSION {
        return Err(DumpError::UnsupportedVersion(version));
    }

    let width = read_u32(reader)?;
    let height = read_u32(reader)?;
    let spp = read_u64(reader)?;
    let render_time = Duration::from_millis(read_u64(reader)?);
    let _flags = read_u64(reader)?;

    let pixels = u64::from(width) * u64::from(height);
    if pixels > MAX_PIXELS {
        return Err(DumpError::TooLarge { width, height });
    }

    expect_marker(reader, SAMPLES_HEADER, "missing sample section")?;
    let mut samples = vec![0.0f64; pixels as usize * 3];
    reader.read_exact(bytemuck::cast_slice_mut(samples.as_mut_slice()))?;
    if cfg!(target_endian = "big") {
        for value in &mut samples {
            *value = f64::from_bits(u64::from_le(value.to_bits()));
        }
    }
    expect_marker(reader, END_MARKER, "missing end marker")?;

    Ok(Snapshot {
        width,
        height,
        samples,
        spp,
        render_time,
    })
}

/// Write a dump file.
pub fn save_dump<P: AsRef<Path>>(path: P, snapshot: &Snapshot) -> DumpResult<()> {
    let path = path.as_ref();
    let mut writer = BufWriter::new(File::create(path)?);
    write_dump(&mut writer, snapshot)?;
    log::info!(
        "Saved render dump ({}x{}, {} spp) to {}",
        snapshot.width,
        snapshot.height,
        snapshot.spp,
        path.display()
    );
    Ok(())
}

/// Read a dump file.
pub fn load_dump<P: AsRef<Path>>(path: P) -> DumpResult<Snapshot> {
    let mut reader = BufReader::new(File::open(path)?);
    read_dump(&mut reader)
}

fn read_u32<R: Read>(reader: &mut R) -> DumpResult<u32> {
    let mut bytes = [0u8; 4];
    reader.read_exact(&mut bytes)?;
    Ok(u32::from_le_bytes(bytes))
}

fn read_u64<R: Read>(reader: &mut R) -> DumpResult<u64> {
    let mut bytes = [0u8; 8];
    reader.read_exact(&mut bytes)?;
    Ok(u64::from_le_bytes(bytes))
}

fn expect_marker<R: Read>(reader: &mut R, marker: &[u8; 3], what: &'static str) -> DumpResult<()> {
    let mut bytes = [0u8; 3];
    reader.read_exact(&mut bytes)?;
    if &bytes != marker {
        return Err(DumpError::Corrupt(what));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn snapshot() -> Snapshot {
        Snapshot {
            width: 3,
            height: 2,
            samples: (0..18).map(|i| i as f64 * 0.125).collect(),
            spp: 42,
            render_time: Duration::from_millis(1500),
        }
    }

    fn encode(snapshot: &Snapshot) -> Vec<u8> {
        let mut bytes = Vec::new();
        write_dump(&mut bytes, snapshot).unwrap();
        bytes
    }

    #[test]
    fn test_dump_round_trip() {
        let original = snapshot();
        let bytes = encode(&original);
        assert_eq!(&bytes[..4], b"DUMP");
        assert_eq!(bytes.len(), 4 + 4 + 4 + 4 + 8 + 8 + 8 + 3 + 18 * 8 + 3);

        let loaded = read_dump(&mut Cursor::new(bytes)).unwrap();
        assert_eq!(loaded, original);
    }

    #[test]
    fn test_empty_render_is_not_dumped() {
        let mut empty = snapshot();
        empty.spp = 0;
        assert!(matches!(write_dump(&mut Vec::new(), &empty), Err(DumpError::NoData)));
    }

    #[test]
    fn test_rejects_foreign_files() {
        let result = read_dump(&mut Cursor::new(b"\x89PNG\r\n\x1a\n".to_vec()));
        assert!(matches!(result, Err(DumpError::BadMagic)));

        let mut bytes = encode(&snapshot());
        bytes[4..8].copy_from_slice(&7u32.to_le_bytes());
        let result = read_dump(&mut Cursor::new(bytes));
        assert!(matches!(result, Err(DumpError::UnsupportedVersion(7))));
    }

    #[test]
    fn test_rejects_truncated_dump() {
        let bytes = encode(&snapshot());
        let result = read_dump(&mut Cursor::new(bytes[..bytes.len() - 20].to_vec()));
        assert!(matches!(result, Err(DumpError::Io(_))));

        let mut bad_end = encode(&snapshot());
        let len = bad_end.len();
        bad_end[len - 1] = b'x';
        let result = read_dump(&mut Cursor::new(bad_end));
        assert!(matches!(result, Err(DumpError::Corrupt(_))));
    }

    #[test]
    fn test_rejects_huge_canvas() {
        let mut bytes = encode(&snapshot());
        bytes[8..12].copy_from_slice(&u32::MAX.to_le_bytes());
        bytes[12..16].copy_from_slice(&u32::MAX.to_le_bytes());
        let result = read_dump(&mut Cursor::new(bytes));
        assert!(matches!(result, Err(DumpError::TooLarge { .. })));
    }

    #[test]
    fn test_save_and_load_file() {
        let path = std::env::temp_dir().join(format!("lumen_dump_{}.dump", std::process::id()));
        save_dump(&path, &snapshot()).unwrap();
        assert_eq!(load_dump(&path).unwrap(), snapshot());
        let _ = std::fs::remove_file(&path);
    }
}
