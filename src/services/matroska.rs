// Minimal EBML reader: just enough of a Matroska/WebM header to get the duration

use anyhow::{bail, Context, Result};
use std::fs::File;
use std::io::{BufReader, ErrorKind, Read, Seek, SeekFrom};
use std::path::Path;

const EBML_HEADER: u64 = 0x1A45_DFA3;
const SEGMENT: u64 = 0x1853_8067;
const INFO: u64 = 0x1549_A966;
const CLUSTER: u64 = 0x1F43_B675;
const TIMECODE_SCALE: u64 = 0x2A_D7B1;
const DURATION: u64 = 0x4489;

/// Nanoseconds per timecode tick unless the file says otherwise
const DEFAULT_TIMECODE_SCALE: u64 = 1_000_000;

pub fn is_matroska_path(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| matches!(e.to_ascii_lowercase().as_str(), "mkv" | "webm" | "mka" | "mk3d"))
        .unwrap_or(false)
}

pub fn read_duration_file(path: &Path) -> Result<f64> {
    let file = File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    read_duration(&mut BufReader::new(file))
}

/// Duration in seconds from the Segment/Info element
pub fn read_duration<R: Read + Seek>(reader: &mut R) -> Result<f64> {
    let header = read_header(reader)?.context("Empty file")?;
    if header.id != EBML_HEADER {
        bail!("Not an EBML file (first element 0x{:X})", header.id);
    }
    skip(reader, &header)?;

    loop {
        let element = read_header(reader)?.context("No Segment element")?;
        if element.id == SEGMENT {
            break;
        }
        skip(reader, &element)?;
    }

    // Segment children, Info usually comes right after the SeekHead
    loop {
        let Some(element) = read_header(reader)? else {
            bail!("Segment ended without an Info element");
        };
        match element.id {
            INFO => return read_info(reader, &element),
            CLUSTER => bail!("Reached media data before an Info element"),
            _ => skip(reader, &element)?,
        }
    }
}

fn read_info<R: Read + Seek>(reader: &mut R, info: &Header) -> Result<f64> {
    let Some(mut remaining) = info.size else {
        bail!("Info element has unknown size");
    };

    let mut scale = DEFAULT_TIMECODE_SCALE;
    let mut duration = None;

    while remaining > 0 {
        let element = read_header(reader)?.context("Truncated Info element")?;
        let size = element.size.context("Info child has unknown size")?;
        remaining = remaining
            .checked_sub(element.header_len + size)
            .context("Info child overruns its parent")?;

        match element.id {
            TIMECODE_SCALE => scale = read_uint(reader, size)?,
            DURATION => duration = Some(read_float(reader, size)?),
            _ => skip(reader, &element)?,
        }
    }

    let ticks = duration.context("Info element has no Duration")?;
    Ok(ticks * scale as f64 / 1_000_000_000.0)
}

struct Header {
    id: u64,
    /// `None` for the reserved "unknown size" value
    size: Option<u64>,
    header_len: u64,
}

fn read_header<R: Read>(reader: &mut R) -> Result<Option<Header>> {
    let Some((id, id_len)) = read_vint(reader, true)? else {
        return Ok(None);
    };
    let (size, size_len) = read_vint(reader, false)?.context("Truncated element header")?;
    let unknown = size == (1u64 << (7 * size_len)) - 1;
    Ok(Some(Header {
        id,
        size: (!unknown).then_some(size),
        header_len: (id_len + size_len) as u64,
    }))
}

/// Variable-length integer. IDs keep their length marker, sizes drop it.
fn read_vint<R: Read>(reader: &mut R, keep_marker: bool) -> Result<Option<(u64, usize)>> {
    let mut first = [0u8; 1];
    match reader.read_exact(&mut first) {
        Ok(()) => {}
        Err(e) if e.kind() == ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }

    let len = first[0].leading_zeros() as usize + 1;
    if len > 8 {
        bail!("Invalid EBML variable-length integer");
    }

    let mut value = if keep_marker {
        u64::from(first[0])
    } else {
        u64::from(first[0]) & (0xFF_u64 >> len)
    };

    let mut rest = [0u8; 7];
    reader.read_exact(&mut rest[..len - 1])?;
    for byte in &rest[..len - 1] {
        value = (value << 8) | u64::from(*byte);
    }

    Ok(Some((value, len)))
}

fn read_uint<R: Read>(reader: &mut R, size: u64) -> Result<u64> {
    if size > 8 {
        bail!("Unsigned integer element too large ({} bytes)", size);
    }
    let mut buf = [0u8; 8];
    reader.read_exact(&mut buf[..size as usize])?;
    Ok(buf[..size as usize]
        .iter()
        .fold(0u64, |acc, b| (acc << 8) | u64::from(*b)))
}

fn read_float<R: Read>(reader: &mut R, size: u64) -> Result<f64> {
    match size {
        4 => {
            let mut buf = [0u8; 4];
            reader.read_exact(&mut buf)?;
            Ok(f64::from(f32::from_be_bytes(buf)))
        }
        8 => {
            let mut buf = [0u8; 8];
            reader.read_exact(&mut buf)?;
            Ok(f64::from_be_bytes(buf))
        }
        _ => bail!("Invalid float element size {}", size),
    }
}

fn skip<R: Seek>(reader: &mut R, element: &Header) -> Result<()> {
    let size = element
        .size
        .with_context(|| format!("Cannot skip element 0x{:X} of unknown size", element.id))?;
    let offset = i64::try_from(size).context("Element size out of range")?;
    reader.seek(SeekFrom::Current(offset))?;
    Ok(())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::io::Cursor;

    fn element(id: &[u8], payload: &[u8]) -> Vec<u8> {
        assert!(payload.len() < 127);
        let mut out = id.to_vec();
        out.push(0x80 | payload.len() as u8);
        out.extend_from_slice(payload);
        out
    }

    fn info(scale: u64, duration: f32) -> Vec<u8> {
        let mut payload = element(&[0x2A, 0xD7, 0xB1], &scale.to_be_bytes()[5..]);
        payload.extend(element(&[0x73, 0xA4], &[0u8; 16])); // SegmentUID, skipped
        payload.extend(element(&[0x44, 0x89], &duration.to_be_bytes()));
        element(&[0x15, 0x49, 0xA9, 0x66], &payload)
    }

    fn ebml_header() -> Vec<u8> {
        element(&[0x1A, 0x45, 0xDF, 0xA3], &element(&[0x42, 0x82], b"matroska"))
    }

    /// Smallest file the reader accepts: EBML header, Segment, SeekHead, Info
    pub(crate) fn sample_file(scale: u64, duration: f32) -> Vec<u8> {
        let mut segment = element(&[0x11, 0x4D, 0x9B, 0x74], &[0u8; 4]);
        segment.extend(info(scale, duration));

        let mut out = ebml_header();
        out.extend(element(&[0x18, 0x53, 0x80, 0x67], &segment));
        out
    }

    #[test]
    fn test_duration_with_default_scale() {
        let bytes = sample_file(1_000_000, 5000.0);
        let seconds = read_duration(&mut Cursor::new(bytes)).unwrap();
        assert!((seconds - 5.0).abs() < 1e-9);
    }

    #[test]
    fn test_duration_with_custom_scale() {
        // 100µs ticks: 36_000_000 ticks = 3600 s
        let bytes = sample_file(100_000, 36_000_000.0);
        let seconds = read_duration(&mut Cursor::new(bytes)).unwrap();
        assert!((seconds - 3600.0).abs() < 1e-6);
    }

    #[test]
    fn test_unknown_size_segment() {
        let mut out = ebml_header();
        out.extend_from_slice(&[0x18, 0x53, 0x80, 0x67]);
        out.extend_from_slice(&[0x01, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF]);
        out.extend(info(1_000_000, 1500.0));

        let seconds = read_duration(&mut Cursor::new(out)).unwrap();
        assert!((seconds - 1.5).abs() < 1e-9);
    }

    #[test]
    fn test_rejects_non_ebml() {
        let err = read_duration(&mut Cursor::new(b"RIFF....AVI LIST".to_vec()));
        assert!(err.is_err());
    }

    #[test]
    fn test_missing_duration() {
        let info = element(
            &[0x15, 0x49, 0xA9, 0x66],
            &element(&[0x2A, 0xD7, 0xB1], &[0x0F, 0x42, 0x40]),
        );
        let mut out = ebml_header();
        out.extend(element(&[0x18, 0x53, 0x80, 0x67], &info));
        assert!(read_duration(&mut Cursor::new(out)).is_err());
    }

    #[test]
    fn test_is_matroska_path() {
        assert!(is_matroska_path(Path::new("/a/b.MKV")));
        assert!(is_matroska_path(Path::new("/a/b.webm")));
        assert!(!is_matroska_path(Path::new("/a/b.mp4")));
    }
}
