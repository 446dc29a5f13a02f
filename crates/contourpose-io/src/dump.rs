//! Binary dumps of network prediction tensors.
//!
//! Layout, all little endian: magic `CPVF`, `u32` version, `u32` K, `u32` H,
//! `u32` W, `f32` origin x, `f32` origin y, `f32` stride, then `K*H*W` `f32`
//! confidences followed by `K*H*W*2` `f32` directions.

use std::io::{BufWriter, Read, Write};
use std::path::Path;

use contourpose_vote::VectorField;
use glam::DVec2;

use crate::error::IoError;

const MAGIC: &[u8; 4] = b"CPVF";
const VERSION: u32 = 1;

fn read_u32<R: Read>(reader: &mut R) -> Result<u32, IoError> {
    let mut buf = [0u8; 4];
    reader.read_exact(&mut buf)?;
    Ok(u32::from_le_bytes(buf))
}

fn read_f32<R: Read>(reader: &mut R) -> Result<f32, IoError> {
    let mut buf = [0u8; 4];
    reader.read_exact(&mut buf)?;
    Ok(f32::from_le_bytes(buf))
}

/// Read `len` values. The buffer grows with the bytes actually present.
fn read_f32_vec<R: Read>(reader: &mut R, len: usize) -> Result<Vec<f32>, IoError> {
    let expected = len as u64 * 4;
    let mut bytes = Vec::new();
    reader.by_ref().take(expected).read_to_end(&mut bytes)?;
    if bytes.len() as u64 != expected {
        return Err(IoError::FieldDump(format!(
            "payload truncated, expected {len} values, got {}",
            bytes.len() / 4
        )));
    }
    Ok(bytes
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect())
}

/// Decode a field dump from a stream.
pub fn decode_field<R: Read>(reader: &mut R) -> Result<VectorField, IoError> {
    let mut magic = [0u8; 4];
    reader.read_exact(&mut magic)?;
    if &magic != MAGIC {
        return Err(IoError::FieldDump(format!("bad magic {magic:?}")));
    }
    let version = read_u32(reader)?;
    if version != VERSION {
        return Err(IoError::FieldDump(format!("unsupported version {version}")));
    }
    let k = read_u32(reader)? as usize;
    let h = read_u32(reader)? as usize;
    let w = read_u32(reader)? as usize;
    let origin = DVec2::new(read_f32(reader)? as f64, read_f32(reader)? as f64);
    let stride = read_f32(reader)? as f64;

    let plane = k
        .checked_mul(h)
        .and_then(|v| v.checked_mul(w))
        .filter(|&v| v <= (u32::MAX as usize))
        .ok_or_else(|| IoError::FieldDump(format!("shape [{k}, {h}, {w}] too large")))?;
    let confidence = read_f32_vec(reader, plane)?;
    let directions = read_f32_vec(reader, plane * 2)?;

    Ok(VectorField::new(k, h, w, confidence, directions)?.with_placement(origin, stride)?)
}

/// Encode a field dump to a stream.
pub fn encode_field<W: Write>(writer: &mut W, field: &VectorField) -> Result<(), IoError> {
    writer.write_all(MAGIC)?;
    writer.write_all(&VERSION.to_le_bytes())?;
    for dim in [field.num_keypoints(), field.height(), field.width()] {
        let dim = u32::try_from(dim)
            .map_err(|_| IoError::FieldDump(format!("dimension {dim} exceeds u32")))?;
        writer.write_all(&dim.to_le_bytes())?;
    }
    let origin = field.origin();
    for v in [origin.x as f32, origin.y as f32, field.stride() as f32] {
        writer.write_all(&v.to_le_bytes())?;
    }
    for v in field.confidence().iter().chain(field.directions()) {
        writer.write_all(&v.to_le_bytes())?;
    }
    Ok(())
}

/// Read a field dump file.
pub fn read_field_dump(path: impl AsRef<Path>) -> Result<VectorField, IoError> {
    let path = path.as_ref();
    let file = std::fs::File::open(path).map_err(IoError::file(path))?;
    decode_field(&mut std::io::BufReader::new(file))
}

/// Write a field dump file.
pub fn write_field_dump(path: impl AsRef<Path>, field: &VectorField) -> Result<(), IoError> {
    let path = path.as_ref();
    let file = std::fs::File::create(path).map_err(IoError::file(path))?;
    let mut writer = BufWriter::new(file);
    encode_field(&mut writer, field)?;
    writer.flush()?;
    Ok(())
}
