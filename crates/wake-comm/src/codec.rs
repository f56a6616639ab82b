//! Binary encode/decode primitives for frames.
//!
//! All integers are little-endian. Points are prefixed with a `u8`
//! component count, value vectors with a `u32` one. The format is intentionally simple: no compression,
//! no alignment padding, no self-describing schema. Writers append to a
//! `Vec<u8>` and cannot fail; readers consume from the front of a byte
//! slice and report truncation as [`CommError::Malformed`].

use std::io::Read;

use wake_core::Point;

use crate::error::CommError;

// ── Primitive writers ───────────────────────────────────────────

/// Write a single byte.
pub fn write_u8(w: &mut Vec<u8>, v: u8) {
    w.push(v);
}

/// Write a little-endian u32.
pub fn write_u32_le(w: &mut Vec<u8>, v: u32) {
    w.extend_from_slice(&v.to_le_bytes());
}

/// Write a little-endian u64.
pub fn write_u64_le(w: &mut Vec<u8>, v: u64) {
    w.extend_from_slice(&v.to_le_bytes());
}

/// Write a little-endian f64.
pub fn write_f64_le(w: &mut Vec<u8>, v: f64) {
    w.extend_from_slice(&v.to_le_bytes());
}

/// Write a point as a `u8` component count followed by f64 components.
///
/// Points carry at most three components, so the count always fits.
pub fn write_point(w: &mut Vec<u8>, p: &[f64]) {
    write_u8(w, p.len() as u8);
    for &x in p {
        write_f64_le(w, x);
    }
}

/// Write an arbitrary-length f64 vector as a `u32` count followed by the
/// values.
pub fn write_values(w: &mut Vec<u8>, values: &[f64]) {
    write_u32_le(w, values.len() as u32);
    for &x in values {
        write_f64_le(w, x);
    }
}

// ── Primitive readers ───────────────────────────────────────────

fn read_exact<const N: usize>(r: &mut &[u8], what: &str) -> Result<[u8; N], CommError> {
    let mut buf = [0u8; N];
    r.read_exact(&mut buf).map_err(|_| CommError::Malformed {
        detail: format!("truncated {what}"),
    })?;
    Ok(buf)
}

/// Read a single byte.
pub fn read_u8(r: &mut &[u8]) -> Result<u8, CommError> {
    Ok(read_exact::<1>(r, "u8")?[0])
}

/// Read a little-endian u32.
pub fn read_u32_le(r: &mut &[u8]) -> Result<u32, CommError> {
    Ok(u32::from_le_bytes(read_exact(r, "u32")?))
}

/// Read a little-endian u64.
pub fn read_u64_le(r: &mut &[u8]) -> Result<u64, CommError> {
    Ok(u64::from_le_bytes(read_exact(r, "u64")?))
}

/// Read a little-endian f64.
pub fn read_f64_le(r: &mut &[u8]) -> Result<f64, CommError> {
    Ok(f64::from_le_bytes(read_exact(r, "f64")?))
}

/// Read a count-prefixed point.
pub fn read_point(r: &mut &[u8]) -> Result<Point, CommError> {
    let n = read_u8(r)? as usize;
    if n > 3 {
        return Err(CommError::Malformed {
            detail: format!("point with {n} components"),
        });
    }
    let mut p = Point::new();
    for _ in 0..n {
        p.push(read_f64_le(r)?);
    }
    Ok(p)
}

/// Read a count-prefixed f64 vector.
///
/// The count is checked against the bytes left before allocating.
pub fn read_values(r: &mut &[u8]) -> Result<Vec<f64>, CommError> {
    let n = read_u32_le(r)? as usize;
    if n.saturating_mul(8) > r.len() {
        return Err(CommError::Malformed {
            detail: format!("{n} values but {} bytes left", r.len()),
        });
    }
    (0..n).map(|_| read_f64_le(r)).collect()
}

/// Fail unless the whole frame was consumed.
pub fn expect_end(r: &[u8]) -> Result<(), CommError> {
    if r.is_empty() {
        Ok(())
    } else {
        Err(CommError::Malformed {
            detail: format!("{} trailing bytes", r.len()),
        })
    }
}
