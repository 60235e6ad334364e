//! Binary primitive codec: the atomic wire representations.
//!
//! | Type          | Encoding                                                  |
//! |---------------|-----------------------------------------------------------|
//! | int, long     | zigzag, then base-128 varint, low group first             |
//! | float, double | 4 / 8 bytes IEEE-754, little-endian                       |
//! | bytes, string | long length, then raw bytes (UTF-8 for strings)           |
//! | boolean       | one byte, `0x00` or `0x01`; anything else is rejected     |
//!
//! Varints are bounded: an int may use at most 5 groups and must fit 32 bits
//! after zigzag, a long at most 10 groups and 64 bits.

use std::io::{self, Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::error::{Error, Result};

/// Longest legal encoding of a 32-bit varint.
pub const MAX_VARINT_INT:  usize = 5;
/// Longest legal encoding of a 64-bit varint.
pub const MAX_VARINT_LONG: usize = 10;

// ── Zigzag ───────────────────────────────────────────────────────────────────

#[inline]
pub fn zigzag_encode(n: i64) -> u64 {
    ((n << 1) ^ (n >> 63)) as u64
}

#[inline]
pub fn zigzag_decode(n: u64) -> i64 {
    ((n >> 1) as i64) ^ -((n & 1) as i64)
}

// ── Encoding ─────────────────────────────────────────────────────────────────

pub fn write_varint<W: Write + ?Sized>(w: &mut W, mut n: u64) -> io::Result<()> {
    let mut buf = [0u8; MAX_VARINT_LONG];
    let mut i = 0;
    while n >= 0x80 {
        buf[i] = (n as u8 & 0x7f) | 0x80;
        n >>= 7;
        i += 1;
    }
    buf[i] = n as u8;
    w.write_all(&buf[..=i])
}

#[inline]
pub fn write_long<W: Write + ?Sized>(w: &mut W, n: i64) -> io::Result<()> {
    write_varint(w, zigzag_encode(n))
}

#[inline]
pub fn write_int<W: Write + ?Sized>(w: &mut W, n: i32) -> io::Result<()> {
    write_varint(w, zigzag_encode(i64::from(n)))
}

#[inline]
pub fn write_boolean<W: Write + ?Sized>(w: &mut W, b: bool) -> io::Result<()> {
    w.write_u8(u8::from(b))
}

#[inline]
pub fn write_float<W: Write + ?Sized>(w: &mut W, f: f32) -> io::Result<()> {
    w.write_f32::<LittleEndian>(f)
}

#[inline]
pub fn write_double<W: Write + ?Sized>(w: &mut W, f: f64) -> io::Result<()> {
    w.write_f64::<LittleEndian>(f)
}

pub fn write_bytes<W: Write + ?Sized>(w: &mut W, bytes: &[u8]) -> io::Result<()> {
    write_long(w, bytes.len() as i64)?;
    w.write_all(bytes)
}

#[inline]
pub fn write_string<W: Write + ?Sized>(w: &mut W, s: &str) -> io::Result<()> {
    write_bytes(w, s.as_bytes())
}

// ── Decoding ─────────────────────────────────────────────────────────────────

/// Read a varint that must fit in `bits` bits (32 or 64).
pub fn read_varint<R: Read + ?Sized>(r: &mut R, bits: u32) -> Result<u64> {
    let max_bytes = bits.div_ceil(7) as usize;
    let mut result = 0u64;
    for i in 0..max_bytes {
        let byte = r.read_u8()?;
        let group = u64::from(byte & 0x7f);
        let shift = 7 * i as u32;
        if shift + 7 > bits && group >> (bits - shift) != 0 {
            return Err(Error::MalformedVarint { max_bytes });
        }
        result |= group << shift;
        if byte & 0x80 == 0 {
            return Ok(result);
        }
    }
    Err(Error::MalformedVarint { max_bytes })
}

#[inline]
pub fn read_long<R: Read + ?Sized>(r: &mut R) -> Result<i64> {
    Ok(zigzag_decode(read_varint(r, 64)?))
}

#[inline]
pub fn read_int<R: Read + ?Sized>(r: &mut R) -> Result<i32> {
    // A 32-bit zigzag value always decodes into i32 range.
    Ok(zigzag_decode(read_varint(r, 32)?) as i32)
}

/// Strict: only `0x00` and `0x01` are booleans.
pub fn read_boolean<R: Read + ?Sized>(r: &mut R) -> Result<bool> {
    match r.read_u8()? {
        0 => Ok(false),
        1 => Ok(true),
        other => Err(Error::MalformedBoolean(other)),
    }
}

#[inline]
pub fn read_float<R: Read + ?Sized>(r: &mut R) -> Result<f32> {
    Ok(r.read_f32::<LittleEndian>()?)
}

#[inline]
pub fn read_double<R: Read + ?Sized>(r: &mut R) -> Result<f64> {
    Ok(r.read_f64::<LittleEndian>()?)
}

/// A non-negative length prefix.
pub fn read_len<R: Read + ?Sized>(r: &mut R) -> Result<usize> {
    let n = read_long(r)?;
    usize::try_from(n).map_err(|_| Error::InvalidLength(n))
}

/// Read exactly `len` bytes without trusting `len` for the allocation.
pub fn read_exact_vec<R: Read + ?Sized>(r: &mut R, len: usize) -> Result<Vec<u8>> {
    let mut buf = Vec::with_capacity(len.min(64 * 1024));
    (&mut *r).take(len as u64).read_to_end(&mut buf)?;
    if buf.len() != len {
        return Err(Error::TruncatedStream);
    }
    Ok(buf)
}

pub fn read_bytes<R: Read + ?Sized>(r: &mut R) -> Result<Vec<u8>> {
    let len = read_len(r)?;
    read_exact_vec(r, len)
}

pub fn read_string<R: Read + ?Sized>(r: &mut R) -> Result<String> {
    Ok(String::from_utf8(read_bytes(r)?)?)
}

/// Discard exactly `len` bytes.
pub fn skip_exact<R: Read + ?Sized>(r: &mut R, len: u64) -> Result<()> {
    let copied = io::copy(&mut (&mut *r).take(len), &mut io::sink())?;
    if copied != len {
        return Err(Error::TruncatedStream);
    }
    Ok(())
}

// ── Position tracking ────────────────────────────────────────────────────────

/// Counts the bytes that pass through a reader or writer.
#[derive(Debug)]
pub struct Position<T> {
    inner: T,
    pos:   u64,
}

impl<T> Position<T> {
    pub fn new(inner: T) -> Self { Self { inner, pos: 0 } }

    pub fn starting_at(inner: T, pos: u64) -> Self { Self { inner, pos } }

    #[inline]
    pub fn position(&self) -> u64 { self.pos }

    pub fn into_inner(self) -> T { self.inner }
}

impl<R: Read> Read for Position<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.pos += n as u64;
        Ok(n)
    }
}

impl<W: Write> Write for Position<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.pos += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}
