use std::io::SeekFrom;

use chrono::{DateTime, Utc};

use crate::constants::*;
use crate::device::BlockDevice;
use crate::error::{Result, XfsError};

/// Reads exactly `size` bytes at `offset` of a device.
///
/// # Arguments
///
/// - `device`: The device to read from.
/// - `offset`: The byte offset, relative to the start of the device.
/// - `size`: The number of bytes to read.
///
/// # Errors
///
/// Returns an `Io` error if the seek fails or fewer than `size` bytes could be
/// read. Partial reads are never returned.
pub fn read_at<D: BlockDevice + ?Sized>(device: &mut D, offset: u64, size: usize) -> Result<Vec<u8>> {
    let mut buffer = Vec::new();
    buffer
        .try_reserve_exact(size)
        .map_err(|err| XfsError::Memory(format!("unable to allocate {size} bytes: {err}")))?;
    buffer.resize(size, 0);

    device.seek(SeekFrom::Start(offset))?;

    let mut filled = 0;
    while filled < size {
        let count = device.read(&mut buffer[filled..])?;
        if count == 0 {
            return Err(XfsError::io(format!(
                "Failed to read {size} bytes at offset {offset}: short read of {filled} bytes"
            )));
        }
        filled += count;
    }

    Ok(buffer)
}

/// Returns `buffer[offset..offset + len]`, or an `Argument` error if it does not fit.
pub fn slice_at(buffer: &[u8], offset: usize, len: usize) -> Result<&[u8]> {
    offset
        .checked_add(len)
        .and_then(|end| buffer.get(offset..end))
        .ok_or_else(|| {
            XfsError::Argument(format!(
                "{len} bytes at offset {offset} exceed buffer of {} bytes",
                buffer.len()
            ))
        })
}

/// Extracts an 8-bit unsigned integer from a buffer at a given offset.
///
/// # Errors
///
/// Returns an `Argument` error if the buffer is too short.
pub fn u8_at(buffer: &[u8], offset: usize) -> Result<u8> {
    Ok(slice_at(buffer, offset, 1)?[0])
}

/// Extracts a big-endian 16-bit unsigned integer from a buffer at a given offset.
pub fn be_u16_at(buffer: &[u8], offset: usize) -> Result<u16> {
    let bytes = slice_at(buffer, offset, 2)?;
    Ok(u16::from_be_bytes([bytes[0], bytes[1]]))
}

/// Extracts a big-endian 32-bit unsigned integer from a buffer at a given offset.
pub fn be_u32_at(buffer: &[u8], offset: usize) -> Result<u32> {
    let bytes = slice_at(buffer, offset, 4)?;
    Ok(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

/// Extracts a big-endian 64-bit unsigned integer from a buffer at a given offset.
pub fn be_u64_at(buffer: &[u8], offset: usize) -> Result<u64> {
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(slice_at(buffer, offset, 8)?);
    Ok(u64::from_be_bytes(bytes))
}

/// Reads a big-endian unsigned integer of `width` bytes (1 to 8).
pub fn be_uint_at(buffer: &[u8], offset: usize, width: usize) -> Result<u64> {
    if !(1..=8).contains(&width) {
        return Err(XfsError::Argument(format!("unsupported integer width {width}")));
    }
    Ok(slice_at(buffer, offset, width)?
        .iter()
        .fold(0u64, |acc, byte| (acc << 8) | u64::from(*byte)))
}

/// Renders a mode the way `ls -l` does, e.g. `-rw-r--r--`.
pub fn file_mode_string(mode: u16) -> String {
    let kind = match mode & S_IFMT {
        S_IFSOCK => 's',
        S_IFLNK => 'l',
        S_IFREG => '-',
        S_IFBLK => 'b',
        S_IFDIR => 'd',
        S_IFCHR => 'c',
        S_IFIFO => 'p',
        _ => '-',
    };

    let bit = |mask: u16, c: char| if mode & mask != 0 { c } else { '-' };
    let exec = |exec_mask: u16, special_mask: u16, set: char, unset: char| {
        match (mode & exec_mask != 0, mode & special_mask != 0) {
            (true, true) => set,
            (false, true) => unset,
            (true, false) => 'x',
            (false, false) => '-',
        }
    };

    [
        kind,
        bit(0o400, 'r'),
        bit(0o200, 'w'),
        exec(0o100, 0o4000, 's', 'S'),
        bit(0o040, 'r'),
        bit(0o020, 'w'),
        exec(0o010, 0o2000, 's', 'S'),
        bit(0o004, 'r'),
        bit(0o002, 'w'),
        exec(0o001, 0o1000, 't', 'T'),
    ]
    .iter()
    .collect()
}

/// Decodes a raw name and escapes control characters as `\xNN`.
///
/// Covers U+0000..=U+001F and U+007F..=U+009F. Bytes that are not valid UTF-8
/// are escaped the same way.
pub fn escape_name(raw: &[u8]) -> String {
    let mut out = String::with_capacity(raw.len());
    for chunk in raw.utf8_chunks() {
        for c in chunk.valid().chars() {
            let code = c as u32;
            if code <= 0x1F || (0x7F..=0x9F).contains(&code) {
                out.push_str(&format!("\\x{code:02x}"));
            } else {
                out.push(c);
            }
        }
        for byte in chunk.invalid() {
            out.push_str(&format!("\\x{byte:02x}"));
        }
    }
    out
}

/// Formats nanoseconds since the Unix epoch as fractional seconds, `1700000000.123456789`.
pub fn format_posix_time_ns(ns: i64) -> String {
    let sign = if ns < 0 { "-" } else { "" };
    let abs = ns.unsigned_abs();
    format!("{sign}{}.{:09}", abs / 1_000_000_000, abs % 1_000_000_000)
}

/// Formats nanoseconds since the Unix epoch as an ISO 8601 UTC date-time,
/// `2023-11-14T22:13:20.000000005Z`, or `Not set (0)` for zero.
pub fn format_iso8601_ns(ns: i64) -> String {
    if ns == 0 {
        return String::from("Not set (0)");
    }
    let seconds = ns.div_euclid(1_000_000_000);
    let nanoseconds = ns.rem_euclid(1_000_000_000) as u32;
    match DateTime::<Utc>::from_timestamp(seconds, nanoseconds) {
        Some(time) => format!("{}Z", time.format("%Y-%m-%dT%H:%M:%S%.9f")),
        None => format!("{ns} (out of range)"),
    }
}
