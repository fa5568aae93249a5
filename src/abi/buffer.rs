//! Buffer read/write helpers for marshalling.
//!
//! Every access is bounds checked and reports [`MarshalError::BufferTooSmall`]
//! instead of panicking. Multi-byte values use the host byte order, which is
//! the byte order the foreign side reads.

use super::MarshalError;

/// Align a value up to the nearest multiple of alignment.
///
/// `align` must be a power of two.
#[inline]
pub fn align_to(val: usize, align: usize) -> usize {
    (val + align - 1) & !(align - 1)
}

/// [`align_to`] that returns `None` instead of wrapping past `usize::MAX`.
#[inline]
pub fn checked_align_to(val: usize, align: usize) -> Option<usize> {
    Some(val.checked_add(align - 1)? & !(align - 1))
}

/// A zeroed buffer of `len` bytes, or [`MarshalError::AllocationFailed`] if
/// the memory cannot be reserved.
pub fn zeroed(len: usize) -> Result<Vec<u8>, MarshalError> {
    let mut buffer = Vec::new();
    buffer
        .try_reserve_exact(len)
        .map_err(|_| MarshalError::AllocationFailed { size: len })?;
    buffer.resize(len, 0u8);
    Ok(buffer)
}

/// The range `start..start + len`, saturating so an overflowing request is
/// simply out of bounds.
#[inline]
fn span(start: usize, len: usize) -> std::ops::Range<usize> {
    start..start.saturating_add(len)
}

/// Borrow `len` bytes starting at `start`.
#[inline]
pub fn read_slice(buffer: &[u8], start: usize, len: usize) -> Result<&[u8], MarshalError> {
    let range = span(start, len);
    let available = buffer.len();
    buffer.get(range.clone()).ok_or(MarshalError::BufferTooSmall {
        needed: range.end,
        available,
    })
}

/// Copy `data` into the buffer at `start`.
#[inline]
pub fn write_slice(buffer: &mut [u8], start: usize, data: &[u8]) -> Result<(), MarshalError> {
    let range = span(start, data.len());
    let available = buffer.len();
    buffer
        .get_mut(range.clone())
        .ok_or(MarshalError::BufferTooSmall {
            needed: range.end,
            available,
        })?
        .copy_from_slice(data);
    Ok(())
}

/// Read a fixed-size byte array at `start`.
#[inline]
pub fn read_array<const N: usize>(buffer: &[u8], start: usize) -> Result<[u8; N], MarshalError> {
    let mut out = [0u8; N];
    out.copy_from_slice(read_slice(buffer, start, N)?);
    Ok(out)
}

/// Read a native-endian unsigned integer of `width` bytes (1, 2, 4 or 8).
pub fn read_uint(buffer: &[u8], start: usize, width: usize) -> Result<u64, MarshalError> {
    Ok(match width {
        1 => u64::from(u8::from_ne_bytes(read_array(buffer, start)?)),
        2 => u64::from(u16::from_ne_bytes(read_array(buffer, start)?)),
        4 => u64::from(u32::from_ne_bytes(read_array(buffer, start)?)),
        _ => u64::from_ne_bytes(read_array(buffer, start)?),
    })
}

/// Write the low `width` bytes (1, 2, 4 or 8) of `value` in native byte order.
pub fn write_uint(
    buffer: &mut [u8],
    start: usize,
    width: usize,
    value: u64,
) -> Result<(), MarshalError> {
    match width {
        1 => write_slice(buffer, start, &(value as u8).to_ne_bytes()),
        2 => write_slice(buffer, start, &(value as u16).to_ne_bytes()),
        4 => write_slice(buffer, start, &(value as u32).to_ne_bytes()),
        _ => write_slice(buffer, start, &value.to_ne_bytes()),
    }
}

/// Fill `len` bytes at `start` with zeros.
#[inline]
pub fn zero_fill(buffer: &mut [u8], start: usize, len: usize) -> Result<(), MarshalError> {
    let range = span(start, len);
    let available = buffer.len();
    buffer
        .get_mut(range.clone())
        .ok_or(MarshalError::BufferTooSmall {
            needed: range.end,
            available,
        })?
        .fill(0);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_align_to() {
        assert_eq!(align_to(0, 8), 0);
        assert_eq!(align_to(1, 8), 8);
        assert_eq!(align_to(8, 8), 8);
        assert_eq!(align_to(20, 8), 24);
        assert_eq!(align_to(5, 1), 5);
    }

    #[test]
    fn test_out_of_bounds_is_an_error() {
        let mut buffer = [0u8; 4];
        assert!(matches!(
            write_uint(&mut buffer, 2, 4, 7),
            Err(MarshalError::BufferTooSmall {
                needed: 6,
                available: 4
            })
        ));
        assert!(read_uint(&buffer, 1, 4).is_err());
    }

    #[test]
    fn test_uint_widths() -> Result<(), MarshalError> {
        let mut buffer = [0u8; 8];
        write_uint(&mut buffer, 0, 2, 0xBEEF)?;
        assert_eq!(read_uint(&buffer, 0, 2)?, 0xBEEF);
        write_uint(&mut buffer, 0, 8, u64::MAX)?;
        assert_eq!(read_uint(&buffer, 0, 8)?, u64::MAX);
        write_uint(&mut buffer, 4, 4, 0x1234_5678)?;
        assert_eq!(read_uint(&buffer, 4, 4)?, 0x1234_5678);
        Ok(())
    }

    #[test]
    fn test_overflowing_ranges_are_errors() {
        let mut buffer = [0u8; 8];
        assert!(matches!(
            read_slice(&buffer, usize::MAX - 2, 8),
            Err(MarshalError::BufferTooSmall {
                needed: usize::MAX,
                available: 8
            })
        ));
        assert!(zero_fill(&mut buffer, 4, usize::MAX).is_err());
        assert!(write_uint(&mut buffer, usize::MAX, 4, 1).is_err());
    }

    #[test]
    fn test_checked_align_to() {
        assert_eq!(checked_align_to(20, 8), Some(24));
        assert_eq!(checked_align_to(usize::MAX - 3, 8), None);
        assert_eq!(checked_align_to(usize::MAX, 1), Some(usize::MAX));
    }
}
