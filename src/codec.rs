//! Length-prefixed array codec for wire structures whose element sizes vary
//! per element. Counts are little-endian and deliberately narrower than
//! borsh's u32 vec prefix: message-level lists carry a single byte, and
//! instruction data carries two.

use crate::error::EngineError;

/// A single wire element: knows its own encoded size and how to write and
/// read itself at a cursor.
pub trait WireElement: Sized {
    fn byte_size(&self) -> usize;
    fn write(&self, out: &mut Vec<u8>) -> Result<(), EngineError>;
    fn read(buf: &[u8], cursor: &mut usize) -> Result<Self, EngineError>;
}

/// Width of a small-array length prefix.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum LenWidth {
    One,
    Two,
}

impl LenWidth {
    pub fn byte_size(self) -> usize {
        match self {
            LenWidth::One => 1,
            LenWidth::Two => 2,
        }
    }

    fn max_len(self) -> usize {
        match self {
            LenWidth::One => usize::from(u8::MAX),
            LenWidth::Two => usize::from(u16::MAX),
        }
    }

    fn write_len(self, len: usize, out: &mut Vec<u8>) {
        match self {
            LenWidth::One => out.push(len as u8),
            LenWidth::Two => out.extend_from_slice(&(len as u16).to_le_bytes()),
        }
    }

    fn read_len(self, buf: &[u8], cursor: &mut usize) -> Result<usize, EngineError> {
        match self {
            LenWidth::One => {
                let byte = *buf.get(*cursor).ok_or(EngineError::MalformedLength)?;
                *cursor += 1;
                Ok(usize::from(byte))
            }
            LenWidth::Two => {
                let end = cursor
                    .checked_add(2)
                    .filter(|end| *end <= buf.len())
                    .ok_or(EngineError::MalformedLength)?;
                let mut raw = [0u8; 2];
                raw.copy_from_slice(&buf[*cursor..end]);
                *cursor = end;
                Ok(usize::from(u16::from_le_bytes(raw)))
            }
        }
    }
}

/// Appends `items` as a length-prefixed array. Fails when the count does
/// not fit the requested prefix width.
pub fn write_small_array<T: WireElement>(
    width: LenWidth,
    items: &[T],
    out: &mut Vec<u8>,
) -> Result<(), EngineError> {
    if items.len() > width.max_len() {
        return Err(EngineError::MalformedLength);
    }
    width.write_len(items.len(), out);
    for item in items {
        item.write(out)?;
    }
    Ok(())
}

/// Reads a length prefix and exactly that many elements, advancing the
/// cursor past the last one.
pub fn read_small_array<T: WireElement>(
    width: LenWidth,
    buf: &[u8],
    cursor: &mut usize,
) -> Result<Vec<T>, EngineError> {
    let len = width.read_len(buf, cursor)?;
    let mut items = Vec::with_capacity(len.min(buf.len()));
    for _ in 0..len {
        items.push(T::read(buf, cursor)?);
    }
    Ok(items)
}

impl WireElement for u8 {
    fn byte_size(&self) -> usize {
        1
    }

    fn write(&self, out: &mut Vec<u8>) -> Result<(), EngineError> {
        out.push(*self);
        Ok(())
    }

    fn read(buf: &[u8], cursor: &mut usize) -> Result<Self, EngineError> {
        let byte = *buf.get(*cursor).ok_or(EngineError::MalformedLength)?;
        *cursor += 1;
        Ok(byte)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn u8_array_round_trips() {
        let items: Vec<u8> = vec![7, 0, 255, 42];
        let mut buf = Vec::new();
        write_small_array(LenWidth::One, &items, &mut buf).unwrap();
        assert_eq!(buf.len(), 1 + items.len());
        assert_eq!(buf[0], 4);

        let mut cursor = 0;
        let decoded: Vec<u8> = read_small_array(LenWidth::One, &buf, &mut cursor).unwrap();
        assert_eq!(decoded, items);
        assert_eq!(cursor, buf.len());
    }

    #[test]
    fn two_byte_prefix_is_little_endian() {
        let items: Vec<u8> = vec![1; 300];
        let mut buf = Vec::new();
        write_small_array(LenWidth::Two, &items, &mut buf).unwrap();
        assert_eq!(&buf[..2], &300u16.to_le_bytes());

        let mut cursor = 0;
        let decoded: Vec<u8> = read_small_array(LenWidth::Two, &buf, &mut cursor).unwrap();
        assert_eq!(decoded.len(), 300);
    }

    #[test]
    fn empty_array_round_trips() {
        let mut buf = Vec::new();
        write_small_array::<u8>(LenWidth::One, &[], &mut buf).unwrap();
        assert_eq!(buf, vec![0]);

        let mut cursor = 0;
        let decoded: Vec<u8> = read_small_array(LenWidth::One, &buf, &mut cursor).unwrap();
        assert!(decoded.is_empty());
    }

    #[test]
    fn declared_count_past_buffer_end_fails() {
        // Claims 5 elements but only carries 2.
        let buf = vec![5u8, 1, 2];
        let mut cursor = 0;
        let err = read_small_array::<u8>(LenWidth::One, &buf, &mut cursor).unwrap_err();
        assert_eq!(err, EngineError::MalformedLength);
    }

    #[test]
    fn truncated_length_prefix_fails() {
        let buf = vec![3u8];
        let mut cursor = 0;
        let err = read_small_array::<u8>(LenWidth::Two, &buf, &mut cursor).unwrap_err();
        assert_eq!(err, EngineError::MalformedLength);
    }

    #[test]
    fn oversized_count_rejected_on_encode() {
        let items: Vec<u8> = vec![0; 256];
        let mut buf = Vec::new();
        let err = write_small_array(LenWidth::One, &items, &mut buf).unwrap_err();
        assert_eq!(err, EngineError::MalformedLength);
    }
}
