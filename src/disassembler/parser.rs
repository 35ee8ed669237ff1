//! Big-endian cursor over method bytecode.

use crate::{Error, Result};

/// Fixed-size integers that can be read from big-endian bytes.
pub trait BigEndian: Sized {
    /// Encoded size in bytes.
    const SIZE: usize;

    /// Decodes from exactly [`Self::SIZE`] bytes.
    fn from_be_slice(bytes: &[u8]) -> Self;
}

macro_rules! impl_big_endian {
    ($($ty:ty),*) => {
        $(
            impl BigEndian for $ty {
                const SIZE: usize = std::mem::size_of::<$ty>();

                fn from_be_slice(bytes: &[u8]) -> Self {
                    let mut buffer = [0u8; std::mem::size_of::<$ty>()];
                    buffer.copy_from_slice(bytes);
                    <$ty>::from_be_bytes(buffer)
                }
            }
        )*
    };
}

impl_big_endian!(u8, i8, u16, i16, u32, i32);

/// A bounds-checked read position within a byte slice.
///
/// # Examples
///
/// ```rust
/// use portflow::disassembler::Parser;
///
/// let mut parser = Parser::new(&[0x00, 0x10, 0xff]);
/// assert_eq!(parser.read_be::<u16>()?, 0x10);
/// assert_eq!(parser.read_be::<i8>()?, -1);
/// assert!(!parser.has_more_data());
/// # Ok::<(), portflow::Error>(())
/// ```
pub struct Parser<'a> {
    data: &'a [u8],
    position: usize,
}

impl<'a> Parser<'a> {
    /// Creates a parser positioned at the start of `data`.
    #[must_use]
    pub fn new(data: &'a [u8]) -> Self {
        Parser { data, position: 0 }
    }

    /// Length of the underlying data.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns `true` if the underlying data is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Returns `true` if the position is before the end of the data.
    #[must_use]
    pub fn has_more_data(&self) -> bool {
        self.position < self.data.len()
    }

    /// Current position.
    #[must_use]
    pub fn pos(&self) -> usize {
        self.position
    }

    /// The whole underlying slice.
    #[must_use]
    pub fn data(&self) -> &'a [u8] {
        self.data
    }

    /// Reads a `T` in big-endian order and advances past it.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if fewer than `T::SIZE` bytes remain.
    pub fn read_be<T: BigEndian>(&mut self) -> Result<T> {
        let end = self.position + T::SIZE;
        let Some(bytes) = self.data.get(self.position..end) else {
            return Err(Error::OutOfBounds);
        };
        self.position = end;
        Ok(T::from_be_slice(bytes))
    }

    /// Skips to the next multiple of `alignment`, returning the skipped bytes.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if the aligned position is past the end.
    pub fn align(&mut self, alignment: usize) -> Result<&'a [u8]> {
        let start = self.position;
        let end = start.next_multiple_of(alignment);
        if end > self.data.len() {
            return Err(Error::OutOfBounds);
        }
        self.position = end;
        Ok(&self.data[start..end])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_big_endian() -> crate::Result<()> {
        let mut parser = Parser::new(&[0x12, 0x34, 0xff, 0xff, 0xff, 0xfe]);
        assert_eq!(parser.read_be::<u16>()?, 0x1234);
        assert_eq!(parser.read_be::<i32>()?, -2);
        assert!(parser.read_be::<u8>().is_err());
        Ok(())
    }

    #[test]
    fn test_align() -> crate::Result<()> {
        let mut parser = Parser::new(&[0xaa, 0, 0, 0, 1]);
        parser.read_be::<u8>()?;
        assert_eq!(parser.align(4)?, &[0, 0, 0]);
        assert_eq!(parser.pos(), 4);
        assert_eq!(parser.align(4)?, &[] as &[u8]);
        Ok(())
    }
}
