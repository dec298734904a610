//! Little-endian, bounds-checked reads of primitive values from blobs delivered by the target.
//!
//! Everything the native transport hands back as raw bytes - signature blobs, constant values,
//! the CLI header - is decoded through these helpers, so that a truncated buffer always surfaces
//! as [`crate::Error::OutOfBounds`] instead of a panic.

use crate::{Error::OutOfBounds, Result};

/// Trait for primitive types that can be decoded from a little-endian byte buffer.
///
/// Implemented for all fixed-width integers and floats used by ECMA-335 blob encodings.
pub trait CilIO: Sized {
    /// Associated type representing the byte array type for this numeric type.
    type Bytes: Sized + for<'a> TryFrom<&'a [u8]>;

    /// Read T from a byte buffer in little-endian
    fn from_le_bytes(bytes: Self::Bytes) -> Self;
}

macro_rules! impl_cil_io {
    ($($ty:ty),* $(,)?) => {
        $(
            impl CilIO for $ty {
                type Bytes = [u8; std::mem::size_of::<$ty>()];

                fn from_le_bytes(bytes: Self::Bytes) -> Self {
                    <$ty>::from_le_bytes(bytes)
                }
            }
        )*
    };
}

impl_cil_io!(u8, i8, u16, i16, u32, i32, u64, i64, f32, f64);

/// Reads a value of type `T` at `offset` in little-endian byte order and advances the offset.
///
/// # Errors
/// Returns [`crate::Error::OutOfBounds`] if the buffer does not hold enough bytes.
pub fn read_le_at<T: CilIO>(data: &[u8], offset: &mut usize) -> Result<T> {
    let type_len = std::mem::size_of::<T>();
    let end = offset.checked_add(type_len).ok_or(OutOfBounds)?;
    if end > data.len() {
        return Err(OutOfBounds);
    }

    let Ok(read) = data[*offset..end].try_into() else {
        return Err(OutOfBounds);
    };

    *offset = end;

    Ok(T::from_le_bytes(read))
}

/// Reads a value of type `T` from the start of the buffer in little-endian byte order.
///
/// # Errors
/// Returns [`crate::Error::OutOfBounds`] if the buffer does not hold enough bytes.
pub fn read_le<T: CilIO>(data: &[u8]) -> Result<T> {
    let mut offset = 0_usize;
    read_le_at(data, &mut offset)
}
