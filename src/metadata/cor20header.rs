//! The CLI header of a module image, as read from target memory.
//!
//! Only the startup break strategy looks at it: the entry point token is taken from here rather
//! than through a [`crate::metadata::module::ModuleView`], so nothing has to be populated before
//! the target is ready.
//!
//! # Reference
//! - [ECMA-335 II.25.3.3](https://ecma-international.org/wp-content/uploads/ECMA-335_6th_edition_june_2012.pdf)

use bitflags::bitflags;

use crate::{
    metadata::{tableid::TableId, token::Token},
    utils::Parser,
    Error::OutOfBounds,
    Result,
};

/// Size of the header in bytes
pub const COR20_HEADER_SIZE: usize = 72;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    /// Runtime flags of the CLI header
    pub struct ComImageFlags: u32 {
        /// Image contains only IL code
        const IL_ONLY = 0x0000_0001;
        /// Image must run in a 32-bit process
        const REQUIRED_32BIT = 0x0000_0002;
        /// Image is an IL library
        const IL_LIBRARY = 0x0000_0004;
        /// Image is strong name signed
        const STRONG_NAME_SIGNED = 0x0000_0008;
        /// The entry point field holds an RVA of native code instead of a token
        const NATIVE_ENTRYPOINT = 0x0000_0010;
        /// Debug data is tracked
        const TRACK_DEBUG_DATA = 0x0001_0000;
        /// Image prefers to run in a 32-bit process
        const PREFERRED_32BIT = 0x0002_0000;
    }
}

/// The CLI header (`IMAGE_COR20_HEADER`)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cor20Header {
    /// Size of header in bytes
    pub cb: u32,
    /// The minimum version of runtime required to run this program
    pub major_runtime_version: u16,
    /// The minor portion of the version
    pub minor_runtime_version: u16,
    /// RVA of the metadata
    pub meta_data_rva: u32,
    /// Size of the metadata
    pub meta_data_size: u32,
    /// Flags describing this runtime
    pub flags: ComImageFlags,
    /// Token of the `MethodDef` or `File` of the entry point, or an RVA with
    /// [`ComImageFlags::NATIVE_ENTRYPOINT`]
    pub entry_point_token: u32,
    /// RVA of implementation specific resources
    pub resource_rva: u32,
    /// Size of implementation specific resources
    pub resource_size: u32,
    /// RVA of the strong name hash data
    pub strong_name_signature_rva: u32,
    /// Size of the strong name hash data
    pub strong_name_signature_size: u32,
    /// RVA of the vtable fixup array
    pub vtable_fixups_rva: u32,
    /// Size of the vtable fixup array
    pub vtable_fixups_size: u32,
}

impl Cor20Header {
    /// Parse a header from `data`
    ///
    /// # Arguments
    /// * `data` - Bytes read from the start of the COM descriptor directory
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if `data` is too short, and a malformed error if the
    /// size field, runtime version or metadata directory are not plausible.
    pub fn read(data: &[u8]) -> Result<Cor20Header> {
        if data.len() < COR20_HEADER_SIZE {
            return Err(OutOfBounds);
        }

        let mut parser = Parser::new(data);

        let cb = parser.read_le::<u32>()?;
        if cb as usize != COR20_HEADER_SIZE {
            return Err(malformed_error!(
                "Invalid CLI header size: expected 72, got {}",
                cb
            ));
        }

        let major_runtime_version = parser.read_le::<u16>()?;
        let minor_runtime_version = parser.read_le::<u16>()?;
        if major_runtime_version == 0 || major_runtime_version > 10 {
            return Err(malformed_error!(
                "Invalid major runtime version: {}",
                major_runtime_version
            ));
        }

        let meta_data_rva = parser.read_le::<u32>()?;
        let meta_data_size = parser.read_le::<u32>()?;
        if meta_data_rva == 0 || meta_data_size == 0 {
            return Err(malformed_error!("Metadata directory is empty"));
        }

        let flags = ComImageFlags::from_bits_truncate(parser.read_le::<u32>()?);
        let entry_point_token = parser.read_le::<u32>()?;
        let resource_rva = parser.read_le::<u32>()?;
        let resource_size = parser.read_le::<u32>()?;
        let strong_name_signature_rva = parser.read_le::<u32>()?;
        let strong_name_signature_size = parser.read_le::<u32>()?;

        // Code manager table, reserved
        parser.advance_by(8)?;

        let vtable_fixups_rva = parser.read_le::<u32>()?;
        let vtable_fixups_size = parser.read_le::<u32>()?;

        Ok(Cor20Header {
            cb,
            major_runtime_version,
            minor_runtime_version,
            meta_data_rva,
            meta_data_size,
            flags,
            entry_point_token,
            resource_rva,
            resource_size,
            strong_name_signature_rva,
            strong_name_signature_size,
            vtable_fixups_rva,
            vtable_fixups_size,
        })
    }

    /// The managed entry point of this module.
    ///
    /// `None` for libraries, native entry points and entry points in another file of the
    /// assembly.
    #[must_use]
    pub fn entry_point(&self) -> Option<Token> {
        if self.flags.contains(ComImageFlags::NATIVE_ENTRYPOINT) {
            return None;
        }

        let token = Token::new(self.entry_point_token);
        if token.is_row_of(TableId::MethodDef) && token.row() != 0 {
            Some(token)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header(flags: u32, entry_point: u32) -> Vec<u8> {
        let mut data = Vec::with_capacity(COR20_HEADER_SIZE);
        data.extend_from_slice(&72u32.to_le_bytes());
        data.extend_from_slice(&2u16.to_le_bytes());
        data.extend_from_slice(&5u16.to_le_bytes());
        data.extend_from_slice(&0x2050u32.to_le_bytes());
        data.extend_from_slice(&0x0600u32.to_le_bytes());
        data.extend_from_slice(&flags.to_le_bytes());
        data.extend_from_slice(&entry_point.to_le_bytes());
        data.resize(COR20_HEADER_SIZE, 0);
        data
    }

    #[test]
    fn crafted() {
        let parsed = Cor20Header::read(&header(0x1, 0x0600_0003)).unwrap();

        assert_eq!(parsed.cb, 72);
        assert_eq!(parsed.major_runtime_version, 2);
        assert_eq!(parsed.minor_runtime_version, 5);
        assert_eq!(parsed.meta_data_rva, 0x2050);
        assert_eq!(parsed.meta_data_size, 0x0600);
        assert_eq!(parsed.flags, ComImageFlags::IL_ONLY);
        assert_eq!(parsed.entry_point(), Some(Token::new(0x0600_0003)));
        assert_eq!(parsed.vtable_fixups_rva, 0);
    }

    #[test]
    fn no_managed_entry_point() {
        let library = Cor20Header::read(&header(0x1, 0)).unwrap();
        assert_eq!(library.entry_point(), None);

        let native = Cor20Header::read(&header(0x11, 0x0000_1234)).unwrap();
        assert_eq!(native.entry_point(), None);

        let other_file = Cor20Header::read(&header(0x1, 0x2600_0001)).unwrap();
        assert_eq!(other_file.entry_point(), None);
    }

    #[test]
    fn invalid() {
        assert!(matches!(
            Cor20Header::read(&[0x48, 0, 0, 0]),
            Err(crate::Error::OutOfBounds)
        ));

        let mut bad_size = header(0x1, 0);
        bad_size[0] = 0x40;
        assert!(matches!(
            Cor20Header::read(&bad_size),
            Err(crate::Error::Malformed { .. })
        ));
    }
}
