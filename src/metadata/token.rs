//! Metadata tokens as reported by the target process.
//!
//! A token packs a [`TableId`] into its high byte and a 1-based row id (rid) into the low
//! 24 bits. Every breakpoint location, debug event payload and cross-reference in the live model
//! is expressed with this type.

use std::fmt;
use std::hash::{Hash, Hasher};

use crate::metadata::tableid::TableId;

/// The largest row id representable in a token.
pub const MAX_RID: u32 = 0x00FF_FFFF;

/// A metadata token: `(table, rid)` packed into a `u32`.
///
/// # Examples
///
/// ```rust
/// use livescope::metadata::{tableid::TableId, token::Token};
///
/// let token = Token::new(0x0600_0005);
/// assert_eq!(token.table_id(), Some(TableId::MethodDef));
/// assert_eq!(token.row(), 5);
/// assert_eq!(Token::from_parts(TableId::MethodDef, 5), token);
/// ```
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Token(pub u32);

impl Token {
    /// Create a new token from its raw value.
    #[must_use]
    pub const fn new(value: u32) -> Self {
        Token(value)
    }

    /// Create a token from a table and a row id. Row ids above [`MAX_RID`] are truncated.
    #[must_use]
    pub fn from_parts(table: TableId, rid: u32) -> Self {
        Token(table.token_base() | (rid & MAX_RID))
    }

    /// The raw value of this token.
    #[must_use]
    pub fn value(&self) -> u32 {
        self.0
    }

    /// The table byte of this token.
    #[must_use]
    pub fn table(&self) -> u8 {
        (self.0 >> 24) as u8
    }

    /// The table of this token, if the table byte names a known table.
    #[must_use]
    pub fn table_id(&self) -> Option<TableId> {
        TableId::from_token_byte(self.table())
    }

    /// The row id of this token.
    #[must_use]
    pub fn row(&self) -> u32 {
        self.0 & MAX_RID
    }

    /// `true` for the all-zero token.
    #[must_use]
    pub fn is_null(&self) -> bool {
        self.0 == 0
    }

    /// `true` if the token points at a row (non-zero rid) of `table`.
    #[must_use]
    pub fn is_row_of(&self, table: TableId) -> bool {
        self.table() == table as u8 && self.row() != 0
    }
}

impl From<u32> for Token {
    fn from(value: u32) -> Self {
        Token(value)
    }
}

impl From<Token> for u32 {
    fn from(token: Token) -> Self {
        token.0
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Token(0x{:08x}, table: 0x{:02x}, row: {})",
            self.0,
            self.table(),
            self.row()
        )
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:08x}", self.0)
    }
}

impl Hash for Token {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.hash(state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_table_and_row() {
        let token = Token(0x0600_0001);
        assert_eq!(token.table(), 0x06);
        assert_eq!(token.row(), 1);
        assert_eq!(token.table_id(), Some(TableId::MethodDef));

        let token = Token(0x06FF_FFFF);
        assert_eq!(token.row(), MAX_RID);
    }

    #[test]
    fn test_token_from_parts() {
        assert_eq!(Token::from_parts(TableId::TypeDef, 3).value(), 0x0200_0003);
        assert_eq!(Token::from_parts(TableId::TypeSpec, 0x0100_0001).value(), 0x1B00_0001);
    }

    #[test]
    fn test_token_is_row_of() {
        assert!(Token(0x0400_0002).is_row_of(TableId::Field));
        assert!(!Token(0x0400_0000).is_row_of(TableId::Field));
        assert!(!Token(0x0600_0002).is_row_of(TableId::Field));
    }

    #[test]
    fn test_token_unknown_table() {
        assert_eq!(Token(0x7000_0001).table_id(), None);
        assert!(Token(0).is_null());
    }

    #[test]
    fn test_token_display_debug() {
        let token = Token(0x0600_0001);
        assert_eq!(format!("{token}"), "0x06000001");
        let debug_str = format!("{token:?}");
        assert!(debug_str.contains("table: 0x06"));
        assert!(debug_str.contains("row: 1"));
    }
}
