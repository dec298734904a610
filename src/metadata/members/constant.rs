use crate::{
    metadata::{import::ConstantRaw, signatures::ELEMENT_TYPE},
    utils::{read_le, Parser},
    Result,
};

/// A decoded default value of a field, parameter or property.
#[derive(Debug, Clone, PartialEq)]
#[allow(missing_docs)]
pub enum ConstantValue {
    Boolean(bool),
    Char(u16),
    I1(i8),
    U1(u8),
    I2(i16),
    U2(u16),
    I4(i32),
    U4(u32),
    I8(i64),
    U8(u64),
    R4(f32),
    R8(f64),
    /// A string constant, stored as UTF-16 in the target
    String(String),
    /// A null object reference (`ELEMENT_TYPE_CLASS` with a zero value)
    Null,
}

impl ConstantValue {
    /// Decode a constant as read from the target
    ///
    /// # Errors
    /// Returns an error if the value is shorter than its element type requires, or if the
    /// element type is not valid for a constant.
    pub fn decode(raw: &ConstantRaw) -> Result<ConstantValue> {
        let data = raw.value.as_slice();
        Ok(match raw.element_type {
            ELEMENT_TYPE::BOOLEAN => ConstantValue::Boolean(read_le::<u8>(data)? != 0),
            ELEMENT_TYPE::CHAR => ConstantValue::Char(read_le::<u16>(data)?),
            ELEMENT_TYPE::I1 => ConstantValue::I1(read_le::<i8>(data)?),
            ELEMENT_TYPE::U1 => ConstantValue::U1(read_le::<u8>(data)?),
            ELEMENT_TYPE::I2 => ConstantValue::I2(read_le::<i16>(data)?),
            ELEMENT_TYPE::U2 => ConstantValue::U2(read_le::<u16>(data)?),
            ELEMENT_TYPE::I4 => ConstantValue::I4(read_le::<i32>(data)?),
            ELEMENT_TYPE::U4 => ConstantValue::U4(read_le::<u32>(data)?),
            ELEMENT_TYPE::I8 => ConstantValue::I8(read_le::<i64>(data)?),
            ELEMENT_TYPE::U8 => ConstantValue::U8(read_le::<u64>(data)?),
            ELEMENT_TYPE::R4 => ConstantValue::R4(read_le::<f32>(data)?),
            ELEMENT_TYPE::R8 => ConstantValue::R8(read_le::<f64>(data)?),
            ELEMENT_TYPE::STRING => {
                let mut parser = Parser::new(data);
                ConstantValue::String(parser.read_string_utf16(data.len() / 2)?)
            }
            ELEMENT_TYPE::CLASS => ConstantValue::Null,
            other => return Err(malformed_error!("Invalid constant element type - {}", other)),
        })
    }
}
