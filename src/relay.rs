//! Wire format of the relay characteristic.
//!
//! The value is UTF-8 text, exactly `true` or `false`. There is no length prefix, no binary
//! packing and no lenient parsing: anything else is rejected.

use std::fmt;

const ON: &[u8] = b"true";
const OFF: &[u8] = b"false";

/// Encodes the relay state as the literal written to the characteristic.
pub fn encode(on: bool) -> &'static [u8] {
    if on { ON } else { OFF }
}

/// Decodes a characteristic value.
pub fn decode(value: &[u8]) -> Result<bool, DecodeError> {
    match value {
        ON => Ok(true),
        OFF => Ok(false),
        _ => Err(DecodeError(value.to_vec())),
    }
}

/// Payload read from the characteristic that is neither `true` nor `false`.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DecodeError(Vec<u8>);

impl DecodeError {
    pub fn payload(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "unexpected relay payload {:?}", String::from_utf8_lossy(&self.0))
    }
}

impl std::error::Error for DecodeError {}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn literals() {
        assert_eq!(encode(true), b"true");
        assert_eq!(encode(false), b"false");
        assert_eq!(decode(b"true"), Ok(true));
        assert_eq!(decode(b"false"), Ok(false));
    }

    #[test]
    fn rejects_everything_else() {
        let data: &[&[u8]] = &[
            b"",
            b"TRUE",
            b"True",
            b"true\n",
            b" false",
            b"1",
            b"0",
            b"on",
            &[0xff, 0xfe],
        ];
        for &inp in data {
            let err = decode(inp).unwrap_err();
            assert_eq!(err.payload(), inp);
        }
    }
}
