use static_assertions::assert_impl_all;
use std::fmt;
use std::str::FromStr;

/// 128-bit Bluetooth UUID identifying a GATT service or characteristic.
#[derive(Clone, Copy, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct Uuid([u8; 16]);

impl Uuid {
    /// Constructs instance from its big-endian integer form, e.g.
    /// `Uuid::from_u128(0x4fafc201_1fb5_459e_8fcc_c5c9c331914b)`.
    pub const fn from_u128(v: u128) -> Self {
        Self(v.to_be_bytes())
    }

    /// Constructs instance from the specified bytes.
    pub const fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }

    /// Returns inner bytes array.
    pub fn bytes(&self) -> [u8; 16] {
        self.0
    }

    pub fn as_u128(&self) -> u128 {
        u128::from_be_bytes(self.0)
    }
}

assert_impl_all!(Uuid: Send, Sync);

impl fmt::Display for Uuid {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let b = &self.0;
        for (i, byte) in b.iter().enumerate() {
            if i == 4 || i == 6 || i == 8 || i == 10 {
                f.write_str("-")?;
            }
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}

impl fmt::Debug for Uuid {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Uuid({})", self)
    }
}

impl From<[u8; 16]> for Uuid {
    fn from(v: [u8; 16]) -> Self {
        Self::from_bytes(v)
    }
}

impl FromStr for Uuid {
    type Err = UuidParseError;

    /// Parses the canonical hyphenated form (`8-4-4-4-12` hex digits, any case).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        const GROUPS: [usize; 5] = [8, 4, 4, 4, 12];

        let mut groups = s.split('-');
        let mut hex = String::with_capacity(32);
        for &len in &GROUPS {
            let group = groups.next().ok_or(UuidParseError(()))?;
            if group.len() != len || !group.bytes().all(|c| c.is_ascii_hexdigit()) {
                return Err(UuidParseError(()));
            }
            hex.push_str(group);
        }
        if groups.next().is_some() {
            return Err(UuidParseError(()));
        }
        u128::from_str_radix(&hex, 16)
            .map(Self::from_u128)
            .map_err(|_| UuidParseError(()))
    }
}

#[derive(Debug)]
pub struct UuidParseError(());

impl fmt::Display for UuidParseError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "invalid UUID string")
    }
}

impl std::error::Error for UuidParseError {}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{RELAY_CHARACTERISTIC_UUID, SERVICE_UUID};

    #[test]
    fn parse_ok() {
        let data = &[
            ("00000000-0000-0000-0000-000000000000", Uuid::from_u128(0)),
            ("12345678-9AbC-Def0-1234-56789aBCDEF0",
                Uuid::from_u128(0x12345678_9abc_def0_1234_56789abcdef0)),
            ("4fafc201-1fb5-459e-8fcc-c5c9c331914b", SERVICE_UUID),
            ("beb5483e-36e1-4688-b7f5-ea07361b26a8", RELAY_CHARACTERISTIC_UUID),
        ];
        for &(inp, exp) in data {
            let act = inp.parse::<Uuid>().unwrap();
            assert_eq!(act, exp);
            assert_eq!(inp.to_ascii_lowercase(), act.to_string());
        }
    }

    #[test]
    fn parse_fail() {
        let data = &[
            "",
            "0",
            "00000000_0000-0000-0000-000000000000",
            "00000000-0000-0000-0000-0000000000000",
            "00000000-0000-0000-0000-000000000000-",
            "0000000-00000-0000-0000-000000000000",
            "00000000-0000-00z0-0000-000000000000",
            "+0000000-0000-0000-0000-000000000000",
        ];
        for &inp in data {
            assert!(inp.parse::<Uuid>().is_err(), "{:?}", inp);
        }
    }

    #[test]
    fn bytes_are_big_endian() {
        let u = Uuid::from_u128(0x0102_0304_0506_0708_090a_0b0c_0d0e_0f10);
        assert_eq!(u.bytes()[0], 0x01);
        assert_eq!(u.bytes()[15], 0x10);
        assert_eq!(u.as_u128(), 0x0102_0304_0506_0708_090a_0b0c_0d0e_0f10);
    }
}
