//! Consistency levels (`[consistency]` primitive, a u16 code).

use std::fmt;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, num_enum::TryFromPrimitive, num_enum::IntoPrimitive,
)]
#[repr(u16)]
pub enum Consistency {
    Any = 0x0000,
    One = 0x0001,
    Two = 0x0002,
    Three = 0x0003,
    Quorum = 0x0004,
    All = 0x0005,
    LocalQuorum = 0x0006,
    EachQuorum = 0x0007,
    Serial = 0x0008,
    LocalSerial = 0x0009,
    LocalOne = 0x000A,
}

impl Default for Consistency {
    fn default() -> Self {
        Self::One
    }
}

impl Consistency {
    pub fn as_u16(self) -> u16 {
        self.into()
    }

    pub fn is_serial(self) -> bool {
        matches!(self, Self::Serial | Self::LocalSerial)
    }
}

impl fmt::Display for Consistency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Any => "ANY",
            Self::One => "ONE",
            Self::Two => "TWO",
            Self::Three => "THREE",
            Self::Quorum => "QUORUM",
            Self::All => "ALL",
            Self::LocalQuorum => "LOCAL_QUORUM",
            Self::EachQuorum => "EACH_QUORUM",
            Self::Serial => "SERIAL",
            Self::LocalSerial => "LOCAL_SERIAL",
            Self::LocalOne => "LOCAL_ONE",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes() {
        assert_eq!(Consistency::LocalOne.as_u16(), 0x000A);
        assert_eq!(Consistency::try_from(0x0004).unwrap(), Consistency::Quorum);
        assert!(Consistency::try_from(0x000B).is_err());
    }

    #[test]
    fn test_serial_predicate() {
        assert!(Consistency::Serial.is_serial());
        assert!(Consistency::LocalSerial.is_serial());
        assert!(!Consistency::Quorum.is_serial());
    }
}
