//! Protocol action codes.

/// Known packet actions. Codes 0x03-0x3F are reserved for future
/// actions; the flags field can carry them but dispatch rejects them.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum Action {
    Get = 0x00,
    Set = 0x01,
    Task = 0x02,
}

impl Action {
    pub fn from_u8(raw: u8) -> Option<Self> {
        match raw {
            0x00 => Some(Action::Get),
            0x01 => Some(Action::Set),
            0x02 => Some(Action::Task),
            _ => None,
        }
    }

    #[inline]
    pub fn to_u8(self) -> u8 {
        self as u8
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_codes() {
        assert_eq!(Action::from_u8(0x00), Some(Action::Get));
        assert_eq!(Action::from_u8(0x01), Some(Action::Set));
        assert_eq!(Action::from_u8(0x02), Some(Action::Task));
        assert_eq!(Action::from_u8(0x03), None);
        assert_eq!(Action::from_u8(0x3F), None);
    }
}
