//! Keyboard input.
use crate::constants::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(try_from = "u8", into = "u8")
)]
#[repr(u8)]
pub enum KeyCode {
    Key0 = 0,
    Key1,
    Key2,
    Key3,
    Key4,
    Key5,
    Key6,
    Key7,
    Key8,
    Key9,
    KeyA,
    KeyB,
    KeyC,
    KeyD,
    KeyE,
    KeyF = 0xF,
}

impl KeyCode {
    pub fn as_u8(&self) -> u8 {
        *self as u8
    }
}

impl std::fmt::Display for KeyCode {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        let key_id = self.as_u8();
        write!(f, "k{key_id:x}")
    }
}

impl From<KeyCode> for u8 {
    fn from(keycode: KeyCode) -> Self {
        keycode.as_u8()
    }
}

impl TryFrom<u8> for KeyCode {
    type Error = InvalidKeyCode;

    fn try_from(key_id: u8) -> Result<Self, Self::Error> {
        match key_id {
            0 => Ok(Self::Key0),
            1 => Ok(Self::Key1),
            2 => Ok(Self::Key2),
            3 => Ok(Self::Key3),
            4 => Ok(Self::Key4),
            5 => Ok(Self::Key5),
            6 => Ok(Self::Key6),
            7 => Ok(Self::Key7),
            8 => Ok(Self::Key8),
            9 => Ok(Self::Key9),
            10 => Ok(Self::KeyA),
            11 => Ok(Self::KeyB),
            12 => Ok(Self::KeyC),
            13 => Ok(Self::KeyD),
            14 => Ok(Self::KeyE),
            15 => Ok(Self::KeyF),
            _ => Err(InvalidKeyCode),
        }
    }
}

#[derive(Debug)]
pub struct InvalidKeyCode;

impl std::error::Error for InvalidKeyCode {}

impl std::fmt::Display for InvalidKeyCode {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "keycode must be in range 0 <= keycode < 16")
    }
}

/// A key changing state, as reported by a client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct InputEvent {
    pub key: KeyCode,
    pub pressed: bool,
}

impl InputEvent {
    pub fn new(key: KeyCode, pressed: bool) -> Self {
        Self { key, pressed }
    }
}

/// Pressed state of the 16 keys. Pressed is a 1 bit, released is a 0 bit.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Keypad(u16);

impl Keypad {
    pub fn set(&mut self, key: KeyCode, pressed: bool) {
        if pressed {
            self.0 |= 1 << key.as_u8();
        } else {
            self.0 &= !(1 << key.as_u8());
        }
    }

    /// Checks whether the key with the given id is down.
    ///
    /// Only the low nibble of `key_id` is considered.
    pub fn is_pressed(&self, key_id: u8) -> bool {
        self.0 & (1 << (key_id & 0xF)) != 0
    }

    /// Check whether any key is pressed down.
    #[inline(always)]
    pub fn any(&self) -> bool {
        self.0 != 0
    }

    /// Retrieve the value of the lowest key that is pressed down.
    #[inline]
    pub fn first(&self) -> Option<u8> {
        (0..KEY_COUNT).find(|k| self.is_pressed(*k))
    }

    pub fn bits(&self) -> u16 {
        self.0
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_key_state() {
        let mut keys = Keypad::default();

        keys.set(KeyCode::Key0, true);
        assert_eq!(keys.bits(), 0b00000000_00000001);
        assert!(keys.is_pressed(0));
        assert!(!keys.is_pressed(1));
        assert!(!keys.is_pressed(7));

        keys.set(KeyCode::Key7, true);
        assert_eq!(keys.bits(), 0b00000000_10000001);
        assert!(keys.is_pressed(0));
        assert!(keys.is_pressed(7));

        keys.set(KeyCode::Key0, false);
        assert_eq!(keys.bits(), 0b00000000_10000000);
        assert!(!keys.is_pressed(0));
        assert!(keys.is_pressed(7));

        keys.set(KeyCode::KeyF, true);
        assert_eq!(keys.bits(), 0b10000000_10000000);
        assert!(keys.is_pressed(15));
        assert_eq!(keys.first(), Some(7));
    }

    #[test]
    fn test_keycode_range() {
        assert_eq!(KeyCode::try_from(0xA).unwrap(), KeyCode::KeyA);
        assert!(KeyCode::try_from(16).is_err());
        assert_eq!(KeyCode::KeyC.to_string(), "kc");
    }

    #[test]
    fn test_no_key_pressed() {
        let keys = Keypad::default();
        assert!(!keys.any());
        assert_eq!(keys.first(), None);
    }
}
