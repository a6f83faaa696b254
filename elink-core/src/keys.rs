use serde::{Deserialize, Serialize};

/// Virtual key codes understood by the tracker host's setup UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HostKey {
    Space,
    Enter,
    Escape,
    Delete,
    Backspace,
    C,
    V,
    D,
    B,
    L,
    R,
}

impl HostKey {
    pub fn code(&self) -> u16 {
        match self {
            HostKey::Space => b' ' as u16,
            HostKey::Enter => 0x000D,
            HostKey::Escape => 0x001B,
            HostKey::Delete => 0x5300,
            HostKey::Backspace => 0x0008,
            HostKey::C => b'c' as u16,
            HostKey::V => b'v' as u16,
            HostKey::D => b'd' as u16,
            HostKey::B => b'b' as u16,
            HostKey::L => b'l' as u16,
            HostKey::R => b'r' as u16,
        }
    }

    pub fn from_code(code: u16) -> Option<Self> {
        use HostKey::*;
        [Space, Enter, Escape, Delete, Backspace, C, V, D, B, L, R]
            .into_iter()
            .find(|k| k.code() == code)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum KeyAction {
    Press,
    Release,
}

/// Discrete key presses coming from the operator's keyboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OperatorKey {
    C,
    V,
    D,
    Q,
    Enter,
    Escape,
    Space,
    Backspace,
    Delete,
    Other,
}

impl OperatorKey {
    pub fn is_abort(&self) -> bool {
        matches!(self, OperatorKey::Q | OperatorKey::Escape)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_fixed() {
        assert_eq!(HostKey::Delete.code(), 0x5300);
        assert_eq!(HostKey::Space.code(), 0x20);
        assert_eq!(HostKey::Backspace.code(), 0x08);
        assert_eq!(HostKey::C.code(), 0x63);
        assert_eq!(HostKey::from_code(0x1B), Some(HostKey::Escape));
        assert_eq!(HostKey::from_code(0x7A), None);
    }
}
