use crate::error::NameTooLong;
use std::fmt;

/// Longest stem the host's file system accepts.
pub const MAX_STEM_LEN: usize = 8;

const EXTENSION: &str = ".edf";

/// Validated name of a recording file on the host.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EdfFileName(String);

impl EdfFileName {
    /// `<prefix>_<name>.edf`, or `<name>.edf` without a prefix. The `.edf`
    /// suffix is only appended when missing.
    pub fn compose(prefix: &str, name: &str) -> Result<Self, NameTooLong> {
        let mut full = if prefix.is_empty() {
            name.to_string()
        } else {
            format!("{prefix}_{name}")
        };
        if !full.ends_with(EXTENSION) {
            full.push_str(EXTENSION);
        }

        let stem_len = full.split('.').next().map_or(0, |s| s.chars().count());
        if stem_len > MAX_STEM_LEN {
            return Err(NameTooLong {
                name: full,
                stem_len,
                max: MAX_STEM_LEN,
            });
        }
        Ok(Self(full))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn stem(&self) -> &str {
        self.0.split('.').next().unwrap_or_default()
    }
}

impl fmt::Display for EdfFileName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for EdfFileName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefix_is_joined_with_underscore() {
        let name = EdfFileName::compose("T1", "ab").unwrap();
        assert_eq!(name.as_str(), "T1_ab.edf");
        assert_eq!(name.stem(), "T1_ab");
    }

    #[test]
    fn extension_is_not_doubled() {
        assert_eq!(EdfFileName::compose("", "run.edf").unwrap().as_str(), "run.edf");
        assert_eq!(EdfFileName::compose("", "run").unwrap().as_str(), "run.edf");
    }

    #[test]
    fn eight_character_stem_is_the_limit() {
        assert!(EdfFileName::compose("", "abcdefgh").is_ok());
        assert!(EdfFileName::compose("TEST", "psp").is_ok());

        let err = EdfFileName::compose("TEST", "psp12").unwrap_err();
        assert_eq!(err.stem_len, 9);
        assert_eq!(err.name, "TEST_psp12.edf");
    }

    #[test]
    fn long_name_fails_with_any_prefix() {
        for prefix in ["", "a", "P01", "experiment"] {
            assert!(EdfFileName::compose(prefix, "averylongname12345").is_err());
        }
    }
}
