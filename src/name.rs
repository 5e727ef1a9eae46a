//! Reserved-prefix validation for snapshot names.

use crate::error::{Error, Result};

/// The reserved internal snapshot name prefix. Applications may not pass any
/// string beginning with this prefix as a `name` or as a drop directive
/// operand (the literal `all` is a separate, always-legal `drop_from`
/// operand and is not covered by this prefix).
pub const RESERVED_PREFIX: &str = "WiredTigerCheckpoint";

/// Validates snapshot names and drop-directive operands against the reserved
/// prefix.
pub struct NameValidator;

impl NameValidator {
    /// Fails with `InvalidArgument` iff `name` begins with [`RESERVED_PREFIX`].
    /// A strict prefix match, so every generational variant (including the
    /// bare prefix itself) is covered. Empty names are accepted: they mean
    /// "use the default internal name."
    pub fn validate(name: &str) -> Result<()> {
        if name.starts_with(RESERVED_PREFIX) {
            return Err(Error::invalid_argument(format!(
                "the checkpoint name \"{}\" is reserved",
                RESERVED_PREFIX
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_empty_and_ordinary_names() {
        assert!(NameValidator::validate("").is_ok());
        assert!(NameValidator::validate("nightly-backup").is_ok());
    }

    #[test]
    fn rejects_exact_prefix_and_every_suffix_length() {
        assert!(NameValidator::validate(RESERVED_PREFIX).is_err());
        assert!(NameValidator::validate(&format!("{}1", RESERVED_PREFIX)).is_err());
        assert!(NameValidator::validate(&format!("{}.42", RESERVED_PREFIX)).is_err());
        assert!(NameValidator::validate(&format!(
            "{}-{}",
            RESERVED_PREFIX,
            "x".repeat(100)
        ))
        .is_err());
    }

    #[test]
    fn does_not_reject_names_merely_containing_the_prefix() {
        assert!(NameValidator::validate(&format!("my-{}", RESERVED_PREFIX)).is_ok());
    }
}
