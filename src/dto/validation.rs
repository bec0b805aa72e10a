//! Validation helpers for request DTOs.

use validator::ValidationError;

/// Longest accepted participant identifier.
pub const MAX_USER_ID_LEN: usize = 64;

/// Participant ids are 1 to 64 visible characters without whitespace.
///
/// ```ignore
/// validate_user_id("ann")       // Ok
/// validate_user_id("")          // Err - empty
/// validate_user_id("ann smith") // Err - whitespace
/// ```
pub fn validate_user_id(id: &str) -> Result<(), ValidationError> {
    if id.is_empty() || id.chars().count() > MAX_USER_ID_LEN {
        let mut err = ValidationError::new("user_id_length");
        err.message = Some(
            format!(
                "user id must be 1 to {MAX_USER_ID_LEN} characters (got {})",
                id.chars().count()
            )
            .into(),
        );
        return Err(err);
    }

    if id.chars().any(|c| c.is_whitespace() || c.is_control()) {
        let mut err = ValidationError::new("user_id_format");
        err.message = Some("user id must not contain whitespace or control characters".into());
        return Err(err);
    }

    Ok(())
}

/// Apply [`validate_user_id`] to every guest.
pub fn validate_user_ids(ids: &[String]) -> Result<(), ValidationError> {
    ids.iter().try_for_each(|id| validate_user_id(id))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_plain_ids() {
        assert!(validate_user_id("ann").is_ok());
        assert!(validate_user_id("user-42@example.org").is_ok());
        assert!(validate_user_id(&"x".repeat(MAX_USER_ID_LEN)).is_ok());
    }

    #[test]
    fn rejects_empty_long_and_spaced_ids() {
        assert!(validate_user_id("").is_err());
        assert!(validate_user_id(&"x".repeat(MAX_USER_ID_LEN + 1)).is_err());
        assert!(validate_user_id("ann smith").is_err());
        assert!(validate_user_id("ann\n").is_err());
    }

    #[test]
    fn guest_lists_fail_on_any_bad_id() {
        assert!(validate_user_ids(&["ann".into(), "bob".into()]).is_ok());
        assert!(validate_user_ids(&["ann".into(), " ".into()]).is_err());
    }
}
