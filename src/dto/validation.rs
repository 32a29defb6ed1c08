//! Validation helpers for inbound event payloads.

use validator::ValidationError;

/// Longest accepted room, user, group, question or answer identifier.
pub const MAX_IDENTIFIER_LEN: usize = 128;
/// Longest accepted chat line or audience question.
pub const MAX_TEXT_LEN: usize = 2000;

/// Validates an opaque identifier (username, room, group, question or answer ID).
///
/// # Examples
///
/// ```ignore
/// validate_identifier("alice")   // Ok
/// validate_identifier("")        // Err - empty
/// validate_identifier(" alice")  // Err - surrounding whitespace
/// ```
pub fn validate_identifier(id: &str) -> Result<(), ValidationError> {
    if id.is_empty() {
        let mut err = ValidationError::new("identifier_empty");
        err.message = Some("Identifier must not be empty".into());
        return Err(err);
    }

    if id.chars().count() > MAX_IDENTIFIER_LEN {
        let mut err = ValidationError::new("identifier_length");
        err.message = Some(
            format!("Identifier must be at most {MAX_IDENTIFIER_LEN} characters").into(),
        );
        return Err(err);
    }

    if id.trim() != id || id.chars().any(char::is_control) {
        let mut err = ValidationError::new("identifier_format");
        err.message = Some(
            "Identifier must not contain control characters or surrounding whitespace".into(),
        );
        return Err(err);
    }

    Ok(())
}

/// Validates free text typed by a participant (chat lines, audience questions).
pub fn validate_text(text: &str) -> Result<(), ValidationError> {
    if text.trim().is_empty() {
        let mut err = ValidationError::new("text_blank");
        err.message = Some("Text must not be blank".into());
        return Err(err);
    }

    if text.chars().count() > MAX_TEXT_LEN {
        let mut err = ValidationError::new("text_length");
        err.message = Some(format!("Text must be at most {MAX_TEXT_LEN} characters").into());
        return Err(err);
    }

    Ok(())
}
