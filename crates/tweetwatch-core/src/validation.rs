//! Subscription input validation.

use crate::error::ValidationError;
use crate::types::Handle;

/// Longest handle the remote service issues.
pub const MAX_HANDLE_LEN: usize = 15;

/// Check a handle is acceptable for a new subscription.
///
/// [`Handle::new`] already restricts the character set; subscriptions also
/// enforce the service's length limit.
pub fn validate_subscription_handle(handle: &Handle) -> Result<(), ValidationError> {
    if handle.len() > MAX_HANDLE_LEN {
        return Err(ValidationError::HandleLength {
            handle: handle.to_string(),
            max: MAX_HANDLE_LEN,
        });
    }
    Ok(())
}

/// Check a question is usable as a matching criterion.
pub fn validate_question(question: &str) -> Result<(), ValidationError> {
    if question.trim().is_empty() {
        return Err(ValidationError::EmptyQuestion);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handle_length_limit() {
        let ok = Handle::new("fifteen_chars__").unwrap();
        assert!(validate_subscription_handle(&ok).is_ok());

        let long = Handle::new("carlos_long_name").unwrap();
        assert!(matches!(
            validate_subscription_handle(&long),
            Err(ValidationError::HandleLength { max: 15, .. })
        ));
    }

    #[test]
    fn test_question_must_have_content() {
        assert!(validate_question("Is this about Rust?").is_ok());
        assert_eq!(validate_question("   "), Err(ValidationError::EmptyQuestion));
    }
}
