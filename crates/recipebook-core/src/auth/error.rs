use thiserror::Error;

/// Failure of a sign-up or login attempt.
///
/// `Display` yields the message shown to the user. Anything the identity
/// provider reports that is not recognised collapses into [`AuthError::Unknown`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("Password is Incorrect")]
    InvalidPassword,

    #[error("Account with Email Doesn't exist")]
    EmailNotFound,

    #[error("Account is Disabled")]
    UserDisabled,

    #[error("Email Id Already Exists")]
    EmailExists,

    /// Transport failures, unreadable error bodies and unrecognised codes.
    /// `detail` is for logs only.
    #[error("An unknown error occurred")]
    Unknown { detail: String },

    /// The response arrived after a logout or a newer attempt and was dropped.
    #[error("Authentication was cancelled")]
    Superseded,
}

impl AuthError {
    /// Map an identity-provider error code to its error.
    pub fn from_code(code: &str) -> Self {
        match code {
            "INVALID_PASSWORD" => AuthError::InvalidPassword,
            "EMAIL_NOT_FOUND" => AuthError::EmailNotFound,
            "USER_DISABLED" => AuthError::UserDisabled,
            "EMAIL_EXISTS" => AuthError::EmailExists,
            other => AuthError::unknown(format!("unrecognised error code: {}", other)),
        }
    }

    pub fn unknown(detail: impl Into<String>) -> Self {
        AuthError::Unknown {
            detail: detail.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_codes_map_to_user_messages() {
        assert_eq!(AuthError::from_code("INVALID_PASSWORD").to_string(), "Password is Incorrect");
        assert_eq!(
            AuthError::from_code("EMAIL_NOT_FOUND").to_string(),
            "Account with Email Doesn't exist"
        );
        assert_eq!(AuthError::from_code("USER_DISABLED").to_string(), "Account is Disabled");
        assert_eq!(AuthError::from_code("EMAIL_EXISTS").to_string(), "Email Id Already Exists");
    }

    #[test]
    fn test_unrecognised_code_falls_through_to_generic_message() {
        let err = AuthError::from_code("TOO_MANY_ATTEMPTS_TRY_LATER");
        assert!(matches!(err, AuthError::Unknown { .. }));
        assert_eq!(err.to_string(), "An unknown error occurred");
        // Code must not leak into the user-facing message
        assert!(!err.to_string().contains("TOO_MANY"));
    }
}
