use super::provider::CredentialValidator;

/// Accepts any non-empty login/password pair.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultValidator;

impl CredentialValidator for DefaultValidator {
    fn validate(&self, login: &str, password: &str) -> bool { !login.is_empty() && !password.is_empty() }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_empty_parts() {
        let v = DefaultValidator;
        assert!(v.validate("alice", "secret"));
        assert!(!v.validate("", "secret"));
        assert!(!v.validate("alice", ""));
        assert!(!v.validate("", ""));
    }
}
