//! Shared-password gate

use subtle::ConstantTimeEq;

/// Checks the shared password, if the page requires one
#[derive(Clone)]
pub struct PasswordGate {
    required: bool,
    password: Option<String>,
}

impl PasswordGate {
    pub fn new(required: bool, password: Option<String>) -> Self {
        Self { required, password }
    }

    pub fn required(&self) -> bool {
        self.required
    }

    /// Constant-time comparison against the configured password
    pub fn check(&self, candidate: &str) -> bool {
        if !self.required {
            return true;
        }
        match &self.password {
            Some(password) if !password.is_empty() => {
                password.as_bytes().ct_eq(candidate.as_bytes()).into()
            }
            _ => false,
        }
    }
}

impl std::fmt::Debug for PasswordGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PasswordGate")
            .field("required", &self.required)
            .finish_non_exhaustive()
    }
}
