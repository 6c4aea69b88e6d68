//! Input validation for account creation

use std::collections::HashSet;

use claimgate_auth_core::Claim;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;

use crate::{CreateUserRequest, Error, Result};

static USERNAME_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-zA-Z0-9_.-]{3,32}$").expect("static username pattern"));

static CLAIM_TYPE_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-zA-Z][a-zA-Z0-9_.:/-]{0,63}$").expect("static claim pattern"));

static COMMON_PASSWORDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "password", "123456", "password123", "admin", "letmein", "welcome", "monkey",
        "dragon", "baseball", "iloveyou", "trustno1", "1234567", "sunshine", "master",
        "123456789", "welcome123", "shadow", "football", "password1", "123123",
        "12345678", "abc123", "qwerty", "111111", "qwertyuiop", "1234567890",
        "password1234", "changeme", "administrator", "passw0rd",
    ]
    .into_iter()
    .collect()
});

const MAX_CLAIMS: usize = 32;
const MAX_CLAIM_VALUE_LEN: usize = 256;

/// Password policy configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PasswordPolicy {
    pub min_length: usize,
    pub max_length: usize,
    pub require_uppercase: bool,
    pub require_lowercase: bool,
    pub require_numbers: bool,
    pub require_special: bool,
    pub min_unique_chars: usize,
    pub disallow_common_passwords: bool,
    pub disallow_username_in_password: bool,
    /// Longest allowed run of repeated or sequential characters; 0 disables the check
    pub max_consecutive_chars: usize,
}

impl Default for PasswordPolicy {
    fn default() -> Self {
        Self {
            min_length: 12,
            max_length: 128,
            require_uppercase: true,
            require_lowercase: true,
            require_numbers: true,
            require_special: false,
            min_unique_chars: 6,
            disallow_common_passwords: true,
            disallow_username_in_password: true,
            max_consecutive_chars: 3,
        }
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum PasswordError {
    #[error("Password must be at least {0} characters")]
    TooShort(usize),

    #[error("Password must not exceed {0} characters")]
    TooLong(usize),

    #[error("Password must contain an uppercase letter")]
    MissingUppercase,

    #[error("Password must contain a lowercase letter")]
    MissingLowercase,

    #[error("Password must contain a number")]
    MissingNumber,

    #[error("Password must contain a special character")]
    MissingSpecial,

    #[error("Password must have at least {0} unique characters")]
    NotEnoughUniqueChars(usize),

    #[error("Password must not contain your username")]
    ContainsUsername,

    #[error("Password has too many consecutive characters (max {0})")]
    TooManyConsecutive(usize),

    #[error("This password is too common")]
    CommonPassword,
}

/// Password validator
#[derive(Debug, Clone, Default)]
pub struct PasswordValidator {
    policy: PasswordPolicy,
}

impl PasswordValidator {
    pub fn new(policy: PasswordPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &PasswordPolicy {
        &self.policy
    }

    pub fn validate(&self, password: &str, username: &str) -> std::result::Result<(), PasswordError> {
        let length = password.chars().count();
        if length < self.policy.min_length {
            return Err(PasswordError::TooShort(self.policy.min_length));
        }
        if length > self.policy.max_length {
            return Err(PasswordError::TooLong(self.policy.max_length));
        }

        if self.policy.require_uppercase && !password.chars().any(char::is_uppercase) {
            return Err(PasswordError::MissingUppercase);
        }
        if self.policy.require_lowercase && !password.chars().any(char::is_lowercase) {
            return Err(PasswordError::MissingLowercase);
        }
        if self.policy.require_numbers && !password.chars().any(char::is_numeric) {
            return Err(PasswordError::MissingNumber);
        }
        if self.policy.require_special && password.chars().all(char::is_alphanumeric) {
            return Err(PasswordError::MissingSpecial);
        }

        let unique_chars: HashSet<char> = password.chars().collect();
        if unique_chars.len() < self.policy.min_unique_chars {
            return Err(PasswordError::NotEnoughUniqueChars(self.policy.min_unique_chars));
        }

        if self.policy.disallow_username_in_password && !username.is_empty() {
            let password_lower = password.to_lowercase();
            if password_lower.contains(&username.to_lowercase()) {
                return Err(PasswordError::ContainsUsername);
            }
        }

        if self.policy.max_consecutive_chars > 0
            && has_consecutive_chars(password, self.policy.max_consecutive_chars)
        {
            return Err(PasswordError::TooManyConsecutive(self.policy.max_consecutive_chars));
        }

        if self.policy.disallow_common_passwords
            && COMMON_PASSWORDS.contains(password.to_lowercase().as_str())
        {
            return Err(PasswordError::CommonPassword);
        }

        Ok(())
    }
}

/// Whether `password` holds a run longer than `max` of repeated (`aaaa`) or
/// ascending (`abcd`, `1234`) characters.
fn has_consecutive_chars(password: &str, max: usize) -> bool {
    let chars: Vec<char> = password.chars().collect();
    chars.windows(max + 1).any(|window| {
        let repeated = window.iter().all(|&c| c == window[0]);
        let ascending = window
            .windows(2)
            .all(|pair| pair[1] as u32 == pair[0] as u32 + 1);
        repeated || ascending
    })
}

pub fn validate_username(username: &str) -> Result<()> {
    if USERNAME_REGEX.is_match(username) {
        Ok(())
    } else {
        Err(Error::Validation(
            "Username must be 3-32 characters of letters, digits, '_', '.' or '-'".to_string(),
        ))
    }
}

pub fn validate_claims(claims: &[Claim]) -> Result<()> {
    if claims.len() > MAX_CLAIMS {
        return Err(Error::Validation(format!("At most {} claims per user", MAX_CLAIMS)));
    }
    for claim in claims {
        if !CLAIM_TYPE_REGEX.is_match(&claim.claim_type) {
            return Err(Error::Validation(format!("Invalid claim type: {:?}", claim.claim_type)));
        }
        if claim.value.is_empty() || claim.value.len() > MAX_CLAIM_VALUE_LEN {
            return Err(Error::Validation(format!(
                "Claim value for {:?} must be 1-{} bytes",
                claim.claim_type, MAX_CLAIM_VALUE_LEN
            )));
        }
    }
    Ok(())
}

/// Check a whole account creation request.
pub fn validate_create_user(request: &CreateUserRequest, passwords: &PasswordValidator) -> Result<()> {
    validate_username(&request.username)?;
    passwords.validate(&request.password, &request.username)?;
    validate_claims(&request.claims)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_password_validation() {
        let validator = PasswordValidator::default();

        assert!(validator.validate("ValidPass135", "user").is_ok());
        assert!(validator.validate("MySecurePassword2024", "user").is_ok());

        assert_eq!(validator.validate("short", "user"), Err(PasswordError::TooShort(12)));
        assert_eq!(
            validator.validate("alllowercase135", "user"),
            Err(PasswordError::MissingUppercase)
        );
        assert_eq!(
            validator.validate("ALLUPPERCASE135", "user"),
            Err(PasswordError::MissingLowercase)
        );
        assert_eq!(validator.validate("NoNumbersHere", "user"), Err(PasswordError::MissingNumber));
        assert_eq!(
            validator.validate("Alice-Rules-2024", "alice"),
            Err(PasswordError::ContainsUsername)
        );
        assert_eq!(
            validator.validate("Passw0rd1234", "user"),
            Err(PasswordError::TooManyConsecutive(3))
        );
    }

    #[test]
    fn test_relaxed_policy() {
        let validator = PasswordValidator::new(PasswordPolicy {
            min_length: 4,
            require_uppercase: false,
            require_numbers: false,
            min_unique_chars: 1,
            max_consecutive_chars: 0,
            disallow_common_passwords: false,
            ..PasswordPolicy::default()
        });
        assert!(validator.validate("aaaa", "user").is_ok());
    }

    #[test]
    fn test_consecutive_chars() {
        assert!(has_consecutive_chars("abcd135", 3));
        assert!(has_consecutive_chars("aaa135", 2));
        assert!(!has_consecutive_chars("AbCd135", 3));
        assert!(!has_consecutive_chars("ab", 3));
    }

    #[test]
    fn test_username_validation() {
        assert!(validate_username("alice").is_ok());
        assert!(validate_username("bob.smith-2").is_ok());
        assert!(validate_username("al").is_err());
        assert!(validate_username("alice smith").is_err());
        assert!(validate_username("<script>").is_err());
    }

    #[test]
    fn test_claim_validation() {
        assert!(validate_claims(&[Claim::new("role", "admin")]).is_ok());
        assert!(validate_claims(&[Claim::new("", "admin")]).is_err());
        assert!(validate_claims(&[Claim::new("role", "")]).is_err());
        assert!(validate_claims(&[Claim::new("1role", "admin")]).is_err());

        let many: Vec<Claim> = (0..=MAX_CLAIMS).map(|i| Claim::new("tag", i.to_string())).collect();
        assert!(validate_claims(&many).is_err());
    }
}
