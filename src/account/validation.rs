//! Input validation for account and transaction requests
//!
//! Validated newtypes keep their fields private so the only way to obtain one
//! is through the checking constructor. Everything here runs before the
//! ledger rule engine sees a request.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// Validation Errors
// ============================================================================

/// Request-shape errors (never business-rule failures)
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ValidationError {
    #[error("Currency must be three uppercase letters: got '{0}'")]
    InvalidCurrency(String),

    #[error("Invalid length for {field}: expected {min}-{max}, got {actual}")]
    InvalidLength {
        field: &'static str,
        min: usize,
        max: usize,
        actual: usize,
    },

    #[error("Invalid format for {field}: '{value}' (expected: {expected})")]
    InvalidFormat {
        field: &'static str,
        value: String,
        expected: &'static str,
    },

    #[error("Amount must be greater than zero")]
    NonPositiveAmount,

    #[error("Amount has {0} decimal places, at most 2 allowed")]
    AmountPrecision(u32),

    #[error("Metadata must be a JSON object")]
    MetadataNotObject,

    #[error("At least one field must be provided")]
    EmptyUpdate,
}

// ============================================================================
// CurrencyCode
// ============================================================================

/// Validated currency code (`XOF`, `EUR`, ...)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CurrencyCode(String);

impl CurrencyCode {
    /// # Validation Rules
    /// - Exactly 3 ASCII letters
    /// - Uppercase (lowercase input is rejected, not normalized)
    ///
    /// ```
    /// use ledger_vault::account::validation::CurrencyCode;
    ///
    /// assert_eq!(CurrencyCode::new("XOF").unwrap().as_str(), "XOF");
    /// assert!(CurrencyCode::new("xof").is_err());
    /// ```
    pub fn new(code: &str) -> Result<Self, ValidationError> {
        let code = code.trim();
        if code.len() == 3 && code.chars().all(|c| c.is_ascii_uppercase()) {
            Ok(Self(code.to_string()))
        } else {
            Err(ValidationError::InvalidCurrency(code.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CurrencyCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for CurrencyCode {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(&value)
    }
}

impl From<CurrencyCode> for String {
    fn from(code: CurrencyCode) -> Self {
        code.0
    }
}

// ============================================================================
// Free-form fields
// ============================================================================

/// Validate a holder name: trimmed, 2-120 characters
pub fn validate_holder_name(name: &str) -> Result<String, ValidationError> {
    let name = name.trim();
    let len = name.chars().count();
    if !(2..=120).contains(&len) {
        return Err(ValidationError::InvalidLength {
            field: "holder_name",
            min: 2,
            max: 120,
            actual: len,
        });
    }
    Ok(name.to_string())
}

/// Validate a client-supplied transaction reference
///
/// References are 4-64 characters of `A-Z a-z 0-9 - _`.
pub fn validate_reference(reference: &str) -> Result<String, ValidationError> {
    let len = reference.len();
    if !(4..=64).contains(&len) {
        return Err(ValidationError::InvalidLength {
            field: "reference",
            min: 4,
            max: 64,
            actual: len,
        });
    }
    if !reference
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(ValidationError::InvalidFormat {
            field: "reference",
            value: reference.to_string(),
            expected: "[A-Za-z0-9_-]{4,64}",
        });
    }
    Ok(reference.to_string())
}

/// Validate an optional description (at most 255 characters)
pub fn validate_description(description: Option<&str>) -> Result<Option<String>, ValidationError> {
    match description.map(str::trim) {
        None | Some("") => Ok(None),
        Some(d) => {
            let len = d.chars().count();
            if len > 255 {
                return Err(ValidationError::InvalidLength {
                    field: "description",
                    min: 0,
                    max: 255,
                    actual: len,
                });
            }
            Ok(Some(d.to_string()))
        }
    }
}

/// Validate a client email: one `@`, a dotted domain, no whitespace
pub fn validate_email(email: &str) -> Result<String, ValidationError> {
    let email = email.trim();
    if email.len() > 255 {
        return Err(ValidationError::InvalidLength {
            field: "email",
            min: 3,
            max: 255,
            actual: email.len(),
        });
    }
    let well_formed = match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.contains('@')
                && domain.split('.').count() >= 2
                && domain.split('.').all(|part| !part.is_empty())
                && !email.chars().any(char::is_whitespace)
        }
        None => false,
    };
    if !well_formed {
        return Err(ValidationError::InvalidFormat {
            field: "email",
            value: email.to_string(),
            expected: "local@domain.tld",
        });
    }
    Ok(email.to_string())
}

/// Validate a client phone number
///
/// An optional leading `+` then 7-15 digits; spaces are dropped.
pub fn validate_phone(phone: &str) -> Result<String, ValidationError> {
    let compact: String = phone.chars().filter(|c| !c.is_whitespace()).collect();
    let digits = compact.strip_prefix('+').unwrap_or(&compact);
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
        return Err(ValidationError::InvalidFormat {
            field: "phone",
            value: phone.to_string(),
            expected: "+?[0-9]{7,15}",
        });
    }
    if !(7..=15).contains(&digits.len()) {
        return Err(ValidationError::InvalidLength {
            field: "phone",
            min: 7,
            max: 15,
            actual: digits.len(),
        });
    }
    Ok(compact)
}

/// Validate a money amount: strictly positive, at most 2 decimal places
pub fn validate_amount(amount: Decimal) -> Result<Decimal, ValidationError> {
    if amount <= Decimal::ZERO {
        return Err(ValidationError::NonPositiveAmount);
    }
    let normalized = amount.normalize();
    if normalized.scale() > 2 {
        return Err(ValidationError::AmountPrecision(normalized.scale()));
    }
    Ok(normalized)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_currency_code() {
        assert!(CurrencyCode::new("XOF").is_ok());
        assert!(CurrencyCode::new(" EUR ").is_ok());
        assert_eq!(
            CurrencyCode::new("eur"),
            Err(ValidationError::InvalidCurrency("eur".to_string()))
        );
        assert!(CurrencyCode::new("EURO").is_err());
        assert!(CurrencyCode::new("E1R").is_err());
    }

    #[test]
    fn test_currency_serde_rejects_invalid() {
        let ok: CurrencyCode = serde_json::from_str("\"XOF\"").unwrap();
        assert_eq!(ok.as_str(), "XOF");
        assert!(serde_json::from_str::<CurrencyCode>("\"xof\"").is_err());
    }

    #[test]
    fn test_holder_name() {
        assert_eq!(validate_holder_name("  Awa Diop ").unwrap(), "Awa Diop");
        assert!(matches!(
            validate_holder_name("A"),
            Err(ValidationError::InvalidLength { actual: 1, .. })
        ));
    }

    #[test]
    fn test_email() {
        assert_eq!(
            validate_email(" awa.diop@example.sn ").unwrap(),
            "awa.diop@example.sn"
        );
        assert!(validate_email("awa.diop").is_err());
        assert!(validate_email("@example.sn").is_err());
        assert!(validate_email("awa@localhost").is_err());
        assert!(validate_email("awa@@example.sn").is_err());
        assert!(validate_email("awa diop@example.sn").is_err());
    }

    #[test]
    fn test_phone() {
        assert_eq!(validate_phone("+221 77 123 45 67").unwrap(), "+221771234567");
        assert!(matches!(
            validate_phone("12345"),
            Err(ValidationError::InvalidLength { actual: 5, .. })
        ));
        assert!(matches!(
            validate_phone("77-123-45-67"),
            Err(ValidationError::InvalidFormat { .. })
        ));
    }

    #[test]
    fn test_reference() {
        assert!(validate_reference("INV-2025_001").is_ok());
        assert!(validate_reference("abc").is_err());
        assert!(matches!(
            validate_reference("bad ref!"),
            Err(ValidationError::InvalidFormat { .. })
        ));
    }

    #[test]
    fn test_description() {
        assert_eq!(validate_description(None).unwrap(), None);
        assert_eq!(validate_description(Some("   ")).unwrap(), None);
        assert_eq!(
            validate_description(Some(" rent ")).unwrap(),
            Some("rent".to_string())
        );
        assert!(validate_description(Some(&"x".repeat(256))).is_err());
    }

    #[test]
    fn test_amount() {
        assert_eq!(
            validate_amount(Decimal::ZERO),
            Err(ValidationError::NonPositiveAmount)
        );
        assert_eq!(
            validate_amount(Decimal::from(-5)),
            Err(ValidationError::NonPositiveAmount)
        );
        assert_eq!(
            validate_amount(Decimal::from_str("10.125").unwrap()),
            Err(ValidationError::AmountPrecision(3))
        );
        assert_eq!(
            validate_amount(Decimal::from_str("10.500").unwrap()).unwrap(),
            Decimal::from_str("10.5").unwrap()
        );
    }
}
