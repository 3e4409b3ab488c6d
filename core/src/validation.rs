//! Local input checks, run before any request is rendered.

use std::fmt;
use std::ops::RangeInclusive;
use std::str::FromStr;

use chrono::NaiveDate;
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};

use crate::error::ValidationError;

pub const MIN_PASSWORD_LEN: usize = 6;
pub const MAX_BIOGRAPHY_LEN: usize = 150;

/// Passwords the service refuses outright.
const BLACKLISTED_PASSWORDS: &[&str] = &[
    "000000", "111111", "112233", "121212", "123123", "123321", "123456", "1234567", "12345678",
    "123456789", "1234567890", "654321", "666666", "696969", "777777", "987654321", "abc123",
    "abcdef", "asdfgh", "baseball", "dragon", "football", "iloveyou", "letmein", "master",
    "monkey", "password", "password1", "password12", "password123", "qwerty", "qwerty123",
    "qwertyuiop", "shadow", "sunshine", "superman", "trustno1", "welcome",
];

pub fn check_password(password: &str) -> Result<(), ValidationError> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(ValidationError::PasswordTooShort { min: MIN_PASSWORD_LEN });
    }
    if BLACKLISTED_PASSWORDS.contains(&password.to_lowercase().as_str()) {
        return Err(ValidationError::PasswordBlacklisted);
    }
    Ok(())
}

pub fn check_biography(text: &str) -> Result<(), ValidationError> {
    let actual = text.chars().count();
    if actual > MAX_BIOGRAPHY_LEN {
        return Err(ValidationError::BiographyTooLong {
            max: MAX_BIOGRAPHY_LEN,
            actual,
        });
    }
    Ok(())
}

/// Shape check only: one `@`, a non-empty local part, a dotted domain.
pub fn check_email(email: &str) -> Result<(), ValidationError> {
    let invalid = || ValidationError::InvalidEmail(email.to_string());
    let (local, domain) = email.split_once('@').ok_or_else(invalid)?;
    let labels_ok = domain.split('.').count() >= 2 && domain.split('.').all(|l| !l.is_empty());
    if local.is_empty() || domain.contains('@') || !labels_ok || email.chars().any(char::is_whitespace) {
        return Err(invalid());
    }
    Ok(())
}

pub fn check_query(query: &str) -> Result<(), ValidationError> {
    if query.trim().is_empty() {
        return Err(ValidationError::EmptyQuery);
    }
    Ok(())
}

pub fn check_not_empty(field: &'static str, value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::EmptyField(field));
    }
    Ok(())
}

// Everything but RFC 3986 unreserved characters.
const SEGMENT_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// Percent-encode a caller value for use as one endpoint path segment.
///
/// `/`, `?` and `#` are encoded so the value cannot leave its segment, and
/// the dot segments `.` and `..` are refused outright.
pub fn path_segment(field: &'static str, value: &str) -> Result<String, ValidationError> {
    check_not_empty(field, value)?;
    if value == "." || value == ".." {
        return Err(ValidationError::InvalidChoice { field, value: value.to_string() });
    }
    Ok(utf8_percent_encode(value, SEGMENT_ENCODE_SET).to_string())
}

/// Profile gender, as accepted by `accounts/set_gender/`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Gender {
    Male,
    Female,
    Unspecified,
    Custom(String),
}

impl Gender {
    /// Numeric code the service expects.
    pub fn code(&self) -> u8 {
        match self {
            Gender::Male => 1,
            Gender::Female => 2,
            Gender::Unspecified => 3,
            Gender::Custom(_) => 4,
        }
    }

    pub fn custom_text(&self) -> Option<&str> {
        match self {
            Gender::Custom(text) => Some(text),
            _ => None,
        }
    }
}

impl FromStr for Gender {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "male" => Ok(Gender::Male),
            "female" => Ok(Gender::Female),
            "unspecified" => Ok(Gender::Unspecified),
            _ => match s.strip_prefix("custom:") {
                Some(text) if !text.trim().is_empty() => Ok(Gender::Custom(text.to_string())),
                _ => Err(ValidationError::InvalidChoice {
                    field: "gender",
                    value: s.to_string(),
                }),
            },
        }
    }
}

impl fmt::Display for Gender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Gender::Male => f.write_str("male"),
            Gender::Female => f.write_str("female"),
            Gender::Unspecified => f.write_str("unspecified"),
            Gender::Custom(text) => write!(f, "custom:{text}"),
        }
    }
}

/// Which kind of content a mute applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Post,
    Story,
    All,
}

impl FromStr for MediaKind {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "post" => Ok(MediaKind::Post),
            "story" => Ok(MediaKind::Story),
            "all" => Ok(MediaKind::All),
            other => Err(ValidationError::InvalidChoice {
                field: "media kind",
                value: other.to_string(),
            }),
        }
    }
}

/// Date of birth submitted during registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Birthday(NaiveDate);

impl Birthday {
    pub const YEARS: RangeInclusive<i32> = 1900..=2100;

    pub fn new(day: u8, month: u8, year: u16) -> Result<Self, ValidationError> {
        let year = i32::from(year);
        NaiveDate::from_ymd_opt(year, u32::from(month), u32::from(day))
            .filter(|_| Self::YEARS.contains(&year))
            .map(Self)
            .ok_or_else(|| ValidationError::InvalidChoice {
                field: "birthday",
                value: format!("{day:02}-{month:02}-{year}"),
            })
    }

    pub fn date(&self) -> NaiveDate {
        self.0
    }
}

impl fmt::Display for Birthday {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format("%d-%m-%Y"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_and_common_passwords_are_rejected() {
        assert_eq!(
            check_password("abc12"),
            Err(ValidationError::PasswordTooShort { min: 6 })
        );
        assert_eq!(check_password("password1"), Err(ValidationError::PasswordBlacklisted));
        assert_eq!(check_password("QWERTY"), Err(ValidationError::PasswordBlacklisted));
        assert!(check_password("correct horse battery").is_ok());
    }

    #[test]
    fn biography_counts_characters_not_bytes() {
        assert!(check_biography(&"é".repeat(150)).is_ok());
        assert_eq!(
            check_biography(&"a".repeat(151)),
            Err(ValidationError::BiographyTooLong { max: 150, actual: 151 })
        );
    }

    #[test]
    fn email_shape() {
        assert!(check_email("someone@example.com").is_ok());
        for bad in ["", "no-at-sign", "@example.com", "a@b", "a@b..c", "a b@example.com", "a@b@c.com"] {
            assert!(check_email(bad).is_err(), "{bad:?} should be rejected");
        }
    }

    #[test]
    fn gender_choices() {
        assert_eq!("male".parse::<Gender>(), Ok(Gender::Male));
        assert_eq!("custom:they".parse::<Gender>(), Ok(Gender::Custom("they".into())));
        assert_eq!(Gender::Custom("they".into()).to_string(), "custom:they");
        assert!(matches!(
            "robot".parse::<Gender>(),
            Err(ValidationError::InvalidChoice { field: "gender", .. })
        ));
        assert!("custom:".parse::<Gender>().is_err());
    }

    #[test]
    fn birthday_rejects_impossible_dates() {
        assert_eq!(Birthday::new(29, 2, 2000).unwrap().to_string(), "29-02-2000");
        assert!(Birthday::new(29, 2, 1999).is_err());
        assert!(Birthday::new(31, 4, 1999).is_err());
        assert!(Birthday::new(1, 13, 1999).is_err());
        assert!(Birthday::new(0, 1, 1999).is_err());
    }

    #[test]
    fn birthday_years_are_bounded() {
        assert!(Birthday::new(31, 12, 1899).is_err());
        assert!(Birthday::new(1, 1, 2101).is_err());
        let first = Birthday::new(1, 1, 1900).unwrap();
        assert_eq!(first.date(), NaiveDate::from_ymd_opt(1900, 1, 1).unwrap());
        assert_eq!(Birthday::new(5, 3, 2100).unwrap().to_string(), "05-03-2100");
    }

    #[test]
    fn path_segments_stay_in_place() {
        assert_eq!(path_segment("user id", "12345").unwrap(), "12345");
        assert_eq!(path_segment("username", "first.last_1").unwrap(), "first.last_1");
        assert_eq!(path_segment("username", "evil?x=1#").unwrap(), "evil%3Fx%3D1%23");
        assert_eq!(
            path_segment("user id", "../../accounts").unwrap(),
            "..%2F..%2Faccounts"
        );
        assert_eq!(path_segment("user id", " "), Err(ValidationError::EmptyField("user id")));
        assert!(matches!(
            path_segment("user id", ".."),
            Err(ValidationError::InvalidChoice { field: "user id", .. })
        ));
        assert!(path_segment("user id", ".").is_err());
    }

    #[test]
    fn blank_query_is_rejected() {
        assert_eq!(check_query("  "), Err(ValidationError::EmptyQuery));
        assert!(check_query("rust").is_ok());
    }
}
