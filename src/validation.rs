//! Rule-based request validation, input sanitization and CSRF tokens.
//!
//! Rules are a closed set of typed variants rather than a stringly-typed
//! DSL; a field may accumulate several error messages since every rule is
//! evaluated independently. `Unique`/`Exists` delegate row lookups to an
//! [`ExistsProbe`] collaborator, which is the only reason validation is async.

use std::collections::BTreeMap;
use std::sync::OnceLock;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use rand::Rng;
use regex::Regex;
use serde::Serialize;
use tower_sessions::Session;

/// Row-existence checks backing the `Unique` and `Exists` rules.
#[async_trait]
pub trait ExistsProbe: Send + Sync {
    async fn exists(
        &self,
        table: &str,
        column: &str,
        value: &str,
        ignore_id: Option<i32>,
    ) -> Result<bool>;
}

#[derive(Debug, Clone)]
pub enum Rule {
    Required,
    Min(usize),
    Max(usize),
    Email,
    Numeric,
    Integer,
    Url,
    Alpha,
    AlphaNum,
    AlphaDash,
    Regex(Regex),
    Date,
    DateFormat(&'static str),
    In(Vec<&'static str>),
    NotIn(Vec<&'static str>),
    /// Value must equal the sibling `<field>_confirmation` value
    Confirmed,
    Unique {
        table: &'static str,
        column: &'static str,
        ignore_id: Option<i32>,
    },
    Exists {
        table: &'static str,
        column: &'static str,
    },
}

pub type FieldErrors = BTreeMap<String, Vec<String>>;

#[derive(Debug, Clone, Default, Serialize)]
pub struct ValidationResult {
    pub valid: bool,
    pub errors: FieldErrors,
}

impl ValidationResult {
    fn add_error(&mut self, field: &str, message: String) {
        self.errors.entry(field.to_string()).or_default().push(message);
        self.valid = false;
    }
}

pub struct Validator<'a> {
    probe: &'a dyn ExistsProbe,
}

impl<'a> Validator<'a> {
    #[must_use]
    pub const fn new(probe: &'a dyn ExistsProbe) -> Self {
        Self { probe }
    }

    /// Validates `data` against per-field rule lists. Every rule runs; errors
    /// accumulate in rule order. Only probe failures propagate as `Err`.
    pub async fn validate(
        &self,
        data: &BTreeMap<String, String>,
        rules: &[(&str, Vec<Rule>)],
    ) -> Result<ValidationResult> {
        let mut result = ValidationResult {
            valid: true,
            errors: FieldErrors::new(),
        };

        for (field, field_rules) in rules {
            let value = data.get(*field).map(String::as_str).unwrap_or_default();

            for rule in field_rules {
                self.apply_rule(field, value, rule, data, &mut result).await?;
            }
        }

        Ok(result)
    }

    async fn apply_rule(
        &self,
        field: &str,
        value: &str,
        rule: &Rule,
        data: &BTreeMap<String, String>,
        result: &mut ValidationResult,
    ) -> Result<()> {
        // All rules except Required and Confirmed pass on an absent value.
        if value.is_empty() && !matches!(rule, Rule::Required | Rule::Confirmed) {
            return Ok(());
        }

        match rule {
            Rule::Required => {
                if value.is_empty() {
                    result.add_error(field, format!("{} is required", label(field)));
                }
            }
            Rule::Min(n) => {
                if value.chars().count() < *n {
                    result.add_error(
                        field,
                        format!("{} must be at least {n} characters", label(field)),
                    );
                }
            }
            Rule::Max(n) => {
                if value.chars().count() > *n {
                    result.add_error(
                        field,
                        format!("{} must be no more than {n} characters", label(field)),
                    );
                }
            }
            Rule::Email => {
                if !email_regex().is_match(value) {
                    result.add_error(field, "Please enter a valid email address".to_string());
                }
            }
            Rule::Numeric => {
                if value.parse::<f64>().is_err() {
                    result.add_error(field, format!("{} must be a number", label(field)));
                }
            }
            Rule::Integer => {
                if value.parse::<i64>().is_err() {
                    result.add_error(field, format!("{} must be an integer", label(field)));
                }
            }
            Rule::Url => {
                let parsed = url::Url::parse(value);
                if !parsed.is_ok_and(|u| u.has_host()) {
                    result.add_error(field, "Please enter a valid URL".to_string());
                }
            }
            Rule::Alpha => {
                if !value.chars().all(|c| c.is_ascii_alphabetic()) {
                    result.add_error(field, format!("{} may only contain letters", label(field)));
                }
            }
            Rule::AlphaNum => {
                if !value.chars().all(|c| c.is_ascii_alphanumeric()) {
                    result.add_error(
                        field,
                        format!("{} may only contain letters and numbers", label(field)),
                    );
                }
            }
            Rule::AlphaDash => {
                if !value
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
                {
                    result.add_error(
                        field,
                        format!(
                            "{} may only contain letters, numbers, dashes and underscores",
                            label(field)
                        ),
                    );
                }
            }
            Rule::Regex(pattern) => {
                if !pattern.is_match(value) {
                    result.add_error(field, format!("{} format is invalid", label(field)));
                }
            }
            Rule::Date => {
                if !parses_as_date(value) {
                    result.add_error(field, "Please enter a valid date".to_string());
                }
            }
            Rule::DateFormat(fmt) => {
                if !matches_date_format(value, fmt) {
                    result.add_error(field, format!("Date must be in format: {fmt}"));
                }
            }
            Rule::In(allowed) => {
                if !allowed.contains(&value) {
                    result.add_error(
                        field,
                        format!("{} must be one of: {}", label(field), allowed.join(", ")),
                    );
                }
            }
            Rule::NotIn(forbidden) => {
                if forbidden.contains(&value) {
                    result.add_error(
                        field,
                        format!("{} cannot be: {}", label(field), forbidden.join(", ")),
                    );
                }
            }
            Rule::Confirmed => {
                let confirm_field = format!("{field}_confirmation");
                let confirmation = data.get(&confirm_field).map(String::as_str).unwrap_or_default();
                if value != confirmation {
                    result.add_error(
                        field,
                        format!("{} confirmation does not match", label(field)),
                    );
                }
            }
            Rule::Unique {
                table,
                column,
                ignore_id,
            } => {
                if self.probe.exists(table, column, value, *ignore_id).await? {
                    result.add_error(field, format!("{} already exists", label(field)));
                }
            }
            Rule::Exists { table, column } => {
                if !self.probe.exists(table, column, value, None).await? {
                    result.add_error(
                        field,
                        format!("Selected {} is invalid", label(field).to_lowercase()),
                    );
                }
            }
        }

        Ok(())
    }
}

/// "first_name" -> "First name"
fn label(field: &str) -> String {
    let spaced = field.replace('_', " ");
    let mut chars = spaced.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => spaced,
    }
}

fn email_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap())
}

/// Standalone form of the `Email` rule for handlers that check a single field.
#[must_use]
pub fn is_valid_email(value: &str) -> bool {
    email_regex().is_match(value)
}

fn parses_as_date(value: &str) -> bool {
    DateTime::parse_from_rfc3339(value).is_ok()
        || NaiveDate::parse_from_str(value, "%Y-%m-%d").is_ok()
        || NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S").is_ok()
}

/// Strict format check: the value must parse AND format back to itself,
/// so "2026-1-5" does not satisfy "%Y-%m-%d".
fn matches_date_format(value: &str, fmt: &str) -> bool {
    if let Ok(dt) = NaiveDateTime::parse_from_str(value, fmt) {
        return dt.format(fmt).to_string() == value;
    }
    if let Ok(d) = NaiveDate::parse_from_str(value, fmt) {
        return d.format(fmt).to_string() == value;
    }
    false
}

// ============================================================================
// Sanitization
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SanitizeKind {
    /// HTML-escape for safe embedding in markup
    Text,
    Email,
    Url,
    Int,
    Float,
}

/// Trims and filters a raw input value for storage or redisplay.
#[must_use]
pub fn sanitize(value: &str, kind: SanitizeKind) -> String {
    let trimmed = value.trim();
    match kind {
        SanitizeKind::Text => html_escape::encode_safe(trimmed).into_owned(),
        SanitizeKind::Email => trimmed
            .chars()
            .filter(|c| c.is_ascii_alphanumeric() || ".!#$%&'*+-/=?^_`{|}~@[]".contains(*c))
            .collect(),
        SanitizeKind::Url => trimmed
            .chars()
            .filter(|c| c.is_ascii_alphanumeric() || "-._~:/?#[]@!$&'()*+,;=%".contains(*c))
            .collect(),
        SanitizeKind::Int => trimmed
            .chars()
            .filter(|c| c.is_ascii_digit() || *c == '+' || *c == '-')
            .collect(),
        SanitizeKind::Float => trimmed
            .chars()
            .filter(|c| c.is_ascii_digit() || "+-.eE".contains(*c))
            .collect(),
    }
}

// ============================================================================
// CSRF tokens
// ============================================================================

const CSRF_SESSION_KEY: &str = "csrf_token";

/// Returns the browser session's CSRF token, minting one on first use.
pub async fn csrf_token(session: &Session) -> Result<String> {
    if let Some(token) = session.get::<String>(CSRF_SESSION_KEY).await? {
        return Ok(token);
    }

    let token = random_hex::<32>();
    session.insert(CSRF_SESSION_KEY, &token).await?;
    Ok(token)
}

/// Constant-time comparison against the session's cached token.
/// False when the session has no token yet.
pub async fn verify_csrf(session: &Session, token: &str) -> bool {
    match session.get::<String>(CSRF_SESSION_KEY).await {
        Ok(Some(expected)) => constant_time_eq(expected.as_bytes(), token.as_bytes()),
        _ => false,
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// Random hex string of `2 * N` characters.
#[must_use]
pub fn random_hex<const N: usize>() -> String {
    let bytes: [u8; N] = rand::rng().random();

    bytes.iter().fold(String::with_capacity(N * 2), |mut acc, b| {
        use std::fmt::Write;
        let _ = write!(acc, "{b:02x}");
        acc
    })
}

// ============================================================================
// Fixed-pattern predicates
// ============================================================================

/// Optional leading `+`, then 1-16 digits not starting with zero.
#[must_use]
pub fn is_valid_phone(phone: &str) -> bool {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\+?[1-9][0-9]{0,15}$").unwrap())
        .is_match(phone)
}

const PASSWORD_SPECIAL_CHARS: &str = "@$!%*?&";

/// At least 8 characters with upper, lower, digit and one of `@$!%*?&`,
/// drawn only from that alphabet.
#[must_use]
pub fn is_strong_password(password: &str) -> bool {
    if password.chars().count() < 8 {
        return false;
    }

    let allowed = |c: char| c.is_ascii_alphanumeric() || PASSWORD_SPECIAL_CHARS.contains(c);
    if !password.chars().all(allowed) {
        return false;
    }

    password.chars().any(|c| c.is_ascii_lowercase())
        && password.chars().any(|c| c.is_ascii_uppercase())
        && password.chars().any(|c| c.is_ascii_digit())
        && password.chars().any(|c| PASSWORD_SPECIAL_CHARS.contains(c))
}
