//! Input normalization: money, dates, and the identifiers and labels sent
//! to the payment provider.
//!
//! Everything here is pure. Request `validate()` methods call into this
//! module and turn its errors into field-level validation errors.

use std::str::FromStr;

use chrono::{DateTime, NaiveDate};
use rust_decimal::{
    Decimal, RoundingStrategy,
    prelude::{FromPrimitive, ToPrimitive},
};
use serde::Deserialize;

use crate::models::transaction::DEFAULT_VAT_RATE;

/// Date formats accepted on input, in priority order. An ambiguous value
/// such as `03/04/2020` resolves to the first format that parses it.
pub const DATE_FORMATS: [&str; 6] = [
    "%Y-%m-%d", "%Y/%m/%d", "%d/%m/%Y", "%m/%d/%Y", "%d-%m-%Y", "%d.%m.%Y",
];

/// Canonical stored date format.
pub const CANONICAL_DATE_FORMAT: &str = "%Y/%m/%d";

const BENEFICIARY_NAME_MAX: usize = 140;
const LABEL_MAX: usize = 50;
const LA_POSTE_SIREN: &str = "356000000";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NormalizeError {
    #[error("must be a number")]
    NotANumber,
    #[error("must not be negative")]
    Negative,
    #[error("is too large")]
    Overflow,
    #[error("unrecognized date `{0}`")]
    UnrecognizedDate(String),
    #[error("must be 14 digits")]
    SiretFormat,
    #[error("checksum does not match")]
    SiretChecksum,
    #[error("is not a well-formed IBAN")]
    IbanFormat,
    #[error("IBAN checksum does not match")]
    IbanChecksum,
}

/// Amount as received on the wire.
///
/// A JSON number without a fractional part (`1000`, `10.0`, `1e3`) is
/// already in cents. A string, or a JSON number with a fractional part, is a
/// euro amount.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum AmountInput {
    Number(serde_json::Number),
    Text(String),
}

/// Convert an amount input to integer cents.
///
/// Euro amounts are rounded half away from zero at two decimals before
/// the ×100 conversion, so `"10.005"` is `1001` cents.
///
/// # Errors
///
/// - `Negative` for any amount below zero
/// - `NotANumber` for text that is not a decimal amount
/// - `Overflow` when the result does not fit in `i64`
pub fn normalize_amount(input: &AmountInput) -> Result<i64, NormalizeError> {
    match input {
        AmountInput::Number(number) => {
            if let Some(cents) = number.as_i64() {
                return if cents < 0 {
                    Err(NormalizeError::Negative)
                } else {
                    Ok(cents)
                };
            }
            if number.is_u64() {
                return Err(NormalizeError::Overflow);
            }
            match number.as_f64() {
                Some(value) if value.fract() == 0.0 => whole_number_cents(value),
                _ => euros_to_cents(&number.to_string()),
            }
        }
        AmountInput::Text(text) => euros_to_cents(text),
    }
}

/// `10.0` and `1e3` carry no fraction, so they are cents like `10` and `1000`.
fn whole_number_cents(value: f64) -> Result<i64, NormalizeError> {
    if value < 0.0 {
        return Err(NormalizeError::Negative);
    }
    Decimal::from_f64(value)
        .and_then(|cents| cents.to_i64())
        .ok_or(NormalizeError::Overflow)
}

fn euros_to_cents(raw: &str) -> Result<i64, NormalizeError> {
    let mut cleaned: String = raw
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '€')
        .map(|c| if c == ',' { '.' } else { c })
        .collect();
    let suffix_start = cleaned.len().saturating_sub(3);
    if cleaned
        .get(suffix_start..)
        .is_some_and(|suffix| suffix.eq_ignore_ascii_case("EUR"))
    {
        cleaned.truncate(suffix_start);
    }
    if cleaned.is_empty() {
        return Err(NormalizeError::NotANumber);
    }

    let euros = Decimal::from_str(&cleaned)
        .or_else(|_| Decimal::from_scientific(&cleaned))
        .map_err(|_| NormalizeError::NotANumber)?;
    if euros.is_sign_negative() && !euros.is_zero() {
        return Err(NormalizeError::Negative);
    }

    let cents = euros
        .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
        .checked_mul(Decimal::ONE_HUNDRED)
        .ok_or(NormalizeError::Overflow)?;
    cents.to_i64().ok_or(NormalizeError::Overflow)
}

/// Render cents as a two-decimal euro amount (`1000` is `"10.00"`).
pub fn format_cents(cents: i64) -> String {
    Decimal::new(cents, 2).to_string()
}

/// Amount without VAT at the default rate: `amount - floor(amount * 20%)`.
pub fn vat_excluded(cents: i64) -> i64 {
    vat_excluded_at(cents, DEFAULT_VAT_RATE)
}

pub fn vat_excluded_at(cents: i64, rate_percent: i32) -> i64 {
    let vat = (i128::from(cents) * i128::from(rate_percent)).div_euclid(100);
    // |vat| <= |cents| for any rate up to 100%
    cents - i64::try_from(vat).unwrap_or(cents)
}

/// Parse a date in one of `DATE_FORMATS` (or an RFC 3339 timestamp) and
/// return it as `YYYY/MM/DD`.
pub fn normalize_date(raw: &str) -> Result<String, NormalizeError> {
    let trimmed = raw.trim();

    let is_plain_date = trimmed.len() == 10
        && trimmed
            .chars()
            .all(|c| c.is_ascii_digit() || matches!(c, '-' | '/' | '.'));
    if is_plain_date {
        for format in DATE_FORMATS {
            if let Ok(date) = NaiveDate::parse_from_str(trimmed, format) {
                return Ok(date.format(CANONICAL_DATE_FORMAT).to_string());
            }
        }
    } else if let Ok(timestamp) = DateTime::parse_from_rfc3339(trimmed) {
        return Ok(timestamp.date_naive().format(CANONICAL_DATE_FORMAT).to_string());
    }

    Err(NormalizeError::UnrecognizedDate(trimmed.to_string()))
}

/// Check a SIRET: 14 digits and a valid Luhn checksum. La Poste
/// establishments do not follow Luhn and are accepted on their SIREN.
pub fn validate_siret(siret: &str) -> Result<(), NormalizeError> {
    if siret.len() != 14 || !siret.bytes().all(|b| b.is_ascii_digit()) {
        return Err(NormalizeError::SiretFormat);
    }
    if siret.starts_with(LA_POSTE_SIREN) || luhn_checksum(siret) % 10 == 0 {
        Ok(())
    } else {
        Err(NormalizeError::SiretChecksum)
    }
}

fn luhn_checksum(digits: &str) -> u32 {
    digits
        .bytes()
        .rev()
        .enumerate()
        .map(|(i, b)| {
            let n = u32::from(b - b'0');
            let n = if i % 2 == 1 { n * 2 } else { n };
            if n >= 10 { n - 9 } else { n }
        })
        .sum()
}

/// The SIREN (company id) is the first nine digits of a SIRET.
pub fn siret_to_siren(siret: &str) -> &str {
    siret.get(..9).unwrap_or(siret)
}

/// Remove spaces and upper-case an IBAN.
pub fn compact_iban(raw: &str) -> String {
    raw.chars()
        .filter(|c| !c.is_whitespace())
        .map(|c| c.to_ascii_uppercase())
        .collect()
}

/// Check IBAN shape and its ISO 7064 mod-97 checksum. Expects the
/// compact form.
pub fn validate_iban(iban: &str) -> Result<(), NormalizeError> {
    let bytes = iban.as_bytes();
    let well_formed = (15..=34).contains(&bytes.len())
        && bytes[..2].iter().all(u8::is_ascii_uppercase)
        && bytes[2..4].iter().all(u8::is_ascii_digit)
        && bytes[4..]
            .iter()
            .all(|b| b.is_ascii_digit() || b.is_ascii_uppercase());
    if !well_formed {
        return Err(NormalizeError::IbanFormat);
    }

    let remainder = bytes[4..]
        .iter()
        .chain(&bytes[..4])
        .fold(0u32, |acc, &b| {
            if b.is_ascii_digit() {
                (acc * 10 + u32::from(b - b'0')) % 97
            } else {
                (acc * 100 + u32::from(b - b'A' + 10)) % 97
            }
        });
    if remainder == 1 {
        Ok(())
    } else {
        Err(NormalizeError::IbanChecksum)
    }
}

/// Beneficiary name accepted by the payment provider: at most 140
/// characters, accents folded, anything outside `A-Za-z0-9 ,-` replaced
/// by a space.
pub fn format_beneficiary_name(name: &str) -> String {
    sanitize(name, BENEFICIARY_NAME_MAX, |c| matches!(c, ' ' | ',' | '-'))
}

/// Payment label accepted by the payment provider: at most 50 characters,
/// accents folded, anything outside `A-Za-z0-9 ?:().,+-/` replaced by a
/// space.
pub fn format_label(label: &str) -> String {
    sanitize(label, LABEL_MAX, |c| {
        matches!(c, ' ' | '?' | ':' | '(' | ')' | '.' | ',' | '+' | '-' | '/')
    })
}

fn sanitize(input: &str, max_chars: usize, allowed_punctuation: impl Fn(char) -> bool) -> String {
    input
        .chars()
        .take(max_chars)
        .map(fold_diacritic)
        .map(|c| {
            if c.is_ascii_alphanumeric() || allowed_punctuation(c) {
                c
            } else {
                ' '
            }
        })
        .collect()
}

/// Strip the accent from Latin letters that decompose into a base letter
/// plus a combining mark.
fn fold_diacritic(c: char) -> char {
    match c {
        'à' | 'á' | 'â' | 'ã' | 'ä' | 'å' | 'ā' | 'ă' | 'ą' => 'a',
        'À' | 'Á' | 'Â' | 'Ã' | 'Ä' | 'Å' | 'Ā' | 'Ă' | 'Ą' => 'A',
        'ç' | 'ć' | 'ĉ' | 'ċ' | 'č' => 'c',
        'Ç' | 'Ć' | 'Ĉ' | 'Ċ' | 'Č' => 'C',
        'ď' => 'd',
        'Ď' => 'D',
        'è' | 'é' | 'ê' | 'ë' | 'ē' | 'ĕ' | 'ė' | 'ę' | 'ě' => 'e',
        'È' | 'É' | 'Ê' | 'Ë' | 'Ē' | 'Ĕ' | 'Ė' | 'Ę' | 'Ě' => 'E',
        'ĝ' | 'ğ' | 'ġ' | 'ģ' => 'g',
        'Ĝ' | 'Ğ' | 'Ġ' | 'Ģ' => 'G',
        'ì' | 'í' | 'î' | 'ï' | 'ĩ' | 'ī' | 'ĭ' | 'į' => 'i',
        'Ì' | 'Í' | 'Î' | 'Ï' | 'Ĩ' | 'Ī' | 'Ĭ' | 'Į' | 'İ' => 'I',
        'ñ' | 'ń' | 'ņ' | 'ň' => 'n',
        'Ñ' | 'Ń' | 'Ņ' | 'Ň' => 'N',
        'ò' | 'ó' | 'ô' | 'õ' | 'ö' | 'ō' | 'ŏ' | 'ő' => 'o',
        'Ò' | 'Ó' | 'Ô' | 'Õ' | 'Ö' | 'Ō' | 'Ŏ' | 'Ő' => 'O',
        'ŕ' | 'ř' => 'r',
        'Ŕ' | 'Ř' => 'R',
        'ś' | 'ŝ' | 'ş' | 'š' => 's',
        'Ś' | 'Ŝ' | 'Ş' | 'Š' => 'S',
        'ţ' | 'ť' => 't',
        'Ţ' | 'Ť' => 'T',
        'ù' | 'ú' | 'û' | 'ü' | 'ũ' | 'ū' | 'ŭ' | 'ů' | 'ű' | 'ų' => 'u',
        'Ù' | 'Ú' | 'Û' | 'Ü' | 'Ũ' | 'Ū' | 'Ŭ' | 'Ů' | 'Ű' | 'Ų' => 'U',
        'ý' | 'ÿ' => 'y',
        'Ý' | 'Ÿ' => 'Y',
        'ź' | 'ż' | 'ž' => 'z',
        'Ź' | 'Ż' | 'Ž' => 'Z',
        other => other,
    }
}

/// Loose email shape check: one `@`, non-empty local part, dotted domain.
pub fn looks_like_email(raw: &str) -> bool {
    let email = raw.trim();
    match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.contains('@')
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
                && !email.contains(char::is_whitespace)
        }
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(s: &str) -> AmountInput {
        AmountInput::Text(s.to_string())
    }

    fn number(v: serde_json::Value) -> AmountInput {
        serde_json::from_value(v).expect("amount input")
    }

    #[test]
    fn decimal_strings_are_euros() {
        assert_eq!(normalize_amount(&text("10.00")), Ok(1000));
        assert_eq!(normalize_amount(&text("10,5")), Ok(1050));
        assert_eq!(normalize_amount(&text("12 €")), Ok(1200));
        assert_eq!(normalize_amount(&text("7 EUR")), Ok(700));
        assert_eq!(normalize_amount(&text("1000")), Ok(100000));
    }

    #[test]
    fn rounding_is_half_away_from_zero() {
        assert_eq!(normalize_amount(&text("10.005")), Ok(1001));
        assert_eq!(normalize_amount(&text("10.004")), Ok(1000));
        assert_eq!(normalize_amount(&number(serde_json::json!(0.125))), Ok(13));
    }

    #[test]
    fn integers_are_cents() {
        assert_eq!(normalize_amount(&number(serde_json::json!(1000))), Ok(1000));
        assert_eq!(normalize_amount(&number(serde_json::json!(0))), Ok(0));
    }

    #[test]
    fn whole_floats_are_cents() {
        assert_eq!(normalize_amount(&number(serde_json::json!(10.0))), Ok(10));
        let scientific: AmountInput = serde_json::from_str("1e3").expect("amount input");
        assert_eq!(normalize_amount(&scientific), Ok(1000));
        assert_eq!(
            normalize_amount(&number(serde_json::json!(-3.0))),
            Err(NormalizeError::Negative)
        );
        assert_eq!(
            normalize_amount(&number(serde_json::json!(1e30))),
            Err(NormalizeError::Overflow)
        );
    }

    #[test]
    fn fractional_numbers_are_euros() {
        assert_eq!(normalize_amount(&number(serde_json::json!(10.5))), Ok(1050));
    }

    #[test]
    fn bad_amounts_are_rejected() {
        assert_eq!(normalize_amount(&text("-1.00")), Err(NormalizeError::Negative));
        assert_eq!(
            normalize_amount(&number(serde_json::json!(-5))),
            Err(NormalizeError::Negative)
        );
        assert_eq!(normalize_amount(&text("ten")), Err(NormalizeError::NotANumber));
        assert_eq!(normalize_amount(&text("")), Err(NormalizeError::NotANumber));
    }

    #[test]
    fn euro_strings_format_back_unchanged() {
        for euros in ["0.00", "0.05", "0.99", "10.00", "123.45", "99999.99"] {
            let cents = normalize_amount(&text(euros)).expect("amount");
            assert_eq!(format_cents(cents), euros);
        }
    }

    #[test]
    fn formatted_cents_parse_back() {
        for cents in [0, 1, 99, 1000, 123456] {
            assert_eq!(normalize_amount(&text(&format_cents(cents))), Ok(cents));
        }
        assert_eq!(format_cents(1000), "10.00");
        assert_eq!(format_cents(5), "0.05");
    }

    #[test]
    fn vat_is_floored() {
        assert_eq!(vat_excluded(1000), 800);
        assert_eq!(vat_excluded(999), 800);
        assert_eq!(vat_excluded(1), 1);
        assert_eq!(vat_excluded(0), 0);
    }

    #[test]
    fn dates_follow_priority_order() {
        assert_eq!(normalize_date("1990-05-12").as_deref(), Ok("1990/05/12"));
        assert_eq!(normalize_date("1990/05/12").as_deref(), Ok("1990/05/12"));
        assert_eq!(normalize_date("03/04/2020").as_deref(), Ok("2020/04/03"));
        assert_eq!(normalize_date("12/31/2020").as_deref(), Ok("2020/12/31"));
        assert_eq!(normalize_date("12-05-2020").as_deref(), Ok("2020/05/12"));
        assert_eq!(normalize_date("12.05.2020").as_deref(), Ok("2020/05/12"));
        assert_eq!(
            normalize_date("1990-05-12T08:30:00Z").as_deref(),
            Ok("1990/05/12")
        );
    }

    #[test]
    fn unknown_dates_are_rejected() {
        assert!(normalize_date("12-05-20").is_err());
        assert!(normalize_date("2020-13-01").is_err());
        assert!(normalize_date("next tuesday").is_err());
    }

    #[test]
    fn siret_checks() {
        assert_eq!(validate_siret("73282932000074"), Ok(()));
        assert_eq!(validate_siret("73282932000075"), Err(NormalizeError::SiretChecksum));
        assert_eq!(validate_siret("7328293200007"), Err(NormalizeError::SiretFormat));
        assert_eq!(validate_siret("35600000000048"), Ok(()));
        assert_eq!(validate_siret("35600000012345"), Ok(()));
        assert_eq!(siret_to_siren("73282932000074"), "732829320");
    }

    #[test]
    fn iban_checks() {
        assert_eq!(validate_iban("FR1420041010050500013M02606"), Ok(()));
        assert_eq!(validate_iban(&compact_iban("fr76 3000 6000 0112 3456 7890 189")), Ok(()));
        assert_eq!(
            validate_iban("FR1420041010050500013M02607"),
            Err(NormalizeError::IbanChecksum)
        );
        assert_eq!(validate_iban("FR14"), Err(NormalizeError::IbanFormat));
    }

    #[test]
    fn beneficiary_name_is_sanitized() {
        assert_eq!(format_beneficiary_name("Société Générale & Fils"), "Societe Generale   Fils");
        assert_eq!(format_beneficiary_name(&"x".repeat(200)).len(), 140);
    }

    #[test]
    fn label_keeps_allowed_punctuation() {
        assert_eq!(format_label("Cmd #42 (été) 1/2 + TVA?"), "Cmd  42 (ete) 1/2 + TVA?");
        assert_eq!(format_label(&"y".repeat(80)).len(), 50);
    }

    #[test]
    fn email_shape() {
        assert!(looks_like_email("a@b.fr"));
        assert!(!looks_like_email("a@b"));
        assert!(!looks_like_email("@b.fr"));
        assert!(!looks_like_email("a b@c.fr"));
    }
}
