//! PII Redactor: lifts personal data out of CV text before it leaves the service.
//!
//! Detection is pattern based. Missing a value is tolerable; corrupting real
//! content is not, so every pattern has an allow-list check before it fires.

use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

use crate::models::document::{PiiFields, RedactedPayload};
use crate::models::job::Applicant;

pub const EMAIL_TOKEN: &str = "[EMAIL]";
pub const PHONE_TOKEN: &str = "[PHONE]";
pub const NATIONAL_ID_TOKEN: &str = "[NATIONAL_ID]";
pub const ADDRESS_TOKEN: &str = "[ADDRESS]";
pub const NAME_TOKEN: &str = "[NAME]";

const MIN_PHONE_DIGITS: usize = 9;
const MAX_PHONE_DIGITS: usize = 15;

static EMAIL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b[a-z0-9._%+\-]+@[a-z0-9.\-]+\.[a-z]{2,}\b").unwrap());

// US SSN and UK National Insurance number.
static NATIONAL_ID_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(?:\d{3}-\d{2}-\d{4}|[a-ceghj-pr-tw-z]{2}\s?\d{2}\s?\d{2}\s?\d{2}\s?[a-d])\b")
        .unwrap()
});

static PHONE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\+?\(?\d[\d \t().\-]{7,}\d").unwrap());

// A house number, one to three capitalised words and a street suffix on one line.
static ADDRESS_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"\b\d{1,5}[ \t]+(?:[A-Z][A-Za-z'\-]*\.?[ \t]+){1,3}(?:Street|St|Avenue|Ave|Road|Rd|Boulevard|Blvd|Lane|Ln|Drive|Dr|Court|Ct|Way|Place|Pl|Terrace|Close)\b\.?(?:,?[ \t]*(?i:apt|suite|unit|flat)[ \t]*#?[ \t]*\w+)?",
    )
    .unwrap()
});

// `2015-2020`, `2019 – present` style date ranges are never phone numbers.
static YEAR_RANGE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?:19|20)\d{2}\s*[-–/]\s*(?:(?:19|20)\d{2}|\d{2})$").unwrap());

// `10.2.0.1`, `1.70.0.123` and similar dotted versions / addresses.
static DOTTED_NUMBER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d{1,4}(?:\.\d{1,4}){2,}$").unwrap());

/// Counted nouns that put a number in prose ("led 4 Teams") rather than an address.
const NON_STREET_WORDS: &[&str] = &[
    "years", "months", "teams", "engineers", "developers", "people", "projects", "services",
    "clients", "customers", "products", "countries", "languages", "reports",
    "in", "on", "at", "to", "the", "and", "of", "for",
];

/// Words that mark a line as a job title or section heading rather than a name.
const NON_NAME_WORDS: &[&str] = &[
    "engineer", "developer", "manager", "designer", "analyst", "consultant", "architect",
    "director", "lead", "senior", "junior", "intern", "officer", "specialist", "scientist",
    "curriculum", "vitae", "resume", "profile", "summary", "experience", "education", "skills",
    "contact", "objective", "software", "data", "product",
];

#[derive(Debug, Error)]
pub enum RedactionError {
    #[error("redaction failed: {0}")]
    Internal(String),
}

#[derive(Debug, Clone, Default)]
pub struct Redactor;

impl Redactor {
    pub fn new() -> Self {
        Self
    }

    /// Returns redacted text plus the lifted values. Finding nothing is not an error.
    pub fn redact(
        &self,
        text: &str,
        applicant: Option<&Applicant>,
    ) -> Result<RedactedPayload, RedactionError> {
        let mut pii = PiiFields::default();
        let mut out = text.to_string();

        if let Some(applicant) = applicant {
            out = redact_known_values(&out, applicant, &mut pii)?;
        }

        out = replace_matches(&out, &EMAIL_RE, EMAIL_TOKEN, &mut pii.emails, |_| true);
        out = replace_matches(
            &out,
            &NATIONAL_ID_RE,
            NATIONAL_ID_TOKEN,
            &mut pii.national_ids,
            |_| true,
        );
        out = replace_matches(
            &out,
            &ADDRESS_RE,
            ADDRESS_TOKEN,
            &mut pii.addresses,
            looks_like_address,
        );
        out = replace_matches(&out, &PHONE_RE, PHONE_TOKEN, &mut pii.phones, looks_like_phone);

        if let Some(name) = heading_name(&out) {
            out = out.replacen(&name, NAME_TOKEN, 1);
            push_unique(&mut pii.names, name);
        }

        Ok(RedactedPayload { text: out, pii })
    }
}

fn redact_known_values(
    text: &str,
    applicant: &Applicant,
    pii: &mut PiiFields,
) -> Result<String, RedactionError> {
    let mut out = text.to_string();
    let name = applicant.name.trim();
    if name.len() >= 3 {
        let re = regex::RegexBuilder::new(&regex::escape(name))
            .case_insensitive(true)
            .build()
            .map_err(|e| RedactionError::Internal(format!("applicant name pattern: {e}")))?;
        out = re.replace_all(&out, NAME_TOKEN).into_owned();
        push_unique(&mut pii.names, name.to_string());
    }
    let email = applicant.email.trim();
    if !email.is_empty() {
        out = out.replace(email, EMAIL_TOKEN);
        push_unique(&mut pii.emails, email.to_string());
    }
    if let Some(phone) = applicant.phone.as_deref().map(str::trim).filter(|p| !p.is_empty()) {
        out = out.replace(phone, PHONE_TOKEN);
        push_unique(&mut pii.phones, phone.to_string());
    }
    Ok(out)
}

fn replace_matches(
    text: &str,
    re: &Regex,
    token: &str,
    sink: &mut Vec<String>,
    accept: impl Fn(&str) -> bool,
) -> String {
    let mut out = String::with_capacity(text.len());
    let mut last = 0;
    for m in re.find_iter(text) {
        let value = m.as_str().trim();
        if !accept(value) {
            continue;
        }
        out.push_str(&text[last..m.start()]);
        out.push_str(token);
        last = m.end();
        push_unique(sink, value.to_string());
    }
    out.push_str(&text[last..]);
    out
}

fn looks_like_phone(candidate: &str) -> bool {
    let digits = candidate.chars().filter(|c| c.is_ascii_digit()).count();
    if !(MIN_PHONE_DIGITS..=MAX_PHONE_DIGITS).contains(&digits) {
        return false;
    }
    if YEAR_RANGE_RE.is_match(candidate) || DOTTED_NUMBER_RE.is_match(candidate) {
        return false;
    }
    let groups: Vec<&str> = candidate
        .split(|c: char| !c.is_ascii_digit())
        .filter(|g| !g.is_empty())
        .collect();
    !is_date_run(&groups)
}

/// `2012 - 2016`, `01.2015 - 12.2019`, `2015-01 - 2019-12`, `03/2018 - 06/2021`.
/// Every group is a year or a month, and months never outnumber years.
fn is_date_run(groups: &[&str]) -> bool {
    let years = groups.iter().filter(|g| is_year(g)).count();
    let months = groups.iter().filter(|g| is_month(g)).count();
    years > 0 && months <= years && years + months == groups.len()
}

fn is_year(group: &str) -> bool {
    group.len() == 4 && (group.starts_with("19") || group.starts_with("20"))
}

fn is_month(group: &str) -> bool {
    group.len() <= 2 && group.parse::<u8>().is_ok_and(|m| (1..=12).contains(&m))
}

fn looks_like_address(candidate: &str) -> bool {
    let mut words = candidate.split_whitespace();
    words.next();
    !words.any(|w| NON_STREET_WORDS.contains(&w.to_lowercase().as_str()))
}

/// A CV usually opens with the candidate's name on its own line.
fn heading_name(text: &str) -> Option<String> {
    let line = text.lines().map(str::trim).find(|l| !l.is_empty())?;
    if line.contains('[') || line.chars().any(|c| c.is_ascii_digit()) {
        return None;
    }
    let words: Vec<&str> = line.split_whitespace().collect();
    if !(2..=4).contains(&words.len()) {
        return None;
    }
    let capitalised = words.iter().all(|w| {
        let mut chars = w.chars();
        chars.next().is_some_and(|c| c.is_uppercase())
            && chars.all(|c| c.is_alphabetic() || c == '-' || c == '\'' || c == '.')
    });
    let title_like = words
        .iter()
        .any(|w| NON_NAME_WORDS.contains(&w.to_lowercase().trim_matches('.')));
    (capitalised && !title_like).then(|| line.to_string())
}

fn push_unique(sink: &mut Vec<String>, value: String) {
    if !sink.contains(&value) {
        sink.push(value);
    }
}
