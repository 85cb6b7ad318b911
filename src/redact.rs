//! Redaction of sensitive patterns
//!
//! Every textual field runs through the redactor before persistence and
//! before embedding, so neither the store nor the vector cache ever sees a
//! raw secret. Matches are replaced with `[REDACTED_<CATEGORY>]` literals.
//!
//! Redaction is idempotent: no replacement token matches any rule, so
//! re-running the redactor over redacted text is a no-op.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

use crate::error::{MnemoError, Result};

/// Built-in bearer-style token prefixes (provider keys, OAuth-ish tokens)
const TOKEN_PATTERN: &str =
    r"(?i)\bbearer\s+[A-Za-z0-9._~+/=-]{8,}|\b(?:sk|pk|rk|ghp|gho|ghu|ghs|xox[abps])[-_][A-Za-z0-9]{10,}\b";

/// `key=value` / `key: value` pairs with a sensitive key
const KEY_VALUE_PATTERN: &str =
    r#"(?i)\b(password|passwd|secret|token|api[_-]?key)\b\s*[:=]\s*[^\s"',;]+"#;

const EMAIL_PATTERN: &str = r"[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}";

/// 13-19 digit runs with optional single space/dash separators; only
/// replaced when the digits pass a Luhn check
const CARD_PATTERN: &str = r"\b\d(?:[ -]?\d){12,18}\b";

/// E.164-like: leading `+` with 7-15 digits, or a bare 10-15 digit run
const PHONE_PATTERN: &str = r"\+[1-9]\d{6,14}\b|\b[1-9]\d{9,14}\b";

const SSN_PATTERN: &str = r"\b\d{3}-\d{2}-\d{4}\b";

/// Passes until redaction reaches a fixpoint; real text converges in two
const MAX_PASSES: usize = 10;

/// How a rule decides what to emit for a match
enum RuleKind {
    /// Replace every match with the rule's category token
    Plain,
    /// Replace only matches whose digits pass the Luhn check
    Card,
    /// Category derived from the captured sensitive key
    KeyValue,
}

struct RedactionRule {
    category: String,
    regex: Regex,
    kind: RuleKind,
}

/// Compiled redaction pattern set
pub struct Redactor {
    rules: Vec<RedactionRule>,
}

static DEFAULT_REDACTOR: Lazy<Redactor> =
    Lazy::new(|| Redactor::new(&[]).expect("built-in redaction patterns compile"));

impl Redactor {
    /// Build the default rule set plus any extra `(category, pattern)` pairs
    pub fn new(extra: &[(String, String)]) -> Result<Self> {
        let mut rules = vec![
            RedactionRule {
                category: "SECRET".to_string(),
                regex: Regex::new(KEY_VALUE_PATTERN).expect("key-value pattern"),
                kind: RuleKind::KeyValue,
            },
            RedactionRule {
                category: "EMAIL".to_string(),
                regex: Regex::new(EMAIL_PATTERN).expect("email pattern"),
                kind: RuleKind::Plain,
            },
            RedactionRule {
                category: "SSN".to_string(),
                regex: Regex::new(SSN_PATTERN).expect("ssn pattern"),
                kind: RuleKind::Plain,
            },
            RedactionRule {
                category: "CARD".to_string(),
                regex: Regex::new(CARD_PATTERN).expect("card pattern"),
                kind: RuleKind::Card,
            },
            RedactionRule {
                category: "PHONE".to_string(),
                regex: Regex::new(PHONE_PATTERN).expect("phone pattern"),
                kind: RuleKind::Plain,
            },
            RedactionRule {
                category: "TOKEN".to_string(),
                regex: Regex::new(TOKEN_PATTERN).expect("token pattern"),
                kind: RuleKind::Plain,
            },
        ];

        for (category, pattern) in extra {
            let regex = Regex::new(pattern).map_err(|e| {
                MnemoError::Config(format!("Invalid redaction pattern '{}': {}", category, e))
            })?;
            rules.push(RedactionRule {
                category: category.to_uppercase(),
                regex,
                kind: RuleKind::Plain,
            });
        }

        Ok(Self { rules })
    }

    /// A shared redactor with only the built-in rules
    pub fn default_rules() -> &'static Redactor {
        &DEFAULT_REDACTOR
    }

    /// Scrub all configured sensitive patterns from `text`
    ///
    /// Runs rule passes until a fixpoint so that replacement tokens sitting
    /// next to residual text can never resurface a match on a later run;
    /// this is what makes redaction idempotent.
    pub fn redact(&self, text: &str) -> String {
        let mut current = text.to_string();
        for _ in 0..MAX_PASSES {
            let next = self.redact_pass(&current);
            if next == current {
                break;
            }
            current = next;
        }
        current
    }

    fn redact_pass(&self, text: &str) -> String {
        let mut out = text.to_string();
        for rule in &self.rules {
            out = match rule.kind {
                RuleKind::Plain => rule
                    .regex
                    .replace_all(&out, format!("[REDACTED_{}]", rule.category))
                    .into_owned(),
                RuleKind::Card => rule
                    .regex
                    .replace_all(&out, |caps: &Captures| {
                        let matched = &caps[0];
                        if luhn_valid(matched) {
                            format!("[REDACTED_{}]", rule.category)
                        } else {
                            matched.to_string()
                        }
                    })
                    .into_owned(),
                RuleKind::KeyValue => rule
                    .regex
                    .replace_all(&out, |caps: &Captures| {
                        format!("[REDACTED_{}]", key_category(&caps[1]))
                    })
                    .into_owned(),
            };
        }
        out
    }
}

/// Map a sensitive key to its replacement category
fn key_category(key: &str) -> &'static str {
    let lower = key.to_ascii_lowercase();
    match lower.as_str() {
        "password" | "passwd" => "PASSWORD",
        "secret" => "SECRET",
        "token" => "TOKEN",
        _ => "API_KEY",
    }
}

/// Luhn checksum over the digits of a candidate card number
fn luhn_valid(candidate: &str) -> bool {
    let digits: Vec<u32> = candidate.chars().filter_map(|c| c.to_digit(10)).collect();
    if digits.len() < 13 || digits.len() > 19 {
        return false;
    }
    let mut sum = 0u32;
    for (i, &d) in digits.iter().rev().enumerate() {
        let mut v = d;
        if i % 2 == 1 {
            v *= 2;
            if v > 9 {
                v -= 9;
            }
        }
        sum += v;
    }
    sum % 10 == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn redact(text: &str) -> String {
        Redactor::default_rules().redact(text)
    }

    #[test]
    fn test_email_redaction() {
        assert_eq!(
            redact("contact alice@example.com for access"),
            "contact [REDACTED_EMAIL] for access"
        );
    }

    #[test]
    fn test_key_value_redaction_preserves_category() {
        assert_eq!(redact("token=abcd1234efgh5678"), "[REDACTED_TOKEN]");
        assert_eq!(redact("password: hunter2"), "[REDACTED_PASSWORD]");
        assert_eq!(redact("api_key=xyz-123"), "[REDACTED_API_KEY]");
        assert_eq!(redact("API-KEY: abc"), "[REDACTED_API_KEY]");
        assert_eq!(redact("secret=sauce"), "[REDACTED_SECRET]");
    }

    #[test]
    fn test_non_sensitive_keys_untouched() {
        assert_eq!(
            redact("user=alice@example.com"),
            "user=[REDACTED_EMAIL]",
            "the key 'user' is not sensitive, only the email value is"
        );
    }

    #[test]
    fn test_card_requires_luhn() {
        // Valid Visa test number
        assert_eq!(redact("card 4111111111111111 on file"), "card [REDACTED_CARD] on file");
        assert_eq!(
            redact("card 4111-1111-1111-1111 on file"),
            "card [REDACTED_CARD] on file"
        );
        // Same length, fails Luhn: left alone by the card rule
        let out = redact("ref 4111111111111112 end");
        assert!(!out.contains("[REDACTED_CARD]"), "got: {}", out);
    }

    #[test]
    fn test_ssn_redaction() {
        assert_eq!(redact("ssn 123-45-6789."), "ssn [REDACTED_SSN].");
    }

    #[test]
    fn test_phone_redaction() {
        assert_eq!(redact("call +14155552671 now"), "call [REDACTED_PHONE] now");
    }

    #[test]
    fn test_bearer_token_redaction() {
        assert_eq!(
            redact("Authorization: Bearer abc.def-ghi_jkl"),
            "Authorization: [REDACTED_TOKEN]"
        );
        assert_eq!(redact("using sk-abcdefghij1234567890"), "using [REDACTED_TOKEN]");
    }

    #[test]
    fn test_idempotence() {
        let inputs = [
            "token=abcd1234efgh5678 from alice@example.com",
            "call +14155552671 re card 4111111111111111 ssn 123-45-6789",
            "password: hunter2 Bearer abcdefgh12345678",
            "nothing sensitive here",
        ];
        for input in inputs {
            let once = redact(input);
            let twice = redact(&once);
            assert_eq!(once, twice, "input: {}", input);
        }
    }

    #[test]
    fn test_adjacent_email_seam_converges() {
        // The first pass consumes "a@b.cd" and leaves "@e.fg" touching the
        // replacement token; the fixpoint loop must clean that up too
        let once = redact("a@b.cd@e.fg");
        assert_eq!(once, redact(&once));
        assert!(!once.contains("@e.fg"), "got: {}", once);
    }

    #[test]
    fn test_custom_pattern() {
        let redactor = Redactor::new(&[("ip".to_string(), r"\b(?:\d{1,3}\.){3}\d{1,3}\b".to_string())])
            .unwrap();
        assert_eq!(redactor.redact("from 10.0.0.1"), "from [REDACTED_IP]");
    }

    #[test]
    fn test_invalid_custom_pattern_rejected() {
        assert!(Redactor::new(&[("bad".to_string(), "(".to_string())]).is_err());
    }
}
