//! PII redaction applied before any write to storage or to response text.

use regex::Regex;
use std::sync::OnceLock;

fn email_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}").unwrap())
}

fn phone_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    // 10 digits, optionally grouped with spaces, dots, or dashes.
    RE.get_or_init(|| {
        Regex::new(r"\b(?:\d{3}[-. ]?){2}\d{4}\b").unwrap()
    })
}

fn card_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    // 13-19 digit sequences, optionally grouped by spaces or dashes.
    RE.get_or_init(|| {
        Regex::new(r"\b(?:\d[ -]?){12,18}\d\b").unwrap()
    })
}

/// Redacts emails, phone-like 10-digit groupings, and 13-19-digit
/// card-like sequences. Order matters: cards are checked before phones
/// would otherwise be tried on overlapping digit runs, so we scan cards
/// first and then leave remaining text for phone/email matching.
pub fn redact(text: &str) -> String {
    let redacted = card_re().replace_all(text, "[REDACTED_CARD]");
    let redacted = phone_re().replace_all(&redacted, "[REDACTED_PHONE]");
    let redacted = email_re().replace_all(&redacted, "[REDACTED_EMAIL]");
    redacted.into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redacts_email() {
        assert_eq!(redact("contact jane@example.com please"), "contact [REDACTED_EMAIL] please");
    }

    #[test]
    fn redacts_phone() {
        assert_eq!(redact("call 555-123-4567 now"), "call [REDACTED_PHONE] now");
    }

    #[test]
    fn redacts_card() {
        assert_eq!(
            redact("card 4111 1111 1111 1111 expires soon"),
            "card [REDACTED_CARD] expires soon"
        );
    }

    #[test]
    fn leaves_ordinary_text_alone() {
        assert_eq!(redact("top 10 products by sales"), "top 10 products by sales");
    }
}
