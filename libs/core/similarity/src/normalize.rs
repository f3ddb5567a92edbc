//! Canonical-form normalization shared by every primitive (§4.A contract).

use unicode_normalization::UnicodeNormalization;

/// Common legal-entity form prefixes/suffixes stripped before comparing
/// counterparty names, so `"ООО Ромашка"` and `"Ромашка"` compare equal.
const ORG_FORM_TOKENS: &[&str] = &[
    "ооо", "зао", "оао", "пао", "ао", "нко", "ип", "тоо", // RU/KZ forms
    "llc", "ltd", "inc", "corp", "gmbh", "plc", "co",
];

/// Case/whitespace-invariant canonical form: Unicode NFKC, lowercase,
/// collapse internal whitespace, strip quotation marks.
pub fn canonical_form(input: &str) -> String {
    let nfkc: String = input.nfkc().collect();
    let lowered = nfkc.to_lowercase();
    let stripped: String = lowered
        .chars()
        .filter(|c| !matches!(c, '"' | '\u{00AB}' | '\u{00BB}' | '\u{201C}' | '\u{201D}' | '\''))
        .collect();
    collapse_whitespace(&stripped)
}

/// `canonical_form` plus removal of organizational-form tokens, used when
/// comparing counterparty (legal-entity) names.
pub fn canonical_form_counterparty(input: &str) -> String {
    let base = canonical_form(input);
    let filtered: Vec<&str> = base
        .split_whitespace()
        .filter(|tok| !ORG_FORM_TOKENS.contains(tok))
        .collect();
    filtered.join(" ")
}

fn collapse_whitespace(input: &str) -> String {
    input.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collapses_whitespace_and_lowercases() {
        assert_eq!(canonical_form("  Winter   Tire  205/55 "), "winter tire 205/55");
    }

    #[test]
    fn strips_quotation_marks() {
        assert_eq!(canonical_form("ООО \u{00AB}Ромашка\u{00BB}"), "ооо ромашка");
    }

    #[test]
    fn counterparty_form_drops_org_prefix() {
        assert_eq!(canonical_form_counterparty("ООО \"Ромашка\""), "ромашка");
        assert_eq!(canonical_form_counterparty("Acme LLC"), "acme");
    }

    #[test]
    fn nfkc_normalizes_compatibility_equivalents() {
        // Fullwidth "Ａ" (U+FF21) NFKC-normalizes to ASCII "a" once lowercased.
        assert_eq!(canonical_form("\u{FF21}BC"), "abc");
    }
}
