//! Document-type classifier — regex-based heuristics over raw OCR text.
//!
//! Grounded on the fast-path classifiers elsewhere in this codebase,
//! generalized from keyword `.contains()` scans to compiled regexes
//! since the signals here (currency + date patterns, labeled-field
//! layouts) are genuinely structural rather than single keywords.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::types::DocumentType;

static CODE_FENCE: Lazy<Regex> = Lazy::new(|| Regex::new(r"```|^\s*(fn|def|class|function)\s+\w+").unwrap());
static CODE_KEYWORDS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(public\s+class|import\s+\w+|#include|console\.log|println!)\b").unwrap());
static INVOICE_SIGNAL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(invoice|total\s*due|subtotal|\$\s?\d+[.,]\d{2}|\b\d{1,2}[/-]\d{1,2}[/-]\d{2,4}\b)").unwrap()
});
static FORM_FIELD: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?im)^\s*[A-Za-z][\w \t]{0,24}:\s*\S{0,40}\s*$").unwrap());
static NON_LATIN: Lazy<Regex> = Lazy::new(|| Regex::new(r"[À-ɏḀ-ỿЀ-ӿ一-鿿]").unwrap());

/// Classify raw OCR text into one of the closed document types. Never
/// returns an error — an unrecognized layout simply falls back to
/// `General`.
pub fn classify(text: &str) -> DocumentType {
    if CODE_FENCE.is_match(text) || CODE_KEYWORDS.is_match(text) {
        return DocumentType::Code;
    }
    if INVOICE_SIGNAL.is_match(text) {
        return DocumentType::Invoice;
    }
    let form_field_lines = FORM_FIELD.find_iter(text).count();
    if form_field_lines >= 3 {
        return DocumentType::Form;
    }
    let non_latin_chars = NON_LATIN.find_iter(text).count();
    if non_latin_chars > 0 && non_latin_chars as f64 / text.chars().count().max(1) as f64 > 0.05 {
        return DocumentType::Multilingual;
    }
    DocumentType::General
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_code_fence() {
        let text = "Here is a snippet:\n```rust\nfn main() {}\n```";
        assert_eq!(classify(text), DocumentType::Code);
    }

    #[test]
    fn classifies_invoice() {
        let text = "INVOICE #4821\nDate: 03/14/2024\nSubtotal: $120.00\nTotal Due: $129.60";
        assert_eq!(classify(text), DocumentType::Invoice);
    }

    #[test]
    fn classifies_form() {
        let text = "Name: John Smith\nDate of Birth: 1990-01-01\nAddress: 12 Main St\nPhone: 555-0100";
        assert_eq!(classify(text), DocumentType::Form);
    }

    #[test]
    fn classifies_multilingual() {
        let text = "Trường Đại học Bách Khoa Hà Nội được thành lập năm 1956";
        assert_eq!(classify(text), DocumentType::Multilingual);
    }

    #[test]
    fn falls_back_to_general() {
        let text = "This is just a plain paragraph of regular text with no special markers.";
        assert_eq!(classify(text), DocumentType::General);
    }
}
