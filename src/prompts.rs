//! Prompt Catalog — static documentType → template map.
//!
//! Each template carries exactly one placeholder (`{{TEXT}}`), substituted
//! once and literally; the catalog never re-expands its own output, so a
//! caller cannot inject a second placeholder through the OCR text itself.

use std::collections::HashMap;

use once_cell::sync::Lazy;

use crate::types::DocumentType;

const PLACEHOLDER: &str = "{{TEXT}}";

struct Template {
    system_preamble: &'static str,
    body: &'static str,
}

static CATALOG: Lazy<HashMap<DocumentType, Template>> = Lazy::new(|| {
    let mut m = HashMap::new();
    m.insert(
        DocumentType::General,
        Template {
            system_preamble: "You correct OCR output. Fix character substitutions, spacing, and punctuation. Preserve meaning and line structure. Return only the corrected text.",
            body: "Correct the OCR errors in the following text:\n\n{{TEXT}}",
        },
    );
    m.insert(
        DocumentType::Code,
        Template {
            system_preamble: "You correct OCR output from source code listings. Preserve exact indentation, symbols, and identifiers. Return only the corrected code, no commentary.",
            body: "Correct the OCR errors in the following code listing, keeping syntax valid:\n\n{{TEXT}}",
        },
    );
    m.insert(
        DocumentType::Invoice,
        Template {
            system_preamble: "You correct OCR output from invoices and receipts. Preserve every amount, date, and line-item exactly; only fix character recognition errors.",
            body: "Correct the OCR errors in the following invoice text, keeping all amounts and dates intact:\n\n{{TEXT}}",
        },
    );
    m.insert(
        DocumentType::Form,
        Template {
            system_preamble: "You correct OCR output from filled forms. Preserve the label: value structure on each line.",
            body: "Correct the OCR errors in the following form text, keeping each field's label and value on its own line:\n\n{{TEXT}}",
        },
    );
    m.insert(
        DocumentType::Handwritten,
        Template {
            system_preamble: "You correct OCR output transcribed from handwriting, which tends to have more substitution and segmentation errors than printed text. Use context to resolve ambiguity.",
            body: "Correct the OCR errors in the following handwritten-text transcription:\n\n{{TEXT}}",
        },
    );
    m.insert(
        DocumentType::Multilingual,
        Template {
            system_preamble: "You correct OCR output that may be missing diacritics or mixing scripts. Restore diacritics and correct character substitutions without translating the text.",
            body: "Correct the OCR errors in the following text, restoring any missing diacritics:\n\n{{TEXT}}",
        },
    );
    m
});

/// A rendered prompt ready to become the Orchestrator's system/user turns.
pub struct RenderedPrompt {
    pub system: String,
    pub user: String,
    /// Set when the requested document type had no catalog entry and the
    /// general template was used instead.
    pub fell_back_to_general: bool,
}

/// Fetch and render the template for `document_type`. Missing types fall
/// back to `General` with `fell_back_to_general` set.
pub fn render(document_type: DocumentType, text: &str) -> RenderedPrompt {
    let (template, fell_back_to_general) = match CATALOG.get(&document_type) {
        Some(t) => (t, false),
        None => (CATALOG.get(&DocumentType::General).expect("general template always present"), true),
    };

    RenderedPrompt {
        system: template.system_preamble.to_string(),
        user: template.body.replace(PLACEHOLDER, text),
        fell_back_to_general,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_document_type_has_a_template() {
        for dt in [
            DocumentType::General,
            DocumentType::Code,
            DocumentType::Invoice,
            DocumentType::Form,
            DocumentType::Handwritten,
            DocumentType::Multilingual,
        ] {
            let rendered = render(dt, "sample");
            assert!(!rendered.fell_back_to_general);
            assert!(rendered.user.contains("sample"));
        }
    }

    #[test]
    fn substitution_is_literal_single_shot() {
        let rendered = render(DocumentType::General, "{{TEXT}} again");
        // The literal occurrence in the input text is not re-expanded.
        assert_eq!(rendered.user.matches("{{TEXT}}").count(), 1);
    }
}
