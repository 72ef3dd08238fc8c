use std::sync::OnceLock;

use regex::Regex;

use crate::types::IdCardFields;

// ── Compiled regex cache ─────────────────────────────────────────────────────

macro_rules! re {
    ($name:ident, $pat:expr) => {
        fn $name() -> &'static Regex {
            static R: OnceLock<Regex> = OnceLock::new();
            R.get_or_init(|| Regex::new($pat).expect("invalid regex"))
        }
    };
}

re!(re_id_number, r"\b\d{8}\b");

// Day-first (DD/MM/YYYY) or year-first (YYYY-MM-DD); either separator in either slot.
re!(re_date, r"\b\d{2}[/-]\d{2}[/-]\d{4}\b|\b\d{4}[/-]\d{2}[/-]\d{2}\b");

// ── Public extraction API ─────────────────────────────────────────────────────

pub struct Extractor;

impl Extractor {
    /// Extract the identifier, dates and non-blank lines from raw OCR text.
    pub fn extract(ocr_text: &str) -> IdCardFields {
        IdCardFields {
            raw_text: ocr_text.to_string(),
            extracted_id: Self::extract_id(ocr_text),
            extracted_dates: Self::extract_dates(ocr_text),
            lines: Self::extract_lines(ocr_text),
        }
    }

    fn extract_id(text: &str) -> Option<String> {
        re_id_number().find(text).map(|m| m.as_str().to_string())
    }

    fn extract_dates(text: &str) -> Vec<String> {
        re_date()
            .find_iter(text)
            .map(|m| m.as_str().to_string())
            .collect()
    }

    fn extract_lines(text: &str) -> Vec<String> {
        text.split('\n')
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
