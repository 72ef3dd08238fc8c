use serde::Serialize;

/// Fields pulled out of the recognized text of one identity document.
///
/// Derived entirely from `raw_text`; the same text always yields the same value.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct IdCardFields {
    /// OCR output, verbatim (including trailing form feeds the engine emits).
    pub raw_text: String,
    /// First standalone run of exactly eight digits.
    pub extracted_id: Option<String>,
    /// Date-like substrings in order of appearance, duplicates kept.
    pub extracted_dates: Vec<String>,
    /// Non-blank lines, trimmed.
    pub lines: Vec<String>,
}
