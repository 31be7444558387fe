//! Validation and normalization utilities for the stock filler

use validator::ValidationError;

pub const DEFAULT_OUTPUT_NAME: &str = "filled_template";
pub const XLSX_EXTENSION: &str = ".xlsx";

// ============================================================================
// Product Names
// ============================================================================

/// Loose product-name key: uppercase, with every space and every letter `S`
/// removed.
///
/// `Apple Boxes`, `APPLE BOXE` and `applebox e` share one key. Dropping every
/// `S` can also merge unrelated names, so callers try an exact match first.
pub fn normalize_name(name: &str) -> String {
    name.to_uppercase()
        .chars()
        .filter(|c| *c != ' ' && *c != 'S')
        .collect()
}

// ============================================================================
// Output Files
// ============================================================================

/// Download filename for a requested output name.
///
/// One trailing `.xlsx` is stripped, the rest trimmed, and `.xlsx` appended.
/// An empty name falls back to `filled_template.xlsx`.
pub fn output_file_name(requested: &str) -> String {
    let stem = requested
        .strip_suffix(XLSX_EXTENSION)
        .unwrap_or(requested)
        .trim();
    let stem = if stem.is_empty() {
        DEFAULT_OUTPUT_NAME
    } else {
        stem
    };
    format!("{stem}{XLSX_EXTENSION}")
}

/// Output names end up in a `Content-Disposition` header; keep them to
/// characters that cannot break out of the quoted filename.
pub fn validate_output_name(name: &str) -> Result<(), ValidationError> {
    let forbidden = ['"', '\\', '/', '\r', '\n', '\0'];
    if name.chars().any(|c| forbidden.contains(&c) || c.is_control()) {
        let mut err = ValidationError::new("invalid_characters");
        err.message = Some("Output name cannot contain quotes, slashes or control characters".into());
        return Err(err);
    }
    Ok(())
}
