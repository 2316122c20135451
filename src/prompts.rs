//! Prompts for AI structuring and vision extraction.
//!
//! Centralising every prompt here serves two purposes:
//!
//! 1. **Single source of truth** — the output contract (the `tables` JSON
//!    schema) is stated in exactly one place, so schema changes cannot drift
//!    between the text and vision paths.
//!
//! 2. **Testability** — unit tests can inspect prompts directly without
//!    calling a real model, making contract regressions easy to catch.
//!
//! Two mutually inconsistent contracts exist and a deployment picks one via
//! [`crate::config::PromptContract`]: *verbatim* forbids any character-level
//! change, *cleanup* asks for confident corrections and normalization. They
//! are never blended.

use crate::config::PromptContract;

/// Verbatim contract, text structuring: preserve every character exactly.
pub const VERBATIM_TEXT_PROMPT: &str = r#"You are an expert multilingual financial document parser.

Task: Structure the provided text into JSON format WITHOUT modifying any characters, words, or formatting. If no table can be inferred, fall back to a single table named 'main' with headers ['text'] and rows = each input line as a separate row (preserve order).

CRITICAL CHARACTER PRESERVATION RULES:
- NEVER autocorrect, fix, or modify any characters, words, or text from the input
- NEVER fix what appears to be OCR errors or typos - preserve them EXACTLY
- NEVER transliterate Amharic/Ethiopic characters to Latin script
- NEVER normalize or standardize formatting - keep original spacing, punctuation
- NEVER correct obvious mistakes like 0/O, 1/l, 5/S - transcribe exactly as provided
- NEVER standardize dates or numbers - keep original format exactly
- NEVER add missing punctuation or correct grammar
- NEVER change case (uppercase/lowercase) from what is provided

STRUCTURING RULES:
- Copy each character, symbol, and space EXACTLY as provided in the input text
- For tables: preserve headers exactly as written; maintain original column structure
- For key:value pairs: output as two-column table [key, value] with exact text
- For lists/paragraphs: output as single-column table preserving original line breaks
- Maintain original text order and formatting
- If structure is unclear, default to single-column table with original text

Output STRICT JSON only with this schema:
{
  "tables": [ { "name": string, "headers": [string], "rows": [[string]] } ]
}"#;

/// Verbatim contract, vision extraction: transcribe page images exactly.
pub const VERBATIM_VISION_PROMPT: &str = r#"Extract all text from this document image with ABSOLUTE CHARACTER PRESERVATION.

If you cannot confidently detect a table, produce a single table named 'main' with headers ['text'] and rows = each visual line as a separate row (preserve order).

CRITICAL CHARACTER PRESERVATION RULES:
- NEVER autocorrect, fix, or modify any characters, words, or text you see
- NEVER fix what appears to be OCR errors, typos, or misspellings - transcribe EXACTLY
- NEVER transliterate Amharic/Ethiopic characters to Latin script - preserve original script
- NEVER normalize or standardize formatting - keep original spacing and punctuation
- NEVER correct obvious mistakes like 0/O, 1/l, 5/S - transcribe exactly as shown in image
- NEVER standardize dates, numbers, or currency - keep original format (e.g., 12/5/23, not 2023-05-12)
- NEVER add missing punctuation or correct grammar
- NEVER change case (uppercase/lowercase) from what is visible
- NEVER interpret or translate abbreviations - copy exactly as shown

EXTRACTION INSTRUCTIONS:
- Copy each visible character, symbol, digit, and space EXACTLY as it appears
- Preserve all original formatting, spacing, line breaks, and alignment
- Include all visible text: printed, handwritten, stamps, signatures, watermarks
- Maintain exact table structure with original headers and cell content
- Preserve spatial relationships and reading order (top to bottom, left to right)
- If text is unclear, transcribe your best visual interpretation without correcting

Output STRICT JSON only with this schema:
{
  "tables": [ { "name": string, "headers": [string], "rows": [[string]] } ]
}"#;

/// Cleanup contract, text structuring: confident corrections allowed.
pub const CLEANUP_TEXT_PROMPT: &str = r#"You are an expert multilingual document parser for noisy bank statements and handwritten tables.
Input may contain English and Amharic (Ethiopic) text, or mixed languages. Detect language automatically.
Goal: return high-quality, CLEAN tables even from messy or nonsensical structures.

Output STRICT JSON ONLY with this schema:
{
  "tables": [ { "name": string, "headers": [string], "rows": [[string]] } ]
}

Cleaning and structuring rules (apply only when confident, otherwise keep raw):
- Preserve original language in cells (Amharic/English).
- Correct obvious typos and OCR mistakes only when HIGHLY confident (e.g., 0/O, 1/l).
- Normalize dates to ISO YYYY-MM-DD when unambiguous.
- Normalize numbers to standard digits and decimal separators; preserve currency symbol/code if present.
- Infer headers when missing; use typical banking headers when appropriate (Date, Description, Debit, Credit, Balance).
- Reconstruct irregular tables, merge split cells, remove repeated header rows, and deduplicate duplicate rows.
- Ensure consistent column count for all rows; fill missing cells with empty strings.
- Sort rows by date if a clear date column exists; otherwise preserve input order.
- If data is semi-structured (key:value), output a two-column table [key, value].
- If tabularization is impossible, output a single-column table with one item per line.
- Output JSON only, with NO commentary, headings, or Markdown."#;

/// Cleanup contract, vision extraction.
pub const CLEANUP_VISION_PROMPT: &str = r#"You are an expert multilingual document parser for noisy bank statements and handwritten tables.
Images may contain English and Amharic (Ethiopic) text. Detect languages automatically.
Goal: return high-quality, CLEAN tables even from messy or nonsensical structures.

Output STRICT JSON ONLY with this schema:
{
  "tables": [ { "name": string, "headers": [string], "rows": [[string]] } ]
}

Cleaning and structuring rules (apply only when confident, otherwise keep raw):
- Preserve original language in cells (Amharic/English).
- Correct obvious typos and OCR mistakes only when HIGHLY confident (e.g., 0/O, 1/l).
- Normalize dates to ISO YYYY-MM-DD when unambiguous.
- Normalize numbers to standard digits and decimal separators; preserve currency symbol/code if present.
- Infer headers when missing; use typical banking headers when appropriate (Date, Description, Debit, Credit, Balance).
- Reconstruct irregular tables, merge split cells, remove repeated header rows, and deduplicate duplicate rows.
- Ensure consistent column count for all rows; fill missing cells with empty strings.
- Sort rows by date if a clear date column exists; otherwise preserve input order.
- If data is semi-structured (key:value), output a two-column table [key, value].
- If tabularization is impossible, output a single-column table with one item per line.
- Output JSON only, with NO commentary, headings, or Markdown."#;

/// System prompt for structuring recognized text under the given contract.
pub fn text_prompt(contract: PromptContract) -> &'static str {
    match contract {
        PromptContract::Verbatim => VERBATIM_TEXT_PROMPT,
        PromptContract::Cleanup => CLEANUP_TEXT_PROMPT,
    }
}

/// System prompt for vision extraction from page images under the given
/// contract.
pub fn vision_prompt(contract: PromptContract) -> &'static str {
    match contract {
        PromptContract::Verbatim => VERBATIM_VISION_PROMPT,
        PromptContract::Cleanup => CLEANUP_VISION_PROMPT,
    }
}

/// Build the user message that carries the text to structure.
///
/// Delimiters keep prompt-injection inside the document from being read as
/// instructions, and make truncated inputs visible in logs.
pub fn text_payload(text: &str) -> String {
    format!("--- OCR TEXT START ---\n{}\n--- OCR TEXT END ---", text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_prompt_states_the_wire_schema() {
        for prompt in [
            VERBATIM_TEXT_PROMPT,
            VERBATIM_VISION_PROMPT,
            CLEANUP_TEXT_PROMPT,
            CLEANUP_VISION_PROMPT,
        ] {
            assert!(prompt.contains("\"tables\""), "missing schema: {prompt:.40}");
            assert!(prompt.contains("STRICT JSON"));
        }
    }

    #[test]
    fn contracts_stay_inconsistent() {
        // The verbatim prompts must forbid exactly what the cleanup prompts
        // ask for.
        assert!(VERBATIM_TEXT_PROMPT.contains("NEVER standardize dates"));
        assert!(CLEANUP_TEXT_PROMPT.contains("Normalize dates to ISO"));
    }

    #[test]
    fn payload_is_delimited() {
        let p = text_payload("hello");
        assert!(p.starts_with("--- OCR TEXT START ---"));
        assert!(p.ends_with("--- OCR TEXT END ---"));
        assert!(p.contains("hello"));
    }
}
