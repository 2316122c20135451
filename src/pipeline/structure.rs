//! AI structuring: recognized text in, canonical table model out.
//!
//! The AI call runs under a hard deadline with a small fixed attempt budget.
//! Failure routing is deliberate:
//!
//! * authentication failures abort immediately — retrying cannot help;
//! * quota exhaustion and timeouts exhaust the attempt budget, then surface
//!   as typed errors so a later retry request can succeed;
//! * everything else (blocked responses, transport failures, unparseable
//!   output) degrades to the naive structural fallback — a job never fails
//!   just because the model had a bad day.
//!
//! The naive fallback guarantees the terminal invariant: any non-empty text
//! always yields a valid [`TableSet`].

use crate::backend::{BackendError, GenerateRequest, GenerativeBackend};
use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::prompts;
use crate::table::{StructuredTable, TableSet};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

/// Structure recognized text into the canonical table model.
///
/// Uses the AI backend when possible, the naive fallback otherwise. Errors
/// are returned only for failures a retry could fix or the operator must see.
pub async fn structure_text(
    text: &str,
    ai: &dyn GenerativeBackend,
    config: &PipelineConfig,
) -> Result<TableSet, PipelineError> {
    if text.trim().is_empty() {
        return Ok(TableSet::empty_fallback());
    }

    let prompt = format!(
        "{}\n\n{}",
        prompts::text_prompt(config.prompt_contract),
        prompts::text_payload(text)
    );
    let request = GenerateRequest {
        prompt,
        images: Vec::new(),
        temperature: config.temperature,
        max_tokens: config.max_tokens,
    };

    let response = call_with_deadline(ai, &request, config).await?;
    match parse_table_payload(&response) {
        Some(tables) if !tables.tables.is_empty() => {
            debug!(tables = tables.tables.len(), rows = tables.row_count(), "AI structuring ok");
            Ok(tables)
        }
        _ => {
            warn!("AI response unusable, applying naive fallback");
            Ok(naive_fallback(text))
        }
    }
}

/// Run one AI request under the configured deadline and attempt budget.
///
/// Returns `Ok(String::new())` when every attempt failed in a way the naive
/// fallback should absorb, and `Err` for auth, quota, and timeout failures
/// that the caller must surface.
pub async fn call_with_deadline(
    ai: &dyn GenerativeBackend,
    request: &GenerateRequest,
    config: &PipelineConfig,
) -> Result<String, PipelineError> {
    let deadline = Duration::from_secs(config.ai_timeout_secs);
    let mut timed_out = false;
    let mut quota: Option<String> = None;

    for attempt in 1..=config.ai_attempts {
        match tokio::time::timeout(deadline, ai.generate(request)).await {
            Ok(Ok(content)) => return Ok(content),
            Ok(Err(BackendError::Auth(detail))) => {
                return Err(PipelineError::AiAuth { detail });
            }
            Ok(Err(BackendError::Quota(detail))) => {
                warn!(attempt, "AI quota failure: {detail}");
                quota = Some(detail);
            }
            Ok(Err(err)) => {
                warn!(attempt, "AI call failed: {err}");
            }
            Err(_elapsed) => {
                warn!(attempt, timeout_secs = config.ai_timeout_secs, "AI call timed out");
                timed_out = true;
            }
        }
    }

    if let Some(detail) = quota {
        return Err(PipelineError::AiQuota { detail });
    }
    if timed_out {
        return Err(PipelineError::AiTimeout {
            secs: config.ai_timeout_secs,
        });
    }
    Ok(String::new())
}

#[derive(Deserialize)]
struct WireDocument {
    tables: Vec<WireTable>,
}

#[derive(Deserialize)]
struct WireTable {
    #[serde(default)]
    name: String,
    #[serde(default)]
    headers: Vec<serde_json::Value>,
    #[serde(default)]
    rows: Vec<Vec<serde_json::Value>>,
}

/// Extract and parse the `tables` JSON object from a model response.
///
/// Models wrap JSON in prose and code fences no matter how firmly the prompt
/// forbids it, so this scans for the first balanced object that deserializes.
pub fn parse_table_payload(response: &str) -> Option<TableSet> {
    let object = extract_json_object(response)?;
    let wire: WireDocument = serde_json::from_str(object).ok()?;
    let tables = wire
        .tables
        .into_iter()
        .map(|t| {
            let name = if t.name.trim().is_empty() {
                "main".to_string()
            } else {
                t.name
            };
            let headers = t.headers.iter().map(value_to_cell).collect();
            let rows = t
                .rows
                .iter()
                .map(|row| row.iter().map(value_to_cell).collect())
                .collect();
            StructuredTable::new(name, headers, rows)
        })
        .collect();
    Some(TableSet::new(tables))
}

fn value_to_cell(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::Null => String::new(),
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Find the first balanced `{...}` object in free-form text, respecting
/// string literals and escapes.
fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let bytes = text.as_bytes();
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (offset, &b) in bytes[start..].iter().enumerate() {
        if escaped {
            escaped = false;
            continue;
        }
        match b {
            b'\\' if in_string => escaped = true,
            b'"' => in_string = !in_string,
            b'{' if !in_string => depth += 1,
            b'}' if !in_string => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..=start + offset]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Deterministic structural fallback when no AI output is usable.
///
/// When every non-empty line splits into the same number of whitespace
/// tokens, the text is treated as a column grid with generated `col1..colN`
/// headers. Otherwise every line becomes one row of a single `text` column.
/// Input order is preserved in both shapes.
pub fn naive_fallback(text: &str) -> TableSet {
    let lines: Vec<&str> = text.lines().filter(|l| !l.trim().is_empty()).collect();
    if lines.is_empty() {
        return TableSet::empty_fallback();
    }

    let widths: Vec<usize> = lines
        .iter()
        .map(|l| l.split_whitespace().count())
        .collect();
    let first = widths[0];
    let uniform = widths.iter().all(|&w| w == first);

    if uniform {
        let headers = (1..=first).map(|i| format!("col{i}")).collect();
        let rows = lines
            .iter()
            .map(|l| l.split_whitespace().map(str::to_string).collect())
            .collect();
        TableSet::new(vec![StructuredTable::new("main", headers, rows)])
    } else {
        let rows = lines.iter().map(|l| vec![l.trim().to_string()]).collect();
        TableSet::new(vec![StructuredTable::new(
            "main",
            vec!["text".to_string()],
            rows,
        )])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_extracted_from_fenced_response() {
        let response = "Here you go:\n```json\n{\"tables\":[{\"name\":\"main\",\"headers\":[\"a\"],\"rows\":[[\"1\"]]}]}\n```\nDone.";
        let tables = parse_table_payload(response).unwrap();
        assert_eq!(tables.tables.len(), 1);
        assert_eq!(tables.tables[0].rows[0][0], "1");
    }

    #[test]
    fn braces_inside_strings_do_not_confuse_extraction() {
        let response = r#"{"tables":[{"name":"m{a}in","headers":["x"],"rows":[["{\"nested\": true}"]]}]}"#;
        let tables = parse_table_payload(response).unwrap();
        assert_eq!(tables.tables[0].name, "m{a}in");
    }

    #[test]
    fn numeric_and_null_cells_become_strings() {
        let response = r#"{"tables":[{"name":"main","headers":["a","b"],"rows":[[100, null]]}]}"#;
        let tables = parse_table_payload(response).unwrap();
        assert_eq!(tables.tables[0].rows[0], vec!["100".to_string(), String::new()]);
    }

    #[test]
    fn garbage_yields_none() {
        assert!(parse_table_payload("no json here").is_none());
        assert!(parse_table_payload("{\"wrong\": true}").is_none());
        assert!(parse_table_payload("{unbalanced").is_none());
    }

    #[test]
    fn fallback_detects_uniform_grid() {
        let text = "2024-01-01 deposit 100\n2024-01-02 withdrawal 50";
        let tables = naive_fallback(text);
        let t = &tables.tables[0];
        assert_eq!(t.headers, vec!["col1", "col2", "col3"]);
        assert_eq!(t.rows.len(), 2);
        assert_eq!(t.rows[1][2], "50");
    }

    #[test]
    fn fallback_irregular_text_becomes_single_column() {
        let text = "Account statement\n\n2024-01-01 deposit 100\nthanks";
        let tables = naive_fallback(text);
        let t = &tables.tables[0];
        assert_eq!(t.headers, vec!["text"]);
        assert_eq!(t.rows.len(), 3);
        assert_eq!(t.rows[0][0], "Account statement");
    }

    #[test]
    fn fallback_uniform_single_token_lines_form_one_column_grid() {
        let tables = naive_fallback("alpha\nbeta");
        let t = &tables.tables[0];
        assert_eq!(t.headers, vec!["col1"]);
        assert_eq!(t.rows, vec![vec!["alpha".to_string()], vec!["beta".to_string()]]);
    }
}
