//! Series extraction from the raw page document, for when no script can run.
//!
//! Chart pages usually ship their series as a JS object literal inside an
//! inline `<script>`. We find `series: [...]`, cut the balanced literal out,
//! repair it into JSON and decode it like a chart-library series array.

use crate::domain::series::RawSeries;
use anyhow::{Context, Result};
use regex::Regex;
use serde_json::Value;
use std::sync::OnceLock;

fn series_key_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"["']?\bseries["']?\s*:\s*\["#).expect("series key regex is valid")
    })
}

/// Returns the first embedded series literal that decodes into at least one
/// series with points. `Ok(None)` means no literal matched.
pub fn extract_series(document: &str) -> Result<Option<Vec<RawSeries>>> {
    let mut last_err = None;

    for m in series_key_re().find_iter(document) {
        let open = m.end() - 1;
        let Some(literal) = balanced_array(document, open) else {
            continue;
        };

        match parse_literal(literal) {
            Ok(series) if !series.is_empty() => return Ok(Some(series)),
            Ok(_) => {}
            Err(err) => last_err = Some(err),
        }
    }

    match last_err {
        Some(err) => Err(err),
        None => Ok(None),
    }
}

fn parse_literal(literal: &str) -> Result<Vec<RawSeries>> {
    let repaired = repair_literal(literal);
    let value: Value = serde_json::from_str(&repaired)
        .with_context(|| format!("embedded series literal is not valid JSON after repair: {repaired}"))?;

    let Value::Array(items) = value else {
        anyhow::bail!("embedded series literal is not an array");
    };

    Ok(items
        .iter()
        .filter_map(RawSeries::from_chart_series)
        .filter(|s| !s.points.is_empty())
        .collect())
}

/// Rewrites a JS object literal into strict JSON: typographic and single
/// quotes become double quotes, bare keys get quoted, trailing commas go.
/// Double-quoted strings are copied untouched.
pub fn repair_literal(literal: &str) -> String {
    let normalized = literal
        .replace(['\u{201C}', '\u{201D}'], "\"")
        .replace(['\u{2018}', '\u{2019}'], "'");
    let chars: Vec<char> = normalized.chars().collect();
    let mut out = String::with_capacity(chars.len() + 16);
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            '"' => {
                let end = string_end(&chars, i);
                out.extend(&chars[i..end]);
                i = end;
            }
            '\'' | '`' => {
                let end = string_end(&chars, i);
                out.push('"');
                let mut j = i + 1;
                let close = if end > i + 1 && chars[end - 1] == c { end - 1 } else { end };
                while j < close {
                    match chars[j] {
                        '\\' if j + 1 < close && (chars[j + 1] == '\'' || chars[j + 1] == '`') => {
                            out.push(chars[j + 1]);
                            j += 2;
                            continue;
                        }
                        '\\' if j + 1 < close => {
                            out.push('\\');
                            out.push(chars[j + 1]);
                            j += 2;
                            continue;
                        }
                        '"' => out.push_str("\\\""),
                        other => out.push(other),
                    }
                    j += 1;
                }
                out.push('"');
                i = end;
            }
            ',' if matches!(next_significant(&chars, i + 1), Some('}' | ']')) => {
                i += 1;
            }
            c if c.is_ascii_alphanumeric() || c == '_' || c == '$' => {
                let start = i;
                while i < chars.len()
                    && (chars[i].is_ascii_alphanumeric() || matches!(chars[i], '_' | '$' | '.'))
                {
                    i += 1;
                }
                let word: String = chars[start..i].iter().collect();
                let is_key = !c.is_ascii_digit() && next_significant(&chars, i) == Some(':');
                if is_key {
                    out.push('"');
                    out.push_str(&word);
                    out.push('"');
                } else {
                    out.push_str(&word);
                }
            }
            other => {
                out.push(other);
                i += 1;
            }
        }
    }
    out
}

/// Index just past the string literal opening at `start`, or the end of
/// input when it never closes.
fn string_end(chars: &[char], start: usize) -> usize {
    let quote = chars[start];
    let mut escaped = false;
    for (offset, &c) in chars[start + 1..].iter().enumerate() {
        if escaped {
            escaped = false;
        } else if c == '\\' {
            escaped = true;
        } else if c == quote {
            return start + offset + 2;
        }
    }
    chars.len()
}

fn next_significant(chars: &[char], from: usize) -> Option<char> {
    chars.get(from..)?.iter().copied().find(|c| !c.is_whitespace())
}

/// Slice from the `[` at `open` through its matching `]`, skipping brackets
/// inside string literals.
fn balanced_array(s: &str, open: usize) -> Option<&str> {
    let bytes = s.as_bytes();
    if bytes.get(open) != Some(&b'[') {
        return None;
    }

    let mut depth = 0usize;
    let mut quote: Option<u8> = None;
    let mut escaped = false;

    for (i, &b) in bytes.iter().enumerate().skip(open) {
        if let Some(q) = quote {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == q {
                quote = None;
            }
            continue;
        }

        match b {
            b'"' | b'\'' | b'`' => quote = Some(b),
            b'[' => depth += 1,
            b']' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&s[open..=i]);
                }
            }
            _ => {}
        }
    }
    None
}
