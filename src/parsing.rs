use regex::Regex;
use std::sync::OnceLock;
use thiserror::Error;

use crate::types::NOT_AVAILABLE;

/// Why a candidate file produced no probe targets.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    #[error("could not read file: {0}")]
    Unreadable(String),
    #[error("no `{0}` assignment found")]
    NoAssignment(String),
    #[error("`{0}` literal is missing its closing bracket")]
    UnterminatedLiteral(String),
    #[error("expected at least 3 elements, found {0}")]
    TooFewSegments(usize),
    #[error("no https://...metrics URLs in the first element")]
    NoUrls,
    #[error("client tag is missing")]
    MissingClient,
    #[error("environment tag is missing")]
    MissingEnv,
}

/// URLs and tags declared in a batch source file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmbeddedConfig {
    pub urls: Vec<String>,
    pub client: String,
    pub env: String,
}

/// Derive `(client, env)` from a URL shaped like
/// `https://host/CLIENT/<anything>/ENVxxx/...`.
///
/// Client is the 4th `/`-separated segment, env the upper-cased first three
/// characters of the 6th. Anything shorter yields `("N/A", "N/A")`.
pub fn extract_info_from_url(url: &str) -> (String, String) {
    let parts: Vec<&str> = url.split('/').collect();
    match (parts.get(3), parts.get(5)) {
        (Some(client), Some(env_source)) => {
            let env: String = env_source.chars().take(3).collect();
            (client.to_string(), env.to_uppercase())
        }
        _ => (NOT_AVAILABLE.to_string(), NOT_AVAILABLE.to_string()),
    }
}

fn url_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r#"["'](https://[^"']*?metrics)["']"#).expect("static URL pattern compiles")
    })
}

/// Find `<variable> = [ ... ]` in `text` and parse it as
/// `[[url, ...], client, env, ...]`.
///
/// The literal may span lines. Only the first assignment is considered.
pub fn parse_embedded_config(text: &str, variable: &str) -> Result<EmbeddedConfig, SkipReason> {
    let assignment = Regex::new(&format!(r"\b{}\s*=\s*\[", regex::escape(variable)))
        .map_err(|_| SkipReason::NoAssignment(variable.to_string()))?;
    let start = assignment
        .find(text)
        .ok_or_else(|| SkipReason::NoAssignment(variable.to_string()))?
        .end();

    let segments = literal_elements(&text[start..])
        .ok_or_else(|| SkipReason::UnterminatedLiteral(variable.to_string()))?;
    if segments.len() < 3 {
        return Err(SkipReason::TooFewSegments(segments.len()));
    }

    let urls: Vec<String> = url_pattern()
        .captures_iter(&segments[0])
        .map(|c| c[1].to_string())
        .collect();
    if urls.is_empty() {
        return Err(SkipReason::NoUrls);
    }

    let client = unquote(&segments[1]);
    if client.is_empty() {
        return Err(SkipReason::MissingClient);
    }
    let env = unquote(&segments[2]);
    if env.is_empty() {
        return Err(SkipReason::MissingEnv);
    }

    Ok(EmbeddedConfig { urls, client, env })
}

/// Top-level elements of a literal whose opening `[` is already consumed,
/// with `#` comments stripped. `None` if the matching `]` never comes.
///
/// Quotes hide brackets, commas and `#` from the scan.
fn literal_elements(rest: &str) -> Option<Vec<String>> {
    let mut elements = Vec::new();
    let mut current = String::new();
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut escaped = false;
    let mut in_comment = false;

    for c in rest.chars() {
        if in_comment {
            if c == '\n' {
                in_comment = false;
                current.push(c);
            }
            continue;
        }
        if let Some(q) = quote {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == q {
                quote = None;
            }
            current.push(c);
            continue;
        }
        match c {
            '#' => {
                in_comment = true;
                continue;
            }
            ']' if depth == 0 => {
                // a trailing comma doesn't open another element
                if !current.trim().is_empty() {
                    elements.push(current);
                }
                return Some(elements);
            }
            ',' if depth == 0 => {
                elements.push(std::mem::take(&mut current));
                continue;
            }
            '"' | '\'' => quote = Some(c),
            '[' | '(' | '{' => depth += 1,
            ']' | ')' | '}' => depth = depth.saturating_sub(1),
            _ => {}
        }
        current.push(c);
    }
    None
}

fn unquote(segment: &str) -> String {
    segment.replace(['"', '\''], "").trim().to_string()
}
