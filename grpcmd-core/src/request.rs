//! # Request Text
//!
//! Splits the free-form text of a request into its headers and its raw JSON body.
//!
//! ```text
//! authorization: Bearer 1234
//! x-request-id: 42
//!
//! {"message": "hello"}
//! ```
//!
//! Two grammars are supported:
//!
//! * [`parse_request`] (strict): a MIME-style header block terminated by a blank line, then
//!   the body. Text that starts directly with the JSON body carries no header block.
//!   Continuation lines (starting with a space or a tab) fold into the previous header.
//! * [`parse_request_heuristic`]: everything before the first `{` is the header block and
//!   everything from it on is the body.
//!
//! Repeated keys produce one `"Key: Value"` entry each, in input order.

/// Headers and raw body of one request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestEnvelope {
    /// Header strings formatted as `"Key: Value"`.
    pub headers: Vec<String>,
    /// The raw body: zero, one or several concatenated JSON objects.
    pub body: String,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RequestParseError {
    #[error("error while parsing headers:\n\tmalformed header line {line}: {text:?}")]
    MalformedHeader { line: usize, text: String },
    #[error("error while parsing headers:\n\tcontinuation line {line} has no header to extend")]
    DanglingContinuation { line: usize },
    #[error("error while parsing headers:\n\tthe header block is not terminated by a blank line")]
    UnterminatedHeaders,
}

/// Parses `raw` with the strict grammar.
pub fn parse_request(raw: &str) -> Result<RequestEnvelope, RequestParseError> {
    if starts_with_body(raw) {
        return Ok(RequestEnvelope {
            headers: Vec::new(),
            body: raw.to_string(),
        });
    }

    let mut offset = 0;
    let mut block = Vec::new();

    for line in raw.split_inclusive('\n') {
        offset += line.len();
        let content = trim_line_ending(line);

        if content.is_empty() {
            return Ok(RequestEnvelope {
                headers: parse_header_lines(&block)?,
                body: raw[offset..].to_string(),
            });
        }

        block.push(content);
    }

    Err(RequestParseError::UnterminatedHeaders)
}

/// Parses `raw` with the heuristic grammar.
///
/// Never fails on a missing header terminator; only malformed header lines are errors.
pub fn parse_request_heuristic(raw: &str) -> Result<RequestEnvelope, RequestParseError> {
    let (head, body) = match raw.find('{') {
        Some(index) => raw.split_at(index),
        None => (raw, ""),
    };

    if head.trim().is_empty() {
        return Ok(RequestEnvelope {
            headers: Vec::new(),
            body: if body.is_empty() { String::new() } else { raw.to_string() },
        });
    }

    let lines: Vec<&str> = head.lines().map(trim_line_ending).collect();

    Ok(RequestEnvelope {
        headers: parse_header_lines(&lines)?,
        body: body.to_string(),
    })
}

/// Splits a `"Key: Value"` string at its first colon.
pub fn split_header(header: &str) -> Option<(String, String)> {
    header
        .split_once(':')
        .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
}

fn starts_with_body(raw: &str) -> bool {
    let first_line = raw.split('\n').next().unwrap_or_default();
    first_line.trim().is_empty() || raw.trim_start().starts_with('{')
}

fn trim_line_ending(line: &str) -> &str {
    line.trim_end_matches('\n').trim_end_matches('\r')
}

fn parse_header_lines(lines: &[&str]) -> Result<Vec<String>, RequestParseError> {
    let mut headers: Vec<(String, String)> = Vec::new();

    for (index, line) in lines.iter().enumerate() {
        let number = index + 1;

        if line.trim().is_empty() {
            continue;
        }

        if line.starts_with([' ', '\t']) {
            let (_, value) = headers
                .last_mut()
                .ok_or(RequestParseError::DanglingContinuation { line: number })?;
            let folded = line.trim();
            if !folded.is_empty() {
                if !value.is_empty() {
                    value.push(' ');
                }
                value.push_str(folded);
            }
            continue;
        }

        let (key, value) = split_header(line)
            .filter(|(key, _)| !key.is_empty() && !key.contains(char::is_whitespace))
            .ok_or_else(|| RequestParseError::MalformedHeader {
                line: number,
                text: line.to_string(),
            })?;

        headers.push((key, value));
    }

    Ok(headers
        .into_iter()
        .map(|(key, value)| format!("{key}: {value}"))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strict_headers_and_body() {
        let envelope = parse_request("x-key: v\n\n{\"a\":1}").unwrap();

        assert_eq!(envelope.headers, vec!["x-key: v"]);
        assert_eq!(envelope.body, "{\"a\":1}");
    }

    #[test]
    fn test_strict_headerless_body() {
        let envelope = parse_request("  {\"a\":1}").unwrap();

        assert!(envelope.headers.is_empty());
        assert_eq!(envelope.body, "  {\"a\":1}");
    }

    #[test]
    fn test_strict_empty_input() {
        assert_eq!(parse_request("").unwrap(), RequestEnvelope::default());
    }

    #[test]
    fn test_strict_repeated_keys_and_folding() {
        let raw = "x-tag: one\r\nx-tag: two\r\nx-long: first\r\n  second\r\n\r\n{}\n{}";
        let envelope = parse_request(raw).unwrap();

        assert_eq!(
            envelope.headers,
            vec!["x-tag: one", "x-tag: two", "x-long: first second"]
        );
        assert_eq!(envelope.body, "{}\n{}");
    }

    #[test]
    fn test_strict_requires_terminator() {
        assert_eq!(
            parse_request("x-key: v"),
            Err(RequestParseError::UnterminatedHeaders)
        );
    }

    #[test]
    fn test_strict_rejects_malformed_header() {
        assert_eq!(
            parse_request("x-key: v\nnot a header\n\n{}"),
            Err(RequestParseError::MalformedHeader {
                line: 2,
                text: "not a header".to_string()
            })
        );
    }

    #[test]
    fn test_heuristic_headers_and_body() {
        let envelope = parse_request_heuristic("x-key: v\n\n{\"a\":1}").unwrap();

        assert_eq!(envelope.headers, vec!["x-key: v"]);
        assert_eq!(envelope.body, "{\"a\":1}");
    }

    #[test]
    fn test_heuristic_headers_without_blank_line() {
        let envelope = parse_request_heuristic("a: 1\nb: 2\n{\"x\": {}}").unwrap();

        assert_eq!(envelope.headers, vec!["a: 1", "b: 2"]);
        assert_eq!(envelope.body, "{\"x\": {}}");
    }

    #[test]
    fn test_heuristic_headerless_body() {
        let envelope = parse_request_heuristic("  {\"a\":1}").unwrap();

        assert!(envelope.headers.is_empty());
        assert_eq!(envelope.body, "  {\"a\":1}");
    }

    #[test]
    fn test_heuristic_empty_and_blank_input() {
        assert_eq!(
            parse_request_heuristic("").unwrap(),
            RequestEnvelope::default()
        );
        assert_eq!(
            parse_request_heuristic(" \n\t ").unwrap(),
            RequestEnvelope::default()
        );
    }

    #[test]
    fn test_heuristic_headers_only() {
        let envelope = parse_request_heuristic("x-key: v\n").unwrap();

        assert_eq!(envelope.headers, vec!["x-key: v"]);
        assert_eq!(envelope.body, "");
    }

    #[test]
    fn test_heuristic_dangling_continuation() {
        assert_eq!(
            parse_request_heuristic("  folded\nx: 1\n{}"),
            Err(RequestParseError::DanglingContinuation { line: 1 })
        );
    }

    #[test]
    fn test_heuristic_skips_blank_lines_in_header_block() {
        let envelope = parse_request_heuristic("\na: 1\n\nb: 2\n\n{}").unwrap();

        assert_eq!(envelope.headers, vec!["a: 1", "b: 2"]);
        assert_eq!(envelope.body, "{}");
    }
}
