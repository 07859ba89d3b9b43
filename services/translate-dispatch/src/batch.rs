//! JSON Lines batch input and output
//!
//! Input: one chat-completions payload (a JSON object) per line, blank lines
//! skipped. Output: one result object per input payload, in input order.

use std::io::Write;
use std::path::Path;

use dispatcher::DispatchResult;
use serde_json::{Value, json};
use tokio::io::AsyncReadExt;

use crate::error::{Error, Result};

/// Read the whole batch from `path`, or from stdin when `path` is `-`.
pub async fn read_input(path: &Path) -> Result<String> {
    if path != Path::new("-") {
        return tokio::fs::read_to_string(path).await.map_err(Error::Input);
    }
    let mut buf = String::new();
    tokio::io::stdin()
        .read_to_string(&mut buf)
        .await
        .map_err(Error::Input)?;
    Ok(buf)
}

/// Parse JSONL payloads. Objects without a `model` field get `default_model`
/// when one is configured.
pub fn parse_payloads(input: &str, default_model: Option<&str>) -> Result<Vec<Value>> {
    let mut payloads = Vec::new();
    for (idx, line) in input.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let mut value: Value = serde_json::from_str(line).map_err(|e| Error::InvalidPayload {
            line: idx + 1,
            message: e.to_string(),
        })?;
        let Some(object) = value.as_object_mut() else {
            return Err(Error::InvalidPayload {
                line: idx + 1,
                message: "payload must be a JSON object".into(),
            });
        };
        if let Some(model) = default_model
            && !object.contains_key("model")
        {
            object.insert("model".into(), Value::String(model.to_owned()));
        }
        payloads.push(value);
    }
    Ok(payloads)
}

/// Minimal one-token request used by `--health-check`.
pub fn probe_payload(model: &str) -> Value {
    json!({
        "model": model,
        "messages": [{"role": "user", "content": "ping"}],
        "max_tokens": 1,
    })
}

/// Output record for the payload at `index`.
pub fn result_line(index: usize, result: &DispatchResult) -> Value {
    json!({
        "index": index,
        "error_code": result.error_code.label(),
        "code": result.error_code.code(),
        "message": result.error_code.message(),
        "response": result.response,
    })
}

/// Write one JSON line per result and flush.
pub fn write_results<W: Write>(mut out: W, results: &[DispatchResult]) -> Result<()> {
    for (index, result) in results.iter().enumerate() {
        let line = result_line(index, result);
        writeln!(out, "{line}").map_err(Error::Output)?;
    }
    out.flush().map_err(Error::Output)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_lines_and_skips_blanks() {
        let input = "{\"model\":\"a\",\"messages\":[]}\n\n   \n{\"model\":\"b\",\"messages\":[]}\n";
        let payloads = parse_payloads(input, None).unwrap();
        assert_eq!(payloads.len(), 2);
        assert_eq!(payloads[1]["model"], "b");
    }

    #[test]
    fn fills_missing_model_only() {
        let input = "{\"messages\":[]}\n{\"model\":\"explicit\",\"messages\":[]}\n";
        let payloads = parse_payloads(input, Some("default-model")).unwrap();
        assert_eq!(payloads[0]["model"], "default-model");
        assert_eq!(payloads[1]["model"], "explicit");
    }

    #[test]
    fn reports_line_number_of_bad_json() {
        let input = "{\"model\":\"a\"}\n\n{not json\n";
        match parse_payloads(input, None) {
            Err(Error::InvalidPayload { line, .. }) => assert_eq!(line, 3),
            other => panic!("expected InvalidPayload, got {other:?}"),
        }
    }

    #[test]
    fn rejects_non_object_payload() {
        let err = parse_payloads("[1, 2, 3]\n", None).unwrap_err();
        assert!(err.to_string().contains("must be a JSON object"));
    }

    #[test]
    fn writes_one_line_per_result_in_order() {
        let results = vec![
            DispatchResult::success(json!({"choices": []})),
            DispatchResult::no_key_available(),
            DispatchResult::retry_max_exceeded(),
        ];
        let mut out = Vec::new();
        write_results(&mut out, &results).unwrap();

        let text = String::from_utf8(out).unwrap();
        let lines: Vec<Value> = text
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0]["index"], 0);
        assert_eq!(lines[0]["error_code"], "none");
        assert_eq!(lines[0]["response"], json!({"choices": []}));
        assert_eq!(lines[1]["error_code"], "no_key_available");
        assert_eq!(lines[1]["code"], 1002);
        assert!(lines[1]["response"].is_null());
        assert_eq!(lines[2]["code"], 1003);
    }

    #[test]
    fn probe_names_model() {
        let probe = probe_payload("m");
        assert_eq!(probe["model"], "m");
        assert_eq!(probe["max_tokens"], 1);
    }

    #[tokio::test]
    async fn reads_input_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("batch.jsonl");
        std::fs::write(&path, "{\"model\":\"a\"}\n").unwrap();

        let text = read_input(&path).await.unwrap();
        assert_eq!(parse_payloads(&text, None).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn missing_input_file_is_input_error() {
        let result = read_input(Path::new("/nonexistent/batch.jsonl")).await;
        assert!(matches!(result, Err(Error::Input(_))));
    }
}
