//! JSON output for the CLI
//!
//! - Exactly one JSON object per invocation, on stdout
//! - Logs go to stderr and never interleave with responses
//! - UTF-8 only

use std::io::{self, Write};

use serde_json::{json, Value};

use super::errors::CliResult;

/// Success envelope
pub fn ok_envelope(data: Value) -> Value {
    json!({
        "status": "ok",
        "data": data
    })
}

/// Error envelope
pub fn error_envelope(code: &str, message: &str) -> Value {
    json!({
        "status": "error",
        "code": code,
        "message": message
    })
}

/// Write one envelope followed by a newline.
pub fn write_envelope<W: Write>(out: &mut W, envelope: &Value) -> CliResult<()> {
    serde_json::to_writer(&mut *out, envelope)?;
    writeln!(out)?;
    out.flush()?;
    Ok(())
}

/// Write a success response to stdout
pub fn write_response(data: Value) -> CliResult<()> {
    write_envelope(&mut io::stdout(), &ok_envelope(data))
}

/// Write an error response to stdout
pub fn write_error(code: &str, message: &str) -> CliResult<()> {
    write_envelope(&mut io::stdout(), &error_envelope(code, message))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ok_envelope_line() {
        let mut out = Vec::new();
        write_envelope(&mut out, &ok_envelope(json!({"name": "apps.corp.com"}))).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.ends_with('\n'));
        let parsed: Value = serde_json::from_str(text.trim()).unwrap();
        assert_eq!(parsed["status"], "ok");
        assert_eq!(parsed["data"]["name"], "apps.corp.com");
    }

    #[test]
    fn test_error_envelope() {
        let value = error_envelope("DIRPART_NOT_FOUND", "Partition not found: x");
        assert_eq!(value["status"], "error");
        assert_eq!(value["code"], "DIRPART_NOT_FOUND");
    }
}
