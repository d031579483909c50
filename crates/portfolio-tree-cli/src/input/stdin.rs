use serde::de::DeserializeOwned;
use std::io::{self, Read};
use tracing::debug;

/// Typed request piped on stdin, as JSON or YAML. `None` when stdin is a
/// terminal or carries nothing but whitespace.
pub fn read_piped<T: DeserializeOwned>() -> Result<Option<T>, Box<dyn std::error::Error>> {
    if atty::is(atty::Stream::Stdin) {
        return Ok(None);
    }

    let mut buffer = String::new();
    io::stdin().read_to_string(&mut buffer)?;
    let body = buffer.trim();
    if body.is_empty() {
        return Ok(None);
    }
    debug!(bytes = body.len(), "read request from stdin");

    if body.starts_with('{') || body.starts_with('[') {
        return Ok(Some(serde_json::from_str(body)?));
    }
    serde_yaml::from_str(body)
        .map(Some)
        .map_err(|e| format!("stdin is neither JSON nor YAML: {e}").into())
}
