use serde_json::Value;
use std::io::{self, Write};
use tracing::warn;

/// Pretty JSON on stdout. A closed pipe (`ptree ... | head`) is not an error.
pub fn print_json(value: &Value) {
    let stdout = io::stdout();
    let mut out = stdout.lock();
    let written = serde_json::to_writer_pretty(&mut out, value)
        .map_err(io::Error::from)
        .and_then(|_| writeln!(out));
    if let Err(e) = written {
        if e.kind() != io::ErrorKind::BrokenPipe {
            warn!(error = %e, "failed to write JSON output");
        }
    }
}
