use serde_json::Value;
use std::fs::OpenOptions;
use std::io::{IsTerminal, Write};

const DEFAULT_LOG_PATH: &str = "/tmp/cowork-debug.log";
const DEBUG_EVENTS_ENV: &str = "COWORK_DEBUG_EVENTS";
const LOG_PATH_ENV: &str = "COWORK_LOG_PATH";

pub fn debug_events_enabled() -> bool {
    std::env::var(DEBUG_EVENTS_ENV)
        .ok()
        .and_then(crate::util::parse_bool_flag)
        .unwrap_or(false)
}

pub fn emit_chunk_trace(chunk: &Value) {
    let message = format!("COWORK DEBUG chunk\n{chunk}\n");
    emit_log_message(&message);
}

pub fn emit_parse_error(context: &str, detail: &str) {
    let message = format!("COWORK ERROR {context}\n{detail}\n");
    emit_log_message(&message);
}

pub fn emit_warning(message: &str) {
    emit_log_message(&format!("COWORK WARN {message}\n"));
}

fn emit_log_message(message: &str) {
    if let Some(path) = resolve_log_path() {
        if append_log_file(&path, message).is_ok() {
            return;
        }
    }

    eprintln!("{message}");
}

fn resolve_log_path() -> Option<String> {
    std::env::var(LOG_PATH_ENV)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .or_else(|| {
            if std::io::stderr().is_terminal() {
                Some(DEFAULT_LOG_PATH.to_string())
            } else {
                None
            }
        })
}

fn append_log_file(path: &str, message: &str) -> std::io::Result<()> {
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    file.write_all(message.as_bytes())
}
