use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};

/// Renderable artifact content, one variant per canvas kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CanvasPayload {
    DataFrame {
        columns: Vec<String>,
        rows: Vec<Vec<String>>,
    },
    Chart {
        spec: Value,
    },
    Image {
        path: String,
    },
    Diagram {
        source: String,
    },
    Markdown {
        text: String,
    },
}

impl CanvasPayload {
    pub fn kind(&self) -> &'static str {
        match self {
            CanvasPayload::DataFrame { .. } => "dataframe",
            CanvasPayload::Chart { .. } => "chart",
            CanvasPayload::Image { .. } => "image",
            CanvasPayload::Diagram { .. } => "diagram",
            CanvasPayload::Markdown { .. } => "markdown",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanvasItem {
    pub id: String,
    #[serde(flatten)]
    pub payload: CanvasPayload,
    pub created_at_ms: u64,
    pub collapsed: bool,
    pub archived: bool,
}

static ITEM_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Unique `canvas_<8 hex>` id, stable for the lifetime of the item.
pub fn generate_item_id() -> String {
    let count = ITEM_COUNTER.fetch_add(1, Ordering::Relaxed);
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0);
    let mixed = nanos.wrapping_mul(0x9e37_79b9).wrapping_add(count << 16 | count);
    format!("canvas_{:08x}", mixed as u32)
}

/// Parse a tool result into artifact content.
///
/// Tool results carry either a JSON object describing the artifact or a
/// plain string; plain strings containing a mermaid fence become diagrams,
/// anything else is markdown.
pub fn parse_artifact(content: &str) -> CanvasPayload {
    if let Ok(value) = serde_json::from_str::<Value>(content) {
        if value.is_object() {
            return parse_artifact_value(&value);
        }
    }
    parse_text_artifact(content)
}

pub fn parse_artifact_value(value: &Value) -> CanvasPayload {
    let Some(map) = value.as_object() else {
        return parse_text_artifact(&value.to_string());
    };

    match map.get("type").and_then(Value::as_str) {
        Some("dataframe") => {
            if let Some(payload) = parse_dataframe(value) {
                return payload;
            }
        }
        Some("chart") | Some("plotly") => {
            let spec = map
                .get("spec")
                .or_else(|| map.get("data"))
                .cloned()
                .unwrap_or_else(|| value.clone());
            return CanvasPayload::Chart { spec };
        }
        Some("mermaid") | Some("diagram") => {
            if let Some(source) = map.get("data").or_else(|| map.get("source")).and_then(Value::as_str) {
                return CanvasPayload::Diagram {
                    source: source.trim().to_string(),
                };
            }
        }
        Some("image") | Some("matplotlib") => {
            if let Some(path) = map.get("file").or_else(|| map.get("path")).and_then(Value::as_str) {
                return CanvasPayload::Image {
                    path: path.to_string(),
                };
            }
        }
        Some("markdown") => {
            if let Some(text) = map.get("data").or_else(|| map.get("text")).and_then(Value::as_str) {
                return CanvasPayload::Markdown {
                    text: text.trim().to_string(),
                };
            }
        }
        // Chart dicts often arrive without a type tag.
        None if map.contains_key("data") && map.contains_key("layout") => {
            return CanvasPayload::Chart {
                spec: value.clone(),
            };
        }
        _ => {}
    }

    parse_text_artifact(&value.to_string())
}

fn parse_dataframe(value: &Value) -> Option<CanvasPayload> {
    let columns: Vec<String> = value
        .get("columns")?
        .as_array()?
        .iter()
        .map(|c| c.as_str().map(str::to_string))
        .collect::<Option<_>>()?;

    let rows = if let Some(rows) = value.get("rows").and_then(Value::as_array) {
        rows.iter()
            .map(|row| {
                row.as_array()
                    .map(|cells| cells.iter().map(cell_text).collect())
            })
            .collect::<Option<Vec<Vec<String>>>>()?
    } else {
        // Record form: one object per row keyed by column name.
        value
            .get("data")?
            .as_array()?
            .iter()
            .map(|record| {
                record.as_object().map(|fields| {
                    columns
                        .iter()
                        .map(|col| fields.get(col).map(cell_text).unwrap_or_default())
                        .collect()
                })
            })
            .collect::<Option<Vec<Vec<String>>>>()?
    };

    Some(CanvasPayload::DataFrame { columns, rows })
}

fn cell_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn parse_text_artifact(content: &str) -> CanvasPayload {
    if let Some(source) = extract_mermaid_fence(content) {
        return CanvasPayload::Diagram { source };
    }
    CanvasPayload::Markdown {
        text: content.trim().to_string(),
    }
}

fn extract_mermaid_fence(content: &str) -> Option<String> {
    let start = content.find("```mermaid")?;
    let body = &content[start + "```mermaid".len()..];
    let end = body.find("```")?;
    Some(body[..end].trim().to_string())
}
