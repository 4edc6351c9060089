use aho_corasick::AhoCorasick;
use serde_json::{json, Value};

use super::item::{generate_item_id, CanvasItem, CanvasPayload};
use crate::util::epoch_millis;

const DOCUMENT_HEADER: &str = "# Canvas";
const ITEM_MARKER: &str = "<!-- canvas-item: ";
const MARKER_END: &str = " -->";
// Bodies containing the literal marker are escaped on export so reload
// never mistakes item content for an item boundary.
const ESCAPED_MARKER: &str = "<!-- canvas-item\\: ";

/// Serialize the active sequence into one markdown document.
///
/// Each item is preceded by an HTML metadata comment so reload can recover
/// id, kind, and creation time exactly; the body uses per-kind rendering.
/// This is the persisted form: `parse_document` is its exact inverse.
pub fn export_document(items: &[CanvasItem]) -> String {
    let mut doc = String::from(DOCUMENT_HEADER);
    doc.push('\n');
    doc.push_str(&render_items(items));
    doc
}

/// Per-item sections without the top header; shared with archive snapshots.
pub fn render_items(items: &[CanvasItem]) -> String {
    let mut out = String::new();
    for item in items {
        let meta = json!({
            "id": item.id,
            "kind": item.payload.kind(),
            "created_at": item.created_at_ms,
        });
        out.push_str(&format!("\n{ITEM_MARKER}{meta}{MARKER_END}\n\n"));
        out.push_str(&render_body(&item.payload).replace(ITEM_MARKER, ESCAPED_MARKER));
        out.push('\n');
    }
    out
}

fn render_body(payload: &CanvasPayload) -> String {
    match payload {
        CanvasPayload::DataFrame { columns, rows } => render_table(columns, rows),
        CanvasPayload::Chart { spec } => {
            let pretty = serde_json::to_string_pretty(spec).unwrap_or_else(|_| spec.to_string());
            format!("```chart\n{pretty}\n```")
        }
        CanvasPayload::Image { path } => format!("![Image]({path})"),
        CanvasPayload::Diagram { source } => format!("```mermaid\n{source}\n```"),
        CanvasPayload::Markdown { text } => text.clone(),
    }
}

// Cell newlines flatten to spaces: the pipe-table form is one line per
// row, so multi-line cell content does not survive export -> reload.
fn render_table(columns: &[String], rows: &[Vec<String>]) -> String {
    let mut out = String::new();
    out.push_str(&render_row(columns.iter()));
    out.push('\n');
    out.push_str(&render_row(columns.iter().map(|_| "---").map(String::from).collect::<Vec<_>>().iter()));
    for row in rows {
        out.push('\n');
        out.push_str(&render_row(row.iter()));
    }
    out
}

fn render_row<'a>(cells: impl Iterator<Item = &'a String>) -> String {
    let escaped: Vec<String> = cells
        .map(|cell| cell.replace('|', "\\|").replace('\n', " "))
        .collect();
    format!("| {} |", escaped.join(" | "))
}

/// Reload a persisted document into an ordered item list.
///
/// Documents written by `export_document` round-trip exactly (order, kind,
/// content, and ids). Documents without metadata comments go through the
/// legacy scanner, which recovers recognizable blocks with fresh ids.
pub fn parse_document(content: &str) -> Vec<CanvasItem> {
    let markers: Vec<(usize, usize, Value)> = find_markers(content);
    if markers.is_empty() {
        return parse_legacy(content);
    }

    let mut items = Vec::new();
    for (index, (_, body_start, meta)) in markers.iter().enumerate() {
        let body_end = markers
            .get(index + 1)
            .map(|(next_start, _, _)| *next_start)
            .unwrap_or(content.len());
        let body = content[*body_start..body_end]
            .trim()
            .replace(ESCAPED_MARKER, ITEM_MARKER);

        let id = meta
            .get("id")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(generate_item_id);
        let created_at_ms = meta.get("created_at").and_then(Value::as_u64).unwrap_or(0);
        let kind = meta.get("kind").and_then(Value::as_str).unwrap_or("markdown");

        items.push(CanvasItem {
            id,
            payload: parse_body(kind, &body),
            created_at_ms,
            collapsed: false,
            archived: false,
        });
    }
    items
}

fn find_markers(content: &str) -> Vec<(usize, usize, Value)> {
    let mut markers = Vec::new();
    let mut search_from = 0;
    while let Some(offset) = content[search_from..].find(ITEM_MARKER) {
        let marker_start = search_from + offset;
        let meta_start = marker_start + ITEM_MARKER.len();
        let Some(end_offset) = content[meta_start..].find(MARKER_END) else {
            break;
        };
        let meta_end = meta_start + end_offset;
        let body_start = meta_end + MARKER_END.len();
        let meta = serde_json::from_str::<Value>(&content[meta_start..meta_end])
            .unwrap_or_else(|_| json!({}));
        markers.push((marker_start, body_start, meta));
        search_from = body_start;
    }
    markers
}

fn parse_body(kind: &str, body: &str) -> CanvasPayload {
    match kind {
        "dataframe" => parse_table(body).unwrap_or_else(|| markdown_payload(body)),
        "chart" => match extract_fence(body, "chart").and_then(|s| serde_json::from_str(&s).ok()) {
            Some(spec) => CanvasPayload::Chart { spec },
            None => markdown_payload(body),
        },
        "image" => extract_image_path(body)
            .map(|path| CanvasPayload::Image { path })
            .unwrap_or_else(|| markdown_payload(body)),
        "diagram" | "mermaid" => extract_fence(body, "mermaid")
            .map(|source| CanvasPayload::Diagram { source })
            .unwrap_or_else(|| markdown_payload(body)),
        _ => markdown_payload(body),
    }
}

fn markdown_payload(body: &str) -> CanvasPayload {
    CanvasPayload::Markdown {
        text: body.trim().to_string(),
    }
}

fn extract_fence(body: &str, lang: &str) -> Option<String> {
    let opener = format!("```{lang}");
    let start = body.find(&opener)?;
    let rest = &body[start + opener.len()..];
    let end = rest.find("```")?;
    Some(rest[..end].trim().to_string())
}

fn extract_image_path(body: &str) -> Option<String> {
    let start = body.find("![")?;
    let open = body[start..].find("](")? + start + 2;
    let close = body[open..].find(')')? + open;
    Some(body[open..close].to_string())
}

fn parse_table(body: &str) -> Option<CanvasPayload> {
    let mut lines = body
        .lines()
        .map(str::trim)
        .filter(|line| line.starts_with('|'));
    let columns = split_row(lines.next()?);
    let separator = lines.next()?;
    if !separator.contains("---") {
        return None;
    }
    let rows: Vec<Vec<String>> = lines.map(split_row).collect();
    Some(CanvasPayload::DataFrame { columns, rows })
}

fn split_row(line: &str) -> Vec<String> {
    let inner = line.trim().trim_start_matches('|').trim_end_matches('|');
    let mut cells = Vec::new();
    let mut current = String::new();
    let mut chars = inner.chars().peekable();
    while let Some(ch) = chars.next() {
        if ch == '\\' && chars.peek() == Some(&'|') {
            current.push('|');
            chars.next();
        } else if ch == '|' {
            cells.push(current.trim().to_string());
            current = String::new();
        } else {
            current.push(ch);
        }
    }
    cells.push(current.trim().to_string());
    cells
}

/// Recover items from a document without metadata comments. Literal block
/// markers are located in one pass; prose between blocks becomes markdown
/// items.
fn parse_legacy(content: &str) -> Vec<CanvasItem> {
    const MERMAID: usize = 0;
    const CHART: usize = 1;
    const IMAGE: usize = 2;
    let scanner = AhoCorasick::new(["```mermaid", "```chart", "!["]).expect("valid patterns");

    let now = epoch_millis();
    let mut items = Vec::new();
    let mut last_end = 0;

    for found in scanner.find_iter(content) {
        if found.start() < last_end {
            continue;
        }

        let (payload, block_end) = match found.pattern().as_usize() {
            MERMAID => {
                let rest = &content[found.end()..];
                match rest.find("```") {
                    Some(end) => (
                        Some(CanvasPayload::Diagram {
                            source: rest[..end].trim().to_string(),
                        }),
                        found.end() + end + 3,
                    ),
                    None => (None, found.end()),
                }
            }
            CHART => {
                let rest = &content[found.end()..];
                match rest.find("```") {
                    Some(end) => (
                        serde_json::from_str(rest[..end].trim())
                            .ok()
                            .map(|spec| CanvasPayload::Chart { spec }),
                        found.end() + end + 3,
                    ),
                    None => (None, found.end()),
                }
            }
            IMAGE => match extract_image_path(&content[found.start()..]) {
                Some(path) => {
                    let close = content[found.start()..]
                        .find(')')
                        .map(|p| found.start() + p + 1)
                        .unwrap_or(found.end());
                    (Some(CanvasPayload::Image { path }), close)
                }
                None => (None, found.end()),
            },
            _ => (None, found.end()),
        };

        let Some(payload) = payload else {
            continue;
        };

        push_legacy_markdown(&mut items, &content[last_end..found.start()], now);
        items.push(CanvasItem {
            id: generate_item_id(),
            payload,
            created_at_ms: now,
            collapsed: false,
            archived: false,
        });
        last_end = block_end;
    }

    push_legacy_markdown(&mut items, &content[last_end..], now);
    items
}

fn push_legacy_markdown(items: &mut Vec<CanvasItem>, raw: &str, now: u64) {
    let cleaned: Vec<&str> = raw
        .lines()
        .filter(|line| {
            let trimmed = line.trim();
            !trimmed.is_empty() && trimmed != DOCUMENT_HEADER && !trimmed.starts_with(ITEM_MARKER.trim_end())
        })
        .collect();
    if cleaned.is_empty() {
        return;
    }
    items.push(CanvasItem {
        id: generate_item_id(),
        payload: CanvasPayload::Markdown {
            text: cleaned.join("\n"),
        },
        created_at_ms: now,
        collapsed: false,
        archived: false,
    });
}
