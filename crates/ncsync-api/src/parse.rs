// ── Tolerant response parsing ──
//
// Inventory and check-sync responses are flat, repetitive documents, so we
// pull tokens out with patterns instead of building a schema-aware tree.
// Both the XML and JSON renderings of RESTCONF are accepted.

use std::sync::LazyLock;

use regex::Regex;

use crate::error::{Error, snippet};
use crate::model::{InventoryEntry, SyncStatus};

static XML_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"<name(?:\s[^>]*)?>\s*([^<]*?)\s*</name>").expect("valid name pattern")
});
static JSON_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#""name"\s*:\s*"((?:[^"\\]|\\.)*)""#).expect("valid name pattern")
});
static XML_DEVICE_MARKER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"<(?:[A-Za-z_][\w.-]*:)?devices?[\s/>]").expect("valid marker pattern")
});
static JSON_DEVICE_MARKER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#""tailf-ncs:devices?"\s*:"#).expect("valid marker pattern")
});
static XML_RESULT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"<result(?:\s[^>]*)?>\s*([^<]*?)\s*</result>").expect("valid result pattern")
});
static JSON_RESULT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#""result"\s*:\s*"((?:[^"\\]|\\.)*)""#).expect("valid result pattern")
});
static XML_INFO: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"<info(?:\s[^>]*)?>\s*([^<]*?)\s*</info>").expect("valid info pattern")
});
static JSON_INFO: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#""info"\s*:\s*"((?:[^"\\]|\\.)*)""#).expect("valid info pattern")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Format {
    Xml,
    Json,
}

fn sniff(text: &str) -> Option<Format> {
    match text.trim_start().chars().next()? {
        '<' => Some(Format::Xml),
        '{' | '[' => Some(Format::Json),
        _ => None,
    }
}

/// Extract device names from an inventory response.
///
/// Order is preserved and repeated names are kept; the caller decides what
/// uniqueness means. An empty body (HTTP 204) is an empty inventory. A
/// document without a `device`/`devices` element or key (login page,
/// RESTCONF `<errors>`) is a parse error, never an empty inventory.
pub fn parse_device_list(body: &[u8]) -> Result<Vec<InventoryEntry>, Error> {
    let text = String::from_utf8_lossy(body);
    if text.trim().is_empty() {
        return Ok(Vec::new());
    }

    let format = sniff(&text).filter(|format| match format {
        Format::Xml => XML_DEVICE_MARKER.is_match(&text),
        Format::Json => JSON_DEVICE_MARKER.is_match(&text),
    });
    let Some(format) = format else {
        return Err(Error::Parse {
            message: "response is not a device inventory".into(),
            snippet: snippet(body),
        });
    };

    let entries = match format {
        Format::Xml => XML_NAME
            .captures_iter(&text)
            .filter_map(|c| c.get(1))
            .map(|m| unescape_xml(m.as_str()))
            .filter(|name| !name.is_empty())
            .map(InventoryEntry::new)
            .collect(),
        Format::Json => JSON_NAME
            .captures_iter(&text)
            .filter_map(|c| c.get(1))
            .map(|m| unescape_json(m.as_str()))
            .filter(|name| !name.is_empty())
            .map(InventoryEntry::new)
            .collect(),
    };

    Ok(entries)
}

/// Interpret a check-sync response.
///
/// Anything other than an explicit `in-sync` / `out-of-sync` marker is an
/// [`SyncStatus::Error`] carrying what we saw.
pub fn parse_sync_status(body: &[u8]) -> SyncStatus {
    let text = String::from_utf8_lossy(body);

    let (result, info) = match sniff(&text) {
        Some(Format::Xml) => (
            first_capture(&XML_RESULT, &text).map(|s| unescape_xml(&s)),
            first_capture(&XML_INFO, &text).map(|s| unescape_xml(&s)),
        ),
        Some(Format::Json) => (
            first_capture(&JSON_RESULT, &text).map(|s| unescape_json(&s)),
            first_capture(&JSON_INFO, &text).map(|s| unescape_json(&s)),
        ),
        None => (None, None),
    };

    match result.as_deref() {
        Some("in-sync") => SyncStatus::InSync,
        Some("out-of-sync") => SyncStatus::OutOfSync,
        Some(other) => SyncStatus::Error(match info {
            Some(info) if !info.is_empty() => format!("check-sync returned '{other}': {info}"),
            _ => format!("check-sync returned '{other}'"),
        }),
        None => SyncStatus::Error(format!(
            "no sync result in response: {:?}",
            snippet(body)
        )),
    }
}

fn first_capture(re: &Regex, text: &str) -> Option<String> {
    re.captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_owned())
}

fn unescape_xml(raw: &str) -> String {
    raw.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

fn unescape_json(raw: &str) -> String {
    serde_json::from_str::<String>(&format!("\"{raw}\"")).unwrap_or_else(|_| raw.to_owned())
}
