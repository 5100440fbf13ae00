//! Images embedded in long-text cells.
//!
//! A long-text cell is either a markdown string or an object with `text`,
//! `preview` and an `images` list. Images appear as `![alt](url)` or
//! `<img src="url">`.

use regex_lite::Regex;
use serde_json::Value;
use std::sync::LazyLock;

static MARKDOWN_IMAGE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"!\[[^\]]*\]\(\s*([^)\s]+)[^)]*\)").unwrap());

static HTML_IMAGE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"<img\b[^>]*?\bsrc\s*=\s*["']([^"']+)["']"#).unwrap());

/// Image URLs in a piece of markdown or HTML, in order, without duplicates.
pub fn image_urls(text: &str) -> Vec<String> {
    let mut urls: Vec<String> = Vec::new();
    for re in [&*MARKDOWN_IMAGE, &*HTML_IMAGE] {
        for caps in re.captures_iter(text) {
            let url = caps[1].to_string();
            if !urls.contains(&url) {
                urls.push(url);
            }
        }
    }
    urls
}

/// Image URLs referenced by a long-text cell.
pub fn cell_image_urls(cell: Option<&Value>) -> Vec<String> {
    match cell {
        Some(Value::String(text)) => image_urls(text),
        Some(Value::Object(obj)) => {
            let mut urls = obj.get("text").and_then(Value::as_str).map(image_urls).unwrap_or_default();
            let listed = obj.get("images").and_then(Value::as_array).into_iter().flatten().filter_map(Value::as_str);
            for url in listed {
                if !urls.iter().any(|u| u == url) {
                    urls.push(url.to_string());
                }
            }
            urls
        }
        _ => Vec::new(),
    }
}

/// Points every reference to `old` at `new`; returns whether anything changed.
pub fn replace_url(cell: &mut Value, old: &str, new: &str) -> bool {
    match cell {
        Value::String(text) => replace_in(text, old, new),
        Value::Object(obj) => {
            let mut changed = false;
            for key in ["text", "preview"] {
                if let Some(Value::String(text)) = obj.get_mut(key) {
                    changed |= replace_in(text, old, new);
                }
            }
            if let Some(Value::Array(images)) = obj.get_mut("images") {
                for image in images.iter_mut().filter(|i| i.as_str() == Some(old)) {
                    *image = Value::String(new.to_string());
                    changed = true;
                }
            }
            changed
        }
        _ => false,
    }
}

fn replace_in(text: &mut String, old: &str, new: &str) -> bool {
    if old.is_empty() || !text.contains(old) {
        return false;
    }
    *text = text.replace(old, new);
    true
}
