use regex::Regex;
use std::sync::LazyLock;

static FOLDER_PATH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/folders/([A-Za-z0-9_-]+)").expect("static regex"));
static ID_QUERY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[?&]id=([A-Za-z0-9_-]+)").expect("static regex"));
static BARE_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_-]+$").expect("static regex"));

/// Extract a Drive folder id from a share link or a bare id.
///
/// Accepts `https://drive.google.com/drive/folders/{id}` (with optional
/// `/u/N/` segments and query strings), `https://drive.google.com/open?id={id}`,
/// and bare ids. Returns `None` for anything else.
pub fn parse_folder_id(input: &str) -> Option<String> {
    let input = input.trim();
    if input.is_empty() {
        return None;
    }

    if BARE_ID.is_match(input) {
        return Some(input.to_string());
    }

    if !input.starts_with("http://") && !input.starts_with("https://") {
        return None;
    }

    FOLDER_PATH
        .captures(input)
        .or_else(|| ID_QUERY.captures(input))
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}
