use chrono::{DateTime, Utc};

pub const DEFAULT_CHAT_TITLE: &str = "New Chat";
const MAX_TITLE_CHARS: usize = 30;

/// Whether a chat still carries a placeholder title worth replacing.
pub fn needs_title(title: &str, message_count: u64) -> bool {
    message_count >= 2
        && (title == DEFAULT_CHAT_TITLE
            || title.starts_with("Chat ")
            || title.chars().count() < 10)
}

/// Clean a model-suggested title: quotes and a `Title:` prefix are removed and
/// long titles are cut to 27 characters plus `...`.
pub fn clean_title(raw: &str) -> Option<String> {
    let mut title = raw.trim().trim_matches(['"', '\'']).trim();
    if let Some(prefix) = title.get(..6)
        && prefix.eq_ignore_ascii_case("title:")
    {
        title = title[6..].trim();
    }
    let title = title.replace(['"', '\''], "");
    let title = title.trim();
    if title.is_empty() {
        return None;
    }

    if title.chars().count() > MAX_TITLE_CHARS {
        let cut: String = title.chars().take(MAX_TITLE_CHARS - 3).collect();
        Some(format!("{cut}..."))
    } else {
        Some(title.to_string())
    }
}

pub fn fallback_title(now: DateTime<Utc>) -> String {
    format!("Chat {}", now.format("%Y-%m-%d"))
}
