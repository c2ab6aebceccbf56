//! Platform language tags to container language codes.

/// (platform tag prefix, ISO 639-2 code, display name). Longest prefixes first.
const LANGUAGES: &[(&str, &str, &str)] = &[
    ("zh-hant", "chi", "中文（繁体）"),
    ("zh-tw", "chi", "中文（繁体）"),
    ("zh-hk", "chi", "中文（香港）"),
    ("zh-hans", "chi", "中文（简体）"),
    ("zh-cn", "chi", "中文（简体）"),
    ("zh", "chi", "中文"),
    ("en", "eng", "English"),
    ("ja", "jpn", "日本語"),
    ("ko", "kor", "한국어"),
    ("es", "spa", "Español"),
    ("fr", "fra", "Français"),
    ("de", "ger", "Deutsch"),
    ("ru", "rus", "Русский"),
    ("pt", "por", "Português"),
    ("it", "ita", "Italiano"),
    ("th", "tha", "ไทย"),
    ("id", "ind", "Bahasa Indonesia"),
    ("ms", "may", "Bahasa Melayu"),
    ("vi", "vie", "Tiếng Việt"),
    ("ar", "ara", "العربية"),
];

const UNDETERMINED: &str = "und";

/// ISO 639-2 code and display name for a platform subtitle tag.
///
/// Machine generated tags (`ai-zh`) map like their base language.
pub fn subtitle_language(tag: &str) -> (&'static str, String) {
    let lower = tag.trim().to_lowercase();
    let base = lower.strip_prefix("ai-").unwrap_or(&lower);
    LANGUAGES
        .iter()
        .find(|(prefix, _, _)| {
            base == *prefix
                || base
                    .strip_prefix(prefix)
                    .is_some_and(|rest| rest.starts_with('-') || rest.starts_with('_'))
        })
        .map(|(_, code, name)| (*code, name.to_string()))
        .unwrap_or((UNDETERMINED, tag.to_string()))
}

/// Normalize a user supplied audio language to a 3-letter code.
pub fn audio_language(tag: &str) -> String {
    let trimmed = tag.trim();
    if trimmed.len() == 3 && trimmed.chars().all(|c| c.is_ascii_alphabetic()) {
        return trimmed.to_lowercase();
    }
    subtitle_language(trimmed).0.to_string()
}
