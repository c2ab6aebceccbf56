//! Quality and codec identifier tables.

/// Platform quality ids and their display names, best first.
pub const QUALITIES: &[(&str, &str)] = &[
    ("127", "8K 超高清"),
    ("126", "杜比视界"),
    ("125", "HDR 真彩"),
    ("120", "4K 超清"),
    ("116", "1080P 高帧率"),
    ("112", "1080P 高码率"),
    ("100", "智能修复"),
    ("80", "1080P 高清"),
    ("74", "720P 高帧率"),
    ("64", "720P 高清"),
    ("48", "720P 高清"),
    ("32", "480P 清晰"),
    ("16", "360P 流畅"),
    ("6", "240P 流畅"),
    ("5", "144P 流畅"),
];

const DOLBY_VISION_ID: &str = "126";

/// Display name for a quality id; unknown ids are returned unchanged.
pub fn quality_name(id: &str) -> &str {
    QUALITIES
        .iter()
        .find(|(qn, _)| *qn == id)
        .map(|(_, name)| *name)
        .unwrap_or(id)
}

/// Whether a track's quality identifier denotes Dolby Vision, by id or by name.
pub fn is_dolby_vision(dfn: &str) -> bool {
    dfn == DOLBY_VISION_ID || dfn == quality_name(DOLBY_VISION_ID)
}

/// Whether a priority entry names the same quality as a track's identifier.
pub fn dfn_matches(preferred: &str, dfn: &str) -> bool {
    preferred == dfn || quality_name(preferred) == dfn || preferred == quality_name(dfn)
}

/// Canonical codec name so `avc`, `h264` and `AVC` rank the same.
pub fn normalize_codec(codec: &str) -> String {
    let lower = codec.trim().to_lowercase();
    match lower.as_str() {
        "avc" | "h264" | "h.264" | "avc1" => "AVC".to_string(),
        "hevc" | "h265" | "h.265" | "hev1" | "hvc1" => "HEVC".to_string(),
        "av1" | "av01" => "AV1".to_string(),
        _ => codec.trim().to_uppercase(),
    }
}

/// Parse a comma separated codec priority list (`hevc,av1,avc`).
pub fn parse_codec_priority(input: &str) -> Vec<String> {
    input
        .split(',')
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .map(normalize_codec)
        .collect()
}

/// Parse a comma separated quality priority list. Entries may be ids (`80`)
/// or display names (`1080P 高清`), see [`dfn_matches`].
pub fn parse_dfn_priority(input: &str) -> Vec<String> {
    input
        .split(',')
        .map(str::trim)
        .filter(|d| !d.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quality_name() {
        assert_eq!(quality_name("80"), "1080P 高清");
        assert_eq!(quality_name("999"), "999");
    }

    #[test]
    fn test_dolby_vision() {
        assert!(is_dolby_vision("126"));
        assert!(is_dolby_vision("杜比视界"));
        assert!(!is_dolby_vision("125"));
    }

    #[test]
    fn test_dfn_matches_ids_and_names() {
        assert!(dfn_matches("80", "80"));
        assert!(dfn_matches("80", "1080P 高清"));
        assert!(dfn_matches("1080P 高清", "80"));
        assert!(!dfn_matches("64", "80"));
    }

    #[test]
    fn test_codec_priority() {
        assert_eq!(
            parse_codec_priority("hevc, av1,h264,,"),
            vec!["HEVC", "AV1", "AVC"]
        );
        assert_eq!(normalize_codec("mp4a"), "MP4A");
    }

    #[test]
    fn test_dfn_priority() {
        assert_eq!(
            parse_dfn_priority("8K 超高清, 80"),
            vec!["8K 超高清".to_string(), "80".to_string()]
        );
    }
}
