use regex::Regex;
use std::sync::LazyLock;
use unicode_normalization::UnicodeNormalization;

/// Longest title (in chars) that ends up in a file name.
pub const MAX_TITLE_CHARS: usize = 200;

static WS_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

pub fn sanitize_path_component(name: &str) -> String {
    let name: String = name.nfc().collect();
    let name: String = name.chars().filter(|c| !c.is_control()).collect();
    let name = WS_RE.replace_all(name.trim(), " ");
    let name = name.replace(" | ", "｜");

    let name = name.trim_end_matches([' ', '-', '.', ';']);

    let forbidden: &[(char, char)] = &[
        ('<', '＜'),
        ('>', '＞'),
        (':', '꞉'),
        ('"', '＂'),
        ('/', '⧸'),
        ('\\', '＼'),
        ('|', '｜'),
        ('?', '？'),
        ('*', ' '),
    ];

    let mut result = name.to_string();
    for (from, to) in forbidden {
        result = result.replace(*from, &to.to_string());
    }

    result.trim().to_string()
}

/// Cuts `s` to at most `max_chars` characters, never splitting a char.
pub fn truncate_chars(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

/// Title safe to use as a file or folder name. Empty results become `untitled`.
pub fn sanitize_title(title: &str) -> String {
    let cleaned = sanitize_path_component(title);
    let cleaned = truncate_chars(&cleaned, MAX_TITLE_CHARS).trim_end();
    let cleaned = sanitize_filename::sanitize_with_options(
        cleaned,
        sanitize_filename::Options {
            windows: true,
            truncate: false,
            replacement: "",
        },
    );
    if cleaned.trim().is_empty() {
        "untitled".to_string()
    } else {
        cleaned
    }
}
