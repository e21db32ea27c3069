use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// Normalize a window title for pattern matching
/// - Strips diacritics via Unicode NFD decomposition (`Hold’em Poker — Mesa` → `hold'em poker - mesa`)
/// - Maps typographic quotes and dashes to ASCII
/// - Lowercases
/// - Collapses whitespace and drops control characters
pub fn normalize_title(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut last_was_space = true;

    for ch in input.nfd() {
        if is_combining_mark(ch) {
            continue;
        }

        let mapped = match ch {
            '\u{2018}' | '\u{2019}' | '`' | '\u{00B4}' => '\'',
            '\u{2013}' | '\u{2014}' | '\u{2212}' => '-',
            // Unique codepoints not decomposed by NFD
            'ı' => 'i',
            'ł' => 'l',
            'ø' => 'o',
            _ => ch,
        };

        if mapped.is_whitespace() {
            if !last_was_space {
                result.push(' ');
                last_was_space = true;
            }
        } else if !mapped.is_control() {
            result.extend(mapped.to_lowercase());
            last_was_space = false;
        }
    }

    if result.ends_with(' ') {
        result.pop();
    }

    result
}
