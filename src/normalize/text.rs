//! Text cleanup, date parsing and language detection

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};

/// Repair common encoding debris: BOM, zero-width characters, replacement
/// characters, non-breaking spaces and CR/CRLF line endings
pub fn repair_encoding(text: &str) -> String {
    let mut result = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '\u{FEFF}' | '\u{200B}' | '\u{200C}' | '\u{200D}' | '\u{2060}' | '\u{00AD}'
            | '\u{FFFD}' => {}
            '\u{00A0}' | '\u{202F}' | '\u{3000}' => result.push(' '),
            '\r' => {
                if chars.peek() == Some(&'\n') {
                    chars.next();
                }
                result.push('\n');
            }
            _ => result.push(c),
        }
    }

    result
}

/// Normalize whitespace, keeping paragraph breaks as a blank line
pub fn normalize_whitespace(text: &str) -> String {
    let mut result = String::with_capacity(text.len());
    let mut pending_whitespace = false;
    let mut newline_count = 0;

    for c in text.chars() {
        if c.is_whitespace() {
            if c == '\n' {
                newline_count += 1;
            }
            pending_whitespace = true;
            continue;
        }

        if pending_whitespace && !result.is_empty() {
            match newline_count {
                0 => result.push(' '),
                1 => result.push('\n'),
                _ => result.push_str("\n\n"),
            }
        }
        newline_count = 0;
        pending_whitespace = false;
        result.push(c);
    }

    result
}

/// Full cleanup used for body text
pub fn clean_text(text: &str) -> String {
    normalize_whitespace(&repair_encoding(text))
}

/// Collapse all whitespace (including newlines) to single spaces
pub fn collapse_inline(text: &str) -> String {
    repair_encoding(text)
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Paragraphs of normalized text
pub fn paragraphs(text: &str) -> impl Iterator<Item = &str> {
    text.split("\n\n").map(str::trim).filter(|p| !p.is_empty())
}

fn is_terminator(c: char) -> bool {
    matches!(c, '.' | '!' | '?' | '。' | '！' | '？' | '…')
}

/// Sentences end at a terminator followed by whitespace (so `3.5` stays
/// whole) or at a line break
pub fn sentences(text: &str) -> Vec<&str> {
    let mut result = Vec::new();
    let mut start = 0;
    let mut chars = text.char_indices().peekable();

    while let Some((i, c)) = chars.next() {
        let end = if c == '\n' {
            Some(i)
        } else if is_terminator(c) {
            match chars.peek() {
                None => Some(i + c.len_utf8()),
                Some((_, next)) if next.is_whitespace() => Some(i + c.len_utf8()),
                _ => None,
            }
        } else {
            None
        };

        if let Some(end) = end {
            let sentence = text[start..end].trim();
            if sentence.chars().any(char::is_alphanumeric) {
                result.push(sentence);
            }
            start = end;
        }
    }

    let tail = text[start..].trim();
    if tail.chars().any(char::is_alphanumeric) {
        result.push(tail);
    }
    result
}

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y.%m.%d %H:%M",
    "%Y. %m. %d. %H:%M",
];

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y.%m.%d", "%Y/%m/%d", "%Y. %m. %d."];

/// Parse a published date in any of the formats blog platforms emit
pub fn parse_date(raw: &str) -> Option<DateTime<Utc>> {
    let value = collapse_inline(raw);
    let value = value.trim();
    if value.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(value) {
        return Some(dt.with_timezone(&Utc));
    }

    for format in DATETIME_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(value, format) {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }

    let date_part = value.trim_end_matches('.');
    for format in DATE_FORMATS {
        let candidate = if format.ends_with('.') { value } else { date_part };
        if let Ok(date) = NaiveDate::parse_from_str(candidate, format) {
            return date
                .and_hms_opt(0, 0, 0)
                .map(|naive| Utc.from_utc_datetime(&naive));
        }
    }

    None
}

pub fn is_hangul(c: char) -> bool {
    matches!(c,
        '\u{AC00}'..='\u{D7A3}'
        | '\u{1100}'..='\u{11FF}'
        | '\u{3130}'..='\u{318F}')
}

/// Share of alphabetic characters that are Hangul
pub fn hangul_ratio(text: &str) -> f64 {
    let mut letters = 0usize;
    let mut hangul = 0usize;
    for c in text.chars().filter(|c| c.is_alphabetic()) {
        letters += 1;
        if is_hangul(c) {
            hangul += 1;
        }
    }
    if letters == 0 {
        0.0
    } else {
        hangul as f64 / letters as f64
    }
}

/// Language tag: `<html lang>` primary subtag, else a Hangul script check
pub fn detect_language(html_lang: Option<&str>, text: &str) -> String {
    if let Some(primary) = html_lang
        .and_then(|lang| lang.split(['-', '_']).next())
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty())
    {
        return primary;
    }

    if hangul_ratio(text) >= 0.3 {
        "ko".to_string()
    } else {
        "en".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Datelike;

    #[test]
    fn test_repair_encoding() {
        let input = "\u{FEFF}Hello\u{00A0}world\u{200B}!\r\nNext\rLine\u{FFFD}";
        assert_eq!(repair_encoding(input), "Hello world!\nNext\nLine");
    }

    #[test]
    fn test_normalize_whitespace() {
        let input = "Hello   world\n\n\n\ntest\nline";
        assert_eq!(normalize_whitespace(input), "Hello world\n\ntest\nline");
        assert_eq!(normalize_whitespace("  \n padded \n "), "padded");
    }

    #[test]
    fn test_collapse_inline() {
        assert_eq!(collapse_inline("  A\n\n title\u{00A0}here "), "A title here");
    }

    #[test]
    fn test_paragraphs() {
        let text = "First para.\n\nSecond para.\n\n\n";
        assert_eq!(paragraphs(text).collect::<Vec<_>>(), vec!["First para.", "Second para."]);
    }

    #[test]
    fn test_sentence_split() {
        let text = "Version 3.5 is out! Is it good? Yes.\nNew line here";
        assert_eq!(
            sentences(text),
            vec!["Version 3.5 is out!", "Is it good?", "Yes.", "New line here"]
        );
        assert!(sentences("  ...  ").is_empty());
    }

    #[test]
    fn test_parse_date_formats() {
        let rfc = parse_date("2024-03-05T10:20:30+09:00").unwrap();
        assert_eq!(rfc.to_rfc3339(), "2024-03-05T01:20:30+00:00");

        for raw in ["2024-03-05", "2024.03.05", "2024/03/05", "2024-03-05 08:00:00"] {
            let parsed = parse_date(raw).unwrap();
            assert_eq!((parsed.year(), parsed.month(), parsed.day()), (2024, 3, 5), "{}", raw);
        }

        assert!(parse_date("yesterday").is_none());
        assert!(parse_date("   ").is_none());
    }

    #[test]
    fn test_detect_language() {
        assert_eq!(detect_language(Some("ko-KR"), "anything"), "ko");
        assert_eq!(detect_language(Some("EN_us"), ""), "en");
        assert_eq!(detect_language(None, "오늘은 제주도 여행 이야기를 합니다"), "ko");
        assert_eq!(detect_language(None, "A plain English sentence."), "en");
        assert_eq!(detect_language(Some(""), "한국어 문장입니다"), "ko");
    }
}
