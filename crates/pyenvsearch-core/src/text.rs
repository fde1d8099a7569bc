//! Text utilities shared by the renderers.
//!
//! All widths are measured in `char`s, never bytes, so truncation cannot split
//! a multi-byte character.

/// Marker appended to truncated text.
pub const ELLIPSIS: &str = "...";

/// Truncate `text` to at most `max_chars` characters.
///
/// When truncation happens the result ends with `...` and its total length is
/// exactly `max_chars` (or the ellipsis alone when `max_chars` is too small to
/// hold anything else).
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let keep = max_chars.saturating_sub(ELLIPSIS.len());
    let mut out: String = text.chars().take(keep).collect();
    out.push_str(ELLIPSIS);
    out
}

/// Collapse every run of whitespace (including newlines) into a single space.
pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// First non-empty line of `text`, trimmed.
pub fn first_line(text: &str) -> Option<&str> {
    text.lines().map(str::trim).find(|line| !line.is_empty())
}

/// First paragraph of `text`: consecutive non-empty lines joined by spaces.
pub fn first_paragraph(text: &str) -> Option<String> {
    let lines: Vec<&str> = text
        .lines()
        .map(str::trim)
        .skip_while(|line| line.is_empty())
        .take_while(|line| !line.is_empty())
        .collect();
    if lines.is_empty() {
        None
    } else {
        Some(lines.join(" "))
    }
}

/// Cut `text` to at most `max_chars`, preferring to end on a line boundary.
///
/// Used for excerpts (READMEs, long descriptions) where a clean cut reads
/// better than a mid-sentence one.
pub fn excerpt(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.trim_end().to_string();
    }
    let head: String = text.chars().take(max_chars).collect();
    // (char position, byte offset) of the last newline in the head
    let last_newline = head
        .char_indices()
        .enumerate()
        .filter(|(_, (_, c))| *c == '\n')
        .map(|(pos, (byte, _))| (pos, byte))
        .last();
    match last_newline {
        Some((pos, byte)) if pos > max_chars / 2 => format!("{}\n{}", head[..byte].trim_end(), ELLIPSIS),
        _ => format!("{}{}", head.trim_end(), ELLIPSIS),
    }
}

// ============================================================================
// Tests
// ============================================================================
