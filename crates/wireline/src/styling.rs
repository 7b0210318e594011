// SPDX-FileCopyrightText: 2026 Wireline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Markdown-to-Unicode styling for outbound text.
//!
//! The messaging provider renders plain text only, so `**bold**`,
//! `__bold__`, `*italic*`, `_italic_`, and `` `mono` `` are rewritten into
//! Unicode mathematical alphanumeric symbols. Word-internal underscores are
//! left alone (`snake_case` survives), and applying the transform twice is
//! a no-op: the mapped code points sit outside the ASCII ranges the scanner
//! looks at.

/// Applies the Markdown-to-Unicode rewrite.
pub fn style_outbound(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len());
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            '`' => match find_close(&chars, i + 1, &['`']) {
                Some(close) if close > i + 1 => {
                    for &inner in &chars[i + 1..close] {
                        out.push(map_mono(inner));
                    }
                    i = close + 1;
                }
                _ => {
                    out.push(c);
                    i += 1;
                }
            },
            '*' if starts_with(&chars, i, "**") => {
                match find_double(&chars, i + 2, '*') {
                    Some(close) if close > i + 2 => {
                        for &inner in &chars[i + 2..close] {
                            out.push(map_bold(inner));
                        }
                        i = close + 2;
                    }
                    _ => {
                        out.push(c);
                        i += 1;
                    }
                }
            }
            '*' => match find_close(&chars, i + 1, &['*']) {
                Some(close) if close > i + 1 && span_is_tight(&chars, i + 1, close) => {
                    for &inner in &chars[i + 1..close] {
                        out.push(map_italic(inner));
                    }
                    i = close + 1;
                }
                _ => {
                    out.push(c);
                    i += 1;
                }
            },
            '_' if starts_with(&chars, i, "__") && at_word_start(&chars, i) => {
                match find_double_with_boundary(&chars, i + 2, '_') {
                    Some(close) if close > i + 2 => {
                        for &inner in &chars[i + 2..close] {
                            out.push(map_bold(inner));
                        }
                        i = close + 2;
                    }
                    _ => {
                        out.push(c);
                        i += 1;
                    }
                }
            }
            '_' if at_word_start(&chars, i) => {
                match find_single_underscore_close(&chars, i + 1) {
                    Some(close) if close > i + 1 => {
                        for &inner in &chars[i + 1..close] {
                            out.push(map_italic(inner));
                        }
                        i = close + 1;
                    }
                    _ => {
                        out.push(c);
                        i += 1;
                    }
                }
            }
            _ => {
                out.push(c);
                i += 1;
            }
        }
    }

    out
}

/// Emphasis spans must not begin or end with whitespace, so stray
/// asterisks in prose (`2 * 3 * 6`) are not eaten.
fn span_is_tight(chars: &[char], start: usize, end: usize) -> bool {
    !chars[start].is_whitespace() && !chars[end - 1].is_whitespace()
}

fn starts_with(chars: &[char], at: usize, pattern: &str) -> bool {
    pattern
        .chars()
        .enumerate()
        .all(|(offset, p)| chars.get(at + offset) == Some(&p))
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// An opening underscore must not be glued to a preceding word character.
fn at_word_start(chars: &[char], i: usize) -> bool {
    i == 0 || !is_word_char(chars[i - 1])
}

fn find_close(chars: &[char], from: usize, delims: &[char]) -> Option<usize> {
    (from..chars.len()).find(|&j| delims.contains(&chars[j]))
}

fn find_double(chars: &[char], from: usize, delim: char) -> Option<usize> {
    (from..chars.len().saturating_sub(1))
        .find(|&j| chars[j] == delim && chars[j + 1] == delim)
}

/// Closing `__` must not be followed by a word character.
fn find_double_with_boundary(chars: &[char], from: usize, delim: char) -> Option<usize> {
    (from..chars.len().saturating_sub(1)).find(|&j| {
        chars[j] == delim
            && chars[j + 1] == delim
            && chars.get(j + 2).map(|c| !is_word_char(*c)).unwrap_or(true)
    })
}

/// Closing `_` must not be followed by a word character.
fn find_single_underscore_close(chars: &[char], from: usize) -> Option<usize> {
    (from..chars.len()).find(|&j| {
        chars[j] == '_' && chars.get(j + 1).map(|c| !is_word_char(*c)).unwrap_or(true)
    })
}

fn map_bold(c: char) -> char {
    let mapped = match c {
        'A'..='Z' => 0x1D400 + (c as u32 - 'A' as u32),
        'a'..='z' => 0x1D41A + (c as u32 - 'a' as u32),
        '0'..='9' => 0x1D7CE + (c as u32 - '0' as u32),
        _ => return c,
    };
    char::from_u32(mapped).unwrap_or(c)
}

fn map_italic(c: char) -> char {
    let mapped = match c {
        // Italic small h is reserved in the mathematical block; Unicode
        // points at the Planck constant instead.
        'h' => 0x210E,
        'A'..='Z' => 0x1D434 + (c as u32 - 'A' as u32),
        'a'..='z' => 0x1D44E + (c as u32 - 'a' as u32),
        _ => return c,
    };
    char::from_u32(mapped).unwrap_or(c)
}

fn map_mono(c: char) -> char {
    let mapped = match c {
        'A'..='Z' => 0x1D670 + (c as u32 - 'A' as u32),
        'a'..='z' => 0x1D68A + (c as u32 - 'a' as u32),
        '0'..='9' => 0x1D7F6 + (c as u32 - '0' as u32),
        _ => return c,
    };
    char::from_u32(mapped).unwrap_or(c)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bold_maps_to_mathematical_bold() {
        let styled = style_outbound("**Ab1**");
        assert_eq!(styled, "\u{1D400}\u{1D41B}\u{1D7CF}");
        assert_eq!(style_outbound("__Ab__"), "\u{1D400}\u{1D41B}");
    }

    #[test]
    fn italic_maps_with_planck_h() {
        assert_eq!(style_outbound("*a*"), "\u{1D44E}");
        assert_eq!(style_outbound("_h_"), "\u{210E}");
    }

    #[test]
    fn mono_maps_backtick_spans() {
        assert_eq!(style_outbound("`ls`"), "\u{1D695}\u{1D69C}");
    }

    #[test]
    fn snake_case_survives() {
        assert_eq!(style_outbound("use snake_case here"), "use snake_case here");
        assert_eq!(
            style_outbound("my_var = other_var"),
            "my_var = other_var"
        );
    }

    #[test]
    fn word_boundary_underscore_still_italicizes() {
        let styled = style_outbound("this is _important_ stuff");
        assert!(styled.contains('\u{1D456}')); // italic i
        assert!(!styled.contains('_'));
    }

    #[test]
    fn unmatched_delimiters_pass_through() {
        assert_eq!(style_outbound("2 * 3 = 6"), "2 * 3 = 6");
        assert_eq!(style_outbound("2 * 3 * 6"), "2 * 3 * 6");
        assert_eq!(style_outbound("a ** b"), "a ** b");
        assert_eq!(style_outbound("`unclosed"), "`unclosed");
    }

    #[test]
    fn styling_is_idempotent() {
        for input in [
            "**bold** and *italic* and `mono`",
            "plain text",
            "__strong__ _soft_ snake_case",
        ] {
            let once = style_outbound(input);
            let twice = style_outbound(&once);
            assert_eq!(once, twice, "input: {input}");
        }
    }

    #[test]
    fn punctuation_inside_spans_is_untouched() {
        let styled = style_outbound("**hi!**");
        assert!(styled.ends_with('!'));
    }
}
