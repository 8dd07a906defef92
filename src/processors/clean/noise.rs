//! Layout noise removal and broken-line repair.
//!
//! Works line-by-line: page markers, horizontal rules, confidentiality stamps, and bare
//! numeric lines are dropped; invisible code points are stripped; then consecutive lines
//! are re-joined according to how the previous line ends.

use super::is_cjk;
use regex::Regex;
use std::sync::LazyLock;

static PAGE_MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^第\s*\d+\s*页(\s*[，,]?\s*共\s*\d+\s*页)?$").expect("page marker"));
static PAGE_RATIO: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d+\s*/\s*\d+$").expect("page ratio"));
static RULE_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[-─━—~～.·_ ]{8,}$").expect("rule run"));
static CONFIDENTIAL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[（(]\s*(机密|秘密|内部|保密)\s*[)）]$").expect("confidential"));
static CROSS_PAGE_NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[-—]\s*\d+\s*[-—]$").expect("cross page number"));

/// Punctuation that terminates a sentence; a line ending here starts a new paragraph.
const TERMINAL_PUNCTUATION: [char; 4] = ['。', '！', '？', '；'];

/// Punctuation after which the next line continues the same clause.
const SOFT_PUNCTUATION: [char; 7] = ['，', '、', '：', '”', '’', '）', '】'];

/// Remove noise lines and invisible code points, then repair broken lines.
pub(crate) fn strip_layout_noise(text: &str) -> String {
    let text = remove_invisible_chars(text);
    let kept: Vec<&str> = text
        .lines()
        .filter(|line| !is_noise_line(line.trim()))
        .collect();
    repair_broken_lines(&kept)
}

fn is_noise_line(line: &str) -> bool {
    if line.is_empty() {
        return false;
    }
    if PAGE_MARKER.is_match(line)
        || PAGE_RATIO.is_match(line)
        || RULE_RUN.is_match(line)
        || CONFIDENTIAL.is_match(line)
        || CROSS_PAGE_NUMBER.is_match(line)
    {
        return true;
    }
    // Bare page numbers and similar numeric debris.
    line.chars().count() <= 10 && line.chars().all(|c| c.is_ascii_digit())
}

fn remove_invisible_chars(text: &str) -> String {
    text.chars()
        .filter(|c| {
            !matches!(
                *c,
                '\u{fffc}'
                    | '\u{fffd}'
                    | '\u{200b}'..='\u{200f}'
                    | '\u{2060}'..='\u{206f}'
                    | '\u{feff}'
                    | '\u{fff0}'..='\u{ffff}'
            )
        })
        .collect()
}

/// Re-join lines that a page layout broke apart.
///
/// - Terminal punctuation at a line end starts a fresh paragraph.
/// - Soft punctuation joins with a space.
/// - A CJK character straddling the break concatenates with no separator.
/// - `word-` followed by a word continues the hyphenated word.
/// - Everything else keeps a single line break.
fn repair_broken_lines(lines: &[&str]) -> String {
    let mut out = String::new();
    let mut prev_nonempty = false;

    for line in lines {
        let line = line.trim();
        if line.is_empty() {
            if prev_nonempty {
                out.push_str("\n\n");
                prev_nonempty = false;
            }
            continue;
        }
        if !prev_nonempty {
            out.push_str(line);
            prev_nonempty = true;
            continue;
        }

        let last = out.chars().last().unwrap_or('\n');
        let first = line.chars().next().unwrap_or(' ');
        if is_structural(line) || last_line_structural(&out) {
            out.push('\n');
            out.push_str(line);
        } else if TERMINAL_PUNCTUATION.contains(&last) {
            out.push_str("\n\n");
            out.push_str(line);
        } else if SOFT_PUNCTUATION.contains(&last) {
            out.push(' ');
            out.push_str(line);
        } else if is_cjk(last) && is_cjk(first) {
            out.push_str(line);
        } else if last == '-' && ends_with_word_hyphen(&out) && first.is_ascii_alphabetic() {
            out.pop();
            out.push_str(line);
        } else {
            out.push('\n');
            out.push_str(line);
        }
    }

    out
}

/// Markdown headings and table rows keep their own line.
fn is_structural(line: &str) -> bool {
    line.starts_with('#') || line.starts_with('|')
}

fn last_line_structural(text: &str) -> bool {
    text.rsplit('\n')
        .next()
        .map(is_structural)
        .unwrap_or(false)
}

fn ends_with_word_hyphen(text: &str) -> bool {
    let mut rev = text.chars().rev();
    matches!(
        (rev.next(), rev.next()),
        (Some('-'), Some(c)) if c.is_ascii_alphanumeric()
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_markers_and_rules_are_dropped() {
        let input = "正文第一行内容很重要。\n第3页\n3/12\n--------\n42\n正文第二行继续。";
        let output = strip_layout_noise(input);
        assert!(!output.contains("第3页"));
        assert!(!output.contains("3/12"));
        assert!(!output.contains("--------"));
        assert!(!output.contains("42"));
        assert!(output.contains("正文第一行内容很重要。"));
    }

    #[test]
    fn confidential_stamps_and_page_footers_are_dropped() {
        let input = "内容行。\n（机密）\n- 7 -\n继续内容。";
        let output = strip_layout_noise(input);
        assert!(!output.contains("机密"));
        assert!(!output.contains("- 7 -"));
    }

    #[test]
    fn terminal_punctuation_starts_a_paragraph() {
        let output = strip_layout_noise("第一句结束。\n第二句开始");
        assert_eq!(output, "第一句结束。\n\n第二句开始");
    }

    #[test]
    fn soft_punctuation_joins_with_space() {
        let output = strip_layout_noise("前半句，\n后半句");
        assert_eq!(output, "前半句， 后半句");
    }

    #[test]
    fn cjk_lines_concatenate_without_separator() {
        let output = strip_layout_noise("这一行被页面\n强行断开了");
        assert_eq!(output, "这一行被页面强行断开了");
    }

    #[test]
    fn hyphenated_words_are_rejoined() {
        let output = strip_layout_noise("the configu-\nration file");
        assert_eq!(output, "the configuration file");
    }

    #[test]
    fn unrelated_lines_keep_their_break() {
        let output = strip_layout_noise("first line\nsecond line");
        assert_eq!(output, "first line\nsecond line");
    }

    #[test]
    fn long_numeric_lines_survive() {
        let output = strip_layout_noise("12345678901234");
        assert_eq!(output, "12345678901234");
    }
}
