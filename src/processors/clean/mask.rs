//! Compliance masking: blacklist line removal and identifier masking.
//!
//! Lines matching the compiled blacklist (copyright notices, contact blocks,
//! confidentiality stamps, page footers) are deleted outright. Mainland mobile numbers
//! and 18-digit citizen identifiers are partially masked in place.

use regex::Regex;
use std::sync::LazyLock;

static BLACKLIST: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"版权所有",
        r"(?i)copyright",
        r"(?i)all rights reserved",
        r"联系(电话|方式|我们)",
        r"电子邮[箱件]",
        r"(?i)confidential",
        r"^地址[：:]",
        r"第\s*\d+\s*页\s*共\s*\d+\s*页",
    ]
    .iter()
    .map(|pattern| Regex::new(pattern).expect("blacklist pattern"))
    .collect()
});

static MOBILE_NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"1[3-9]\d{9}").expect("mobile pattern"));

static CITIZEN_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d{17}[0-9Xx]").expect("citizen id pattern"));

/// Apply blacklist deletion and identifier masking.
pub(crate) fn apply(text: &str) -> String {
    let kept: Vec<&str> = text
        .lines()
        .filter(|line| !BLACKLIST.iter().any(|pattern| pattern.is_match(line)))
        .collect();
    let text = kept.join("\n");
    let text = mask_matches(&text, &CITIZEN_ID, 6, 4);
    mask_matches(&text, &MOBILE_NUMBER, 3, 4)
}

/// Replace each digit-bounded match with `prefix` kept digits, asterisks, and `suffix`
/// kept digits.
fn mask_matches(text: &str, pattern: &Regex, prefix: usize, suffix: usize) -> String {
    let mut out = String::with_capacity(text.len());
    let mut cursor = 0;

    for found in pattern.find_iter(text) {
        let start = found.start();
        let end = found.end();
        // A digit on either side means this run is part of a longer number.
        let before_digit = text[..start]
            .chars()
            .next_back()
            .map(|c| c.is_ascii_digit())
            .unwrap_or(false);
        let after_digit = text[end..]
            .chars()
            .next()
            .map(|c| c.is_ascii_digit())
            .unwrap_or(false);

        out.push_str(&text[cursor..start]);
        if before_digit || after_digit {
            out.push_str(found.as_str());
        } else {
            let value = found.as_str();
            let masked_len = value.len() - prefix - suffix;
            out.push_str(&value[..prefix]);
            out.push_str(&"*".repeat(masked_len));
            out.push_str(&value[value.len() - suffix..]);
        }
        cursor = end;
    }
    out.push_str(&text[cursor..]);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blacklisted_lines_are_deleted() {
        let input = "重要内容保留。\n版权所有 © 2025 某公司\nCopyright 2025\n联系电话：010-1234\n下一行保留。";
        let output = apply(input);
        assert_eq!(output, "重要内容保留。\n下一行保留。");
    }

    #[test]
    fn mobile_numbers_are_masked() {
        let output = apply("请拨打 13812345678 联系。");
        assert_eq!(output, "请拨打 138****5678 联系。");
    }

    #[test]
    fn citizen_ids_are_masked() {
        let output = apply("证件号 11010119900307803X 已登记。");
        assert_eq!(output, "证件号 110101********803X 已登记。");
    }

    #[test]
    fn longer_digit_runs_are_left_alone() {
        let input = "订单号 213812345678901 不是手机号。";
        assert_eq!(apply(input), input);
    }

    #[test]
    fn masking_is_idempotent() {
        let once = apply("电话 13812345678 和证件 11010119900307803X。");
        let twice = apply(&once);
        assert_eq!(once, twice);
    }
}
