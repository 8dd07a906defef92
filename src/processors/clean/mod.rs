//! Multi-stage text normalization and noise removal.
//!
//! `raw_text` (or a best-effort decode of `binary`) is pushed through a fixed stage
//! order: encoding repair, optional HTML-to-Markdown conversion, layout noise removal,
//! compliance masking, optional semantic paragraph dedup, and whitespace finalization.
//! Each stage operates on the string produced by the previous one, and the whole
//! pipeline is idempotent: cleaning already-clean text changes nothing.

mod dedup;
mod mask;
mod noise;

pub use dedup::shutdown_dedup_model;

use crate::html;
use crate::pipeline::{Item, ItemPatch, ProcessorError, RunContext};
use crate::processors::Processor;
use async_trait::async_trait;
use encoding_rs::{Encoding, GBK, UTF_16BE, UTF_16LE, WINDOWS_1252};
use regex::Regex;
use std::sync::LazyLock;
use unicode_normalization::UnicodeNormalization;

/// Cleaned text at or below this many characters is treated as extraction residue.
const MIN_MEANINGFUL_LENGTH: usize = 30;

static NEWLINE_PADDING: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[ \t]*\n[ \t]*").expect("newline padding regex"));
static SPACE_RUNS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[ \t]+").expect("space run regex"));
static NEWLINE_RUNS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n{3,}").expect("newline run regex"));

/// Transforms `raw_text` into `clean_text`.
pub struct CleanProcessor {
    semantic_dedup: bool,
}

impl CleanProcessor {
    /// Build the cleaner; `semantic_dedup` opts into the paragraph dedup stage.
    pub fn new(semantic_dedup: bool) -> Self {
        Self { semantic_dedup }
    }

    /// Run every cleaning stage over the supplied text.
    pub(crate) fn clean(&self, text: &str) -> String {
        let original_len = text.chars().count();

        let text = repair_encoding(text);
        let text = if html::looks_like_html(&text) {
            html::to_markdown(&text)
        } else {
            text
        };
        let text = noise::strip_layout_noise(&text);
        let text = mask::apply(&text);
        let text = if self.semantic_dedup {
            dedup::dedupe_paragraphs(&text)
        } else {
            text
        };
        let text = finalize(&text);

        // Drop extraction residue, but never a short document that survived cleaning
        // untouched.
        let final_len = text.chars().count();
        if final_len <= MIN_MEANINGFUL_LENGTH && final_len < original_len {
            return String::new();
        }
        text
    }
}

#[async_trait]
impl Processor for CleanProcessor {
    fn name(&self) -> &'static str {
        "clean"
    }

    fn order(&self) -> i32 {
        20
    }

    async fn process(&self, item: &Item, _ctx: &RunContext) -> Result<ItemPatch, ProcessorError> {
        let text = match item.raw_text.as_deref() {
            Some(text) => text.to_string(),
            None => item
                .binary
                .as_deref()
                .map(decode_bytes)
                .unwrap_or_default(),
        };

        let clean_text = self.clean(&text);
        tracing::debug!(
            file_name = %item.file_name,
            input_chars = text.chars().count(),
            output_chars = clean_text.chars().count(),
            "Text cleaned"
        );

        Ok(ItemPatch {
            clean_text: Some(clean_text),
            ..ItemPatch::default()
        })
    }
}

/// Decode raw bytes, trying UTF-8, UTF-16, GBK, then Latin-1, with lossy UTF-8 as the
/// last resort.
pub(crate) fn decode_bytes(bytes: &[u8]) -> String {
    if let Ok(text) = std::str::from_utf8(bytes) {
        return text.to_string();
    }

    if let Some((encoding, bom_len)) = Encoding::for_bom(bytes) {
        if encoding == UTF_16LE || encoding == UTF_16BE {
            let (decoded, _, had_errors) = encoding.decode(&bytes[bom_len..]);
            if !had_errors {
                return decoded.into_owned();
            }
        }
    } else if bytes.len() % 2 == 0 && bytes.iter().filter(|b| **b == 0).count() * 4 >= bytes.len()
    {
        // Heavy NUL density is a strong UTF-16 signal for CJK and Latin text alike.
        let (decoded, _, had_errors) = UTF_16LE.decode(bytes);
        if !had_errors {
            return decoded.into_owned();
        }
    }

    let (decoded, _, had_errors) = GBK.decode(bytes);
    if !had_errors {
        return decoded.into_owned();
    }

    let (decoded, _, had_errors) = WINDOWS_1252.decode(bytes);
    if !had_errors {
        return decoded.into_owned();
    }

    String::from_utf8_lossy(bytes).into_owned()
}

/// Repair double-encoded UTF-8 and apply Unicode NFC normalization.
fn repair_encoding(text: &str) -> String {
    fix_mojibake(text).nfc().collect()
}

/// Undo the classic UTF-8-read-as-Latin-1 corruption when it is detectable.
fn fix_mojibake(text: &str) -> String {
    // Mojibake from this corruption consists entirely of Latin-1 range characters and
    // always contains a high-range lead byte.
    if text.is_empty()
        || !text.chars().all(|c| (c as u32) < 0x100)
        || !text.chars().any(|c| (0x80..0x100).contains(&(c as u32)))
    {
        return text.to_string();
    }

    let bytes: Vec<u8> = text.chars().map(|c| c as u8).collect();
    match String::from_utf8(bytes) {
        // A successful re-decode that shortened the text means multi-byte sequences
        // collapsed back into real characters.
        Ok(candidate) if candidate.chars().count() < text.chars().count() => candidate,
        _ => text.to_string(),
    }
}

/// Collapse whitespace: CJK-internal gaps, space/tab runs, and newline stacks.
fn finalize(text: &str) -> String {
    let text = collapse_cjk_gaps(text);
    let text = NEWLINE_PADDING.replace_all(&text, "\n");
    let text = SPACE_RUNS.replace_all(&text, " ");
    let text = NEWLINE_RUNS.replace_all(&text, "\n\n");
    text.trim().to_string()
}

pub(crate) fn is_cjk(c: char) -> bool {
    ('\u{4e00}'..='\u{9fff}').contains(&c)
}

/// Remove spaces and tabs that sit between two CJK characters.
fn collapse_cjk_gaps(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len());
    let mut index = 0;
    while index < chars.len() {
        let c = chars[index];
        if c == ' ' || c == '\t' {
            let start = index;
            while index < chars.len() && (chars[index] == ' ' || chars[index] == '\t') {
                index += 1;
            }
            let prev_cjk = out.chars().last().map(is_cjk).unwrap_or(false);
            let next_cjk = chars.get(index).copied().map(is_cjk).unwrap_or(false);
            if !(prev_cjk && next_cjk) {
                for gap in &chars[start..index] {
                    out.push(*gap);
                }
            }
        } else {
            out.push(c);
            index += 1;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::Item;

    fn clean(text: &str) -> String {
        CleanProcessor::new(false).clean(text)
    }

    #[tokio::test]
    async fn passes_plain_text_through() {
        let processor = CleanProcessor::new(false);
        let item = Item {
            raw_text: Some("hello world".into()),
            ..Item::default()
        };
        let patch = processor.process(&item, &RunContext::new()).await.unwrap();
        assert_eq!(patch.clean_text.as_deref(), Some("hello world"));
    }

    #[test]
    fn cleaning_is_idempotent() {
        let samples = [
            "hello world",
            "第1页\n正文第一段。\n继续 内容\n\n\n\n下一段，\n结尾。",
            "<html><body><h1>标题</h1><p>正文内容在这里，足够长。</p></body></html>",
            "word-\nwrap and more text to keep this above the residue threshold",
        ];
        for sample in samples {
            let once = clean(sample);
            let twice = clean(&once);
            assert_eq!(once, twice, "not idempotent for {sample:?}");
        }
    }

    #[test]
    fn cjk_gaps_collapse_but_ascii_spacing_survives() {
        let cleaned = clean("中文 之间 的空格应当移除 but ascii words keep their spaces");
        assert!(cleaned.contains("中文之间的空格应当移除"));
        assert!(cleaned.contains("ascii words keep"));
    }

    #[test]
    fn newline_stacks_collapse_to_paragraph_breaks() {
        let cleaned = clean(
            "第一段落的内容足够长，完全可以通过清洗阶段的残留门槛检查。\n\n\n\n\n第二段落的内容同样足够长，也会被完整保留下来。",
        );
        assert!(cleaned.contains("\n\n"));
        assert!(!cleaned.contains("\n\n\n"));
    }

    #[test]
    fn residue_is_dropped_but_short_clean_input_survives() {
        // Unchanged short input stays.
        assert_eq!(clean("hello world"), "hello world");
        // Noise-only input reduces to nothing.
        assert_eq!(clean("----------------\n3/10\n42\n"), "");
    }

    #[test]
    fn decode_falls_back_through_known_encodings() {
        assert_eq!(decode_bytes("plain".as_bytes()), "plain");

        let utf16: Vec<u8> = "你好world"
            .encode_utf16()
            .flat_map(|unit| unit.to_le_bytes())
            .collect();
        assert_eq!(decode_bytes(&utf16), "你好world");

        let (gbk_bytes, _, _) = GBK.encode("中文内容");
        assert_eq!(decode_bytes(&gbk_bytes), "中文内容");
    }

    #[test]
    fn mojibake_is_repaired() {
        // "café" encoded as UTF-8, then mis-read as Latin-1.
        let mangled = "cafÃ©";
        assert_eq!(fix_mojibake(mangled), "café");
        // Already-correct text is untouched.
        assert_eq!(fix_mojibake("café"), "café");
        assert_eq!(fix_mojibake("中文"), "中文");
    }

    #[test]
    fn html_input_becomes_markdown() {
        let cleaned = clean(
            "<html><body><h2>季度总结</h2><p>这一季度的收入持续增长，超过了年初制定的既定目标，各业务线均有稳定贡献。</p></body></html>",
        );
        assert!(cleaned.contains("## 季度总结"));
        assert!(cleaned.contains("收入持续增长"));
        assert!(!cleaned.contains('<'));
    }

    #[test]
    fn invisible_codepoints_are_removed() {
        let cleaned =
            clean("正文\u{200b}内容\u{feff}保持完整，这一行写得足够长，清洗之后仍然不会被当作残留丢弃。");
        assert!(!cleaned.contains('\u{200b}'));
        assert!(!cleaned.contains('\u{feff}'));
        assert!(cleaned.contains("正文内容"));
    }
}
