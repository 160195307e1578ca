use crate::Case;
use regex::Regex;
use std::sync::OnceLock;

fn tag_regex() -> &'static Regex {
    static TAG_RE: OnceLock<Regex> = OnceLock::new();
    TAG_RE.get_or_init(|| Regex::new(r"<[^>]+>").expect("valid tag regex"))
}

fn whitespace_regex() -> &'static Regex {
    static WS_RE: OnceLock<Regex> = OnceLock::new();
    WS_RE.get_or_init(|| Regex::new(r"\s+").expect("valid whitespace regex"))
}

/// Removes `<...>` tags, collapses whitespace runs and trims.
///
/// Deliberately naive: script/style bodies, entities and malformed markup
/// pass through untouched.
pub fn strip_html(html: &str) -> String {
    let without_tags = tag_regex().replace_all(html, "");
    whitespace_regex()
        .replace_all(&without_tags, " ")
        .trim()
        .to_string()
}

fn present(field: &Option<String>) -> Option<&str> {
    field.as_deref().filter(|value| !value.is_empty())
}

/// Flattens the case fields the prompt needs into labelled lines.
///
/// An empty result means the case carries nothing worth summarizing.
pub fn compose(case: &Case) -> String {
    let mut parts: Vec<String> = Vec::new();

    if let Some(title) = present(&case.title) {
        parts.push(format!("标题: {}", title));
    }
    if let Some(description) = present(&case.description) {
        parts.push(format!("描述: {}", description));
    }
    if let Some(content) = present(&case.content) {
        parts.push(format!("详细内容: {}", strip_html(content)));
    }
    if let Some(case_number) = present(&case.case_number) {
        parts.push(format!("案件编号: {}", case_number));
    }
    if let Some(keywords) = present(&case.keywords) {
        parts.push(format!("关键词: {}", keywords));
    }
    if let Some(address) = present(&case.address) {
        parts.push(format!("地址: {}", address));
    }
    if let Some(details) = present(&case.details) {
        parts.push(format!("案件详情: {}", strip_html(details)));
    }

    parts.join("\n")
}
