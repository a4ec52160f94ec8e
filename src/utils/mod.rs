//! 通用工具模块

pub mod logging;

/// 去掉在线文本提交中的 HTML 标签，保留纯文本
///
/// LMS 的在线提交正文是富文本 HTML，评分只需要纯文本
pub fn strip_html(text: &str) -> String {
    let Ok(re) = regex::Regex::new(r"<[^>]+>") else {
        return text.to_string();
    };
    let stripped = re.replace_all(text, " ");
    stripped
        .replace("&nbsp;", " ")
        .replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// 截断过长文本，超长时补省略号（按字符截断，避免切断多字节字符）
pub fn truncate_text(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        let truncated: String = text.chars().take(max_chars).collect();
        format!("{}...", truncated)
    }
}
