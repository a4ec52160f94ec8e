//! 内容体量估算服务 - 业务能力层
//!
//! 不调用 LLM，只根据文件格式和字节大小（或已提取文本）估算 token 数，
//! 并把 token 数按模型单价换算成金额。
//!
//! 各格式的换算常数是经验调参值，没有原理性推导；
//! 如与实际消耗偏差过大，直接改这里的常数重新标定。

use std::path::Path;

// ========== 估算常数（可按实测重新标定） ==========

/// 文本内容：约 4 个字符折 1 个 token
const CHARS_PER_TOKEN: u64 = 4;

/// PDF：压缩+版面开销大，字节数折算保守
const PDF_BYTES_PER_TOKEN: u64 = 25;
const PDF_FLOOR: u64 = 300;
const PDF_CEILING: u64 = 20_000;

/// Word 文档（docx/odt/rtf）
const DOC_BYTES_PER_TOKEN: u64 = 6;
const DOC_FLOOR: u64 = 200;
const DOC_CEILING: u64 = 15_000;

/// 演示文稿（pptx/ppt/key）：大部分字节是图片和母版
const SLIDES_BYTES_PER_TOKEN: u64 = 300;
const SLIDES_FLOOR: u64 = 400;
const SLIDES_CEILING: u64 = 8_000;

/// 电子表格（xlsx/xls）
const SHEET_BYTES_PER_TOKEN: u64 = 50;
const SHEET_FLOOR: u64 = 200;
const SHEET_CEILING: u64 = 10_000;

/// 图片按视觉 token 平坦计费，按字节大小分档
const IMAGE_SMALL_BYTES: u64 = 128 * 1024;
const IMAGE_MEDIUM_BYTES: u64 = 512 * 1024;
const IMAGE_SMALL_TOKENS: u64 = 425;
const IMAGE_MEDIUM_TOKENS: u64 = 765;
const IMAGE_LARGE_TOKENS: u64 = 1_105;

/// 未知二进制格式的保守兜底
const FALLBACK_BYTES_PER_TOKEN: u64 = 8;
const FALLBACK_FLOOR: u64 = 100;
const FALLBACK_CEILING: u64 = 12_000;

/// 文件格式标签
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileFormat {
    /// 纯文本类（txt/md/html/csv 等，可直接读取字符数）
    Text,
    Pdf,
    /// Word 类文档
    Document,
    /// 演示文稿
    Slides,
    /// 电子表格
    Spreadsheet,
    /// 图片（视觉 token）
    Image,
    /// 未知二进制
    Unknown,
}

impl FileFormat {
    /// 按扩展名判断格式
    pub fn from_path(path: &Path) -> Self {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase())
            .unwrap_or_default();

        match ext.as_str() {
            "txt" | "md" | "html" | "htm" | "csv" | "json" | "tex" => FileFormat::Text,
            "pdf" => FileFormat::Pdf,
            "doc" | "docx" | "odt" | "rtf" => FileFormat::Document,
            "ppt" | "pptx" | "key" | "odp" => FileFormat::Slides,
            "xls" | "xlsx" | "ods" => FileFormat::Spreadsheet,
            "png" | "jpg" | "jpeg" | "gif" | "webp" | "bmp" => FileFormat::Image,
            _ => FileFormat::Unknown,
        }
    }
}

/// 估算输入：格式 + 字节大小 + 可选的已提取文本
#[derive(Debug, Clone)]
pub struct FileDescriptor {
    pub format: FileFormat,
    pub byte_size: u64,
    pub text: Option<String>,
}

impl FileDescriptor {
    /// 从磁盘文件构造（读不到大小时按 0 字节处理，估算不报错）
    pub fn from_file(path: &Path, text: Option<String>) -> Self {
        let byte_size = std::fs::metadata(path).map(|m| m.len()).unwrap_or(0);
        Self {
            format: FileFormat::from_path(path),
            byte_size,
            text,
        }
    }
}

/// 估算一个文件的 token 数
///
/// 不变量：
/// - 同一格式内对字节大小单调不减
/// - 非空文件估算值恒为正
/// - 空文件（0 字节且无文本）估算为 0
pub fn estimate_tokens(desc: &FileDescriptor) -> u64 {
    // 有提取文本时按实际字符数折算，最准确
    if let Some(text) = &desc.text {
        if !text.is_empty() {
            return (text.chars().count() as u64 / CHARS_PER_TOKEN).max(1);
        }
    }

    if desc.byte_size == 0 {
        return 0;
    }

    match desc.format {
        FileFormat::Text => (desc.byte_size / CHARS_PER_TOKEN).max(1),
        FileFormat::Pdf => clamp_estimate(desc.byte_size, PDF_BYTES_PER_TOKEN, PDF_FLOOR, PDF_CEILING),
        FileFormat::Document => {
            clamp_estimate(desc.byte_size, DOC_BYTES_PER_TOKEN, DOC_FLOOR, DOC_CEILING)
        }
        FileFormat::Slides => {
            clamp_estimate(desc.byte_size, SLIDES_BYTES_PER_TOKEN, SLIDES_FLOOR, SLIDES_CEILING)
        }
        FileFormat::Spreadsheet => {
            clamp_estimate(desc.byte_size, SHEET_BYTES_PER_TOKEN, SHEET_FLOOR, SHEET_CEILING)
        }
        FileFormat::Image => {
            if desc.byte_size <= IMAGE_SMALL_BYTES {
                IMAGE_SMALL_TOKENS
            } else if desc.byte_size <= IMAGE_MEDIUM_BYTES {
                IMAGE_MEDIUM_TOKENS
            } else {
                IMAGE_LARGE_TOKENS
            }
        }
        FileFormat::Unknown => clamp_estimate(
            desc.byte_size,
            FALLBACK_BYTES_PER_TOKEN,
            FALLBACK_FLOOR,
            FALLBACK_CEILING,
        ),
    }
}

/// 演示文稿格式的估算上下界（供外部校验/测试边界）
pub fn slides_bounds() -> (u64, u64) {
    (SLIDES_FLOOR, SLIDES_CEILING)
}

fn clamp_estimate(byte_size: u64, bytes_per_token: u64, floor: u64, ceiling: u64) -> u64 {
    (byte_size / bytes_per_token).clamp(floor, ceiling)
}

/// token 数换算金额：tokens * price_per_1k / 1000
///
/// 纯函数，无任何缓存；单价变化后必须重新计算，绝不能沿用旧值
pub fn cost(tokens: u64, price_per_1k: f64) -> f64 {
    tokens as f64 * price_per_1k / 1000.0
}

/// 金额保留 4 位小数（货币最小展示单位）
pub fn round_currency(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}
