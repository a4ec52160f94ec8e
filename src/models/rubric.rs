use serde::{Deserialize, Serialize};
use serde_json::Value;

/// 评分细则
///
/// 统一格式：本地 JSON 文件和 LMS 返回的细则都转换成这个结构
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rubric {
    pub assignment_title: String,
    pub total_points: f64,
    pub criteria: Vec<RubricCriterion>,
    #[serde(default)]
    pub grading_instructions: String,
}

/// 单项评分标准
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RubricCriterion {
    pub name: String,
    pub points: f64,
    #[serde(default)]
    pub description: String,
}

impl Rubric {
    /// 从 Canvas 风格的细则 JSON 转换
    ///
    /// Canvas 的 data 字段是标准数组，每项带 description / points；
    /// 缺失字段按保守默认值处理。
    pub fn from_canvas_json(value: &Value) -> Option<Self> {
        let title = value
            .get("title")
            .and_then(|v| v.as_str())
            .unwrap_or("Canvas Rubric")
            .to_string();
        let total_points = value
            .get("points_possible")
            .and_then(|v| v.as_f64())
            .unwrap_or(100.0);

        let data = value.get("data").and_then(|v| v.as_array())?;

        let criteria = data
            .iter()
            .map(|criterion| RubricCriterion {
                name: criterion
                    .get("description")
                    .and_then(|v| v.as_str())
                    .unwrap_or("Criterion")
                    .to_string(),
                points: criterion.get("points").and_then(|v| v.as_f64()).unwrap_or(0.0),
                description: criterion
                    .get("long_description")
                    .and_then(|v| v.as_str())
                    .unwrap_or("")
                    .to_string(),
            })
            .collect();

        Some(Self {
            assignment_title: title,
            total_points,
            criteria,
            grading_instructions: "Grade this assignment based on the rubric criteria below."
                .to_string(),
        })
    }
}
