/// 程序配置文件
#[derive(Clone, Debug)]
pub struct Config {
    /// 运行根目录（每次评分运行会在其下创建带时间戳的作业文件夹）
    pub output_root: String,
    /// 本地评分细则文件路径（为空时尝试从 LMS 获取）
    pub rubric_path: String,
    /// 要恢复的运行目录（为空时新建一次运行）
    pub resume_run_root: String,
    /// 评分时附加给引擎的额外说明
    pub extra_instructions: String,
    /// 课程资料文件路径列表（逗号分隔，为空时不附带课程上下文）
    pub course_materials: String,
    /// 是否显示详细日志
    pub verbose_logging: bool,
    /// 输出日志文件
    pub output_log_file: String,
    // --- LMS 配置 ---
    pub lms_base_url: String,
    pub lms_api_token: String,
    pub course_id: i64,
    pub assignment_id: i64,
    pub assignment_name: String,
    // --- LLM 配置 ---
    pub llm_api_key: String,
    pub llm_api_base_url: String,
    pub llm_model_name: String,
    // --- 预算配置 ---
    /// 预算（货币金额，美元）；<= 0 表示不设预算
    pub budget_cost: f64,
    /// 每 1K token 价格覆盖值；<= 0 表示按模型查价格表
    pub price_per_1k_override: f64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            output_root: ".".to_string(),
            rubric_path: String::new(),
            resume_run_root: String::new(),
            extra_instructions: String::new(),
            course_materials: String::new(),
            verbose_logging: false,
            output_log_file: "output.txt".to_string(),
            lms_base_url: "https://canvas.instructure.com".to_string(),
            lms_api_token: String::new(),
            course_id: 0,
            assignment_id: 0,
            assignment_name: "assignment".to_string(),
            llm_api_key: String::new(),
            llm_api_base_url: "https://api.openai.com/v1".to_string(),
            llm_model_name: "gpt-4o".to_string(),
            budget_cost: 0.0,
            price_per_1k_override: 0.0,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let default = Self::default();
        Self {
            output_root: std::env::var("OUTPUT_ROOT").unwrap_or(default.output_root),
            rubric_path: std::env::var("RUBRIC_PATH").unwrap_or(default.rubric_path),
            resume_run_root: std::env::var("RESUME_RUN_ROOT").unwrap_or(default.resume_run_root),
            extra_instructions: std::env::var("EXTRA_INSTRUCTIONS").unwrap_or(default.extra_instructions),
            course_materials: std::env::var("COURSE_MATERIALS").unwrap_or(default.course_materials),
            verbose_logging: std::env::var("VERBOSE_LOGGING").ok().and_then(|v| v.parse().ok()).unwrap_or(default.verbose_logging),
            output_log_file: std::env::var("OUTPUT_LOG_FILE").unwrap_or(default.output_log_file),
            lms_base_url: std::env::var("LMS_BASE_URL").unwrap_or(default.lms_base_url),
            lms_api_token: std::env::var("LMS_API_TOKEN").unwrap_or(default.lms_api_token),
            course_id: std::env::var("COURSE_ID").ok().and_then(|v| v.parse().ok()).unwrap_or(default.course_id),
            assignment_id: std::env::var("ASSIGNMENT_ID").ok().and_then(|v| v.parse().ok()).unwrap_or(default.assignment_id),
            assignment_name: std::env::var("ASSIGNMENT_NAME").unwrap_or(default.assignment_name),
            llm_api_key: std::env::var("LLM_API_KEY").unwrap_or(default.llm_api_key),
            llm_api_base_url: std::env::var("LLM_API_BASE_URL").unwrap_or(default.llm_api_base_url),
            llm_model_name: std::env::var("LLM_MODEL_NAME").unwrap_or(default.llm_model_name),
            budget_cost: std::env::var("BUDGET_COST").ok().and_then(|v| v.parse().ok()).unwrap_or(default.budget_cost),
            price_per_1k_override: std::env::var("PRICE_PER_1K").ok().and_then(|v| v.parse().ok()).unwrap_or(default.price_per_1k_override),
        }
    }
}
