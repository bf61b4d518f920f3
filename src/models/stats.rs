use serde::{Deserialize, Serialize};

/// 单个文件的统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct FileStats {
    pub tokens: u64,
    pub cost: f64,
    pub pages: u64,
    pub sections: u64,
}

/// 全局累计统计（所有会话）
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct GlobalStats {
    pub total_tokens_all_forms: u64,
    pub total_cost_all_forms: f64,
    pub total_pages_all_forms: u64,
    pub total_sections_all_forms: u64,
}

impl GlobalStats {
    pub fn add(&mut self, file: &FileStats) {
        self.total_tokens_all_forms += file.tokens;
        self.total_cost_all_forms += file.cost;
        self.total_pages_all_forms += file.pages;
        self.total_sections_all_forms += file.sections;
    }

    /// 平均每页 token 数
    pub fn average_tokens_per_page(&self) -> f64 {
        if self.total_pages_all_forms == 0 {
            0.0
        } else {
            self.total_tokens_all_forms as f64 / self.total_pages_all_forms as f64
        }
    }

    /// 平均每页费用
    pub fn average_cost_per_page(&self) -> f64 {
        if self.total_pages_all_forms == 0 {
            0.0
        } else {
            self.total_cost_all_forms / self.total_pages_all_forms as f64
        }
    }
}
