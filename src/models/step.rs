use serde::Serialize;
use std::fmt;
use std::time::Duration;

/// 单个文件的七个处理步骤（顺序固定）
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    Initializing,
    ConvertingImages,
    SegmentingSections,
    ExtractingFormCode,
    ProcessingSections,
    WritingJson,
    GeneratingPackage,
}

impl Step {
    pub const ALL: [Step; 7] = [
        Step::Initializing,
        Step::ConvertingImages,
        Step::SegmentingSections,
        Step::ExtractingFormCode,
        Step::ProcessingSections,
        Step::WritingJson,
        Step::GeneratingPackage,
    ];

    pub const COUNT: usize = Self::ALL.len();

    /// 步骤序号（从 0 开始）
    pub fn index(self) -> usize {
        self as usize
    }

    /// 展示给客户端的步骤名称
    pub fn label(self) -> &'static str {
        match self {
            Step::Initializing => "Initializing conversion process",
            Step::ConvertingImages => "Converting PDF to high-quality images",
            Step::SegmentingSections => "Segmenting images into form sections",
            Step::ExtractingFormCode => "Extracting form code from file name",
            Step::ProcessingSections => "Processing individual form sections",
            Step::WritingJson => "Writing structured JSON data",
            Step::GeneratingPackage => "Generating final AF package",
        }
    }

    pub fn labels() -> Vec<&'static str> {
        Self::ALL.iter().map(|s| s.label()).collect()
    }

    /// 模拟延迟的基准时长
    pub fn base_latency(self) -> Duration {
        let millis = match self {
            Step::Initializing => 1000,
            Step::ConvertingImages => 2000,
            Step::SegmentingSections => 2000,
            Step::ExtractingFormCode => 1000,
            Step::ProcessingSections => 3000,
            Step::WritingJson => 1000,
            Step::GeneratingPackage => 2000,
        };
        Duration::from_millis(millis)
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{} {}", self.index() + 1, Self::COUNT, self.label())
    }
}

/// 会话整体进度（百分比）
///
/// `(completed_files + fraction) / total_files * 100`
pub fn overall_progress(completed_files: usize, fraction: f64, total_files: usize) -> f64 {
    if total_files == 0 {
        return 0.0;
    }
    let value = (completed_files as f64 + fraction.clamp(0.0, 1.0)) / total_files as f64 * 100.0;
    value.min(100.0)
}

/// 进入步骤时的文件内进度
pub fn entered_fraction(step: Step) -> f64 {
    step.index() as f64 / Step::COUNT as f64
}

/// 完成步骤时的文件内进度
pub fn finished_fraction(step: Step) -> f64 {
    (step.index() + 1) as f64 / Step::COUNT as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_order_and_labels() {
        assert_eq!(Step::COUNT, 7);
        assert_eq!(Step::Initializing.index(), 0);
        assert_eq!(Step::GeneratingPackage.index(), 6);
        assert_eq!(Step::labels()[3], "Extracting form code from file name");
    }

    #[test]
    fn test_overall_progress_formula() {
        // 两个文件，第一个完成，第二个完成了第 1 步
        let p = overall_progress(1, finished_fraction(Step::Initializing), 2);
        assert!((p - (1.0 + 1.0 / 7.0) / 2.0 * 100.0).abs() < 1e-9);

        assert_eq!(overall_progress(0, finished_fraction(Step::GeneratingPackage), 1), 100.0);
        assert_eq!(overall_progress(0, 0.0, 0), 0.0);
    }

    #[test]
    fn test_entered_is_below_finished() {
        for step in Step::ALL {
            assert!(entered_fraction(step) < finished_fraction(step));
        }
    }
}
