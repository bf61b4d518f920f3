pub mod form;
pub mod session;
pub mod stats;
pub mod step;

pub use form::{FormCode, FormField, FormRecord, FormSection, HeaderDetails, SectionContent};
pub use session::{
    FileResult, FileSummary, ProcessingMode, SessionRecord, SessionSnapshot, SessionStatus,
};
pub use stats::{FileStats, GlobalStats};
pub use step::Step;
