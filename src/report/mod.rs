pub mod aggregate;
pub mod assets;
pub mod compose;
pub mod doc;

use std::collections::HashMap;
use std::fmt;

use assets::Photo;

/// Class levels offered by the school, youngest first. The writing-speed
/// field is tracked from LKG onward; Nursery reports never show it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClassLevel {
    Nursery,
    Lkg,
    Ukg,
}

impl ClassLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            ClassLevel::Nursery => "Nursery",
            ClassLevel::Lkg => "LKG",
            ClassLevel::Ukg => "UKG",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "nursery" => Some(ClassLevel::Nursery),
            "lkg" => Some(ClassLevel::Lkg),
            "ukg" => Some(ClassLevel::Ukg),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanType {
    Annual,
    Monthly,
    Weekly,
}

impl PlanType {
    pub fn as_str(self) -> &'static str {
        match self {
            PlanType::Annual => "Annual",
            PlanType::Monthly => "Monthly",
            PlanType::Weekly => "Weekly",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "annual" => Some(PlanType::Annual),
            "monthly" => Some(PlanType::Monthly),
            "weekly" => Some(PlanType::Weekly),
            _ => None,
        }
    }
}

/// Three-level scale used for every developmental domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rating {
    Excellent,
    Good,
    NeedsImprovement,
}

impl Rating {
    pub fn as_str(self) -> &'static str {
        match self {
            Rating::Excellent => "Excellent",
            Rating::Good => "Good",
            Rating::NeedsImprovement => "Needs Improvement",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "excellent" => Some(Rating::Excellent),
            "good" => Some(Rating::Good),
            "needs improvement" => Some(Rating::NeedsImprovement),
            _ => None,
        }
    }
}

/// Domain column order used by the progress table.
pub const RATING_DOMAINS: [&str; 5] = ["Social", "Motor", "Language", "Numeracy", "Creativity"];

#[derive(Debug, Clone)]
pub struct Student {
    pub id: String,
    pub name: String,
    pub age: i64,
    pub class_level: ClassLevel,
    pub learning_ability: Option<String>,
    pub writing_speed: Option<String>,
    pub photo_url: Option<String>,
    pub teacher_id: String,
}

#[derive(Debug, Clone)]
pub struct ProgressEntry {
    pub id: String,
    pub student_id: String,
    pub entry_date: String,
    pub social: Rating,
    pub motor: Rating,
    pub language: Rating,
    pub numeracy: Rating,
    pub creativity: Rating,
    pub comments: Option<String>,
}

impl ProgressEntry {
    /// Ratings in `RATING_DOMAINS` column order.
    pub fn ratings(&self) -> [Rating; 5] {
        [
            self.social,
            self.motor,
            self.language,
            self.numeracy,
            self.creativity,
        ]
    }
}

#[derive(Debug, Clone)]
pub struct TeachingPlan {
    pub id: String,
    pub plan_type: PlanType,
    pub class_level: ClassLevel,
    pub title: String,
    pub description: Option<String>,
    pub activities: Option<String>,
    pub goals: Option<String>,
    pub start_date: String,
    pub end_date: String,
    pub teacher_id: String,
}

#[derive(Debug)]
pub struct ReportError {
    pub code: String,
    pub message: String,
    pub details: Option<serde_json::Value>,
}

impl ReportError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        ReportError {
            code: code.into(),
            message: message.into(),
            details: None,
        }
    }
}

impl fmt::Display for ReportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for ReportError {}

#[derive(Debug, Clone, Default)]
pub struct StudentReportOptions {
    pub include_photos: bool,
    pub class_level: Option<ClassLevel>,
}

#[derive(Debug, Clone, Default)]
pub struct PlanReportOptions {
    pub plan_type: Option<PlanType>,
    pub class_level: Option<ClassLevel>,
}

/// A finalized report; `bytes` is the complete PDF, ready to serve or write.
#[derive(Debug)]
pub struct RenderedReport {
    pub bytes: Vec<u8>,
    pub page_count: usize,
}

/// Compose and finalize a student progress report from pre-aggregated data.
///
/// `photos` holds the pre-fetched photo bytes keyed by student id (see
/// [`assets::resolve_photos`]); students without an entry render text-only.
pub fn generate_student_report(
    students: &[Student],
    progress: &HashMap<String, Vec<ProgressEntry>>,
    photos: &HashMap<String, Photo>,
    opts: &StudentReportOptions,
) -> Result<RenderedReport, ReportError> {
    let doc = compose::compose_student_report(students, progress, photos, opts)?;
    Ok(doc.finish())
}

/// Compose and finalize a teaching-plan report from pre-aggregated data.
pub fn generate_teaching_plan_report(
    plans: &[TeachingPlan],
    teacher_names: &HashMap<String, String>,
    opts: &PlanReportOptions,
) -> Result<RenderedReport, ReportError> {
    let doc = compose::compose_plan_report(plans, teacher_names, opts)?;
    Ok(doc.finish())
}
