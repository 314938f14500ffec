//! Section layout for the two report kinds.
//!
//! Layout state is an explicit [`LayoutCursor`] handed to each section
//! renderer and returned updated; there is no implicit document cursor.
//! Page breaks happen here (between entities and when a block would cross
//! the footer band); page numbering happens later, in `doc::finish`.

use std::collections::HashMap;

use chrono::NaiveDate;

use super::assets::Photo;
use super::doc::{Document, ImageEncoding, Op, CONTENT_BOTTOM, CONTENT_TOP, MARGIN, PAGE_WIDTH};
use super::{
    PlanReportOptions, ProgressEntry, ReportError, Student, StudentReportOptions, TeachingPlan,
    RATING_DOMAINS,
};

const TITLE_SIZE: f32 = 16.0;
const ENTITY_SIZE: f32 = 13.0;
const HEADING_SIZE: f32 = 11.0;
const BODY_SIZE: f32 = 10.0;
const TABLE_SIZE: f32 = 8.5;
const LINE_GAP: f32 = 13.0;
const ROW_GAP: f32 = 12.0;

/// Column x-offsets (from the left margin) for the progress table: date
/// first, then the five domains.
const TABLE_COLS: [f32; 6] = [0.0, 72.0, 156.0, 240.0, 324.0, 408.0];

const PHOTO_BOX_WIDTH: f32 = 64.0;
const PHOTO_BOX_HEIGHT: f32 = 80.0;

pub const NO_STUDENTS_NOTICE: &str = "No students found matching the criteria.";
pub const NO_PLANS_NOTICE: &str = "No teaching plans found matching the criteria.";
pub const NO_PROGRESS_NOTICE: &str = "No progress records for this student.";

/// Explicit layout cursor; `y` is the baseline of the next line to write.
#[derive(Debug, Clone, Copy)]
pub struct LayoutCursor {
    pub y: f32,
}

impl LayoutCursor {
    fn top() -> Self {
        LayoutCursor { y: CONTENT_TOP }
    }
}

fn ensure_room(doc: &mut Document, cursor: LayoutCursor, needed: f32) -> LayoutCursor {
    if cursor.y - needed < CONTENT_BOTTOM {
        doc.page_break();
        LayoutCursor::top()
    } else {
        cursor
    }
}

fn push_line(
    doc: &mut Document,
    cursor: LayoutCursor,
    indent: f32,
    size: f32,
    bold: bool,
    text: impl Into<String>,
) -> LayoutCursor {
    let cursor = ensure_room(doc, cursor, size + 4.0);
    doc.push(Op::Text {
        x: MARGIN + indent,
        y: cursor.y - size,
        size,
        bold,
        text: text.into(),
    });
    LayoutCursor {
        y: cursor.y - size - 4.0,
    }
}

/// Greedy word wrap on a character budget; layout here never needs exact
/// glyph metrics.
fn wrap(text: &str, max_chars: usize) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();
    for word in text.split_whitespace() {
        if current.is_empty() {
            current = word.to_string();
        } else if current.chars().count() + 1 + word.chars().count() <= max_chars {
            current.push(' ');
            current.push_str(word);
        } else {
            lines.push(std::mem::take(&mut current));
            current = word.to_string();
        }
    }
    if !current.is_empty() {
        lines.push(current);
    }
    lines
}

fn parse_date(value: &str, what: &str) -> Result<NaiveDate, ReportError> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d").map_err(|_| {
        ReportError::new("bad_date", format!("malformed {} date: {}", what, value))
    })
}

fn format_date(date: NaiveDate) -> String {
    date.format("%d %b %Y").to_string()
}

fn report_header(doc: &mut Document, title: &str, filters: &[String]) -> LayoutCursor {
    let mut cursor = LayoutCursor::top();
    doc.push(Op::Text {
        x: MARGIN,
        y: cursor.y - TITLE_SIZE,
        size: TITLE_SIZE,
        bold: true,
        text: title.to_string(),
    });
    cursor.y -= TITLE_SIZE + 8.0;
    for filter in filters {
        doc.push(Op::Text {
            x: MARGIN,
            y: cursor.y - BODY_SIZE,
            size: BODY_SIZE,
            bold: false,
            text: filter.clone(),
        });
        cursor.y -= LINE_GAP;
    }
    cursor.y -= 4.0;
    doc.push(Op::Rule { y: cursor.y });
    cursor.y -= 12.0;
    cursor
}

pub fn compose_student_report(
    students: &[Student],
    progress: &HashMap<String, Vec<ProgressEntry>>,
    photos: &HashMap<String, Photo>,
    opts: &StudentReportOptions,
) -> Result<Document, ReportError> {
    let mut filters = Vec::new();
    if let Some(class_level) = opts.class_level {
        filters.push(format!("Class: {}", class_level.as_str()));
    }

    let mut doc = Document::new();
    let mut cursor = report_header(&mut doc, "Student Progress Report", &filters);

    if students.is_empty() {
        push_line(&mut doc, cursor, 0.0, HEADING_SIZE, false, NO_STUDENTS_NOTICE);
        return Ok(doc);
    }

    for (i, student) in students.iter().enumerate() {
        if i > 0 {
            doc.page_break();
            cursor = LayoutCursor::top();
        }
        let entries = progress
            .get(&student.id)
            .map(Vec::as_slice)
            .unwrap_or(&[]);
        let photo = if opts.include_photos {
            photos.get(&student.id)
        } else {
            None
        };
        cursor = student_section(&mut doc, cursor, student, entries, photo)?;
    }

    Ok(doc)
}

fn student_section(
    doc: &mut Document,
    cursor: LayoutCursor,
    student: &Student,
    entries: &[ProgressEntry],
    photo: Option<&Photo>,
) -> Result<LayoutCursor, ReportError> {
    let mut cursor = ensure_room(doc, cursor, 90.0);

    if let Some(photo) = photo {
        let (pw, ph) = photo.dimensions();
        let scale = (PHOTO_BOX_WIDTH / pw as f32).min(PHOTO_BOX_HEIGHT / ph as f32);
        let width = pw as f32 * scale;
        let height = ph as f32 * scale;
        let (encoding, data) = match photo {
            Photo::Jpeg { data, .. } => (ImageEncoding::Jpeg, data.clone()),
            Photo::Rgb { data, .. } => (ImageEncoding::Rgb, data.clone()),
        };
        doc.push(Op::Image {
            x: PAGE_WIDTH - MARGIN - width,
            y: cursor.y - height,
            width,
            height,
            pixel_width: pw,
            pixel_height: ph,
            encoding,
            data,
        });
    }

    cursor = push_line(doc, cursor, 0.0, ENTITY_SIZE, true, student.name.clone());
    cursor = push_line(
        doc,
        cursor,
        0.0,
        BODY_SIZE,
        false,
        format!("Class: {}", student.class_level.as_str()),
    );
    cursor = push_line(
        doc,
        cursor,
        0.0,
        BODY_SIZE,
        false,
        format!("Age: {} years", student.age),
    );
    if let Some(ability) = &student.learning_ability {
        cursor = push_line(
            doc,
            cursor,
            0.0,
            BODY_SIZE,
            false,
            format!("Learning ability: {}", ability),
        );
    }
    // Writing speed is not assessed in Nursery; omit the line there even
    // when a value was recorded.
    if student.class_level != super::ClassLevel::Nursery {
        if let Some(speed) = &student.writing_speed {
            cursor = push_line(
                doc,
                cursor,
                0.0,
                BODY_SIZE,
                false,
                format!("Writing speed: {}", speed),
            );
        }
    }
    cursor.y -= 8.0;

    progress_table(doc, cursor, entries)
}

fn table_header(doc: &mut Document, cursor: LayoutCursor) -> LayoutCursor {
    let cursor = ensure_room(doc, cursor, 40.0);
    let y = cursor.y - 9.0;
    doc.push(Op::Text {
        x: MARGIN + TABLE_COLS[0],
        y,
        size: 9.0,
        bold: true,
        text: "Date".to_string(),
    });
    for (i, domain) in RATING_DOMAINS.iter().enumerate() {
        doc.push(Op::Text {
            x: MARGIN + TABLE_COLS[i + 1],
            y,
            size: 9.0,
            bold: true,
            text: domain.to_string(),
        });
    }
    let rule_y = y - 4.0;
    doc.push(Op::Rule { y: rule_y });
    LayoutCursor { y: rule_y - 4.0 }
}

fn progress_table(
    doc: &mut Document,
    cursor: LayoutCursor,
    entries: &[ProgressEntry],
) -> Result<LayoutCursor, ReportError> {
    if entries.is_empty() {
        return Ok(push_line(
            doc,
            cursor,
            0.0,
            BODY_SIZE,
            false,
            NO_PROGRESS_NOTICE,
        ));
    }

    // Fail-fast on malformed dates before anything is laid out, then order
    // newest first regardless of how the caller sorted the slice.
    let mut dated: Vec<(NaiveDate, &ProgressEntry)> = Vec::with_capacity(entries.len());
    for entry in entries {
        dated.push((parse_date(&entry.entry_date, "progress")?, entry));
    }
    dated.sort_by(|a, b| b.0.cmp(&a.0));

    let mut cursor = table_header(doc, cursor);
    for (date, entry) in dated {
        let comment_lines = entry
            .comments
            .as_deref()
            .map(|c| wrap(c, 100))
            .unwrap_or_default();
        let needed = ROW_GAP + comment_lines.len() as f32 * (TABLE_SIZE + 3.0) + 4.0;
        if cursor.y - needed < CONTENT_BOTTOM {
            doc.page_break();
            cursor = table_header(doc, LayoutCursor::top());
        }

        let y = cursor.y - TABLE_SIZE;
        doc.push(Op::Text {
            x: MARGIN + TABLE_COLS[0],
            y,
            size: TABLE_SIZE,
            bold: false,
            text: format_date(date),
        });
        for (i, rating) in entry.ratings().iter().enumerate() {
            doc.push(Op::Text {
                x: MARGIN + TABLE_COLS[i + 1],
                y,
                size: TABLE_SIZE,
                bold: false,
                text: rating.as_str().to_string(),
            });
        }
        cursor.y = y - 3.5;

        for (i, line) in comment_lines.iter().enumerate() {
            let text = if i == 0 {
                format!("Comments: {}", line)
            } else {
                line.clone()
            };
            cursor = push_line(doc, cursor, TABLE_COLS[1], TABLE_SIZE, false, text);
        }
        cursor.y -= 2.0;
    }

    Ok(cursor)
}

pub fn compose_plan_report(
    plans: &[TeachingPlan],
    teacher_names: &HashMap<String, String>,
    opts: &PlanReportOptions,
) -> Result<Document, ReportError> {
    let mut filters = Vec::new();
    if let Some(plan_type) = opts.plan_type {
        filters.push(format!("Type: {}", plan_type.as_str()));
    }
    if let Some(class_level) = opts.class_level {
        filters.push(format!("Class: {}", class_level.as_str()));
    }

    let mut doc = Document::new();
    let mut cursor = report_header(&mut doc, "Teaching Plan Report", &filters);

    if plans.is_empty() {
        push_line(&mut doc, cursor, 0.0, HEADING_SIZE, false, NO_PLANS_NOTICE);
        return Ok(doc);
    }

    for (i, plan) in plans.iter().enumerate() {
        if i > 0 {
            doc.page_break();
            cursor = LayoutCursor::top();
        }
        cursor = plan_section(&mut doc, cursor, plan, teacher_names)?;
    }

    Ok(doc)
}

fn plan_section(
    doc: &mut Document,
    cursor: LayoutCursor,
    plan: &TeachingPlan,
    teacher_names: &HashMap<String, String>,
) -> Result<LayoutCursor, ReportError> {
    let start = parse_date(&plan.start_date, "plan start")?;
    let end = parse_date(&plan.end_date, "plan end")?;
    let teacher = teacher_names
        .get(&plan.teacher_id)
        .map(String::as_str)
        .unwrap_or("(unknown teacher)");

    let mut cursor = ensure_room(doc, cursor, 90.0);
    cursor = push_line(doc, cursor, 0.0, ENTITY_SIZE, true, plan.title.clone());
    cursor = push_line(
        doc,
        cursor,
        0.0,
        BODY_SIZE,
        false,
        format!("Type: {}", plan.plan_type.as_str()),
    );
    cursor = push_line(
        doc,
        cursor,
        0.0,
        BODY_SIZE,
        false,
        format!("Class: {}", plan.class_level.as_str()),
    );
    cursor = push_line(doc, cursor, 0.0, BODY_SIZE, false, format!("Teacher: {}", teacher));
    cursor = push_line(
        doc,
        cursor,
        0.0,
        BODY_SIZE,
        false,
        format!("Period: {} to {}", format_date(start), format_date(end)),
    );
    cursor.y -= 6.0;

    cursor = plan_text_section(doc, cursor, "Description", plan.description.as_deref());
    cursor = plan_text_section(doc, cursor, "Activities", plan.activities.as_deref());
    cursor = plan_text_section(doc, cursor, "Goals", plan.goals.as_deref());

    Ok(cursor)
}

fn plan_text_section(
    doc: &mut Document,
    cursor: LayoutCursor,
    heading: &str,
    body: Option<&str>,
) -> LayoutCursor {
    let Some(body) = body else {
        return cursor;
    };
    let mut cursor = ensure_room(doc, cursor, 40.0);
    cursor = push_line(doc, cursor, 0.0, HEADING_SIZE, true, heading);
    for line in wrap(body, 95) {
        cursor = push_line(doc, cursor, 0.0, BODY_SIZE, false, line);
    }
    cursor.y -= 6.0;
    cursor
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::{ClassLevel, PlanType, Rating};

    fn student(id: &str, class_level: ClassLevel, writing_speed: Option<&str>) -> Student {
        Student {
            id: id.to_string(),
            name: format!("Student {}", id),
            age: 4,
            class_level,
            learning_ability: Some("Quick learner".to_string()),
            writing_speed: writing_speed.map(|s| s.to_string()),
            photo_url: None,
            teacher_id: "t1".to_string(),
        }
    }

    fn entry(id: &str, student_id: &str, date: &str, comments: Option<&str>) -> ProgressEntry {
        ProgressEntry {
            id: id.to_string(),
            student_id: student_id.to_string(),
            entry_date: date.to_string(),
            social: Rating::Good,
            motor: Rating::Excellent,
            language: Rating::Good,
            numeracy: Rating::NeedsImprovement,
            creativity: Rating::Good,
            comments: comments.map(|c| c.to_string()),
        }
    }

    fn rendered_text(doc: Document) -> String {
        // Content streams are written uncompressed, so shown text is
        // findable in the raw bytes.
        String::from_utf8_lossy(&doc.finish().bytes).to_string()
    }

    #[test]
    fn empty_student_set_renders_notice_page() {
        let doc = compose_student_report(
            &[],
            &HashMap::new(),
            &HashMap::new(),
            &StudentReportOptions {
                include_photos: false,
                class_level: Some(ClassLevel::Ukg),
            },
        )
        .expect("compose");
        assert_eq!(doc.page_count(), 1);
        let text = rendered_text(doc);
        assert!(text.contains(NO_STUDENTS_NOTICE));
        assert!(text.contains("Class: UKG"));
    }

    #[test]
    fn empty_plan_set_renders_exact_notice_with_filters() {
        let doc = compose_plan_report(
            &[],
            &HashMap::new(),
            &PlanReportOptions {
                plan_type: Some(PlanType::Weekly),
                class_level: Some(ClassLevel::Ukg),
            },
        )
        .expect("compose");
        assert_eq!(doc.page_count(), 1);
        let text = rendered_text(doc);
        assert!(text.contains(NO_PLANS_NOTICE));
        assert!(text.contains("Type: Weekly"));
        assert!(text.contains("Class: UKG"));
    }

    #[test]
    fn nursery_never_shows_writing_speed() {
        let students = vec![student("s1", ClassLevel::Nursery, Some("Average"))];
        let doc = compose_student_report(
            &students,
            &HashMap::new(),
            &HashMap::new(),
            &StudentReportOptions::default(),
        )
        .expect("compose");
        let text = rendered_text(doc);
        assert!(!text.contains("Writing speed"));
    }

    #[test]
    fn writing_speed_shown_for_lkg_when_present() {
        let students = vec![
            student("s1", ClassLevel::Lkg, Some("Fast")),
            student("s2", ClassLevel::Lkg, None),
        ];
        let doc = compose_student_report(
            &students,
            &HashMap::new(),
            &HashMap::new(),
            &StudentReportOptions::default(),
        )
        .expect("compose");
        let text = rendered_text(doc);
        assert!(text.contains("Writing speed: Fast"));
        assert_eq!(text.matches("Writing speed").count(), 1);
    }

    #[test]
    fn zero_entries_renders_no_records_notice() {
        let students = vec![student("s1", ClassLevel::Ukg, None)];
        let doc = compose_student_report(
            &students,
            &HashMap::new(),
            &HashMap::new(),
            &StudentReportOptions::default(),
        )
        .expect("compose");
        let text = rendered_text(doc);
        assert!(text.contains(NO_PROGRESS_NOTICE));
    }

    #[test]
    fn entries_render_newest_first() {
        let students = vec![student("s1", ClassLevel::Ukg, None)];
        let mut progress = HashMap::new();
        progress.insert(
            "s1".to_string(),
            vec![
                entry("e1", "s1", "2025-01-10", None),
                entry("e2", "s1", "2025-03-05", Some("Great week")),
                entry("e3", "s1", "2025-02-14", None),
            ],
        );
        let doc = compose_student_report(
            &students,
            &progress,
            &HashMap::new(),
            &StudentReportOptions::default(),
        )
        .expect("compose");
        let text = rendered_text(doc);
        let newest = text.find("05 Mar 2025").expect("newest row");
        let middle = text.find("14 Feb 2025").expect("middle row");
        let oldest = text.find("10 Jan 2025").expect("oldest row");
        assert!(newest < middle && middle < oldest);
        assert!(text.contains("Comments: Great week"));
    }

    #[test]
    fn malformed_entry_date_fails_generation() {
        let students = vec![student("s1", ClassLevel::Ukg, None)];
        let mut progress = HashMap::new();
        progress.insert(
            "s1".to_string(),
            vec![entry("e1", "s1", "not-a-date", None)],
        );
        let err = compose_student_report(
            &students,
            &progress,
            &HashMap::new(),
            &StudentReportOptions::default(),
        )
        .expect_err("must fail");
        assert_eq!(err.code, "bad_date");
    }

    #[test]
    fn each_student_after_first_starts_new_page() {
        let students = vec![
            student("s1", ClassLevel::Ukg, None),
            student("s2", ClassLevel::Ukg, None),
            student("s3", ClassLevel::Ukg, None),
        ];
        let doc = compose_student_report(
            &students,
            &HashMap::new(),
            &HashMap::new(),
            &StudentReportOptions::default(),
        )
        .expect("compose");
        assert_eq!(doc.page_count(), 3);
    }

    #[test]
    fn plan_sections_render_headings_and_teacher() {
        let plans = vec![TeachingPlan {
            id: "p1".to_string(),
            plan_type: PlanType::Weekly,
            class_level: ClassLevel::Lkg,
            title: "Shapes and Colours".to_string(),
            description: Some("Introduce basic shapes.".to_string()),
            activities: Some("Sorting games and finger painting.".to_string()),
            goals: None,
            start_date: "2025-04-07".to_string(),
            end_date: "2025-04-11".to_string(),
            teacher_id: "t1".to_string(),
        }];
        let mut names = HashMap::new();
        names.insert("t1".to_string(), "Ms. Rivera".to_string());
        let doc = compose_plan_report(&plans, &names, &PlanReportOptions::default())
            .expect("compose");
        let text = rendered_text(doc);
        assert!(text.contains("Shapes and Colours"));
        assert!(text.contains("Teacher: Ms. Rivera"));
        assert!(text.contains("Period: 07 Apr 2025 to 11 Apr 2025"));
        assert!(text.contains("Description"));
        assert!(text.contains("Activities"));
        assert!(!text.contains("Goals"));
    }
}
