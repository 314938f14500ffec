//! Read-only collection step preceding composition.
//!
//! Every loader returns an empty-but-valid result when nothing matches;
//! only persistence failures surface as errors, and they propagate without
//! retry.

use std::collections::HashMap;

use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection};

use super::{ClassLevel, PlanType, ProgressEntry, Rating, ReportError, Student, TeachingPlan};

#[derive(Debug, Clone, Default)]
pub struct ReportFilters {
    pub class_level: Option<ClassLevel>,
    pub teacher_id: Option<String>,
    pub date_from: Option<String>,
    pub date_to: Option<String>,
    pub plan_type: Option<PlanType>,
}

fn db_err(e: rusqlite::Error) -> ReportError {
    ReportError::new("db_query_failed", e.to_string())
}

fn parse_class_level(raw: &str, id: &str) -> Result<ClassLevel, ReportError> {
    ClassLevel::parse(raw).ok_or_else(|| {
        ReportError::new("bad_record", format!("unknown class level '{}' on {}", raw, id))
    })
}

fn parse_rating(raw: &str, id: &str) -> Result<Rating, ReportError> {
    Rating::parse(raw).ok_or_else(|| {
        ReportError::new("bad_record", format!("unknown rating '{}' on entry {}", raw, id))
    })
}

pub fn load_students(
    conn: &Connection,
    filters: &ReportFilters,
) -> Result<Vec<Student>, ReportError> {
    let mut sql = String::from(
        "SELECT id, name, age, class_level, learning_ability, writing_speed, photo_url, teacher_id
         FROM students",
    );
    let mut clauses: Vec<&str> = Vec::new();
    let mut values: Vec<Value> = Vec::new();
    if let Some(class_level) = filters.class_level {
        clauses.push("class_level = ?");
        values.push(Value::Text(class_level.as_str().to_string()));
    }
    if let Some(teacher_id) = &filters.teacher_id {
        clauses.push("teacher_id = ?");
        values.push(Value::Text(teacher_id.clone()));
    }
    if !clauses.is_empty() {
        sql.push_str(" WHERE ");
        sql.push_str(&clauses.join(" AND "));
    }
    sql.push_str(" ORDER BY sort_order");

    let mut stmt = conn.prepare(&sql).map_err(db_err)?;
    let rows = stmt
        .query_map(params_from_iter(values), |r| {
            Ok((
                r.get::<_, String>(0)?,
                r.get::<_, String>(1)?,
                r.get::<_, i64>(2)?,
                r.get::<_, String>(3)?,
                r.get::<_, Option<String>>(4)?,
                r.get::<_, Option<String>>(5)?,
                r.get::<_, Option<String>>(6)?,
                r.get::<_, String>(7)?,
            ))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(db_err)?;

    let mut students = Vec::with_capacity(rows.len());
    for (id, name, age, class_raw, learning_ability, writing_speed, photo_url, teacher_id) in rows {
        let class_level = parse_class_level(&class_raw, &id)?;
        students.push(Student {
            id,
            name,
            age,
            class_level,
            learning_ability,
            writing_speed,
            photo_url,
            teacher_id,
        });
    }
    Ok(students)
}

/// Progress entries per student, newest first, optionally date-bounded.
pub fn load_progress(
    conn: &Connection,
    students: &[Student],
    filters: &ReportFilters,
) -> Result<HashMap<String, Vec<ProgressEntry>>, ReportError> {
    let mut sql = String::from(
        "SELECT id, student_id, entry_date, social, motor, language, numeracy, creativity, comments
         FROM progress_entries
         WHERE student_id = ?",
    );
    if filters.date_from.is_some() {
        sql.push_str(" AND entry_date >= ?");
    }
    if filters.date_to.is_some() {
        sql.push_str(" AND entry_date <= ?");
    }
    sql.push_str(" ORDER BY entry_date DESC, created_at DESC");

    let mut stmt = conn.prepare(&sql).map_err(db_err)?;
    let mut by_student = HashMap::new();
    for student in students {
        let mut values: Vec<Value> = vec![Value::Text(student.id.clone())];
        if let Some(from) = &filters.date_from {
            values.push(Value::Text(from.clone()));
        }
        if let Some(to) = &filters.date_to {
            values.push(Value::Text(to.clone()));
        }
        let rows = stmt
            .query_map(params_from_iter(values), |r| {
                Ok((
                    r.get::<_, String>(0)?,
                    r.get::<_, String>(1)?,
                    r.get::<_, String>(2)?,
                    r.get::<_, String>(3)?,
                    r.get::<_, String>(4)?,
                    r.get::<_, String>(5)?,
                    r.get::<_, String>(6)?,
                    r.get::<_, String>(7)?,
                    r.get::<_, Option<String>>(8)?,
                ))
            })
            .and_then(|it| it.collect::<Result<Vec<_>, _>>())
            .map_err(db_err)?;

        let mut entries = Vec::with_capacity(rows.len());
        for (id, student_id, entry_date, social, motor, language, numeracy, creativity, comments) in
            rows
        {
            entries.push(ProgressEntry {
                social: parse_rating(&social, &id)?,
                motor: parse_rating(&motor, &id)?,
                language: parse_rating(&language, &id)?,
                numeracy: parse_rating(&numeracy, &id)?,
                creativity: parse_rating(&creativity, &id)?,
                id,
                student_id,
                entry_date,
                comments,
            });
        }
        by_student.insert(student.id.clone(), entries);
    }
    Ok(by_student)
}

pub fn load_plans(
    conn: &Connection,
    filters: &ReportFilters,
) -> Result<Vec<TeachingPlan>, ReportError> {
    let mut sql = String::from(
        "SELECT id, plan_type, class_level, title, description, activities, goals,
                start_date, end_date, teacher_id
         FROM teaching_plans",
    );
    let mut clauses: Vec<&str> = Vec::new();
    let mut values: Vec<Value> = Vec::new();
    if let Some(plan_type) = filters.plan_type {
        clauses.push("plan_type = ?");
        values.push(Value::Text(plan_type.as_str().to_string()));
    }
    if let Some(class_level) = filters.class_level {
        clauses.push("class_level = ?");
        values.push(Value::Text(class_level.as_str().to_string()));
    }
    if let Some(teacher_id) = &filters.teacher_id {
        clauses.push("teacher_id = ?");
        values.push(Value::Text(teacher_id.clone()));
    }
    // Date filters select plans whose range overlaps the requested window.
    if let Some(from) = &filters.date_from {
        clauses.push("end_date >= ?");
        values.push(Value::Text(from.clone()));
    }
    if let Some(to) = &filters.date_to {
        clauses.push("start_date <= ?");
        values.push(Value::Text(to.clone()));
    }
    if !clauses.is_empty() {
        sql.push_str(" WHERE ");
        sql.push_str(&clauses.join(" AND "));
    }
    sql.push_str(" ORDER BY start_date DESC, title");

    let mut stmt = conn.prepare(&sql).map_err(db_err)?;
    let rows = stmt
        .query_map(params_from_iter(values), |r| {
            Ok((
                r.get::<_, String>(0)?,
                r.get::<_, String>(1)?,
                r.get::<_, String>(2)?,
                r.get::<_, String>(3)?,
                r.get::<_, Option<String>>(4)?,
                r.get::<_, Option<String>>(5)?,
                r.get::<_, Option<String>>(6)?,
                r.get::<_, String>(7)?,
                r.get::<_, String>(8)?,
                r.get::<_, String>(9)?,
            ))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(db_err)?;

    let mut plans = Vec::with_capacity(rows.len());
    for (
        id,
        type_raw,
        class_raw,
        title,
        description,
        activities,
        goals,
        start_date,
        end_date,
        teacher_id,
    ) in rows
    {
        let plan_type = PlanType::parse(&type_raw).ok_or_else(|| {
            ReportError::new("bad_record", format!("unknown plan type '{}' on {}", type_raw, id))
        })?;
        let class_level = parse_class_level(&class_raw, &id)?;
        plans.push(TeachingPlan {
            id,
            plan_type,
            class_level,
            title,
            description,
            activities,
            goals,
            start_date,
            end_date,
            teacher_id,
        });
    }
    Ok(plans)
}

/// Teacher display names keyed by id, for plan headers.
pub fn teacher_names(conn: &Connection) -> Result<HashMap<String, String>, ReportError> {
    let mut stmt = conn
        .prepare("SELECT id, name FROM teachers")
        .map_err(db_err)?;
    let rows = stmt
        .query_map([], |r| Ok((r.get::<_, String>(0)?, r.get::<_, String>(1)?)))
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(db_err)?;
    Ok(rows.into_iter().collect())
}
