use crate::ipc::error::{err, ok};
use crate::ipc::handlers::{db_conn, required_str};
use crate::ipc::types::{AppState, Request};
use crate::report::assets::{resolve_photos, HttpPhotoSource};
use crate::report::{
    aggregate, generate_student_report, generate_teaching_plan_report, ClassLevel, PlanType,
    PlanReportOptions, ReportError, StudentReportOptions,
};
use serde_json::json;
use std::collections::HashMap;
use std::path::Path;

fn report_err(req: &Request, e: ReportError) -> serde_json::Value {
    err(&req.id, &e.code, e.message, e.details)
}

fn parse_filters(req: &Request) -> Result<aggregate::ReportFilters, serde_json::Value> {
    let mut filters = aggregate::ReportFilters::default();
    if let Some(raw) = req.params.get("classLevel").and_then(|v| v.as_str()) {
        let Some(class_level) = ClassLevel::parse(raw) else {
            return Err(err(
                &req.id,
                "bad_params",
                "classLevel must be one of: Nursery, LKG, UKG",
                Some(json!({ "classLevel": raw })),
            ));
        };
        filters.class_level = Some(class_level);
    }
    if let Some(raw) = req.params.get("type").and_then(|v| v.as_str()) {
        let Some(plan_type) = PlanType::parse(raw) else {
            return Err(err(
                &req.id,
                "bad_params",
                "type must be one of: Annual, Monthly, Weekly",
                Some(json!({ "type": raw })),
            ));
        };
        filters.plan_type = Some(plan_type);
    }
    if let Some(teacher_id) = req.params.get("teacherId").and_then(|v| v.as_str()) {
        filters.teacher_id = Some(teacher_id.to_string());
    }
    if let Some(from) = req.params.get("dateFrom").and_then(|v| v.as_str()) {
        filters.date_from = Some(from.to_string());
    }
    if let Some(to) = req.params.get("dateTo").and_then(|v| v.as_str()) {
        filters.date_to = Some(to.to_string());
    }
    Ok(filters)
}

fn write_report(
    req: &Request,
    out_path: &str,
    bytes: &[u8],
    page_count: usize,
) -> serde_json::Value {
    if let Some(parent) = Path::new(out_path).parent() {
        if !parent.as_os_str().is_empty() {
            if let Err(e) = std::fs::create_dir_all(parent) {
                return err(&req.id, "io_failed", e.to_string(), None);
            }
        }
    }
    if let Err(e) = std::fs::write(out_path, bytes) {
        return err(&req.id, "io_failed", e.to_string(), None);
    }
    ok(
        &req.id,
        json!({
            "path": out_path,
            "pageCount": page_count,
            "byteLength": bytes.len()
        }),
    )
}

fn handle_student_progress_pdf(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let out_path = match required_str(req, "outPath") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let filters = match parse_filters(req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let include_photos = req
        .params
        .get("includePhotos")
        .and_then(|v| v.as_bool())
        .unwrap_or(false);

    let students = match aggregate::load_students(conn, &filters) {
        Ok(v) => v,
        Err(e) => return report_err(req, e),
    };
    let progress = match aggregate::load_progress(conn, &students, &filters) {
        Ok(v) => v,
        Err(e) => return report_err(req, e),
    };

    // Photos are resolved up front; a client that cannot even be built is
    // the same degradation as every fetch failing.
    let photos = if include_photos {
        match HttpPhotoSource::new() {
            Ok(source) => resolve_photos(&students, &source),
            Err(e) => {
                log::warn!("photo client unavailable, rendering text-only: {}", e);
                HashMap::new()
            }
        }
    } else {
        HashMap::new()
    };

    let opts = StudentReportOptions {
        include_photos,
        class_level: filters.class_level,
    };
    let report = match generate_student_report(&students, &progress, &photos, &opts) {
        Ok(v) => v,
        Err(e) => return report_err(req, e),
    };
    write_report(req, &out_path, &report.bytes, report.page_count)
}

fn handle_teaching_plan_pdf(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let out_path = match required_str(req, "outPath") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let filters = match parse_filters(req) {
        Ok(v) => v,
        Err(e) => return e,
    };

    let plans = match aggregate::load_plans(conn, &filters) {
        Ok(v) => v,
        Err(e) => return report_err(req, e),
    };
    let names = match aggregate::teacher_names(conn) {
        Ok(v) => v,
        Err(e) => return report_err(req, e),
    };

    let opts = PlanReportOptions {
        plan_type: filters.plan_type,
        class_level: filters.class_level,
    };
    let report = match generate_teaching_plan_report(&plans, &names, &opts) {
        Ok(v) => v,
        Err(e) => return report_err(req, e),
    };
    write_report(req, &out_path, &report.bytes, report.page_count)
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "reports.studentProgressPdf" => Some(handle_student_progress_pdf(state, req)),
        "reports.teachingPlanPdf" => Some(handle_teaching_plan_pdf(state, req)),
        _ => None,
    }
}
