use crate::ipc::error::{err, ok};
use crate::ipc::handlers::{db_conn, now_ts, opt_str, required_str};
use crate::ipc::types::{AppState, Request};
use crate::report::Rating;
use chrono::NaiveDate;
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use serde_json::json;
use uuid::Uuid;

/// Rating columns in storage order; patch keys match.
const DOMAINS: [&str; 5] = ["social", "motor", "language", "numeracy", "creativity"];

fn student_exists(conn: &Connection, student_id: &str) -> Result<bool, rusqlite::Error> {
    conn.query_row("SELECT 1 FROM students WHERE id = ?", [student_id], |_r| {
        Ok(())
    })
    .optional()
    .map(|v| v.is_some())
}

fn parse_rating(req: &Request, domain: &str, value: &str) -> Result<Rating, serde_json::Value> {
    Rating::parse(value).ok_or_else(|| {
        err(
            &req.id,
            "bad_params",
            format!(
                "ratings.{} must be one of: Excellent, Good, Needs Improvement",
                domain
            ),
            Some(json!({ domain: value })),
        )
    })
}

fn parse_entry_date(req: &Request, value: &str) -> Result<String, serde_json::Value> {
    match NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d") {
        Ok(d) => Ok(d.format("%Y-%m-%d").to_string()),
        Err(_) => Err(err(
            &req.id,
            "bad_params",
            "date must be YYYY-MM-DD",
            Some(json!({ "date": value })),
        )),
    }
}

fn handle_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let student_id = match required_str(req, "studentId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    match student_exists(conn, &student_id) {
        Ok(true) => {}
        Ok(false) => return err(&req.id, "not_found", "student not found", None),
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    }

    let mut stmt = match conn.prepare(
        "SELECT id, entry_date, social, motor, language, numeracy, creativity, comments
         FROM progress_entries
         WHERE student_id = ?
         ORDER BY entry_date DESC, created_at DESC",
    ) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let entries = match stmt
        .query_map([&student_id], |r| {
            let id: String = r.get(0)?;
            let entry_date: String = r.get(1)?;
            let social: String = r.get(2)?;
            let motor: String = r.get(3)?;
            let language: String = r.get(4)?;
            let numeracy: String = r.get(5)?;
            let creativity: String = r.get(6)?;
            let comments: Option<String> = r.get(7)?;
            Ok(json!({
                "id": id,
                "date": entry_date,
                "ratings": {
                    "social": social,
                    "motor": motor,
                    "language": language,
                    "numeracy": numeracy,
                    "creativity": creativity
                },
                "comments": comments
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
    {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    ok(&req.id, json!({ "entries": entries }))
}

fn handle_add(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let student_id = match required_str(req, "studentId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    match student_exists(conn, &student_id) {
        Ok(true) => {}
        Ok(false) => return err(&req.id, "not_found", "student not found", None),
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    }
    let date = match required_str(req, "date") {
        Ok(v) => match parse_entry_date(req, &v) {
            Ok(d) => d,
            Err(e) => return e,
        },
        Err(e) => return e,
    };
    let Some(ratings) = req.params.get("ratings").and_then(|v| v.as_object()) else {
        return err(&req.id, "bad_params", "missing ratings", None);
    };
    let mut parsed = Vec::with_capacity(DOMAINS.len());
    for domain in DOMAINS {
        let Some(raw) = ratings.get(domain).and_then(|v| v.as_str()) else {
            return err(&req.id, "bad_params", format!("missing ratings.{}", domain), None);
        };
        match parse_rating(req, domain, raw) {
            Ok(r) => parsed.push(r),
            Err(e) => return e,
        }
    }
    let comments = match opt_str(&req.params, "comments") {
        Ok(v) => v,
        Err(m) => return err(&req.id, "bad_params", m, None),
    };

    let entry_id = Uuid::new_v4().to_string();
    let ts = now_ts();
    if let Err(e) = conn.execute(
        "INSERT INTO progress_entries(
            id, student_id, entry_date, social, motor, language, numeracy, creativity,
            comments, created_at, updated_at
         ) VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        params![
            entry_id,
            student_id,
            date,
            parsed[0].as_str(),
            parsed[1].as_str(),
            parsed[2].as_str(),
            parsed[3].as_str(),
            parsed[4].as_str(),
            comments,
            ts,
            ts
        ],
    ) {
        return err(&req.id, "db_insert_failed", e.to_string(), None);
    }
    ok(&req.id, json!({ "entryId": entry_id }))
}

fn handle_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let entry_id = match required_str(req, "entryId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let Some(patch) = req.params.get("patch").and_then(|v| v.as_object()) else {
        return err(&req.id, "bad_params", "missing patch", None);
    };

    let exists = match conn
        .query_row(
            "SELECT 1 FROM progress_entries WHERE id = ?",
            [&entry_id],
            |_r| Ok(()),
        )
        .optional()
    {
        Ok(v) => v.is_some(),
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    if !exists {
        return err(&req.id, "not_found", "progress entry not found", None);
    }

    let mut fields: Vec<String> = Vec::new();
    let mut values: Vec<Value> = Vec::new();
    for (k, v) in patch {
        match k.as_str() {
            "date" => {
                let Some(s) = v.as_str() else {
                    return err(&req.id, "bad_params", "patch.date must be string", None);
                };
                let date = match parse_entry_date(req, s) {
                    Ok(d) => d,
                    Err(e) => return e,
                };
                fields.push("entry_date = ?".to_string());
                values.push(Value::Text(date));
            }
            "comments" => {
                fields.push("comments = ?".to_string());
                if v.is_null() {
                    values.push(Value::Null);
                } else if let Some(s) = v.as_str() {
                    values.push(Value::Text(s.to_string()));
                } else {
                    return err(&req.id, "bad_params", "patch.comments must be string or null", None);
                }
            }
            domain if DOMAINS.contains(&domain) => {
                let Some(s) = v.as_str() else {
                    return err(&req.id, "bad_params", format!("patch.{} must be string", domain), None);
                };
                let rating = match parse_rating(req, domain, s) {
                    Ok(r) => r,
                    Err(e) => return e,
                };
                fields.push(format!("{} = ?", domain));
                values.push(Value::Text(rating.as_str().to_string()));
            }
            _ => return err(&req.id, "bad_params", format!("unknown patch field: {}", k), None),
        }
    }
    if fields.is_empty() {
        return ok(&req.id, json!({ "ok": true }));
    }
    fields.push("updated_at = ?".to_string());
    values.push(Value::Text(now_ts()));
    values.push(Value::Text(entry_id));
    let sql = format!(
        "UPDATE progress_entries SET {} WHERE id = ?",
        fields.join(", ")
    );
    if let Err(e) = conn.execute(&sql, params_from_iter(values)) {
        return err(&req.id, "db_update_failed", e.to_string(), None);
    }
    ok(&req.id, json!({ "ok": true }))
}

fn handle_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let entry_id = match required_str(req, "entryId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    match conn.execute("DELETE FROM progress_entries WHERE id = ?", [&entry_id]) {
        Ok(0) => err(&req.id, "not_found", "progress entry not found", None),
        Ok(_) => ok(&req.id, json!({ "ok": true })),
        Err(e) => err(&req.id, "db_delete_failed", e.to_string(), None),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "progress.list" => Some(handle_list(state, req)),
        "progress.add" => Some(handle_add(state, req)),
        "progress.update" => Some(handle_update(state, req)),
        "progress.delete" => Some(handle_delete(state, req)),
        _ => None,
    }
}
