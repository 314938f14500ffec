use crate::ipc::error::{err, ok};
use crate::ipc::handlers::{db_conn, now_ts, opt_str, required_str};
use crate::ipc::types::{AppState, Request};
use crate::report::{ClassLevel, PlanType};
use chrono::NaiveDate;
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use serde_json::json;
use uuid::Uuid;

fn teacher_exists(conn: &Connection, teacher_id: &str) -> Result<bool, rusqlite::Error> {
    conn.query_row("SELECT 1 FROM teachers WHERE id = ?", [teacher_id], |_r| {
        Ok(())
    })
    .optional()
    .map(|v| v.is_some())
}

fn parse_plan_type(req: &Request, value: &str) -> Result<PlanType, serde_json::Value> {
    PlanType::parse(value).ok_or_else(|| {
        err(
            &req.id,
            "bad_params",
            "type must be one of: Annual, Monthly, Weekly",
            Some(json!({ "type": value })),
        )
    })
}

fn parse_class_level(req: &Request, value: &str) -> Result<ClassLevel, serde_json::Value> {
    ClassLevel::parse(value).ok_or_else(|| {
        err(
            &req.id,
            "bad_params",
            "classLevel must be one of: Nursery, LKG, UKG",
            Some(json!({ "classLevel": value })),
        )
    })
}

fn parse_plan_date(req: &Request, key: &str, value: &str) -> Result<String, serde_json::Value> {
    match NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d") {
        Ok(d) => Ok(d.format("%Y-%m-%d").to_string()),
        Err(_) => Err(err(
            &req.id,
            "bad_params",
            format!("{} must be YYYY-MM-DD", key),
            Some(json!({ key: value })),
        )),
    }
}

fn handle_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };

    let mut sql = String::from(
        "SELECT id, plan_type, class_level, title, description, activities, goals,
                start_date, end_date, teacher_id
         FROM teaching_plans",
    );
    let mut clauses: Vec<&str> = Vec::new();
    let mut values: Vec<Value> = Vec::new();
    if let Some(raw) = req.params.get("type").and_then(|v| v.as_str()) {
        let plan_type = match parse_plan_type(req, raw) {
            Ok(v) => v,
            Err(e) => return e,
        };
        clauses.push("plan_type = ?");
        values.push(Value::Text(plan_type.as_str().to_string()));
    }
    if let Some(raw) = req.params.get("classLevel").and_then(|v| v.as_str()) {
        let class_level = match parse_class_level(req, raw) {
            Ok(v) => v,
            Err(e) => return e,
        };
        clauses.push("class_level = ?");
        values.push(Value::Text(class_level.as_str().to_string()));
    }
    if let Some(teacher_id) = req.params.get("teacherId").and_then(|v| v.as_str()) {
        clauses.push("teacher_id = ?");
        values.push(Value::Text(teacher_id.to_string()));
    }
    if !clauses.is_empty() {
        sql.push_str(" WHERE ");
        sql.push_str(&clauses.join(" AND "));
    }
    sql.push_str(" ORDER BY start_date DESC, title");

    let mut stmt = match conn.prepare(&sql) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let plans = match stmt
        .query_map(params_from_iter(values), |r| {
            let id: String = r.get(0)?;
            let plan_type: String = r.get(1)?;
            let class_level: String = r.get(2)?;
            let title: String = r.get(3)?;
            let description: Option<String> = r.get(4)?;
            let activities: Option<String> = r.get(5)?;
            let goals: Option<String> = r.get(6)?;
            let start_date: String = r.get(7)?;
            let end_date: String = r.get(8)?;
            let teacher_id: String = r.get(9)?;
            Ok(json!({
                "id": id,
                "type": plan_type,
                "classLevel": class_level,
                "title": title,
                "description": description,
                "activities": activities,
                "goals": goals,
                "startDate": start_date,
                "endDate": end_date,
                "teacherId": teacher_id
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
    {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    ok(&req.id, json!({ "plans": plans }))
}

fn handle_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let type_raw = match required_str(req, "type") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let plan_type = match parse_plan_type(req, &type_raw) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let class_raw = match required_str(req, "classLevel") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let class_level = match parse_class_level(req, &class_raw) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let title = match required_str(req, "title") {
        Ok(v) => v.trim().to_string(),
        Err(e) => return e,
    };
    if title.is_empty() {
        return err(&req.id, "bad_params", "title must not be empty", None);
    }
    let teacher_id = match required_str(req, "teacherId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    match teacher_exists(conn, &teacher_id) {
        Ok(true) => {}
        Ok(false) => return err(&req.id, "not_found", "teacher not found", None),
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    }
    let start_date = match required_str(req, "startDate") {
        Ok(v) => match parse_plan_date(req, "startDate", &v) {
            Ok(d) => d,
            Err(e) => return e,
        },
        Err(e) => return e,
    };
    let end_date = match required_str(req, "endDate") {
        Ok(v) => match parse_plan_date(req, "endDate", &v) {
            Ok(d) => d,
            Err(e) => return e,
        },
        Err(e) => return e,
    };
    if end_date < start_date {
        return err(&req.id, "bad_params", "endDate must not precede startDate", None);
    }
    let description = match opt_str(&req.params, "description") {
        Ok(v) => v,
        Err(m) => return err(&req.id, "bad_params", m, None),
    };
    let activities = match opt_str(&req.params, "activities") {
        Ok(v) => v,
        Err(m) => return err(&req.id, "bad_params", m, None),
    };
    let goals = match opt_str(&req.params, "goals") {
        Ok(v) => v,
        Err(m) => return err(&req.id, "bad_params", m, None),
    };

    let plan_id = Uuid::new_v4().to_string();
    let ts = now_ts();
    if let Err(e) = conn.execute(
        "INSERT INTO teaching_plans(
            id, plan_type, class_level, title, description, activities, goals,
            start_date, end_date, teacher_id, created_at, updated_at
         ) VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        params![
            plan_id,
            plan_type.as_str(),
            class_level.as_str(),
            title,
            description,
            activities,
            goals,
            start_date,
            end_date,
            teacher_id,
            ts,
            ts
        ],
    ) {
        return err(&req.id, "db_insert_failed", e.to_string(), None);
    }
    ok(&req.id, json!({ "planId": plan_id }))
}

fn handle_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let plan_id = match required_str(req, "planId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let Some(patch) = req.params.get("patch").and_then(|v| v.as_object()) else {
        return err(&req.id, "bad_params", "missing patch", None);
    };

    let exists = match conn
        .query_row(
            "SELECT 1 FROM teaching_plans WHERE id = ?",
            [&plan_id],
            |_r| Ok(()),
        )
        .optional()
    {
        Ok(v) => v.is_some(),
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    if !exists {
        return err(&req.id, "not_found", "plan not found", None);
    }

    let mut fields: Vec<String> = Vec::new();
    let mut values: Vec<Value> = Vec::new();
    for (k, v) in patch {
        match k.as_str() {
            "type" => {
                let Some(s) = v.as_str() else {
                    return err(&req.id, "bad_params", "patch.type must be string", None);
                };
                let plan_type = match parse_plan_type(req, s) {
                    Ok(v) => v,
                    Err(e) => return e,
                };
                fields.push("plan_type = ?".to_string());
                values.push(Value::Text(plan_type.as_str().to_string()));
            }
            "classLevel" => {
                let Some(s) = v.as_str() else {
                    return err(&req.id, "bad_params", "patch.classLevel must be string", None);
                };
                let class_level = match parse_class_level(req, s) {
                    Ok(v) => v,
                    Err(e) => return e,
                };
                fields.push("class_level = ?".to_string());
                values.push(Value::Text(class_level.as_str().to_string()));
            }
            "title" => {
                let Some(s) = v.as_str().map(str::trim).filter(|s| !s.is_empty()) else {
                    return err(&req.id, "bad_params", "patch.title must be a non-empty string", None);
                };
                fields.push("title = ?".to_string());
                values.push(Value::Text(s.to_string()));
            }
            "description" | "activities" | "goals" => {
                fields.push(format!("{} = ?", k));
                if v.is_null() {
                    values.push(Value::Null);
                } else if let Some(s) = v.as_str() {
                    values.push(Value::Text(s.to_string()));
                } else {
                    return err(&req.id, "bad_params", format!("patch.{} must be string or null", k), None);
                }
            }
            "startDate" | "endDate" => {
                let Some(s) = v.as_str() else {
                    return err(&req.id, "bad_params", format!("patch.{} must be string", k), None);
                };
                let date = match parse_plan_date(req, k, s) {
                    Ok(d) => d,
                    Err(e) => return e,
                };
                let column = if k == "startDate" { "start_date" } else { "end_date" };
                fields.push(format!("{} = ?", column));
                values.push(Value::Text(date));
            }
            "teacherId" => {
                let Some(s) = v.as_str() else {
                    return err(&req.id, "bad_params", "patch.teacherId must be string", None);
                };
                match teacher_exists(conn, s) {
                    Ok(true) => {}
                    Ok(false) => return err(&req.id, "not_found", "teacher not found", None),
                    Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
                }
                fields.push("teacher_id = ?".to_string());
                values.push(Value::Text(s.to_string()));
            }
            _ => return err(&req.id, "bad_params", format!("unknown patch field: {}", k), None),
        }
    }
    if fields.is_empty() {
        return ok(&req.id, json!({ "ok": true }));
    }
    fields.push("updated_at = ?".to_string());
    values.push(Value::Text(now_ts()));
    values.push(Value::Text(plan_id));
    let sql = format!("UPDATE teaching_plans SET {} WHERE id = ?", fields.join(", "));
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
    let plan_id = match required_str(req, "planId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    match conn.execute("DELETE FROM teaching_plans WHERE id = ?", [&plan_id]) {
        Ok(0) => err(&req.id, "not_found", "plan not found", None),
        Ok(_) => ok(&req.id, json!({ "ok": true })),
        Err(e) => err(&req.id, "db_delete_failed", e.to_string(), None),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "plans.list" => Some(handle_list(state, req)),
        "plans.create" => Some(handle_create(state, req)),
        "plans.update" => Some(handle_update(state, req)),
        "plans.delete" => Some(handle_delete(state, req)),
        _ => None,
    }
}
