use crate::ipc::error::{err, ok};
use crate::ipc::handlers::{db_conn, now_ts, opt_str, required_str};
use crate::ipc::types::{AppState, Request};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, OptionalExtension};
use serde_json::json;
use uuid::Uuid;

const ROLES: [&str; 2] = ["admin", "teacher"];

fn handle_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let mut stmt = match conn.prepare(
        "SELECT id, name, email, role, active FROM teachers ORDER BY name",
    ) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let teachers = match stmt
        .query_map([], |r| {
            let id: String = r.get(0)?;
            let name: String = r.get(1)?;
            let email: Option<String> = r.get(2)?;
            let role: String = r.get(3)?;
            let active: i64 = r.get(4)?;
            Ok(json!({
                "id": id,
                "name": name,
                "email": email,
                "role": role,
                "active": active != 0
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
    {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    ok(&req.id, json!({ "teachers": teachers }))
}

fn handle_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let name = match required_str(req, "name") {
        Ok(v) => v.trim().to_string(),
        Err(e) => return e,
    };
    if name.is_empty() {
        return err(&req.id, "bad_params", "name must not be empty", None);
    }
    let email = match opt_str(&req.params, "email") {
        Ok(v) => v,
        Err(m) => return err(&req.id, "bad_params", m, None),
    };
    let role = match opt_str(&req.params, "role") {
        Ok(v) => v.unwrap_or_else(|| "teacher".to_string()),
        Err(m) => return err(&req.id, "bad_params", m, None),
    };
    if !ROLES.contains(&role.as_str()) {
        return err(
            &req.id,
            "bad_params",
            "role must be one of: admin, teacher",
            Some(json!({ "role": role })),
        );
    }

    let teacher_id = Uuid::new_v4().to_string();
    let ts = now_ts();
    if let Err(e) = conn.execute(
        "INSERT INTO teachers(id, name, email, role, active, created_at, updated_at)
         VALUES(?, ?, ?, ?, 1, ?, ?)",
        params![teacher_id, name, email, role, ts, ts],
    ) {
        return err(&req.id, "db_insert_failed", e.to_string(), None);
    }
    ok(&req.id, json!({ "teacherId": teacher_id }))
}

fn handle_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let teacher_id = match required_str(req, "teacherId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let Some(patch) = req.params.get("patch").and_then(|v| v.as_object()) else {
        return err(&req.id, "bad_params", "missing patch", None);
    };

    let exists = match conn
        .query_row("SELECT 1 FROM teachers WHERE id = ?", [&teacher_id], |_r| {
            Ok(())
        })
        .optional()
    {
        Ok(v) => v.is_some(),
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    if !exists {
        return err(&req.id, "not_found", "teacher not found", None);
    }

    let mut fields: Vec<String> = Vec::new();
    let mut values: Vec<Value> = Vec::new();
    for (k, v) in patch {
        match k.as_str() {
            "name" => {
                let Some(s) = v.as_str().map(str::trim).filter(|s| !s.is_empty()) else {
                    return err(&req.id, "bad_params", "patch.name must be a non-empty string", None);
                };
                fields.push("name = ?".to_string());
                values.push(Value::Text(s.to_string()));
            }
            "email" => {
                fields.push("email = ?".to_string());
                if v.is_null() {
                    values.push(Value::Null);
                } else if let Some(s) = v.as_str() {
                    values.push(Value::Text(s.trim().to_string()));
                } else {
                    return err(&req.id, "bad_params", "patch.email must be string or null", None);
                }
            }
            "role" => {
                let Some(s) = v.as_str().filter(|s| ROLES.contains(s)) else {
                    return err(&req.id, "bad_params", "patch.role must be one of: admin, teacher", None);
                };
                fields.push("role = ?".to_string());
                values.push(Value::Text(s.to_string()));
            }
            "active" => {
                let Some(b) = v.as_bool() else {
                    return err(&req.id, "bad_params", "patch.active must be boolean", None);
                };
                fields.push("active = ?".to_string());
                values.push(Value::Integer(if b { 1 } else { 0 }));
            }
            _ => return err(&req.id, "bad_params", format!("unknown patch field: {}", k), None),
        }
    }
    if fields.is_empty() {
        return ok(&req.id, json!({ "ok": true }));
    }
    fields.push("updated_at = ?".to_string());
    values.push(Value::Text(now_ts()));
    values.push(Value::Text(teacher_id));
    let sql = format!("UPDATE teachers SET {} WHERE id = ?", fields.join(", "));
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
    let teacher_id = match required_str(req, "teacherId") {
        Ok(v) => v,
        Err(e) => return e,
    };

    let referenced: i64 = match conn.query_row(
        "SELECT (SELECT COUNT(*) FROM students WHERE teacher_id = ?1)
              + (SELECT COUNT(*) FROM teaching_plans WHERE teacher_id = ?1)",
        [&teacher_id],
        |r| r.get(0),
    ) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    if referenced > 0 {
        return err(
            &req.id,
            "in_use",
            "teacher still has students or plans",
            Some(json!({ "references": referenced })),
        );
    }

    match conn.execute("DELETE FROM teachers WHERE id = ?", [&teacher_id]) {
        Ok(0) => err(&req.id, "not_found", "teacher not found", None),
        Ok(_) => ok(&req.id, json!({ "ok": true })),
        Err(e) => err(&req.id, "db_delete_failed", e.to_string(), None),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "teachers.list" => Some(handle_list(state, req)),
        "teachers.create" => Some(handle_create(state, req)),
        "teachers.update" => Some(handle_update(state, req)),
        "teachers.delete" => Some(handle_delete(state, req)),
        _ => None,
    }
}
