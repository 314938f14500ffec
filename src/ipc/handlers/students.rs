use crate::ipc::error::{err, ok};
use crate::ipc::handlers::{db_conn, now_ts, opt_str, required_str};
use crate::ipc::types::{AppState, Request};
use crate::report::ClassLevel;
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

fn handle_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };

    let mut sql = String::from(
        "SELECT id, name, age, class_level, learning_ability, writing_speed, photo_url,
                teacher_id, sort_order
         FROM students",
    );
    let mut clauses: Vec<&str> = Vec::new();
    let mut values: Vec<Value> = Vec::new();
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
    sql.push_str(" ORDER BY sort_order");

    let mut stmt = match conn.prepare(&sql) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let students = match stmt
        .query_map(params_from_iter(values), |r| {
            let id: String = r.get(0)?;
            let name: String = r.get(1)?;
            let age: i64 = r.get(2)?;
            let class_level: String = r.get(3)?;
            let learning_ability: Option<String> = r.get(4)?;
            let writing_speed: Option<String> = r.get(5)?;
            let photo_url: Option<String> = r.get(6)?;
            let teacher_id: String = r.get(7)?;
            let sort_order: i64 = r.get(8)?;
            Ok(json!({
                "id": id,
                "name": name,
                "age": age,
                "classLevel": class_level,
                "learningAbility": learning_ability,
                "writingSpeed": writing_speed,
                "photoUrl": photo_url,
                "teacherId": teacher_id,
                "sortOrder": sort_order
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
    {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    ok(&req.id, json!({ "students": students }))
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
    let age = match req.params.get("age").and_then(|v| v.as_i64()) {
        Some(v) if v >= 1 => v,
        Some(_) => return err(&req.id, "bad_params", "age must be >= 1", None),
        None => return err(&req.id, "bad_params", "missing age", None),
    };
    let class_raw = match required_str(req, "classLevel") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let class_level = match parse_class_level(req, &class_raw) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let teacher_id = match required_str(req, "teacherId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    match teacher_exists(conn, &teacher_id) {
        Ok(true) => {}
        Ok(false) => return err(&req.id, "not_found", "teacher not found", None),
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    }
    let learning_ability = match opt_str(&req.params, "learningAbility") {
        Ok(v) => v,
        Err(m) => return err(&req.id, "bad_params", m, None),
    };
    let writing_speed = match opt_str(&req.params, "writingSpeed") {
        Ok(v) => v,
        Err(m) => return err(&req.id, "bad_params", m, None),
    };
    let photo_url = match opt_str(&req.params, "photoUrl") {
        Ok(v) => v,
        Err(m) => return err(&req.id, "bad_params", m, None),
    };

    let sort_order: i64 = match conn.query_row(
        "SELECT COALESCE(MAX(sort_order), -1) + 1 FROM students WHERE class_level = ?",
        [class_level.as_str()],
        |r| r.get(0),
    ) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let student_id = Uuid::new_v4().to_string();
    let ts = now_ts();
    if let Err(e) = conn.execute(
        "INSERT INTO students(
            id, name, age, class_level, learning_ability, writing_speed, photo_url,
            teacher_id, sort_order, created_at, updated_at
         ) VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        params![
            student_id,
            name,
            age,
            class_level.as_str(),
            learning_ability,
            writing_speed,
            photo_url,
            teacher_id,
            sort_order,
            ts,
            ts
        ],
    ) {
        return err(&req.id, "db_insert_failed", e.to_string(), None);
    }
    ok(&req.id, json!({ "studentId": student_id }))
}

fn handle_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let student_id = match required_str(req, "studentId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let Some(patch) = req.params.get("patch").and_then(|v| v.as_object()) else {
        return err(&req.id, "bad_params", "missing patch", None);
    };

    let exists = match conn
        .query_row("SELECT 1 FROM students WHERE id = ?", [&student_id], |_r| {
            Ok(())
        })
        .optional()
    {
        Ok(v) => v.is_some(),
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    if !exists {
        return err(&req.id, "not_found", "student not found", None);
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
            "age" => {
                let Some(n) = v.as_i64().filter(|n| *n >= 1) else {
                    return err(&req.id, "bad_params", "patch.age must be an integer >= 1", None);
                };
                fields.push("age = ?".to_string());
                values.push(Value::Integer(n));
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
            "learningAbility" => {
                fields.push("learning_ability = ?".to_string());
                if v.is_null() {
                    values.push(Value::Null);
                } else if let Some(s) = v.as_str() {
                    values.push(Value::Text(s.trim().to_string()));
                } else {
                    return err(&req.id, "bad_params", "patch.learningAbility must be string or null", None);
                }
            }
            "writingSpeed" => {
                fields.push("writing_speed = ?".to_string());
                if v.is_null() {
                    values.push(Value::Null);
                } else if let Some(s) = v.as_str() {
                    values.push(Value::Text(s.trim().to_string()));
                } else {
                    return err(&req.id, "bad_params", "patch.writingSpeed must be string or null", None);
                }
            }
            "photoUrl" => {
                fields.push("photo_url = ?".to_string());
                if v.is_null() {
                    values.push(Value::Null);
                } else if let Some(s) = v.as_str() {
                    values.push(Value::Text(s.trim().to_string()));
                } else {
                    return err(&req.id, "bad_params", "patch.photoUrl must be string or null", None);
                }
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
            "sortOrder" => {
                let Some(n) = v.as_i64().filter(|n| *n >= 0) else {
                    return err(&req.id, "bad_params", "patch.sortOrder must be an integer >= 0", None);
                };
                fields.push("sort_order = ?".to_string());
                values.push(Value::Integer(n));
            }
            _ => return err(&req.id, "bad_params", format!("unknown patch field: {}", k), None),
        }
    }
    if fields.is_empty() {
        return ok(&req.id, json!({ "ok": true }));
    }
    fields.push("updated_at = ?".to_string());
    values.push(Value::Text(now_ts()));
    values.push(Value::Text(student_id));
    let sql = format!("UPDATE students SET {} WHERE id = ?", fields.join(", "));
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
    let student_id = match required_str(req, "studentId") {
        Ok(v) => v,
        Err(e) => return e,
    };

    // Progress entries go with the student.
    if let Err(e) = conn.execute(
        "DELETE FROM progress_entries WHERE student_id = ?",
        [&student_id],
    ) {
        return err(&req.id, "db_delete_failed", e.to_string(), None);
    }
    match conn.execute("DELETE FROM students WHERE id = ?", [&student_id]) {
        Ok(0) => err(&req.id, "not_found", "student not found", None),
        Ok(_) => ok(&req.id, json!({ "ok": true })),
        Err(e) => err(&req.id, "db_delete_failed", e.to_string(), None),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "students.list" => Some(handle_list(state, req)),
        "students.create" => Some(handle_create(state, req)),
        "students.update" => Some(handle_update(state, req)),
        "students.delete" => Some(handle_delete(state, req)),
        _ => None,
    }
}
