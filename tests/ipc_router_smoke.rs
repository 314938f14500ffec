use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::time::{SystemTime, UNIX_EPOCH};

fn temp_dir(prefix: &str) -> PathBuf {
    let p = std::env::temp_dir().join(format!(
        "{}-{}",
        prefix,
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos()
    ));
    std::fs::create_dir_all(&p).expect("create temp dir");
    p
}

fn spawn_sidecar() -> (Child, ChildStdin, BufReader<ChildStdout>) {
    let exe = env!("CARGO_BIN_EXE_littlestepsd");
    let mut child = Command::new(exe)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn littlestepsd");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    (child, stdin, BufReader::new(stdout))
}

fn request(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let payload = json!({
        "id": id,
        "method": method,
        "params": params,
    });
    writeln!(stdin, "{}", payload).expect("write request");
    stdin.flush().expect("flush request");

    let mut line = String::new();
    reader.read_line(&mut line).expect("read response line");
    assert!(!line.trim().is_empty(), "empty response for {}", method);
    let value: serde_json::Value = serde_json::from_str(line.trim()).expect("parse response json");
    assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id));
    value
}

fn request_ok(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let value = request(stdin, reader, id, method, params);
    assert!(
        value.get("ok").and_then(|v| v.as_bool()).unwrap_or(false),
        "{} failed: {}",
        method,
        value
            .get("error")
            .and_then(|e| e.get("message"))
            .and_then(|v| v.as_str())
            .unwrap_or("unknown error")
    );
    value.get("result").cloned().unwrap_or_else(|| json!({}))
}

fn error_code(value: &serde_json::Value) -> &str {
    value
        .get("error")
        .and_then(|e| e.get("code"))
        .and_then(|v| v.as_str())
        .unwrap_or("")
}

#[test]
fn router_dispatch_smoke_covers_handler_families() {
    let workspace = temp_dir("littlesteps-router-smoke");
    let report_out = workspace.join("smoke-report.pdf");

    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    let _ = request_ok(&mut stdin, &mut reader, "1", "health", json!({}));

    // Everything except health needs a workspace first.
    let early = request(
        &mut stdin,
        &mut reader,
        "2",
        "students.list",
        json!({}),
    );
    assert_eq!(error_code(&early), "no_workspace");

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );

    let teacher = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "teachers.create",
        json!({ "name": "Ms. Okafor", "email": "okafor@littlesteps.test" }),
    );
    let teacher_id = teacher
        .get("teacherId")
        .and_then(|v| v.as_str())
        .expect("teacherId")
        .to_string();

    let listed = request_ok(&mut stdin, &mut reader, "5", "teachers.list", json!({}));
    assert_eq!(
        listed
            .get("teachers")
            .and_then(|v| v.as_array())
            .map(|v| v.len()),
        Some(1)
    );

    let student = request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "students.create",
        json!({
            "name": "Priya Nair",
            "age": 4,
            "classLevel": "LKG",
            "teacherId": teacher_id,
            "learningAbility": "Average"
        }),
    );
    let student_id = student
        .get("studentId")
        .and_then(|v| v.as_str())
        .expect("studentId")
        .to_string();

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "7",
        "students.update",
        json!({ "studentId": student_id, "patch": { "writingSpeed": "Fast" } }),
    );

    let bad_rating = request(
        &mut stdin,
        &mut reader,
        "8",
        "progress.add",
        json!({
            "studentId": student_id,
            "date": "2025-06-02",
            "ratings": {
                "social": "Amazing",
                "motor": "Good",
                "language": "Good",
                "numeracy": "Good",
                "creativity": "Good"
            }
        }),
    );
    assert_eq!(error_code(&bad_rating), "bad_params");

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "9",
        "progress.add",
        json!({
            "studentId": student_id,
            "date": "2025-06-02",
            "ratings": {
                "social": "Good",
                "motor": "Excellent",
                "language": "Good",
                "numeracy": "Needs Improvement",
                "creativity": "Good"
            },
            "comments": "Settling in well."
        }),
    );

    let entries = request_ok(
        &mut stdin,
        &mut reader,
        "10",
        "progress.list",
        json!({ "studentId": student_id }),
    );
    assert_eq!(
        entries
            .get("entries")
            .and_then(|v| v.as_array())
            .map(|v| v.len()),
        Some(1)
    );

    let plan = request_ok(
        &mut stdin,
        &mut reader,
        "11",
        "plans.create",
        json!({
            "type": "Weekly",
            "classLevel": "LKG",
            "title": "Water Play Week",
            "teacherId": teacher
                .get("teacherId")
                .and_then(|v| v.as_str())
                .expect("teacherId"),
            "startDate": "2025-06-02",
            "endDate": "2025-06-06",
            "activities": "Pouring, floating and sinking."
        }),
    );
    assert!(plan.get("planId").and_then(|v| v.as_str()).is_some());

    let plans = request_ok(
        &mut stdin,
        &mut reader,
        "12",
        "plans.list",
        json!({ "type": "Weekly" }),
    );
    assert_eq!(
        plans
            .get("plans")
            .and_then(|v| v.as_array())
            .map(|v| v.len()),
        Some(1)
    );

    let report = request_ok(
        &mut stdin,
        &mut reader,
        "13",
        "reports.studentProgressPdf",
        json!({
            "outPath": report_out.to_string_lossy(),
            "classLevel": "LKG"
        }),
    );
    assert!(report.get("pageCount").and_then(|v| v.as_u64()).unwrap_or(0) >= 1);
    assert!(report_out.exists());

    // Teacher still referenced; delete must refuse.
    let refused = request(
        &mut stdin,
        &mut reader,
        "14",
        "teachers.delete",
        json!({ "teacherId": teacher.get("teacherId").and_then(|v| v.as_str()).expect("teacherId") }),
    );
    assert_eq!(error_code(&refused), "in_use");

    let unknown = request(&mut stdin, &mut reader, "15", "backup.create", json!({}));
    assert_eq!(error_code(&unknown), "not_implemented");

    drop(stdin);
    let _ = child.wait();
}
