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

fn request_ok(
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

fn add_progress(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    student_id: &str,
    date: &str,
    comments: Option<&str>,
) {
    let mut params = json!({
        "studentId": student_id,
        "date": date,
        "ratings": {
            "social": "Good",
            "motor": "Excellent",
            "language": "Good",
            "numeracy": "Good",
            "creativity": "Needs Improvement"
        }
    });
    if let Some(c) = comments {
        params["comments"] = json!(c);
    }
    let _ = request_ok(stdin, reader, id, "progress.add", params);
}

#[test]
fn student_progress_pdf_end_to_end() {
    let workspace = temp_dir("littlesteps-student-pdf");
    let out_path = workspace.join("progress.pdf");

    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );

    let teacher = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "teachers.create",
        json!({ "name": "Mr. Herrera" }),
    );
    let teacher_id = teacher
        .get("teacherId")
        .and_then(|v| v.as_str())
        .expect("teacherId")
        .to_string();

    // One Nursery student with a recorded writing speed (must be omitted),
    // one UKG student with entries, one UKG student with none.
    let nursery = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "students.create",
        json!({
            "name": "Anya Bose",
            "age": 3,
            "classLevel": "Nursery",
            "teacherId": teacher_id,
            "writingSpeed": "Slow"
        }),
    );
    let nursery_id = nursery
        .get("studentId")
        .and_then(|v| v.as_str())
        .expect("studentId")
        .to_string();
    let ukg = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "students.create",
        json!({
            "name": "Rohan Mehta",
            "age": 5,
            "classLevel": "UKG",
            "teacherId": teacher_id,
            "writingSpeed": "Fast",
            "learningAbility": "Quick learner"
        }),
    );
    let ukg_id = ukg
        .get("studentId")
        .and_then(|v| v.as_str())
        .expect("studentId")
        .to_string();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "students.create",
        json!({
            "name": "Sara Iqbal",
            "age": 5,
            "classLevel": "UKG",
            "teacherId": teacher_id
        }),
    );

    add_progress(&mut stdin, &mut reader, "6", &nursery_id, "2025-05-12", None);
    add_progress(&mut stdin, &mut reader, "7", &ukg_id, "2025-04-01", None);
    add_progress(
        &mut stdin,
        &mut reader,
        "8",
        &ukg_id,
        "2025-05-20",
        Some("Counts to twenty unaided."),
    );
    add_progress(&mut stdin, &mut reader, "9", &ukg_id, "2025-05-05", None);

    let report = request_ok(
        &mut stdin,
        &mut reader,
        "10",
        "reports.studentProgressPdf",
        json!({ "outPath": out_path.to_string_lossy() }),
    );

    // One page per student: nothing here overflows.
    assert_eq!(report.get("pageCount").and_then(|v| v.as_u64()), Some(3));

    let bytes = std::fs::read(&out_path).expect("read pdf");
    assert_eq!(
        report.get("byteLength").and_then(|v| v.as_u64()),
        Some(bytes.len() as u64)
    );
    assert!(bytes.starts_with(b"%PDF-"));

    let text = String::from_utf8_lossy(&bytes).to_string();
    assert!(text.contains("Student Progress Report"));
    assert!(text.contains("Anya Bose"));
    assert!(text.contains("Rohan Mehta"));
    assert!(text.contains("Sara Iqbal"));

    // Nursery never shows writing speed; UKG does.
    assert_eq!(text.matches("Writing speed").count(), 1);
    assert!(text.contains("Writing speed: Fast"));

    // Entries newest first.
    let newest = text.find("20 May 2025").expect("newest entry");
    let middle = text.find("05 May 2025").expect("middle entry");
    let oldest = text.find("01 Apr 2025").expect("oldest entry");
    assert!(newest < middle && middle < oldest);
    assert!(text.contains("Comments: Counts to twenty unaided."));

    // Entry-less student gets the notice, not an empty table.
    assert!(text.contains("No progress records for this student."));

    // Footer stamping across the whole document.
    assert!(text.contains("Page 1 of 3"));
    assert!(text.contains("Page 2 of 3"));
    assert!(text.contains("Page 3 of 3"));
    assert!(text.contains("Little Steps Pre-Primary School"));

    drop(stdin);
    let _ = child.wait();
}

#[test]
fn unreachable_photo_degrades_to_text_only() {
    let workspace = temp_dir("littlesteps-photo-degrade");
    let out_path = workspace.join("progress.pdf");

    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let teacher = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "teachers.create",
        json!({ "name": "Ms. Laine" }),
    );
    let teacher_id = teacher
        .get("teacherId")
        .and_then(|v| v.as_str())
        .expect("teacherId")
        .to_string();

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "students.create",
        json!({
            "name": "Tomas Vik",
            "age": 4,
            "classLevel": "LKG",
            "teacherId": teacher_id,
            "photoUrl": "http://127.0.0.1:9/unreachable.jpg"
        }),
    );
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "students.create",
        json!({
            "name": "Lena Vik",
            "age": 5,
            "classLevel": "LKG",
            "teacherId": teacher
                .get("teacherId")
                .and_then(|v| v.as_str())
                .expect("teacherId")
        }),
    );

    let report = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "reports.studentProgressPdf",
        json!({
            "outPath": out_path.to_string_lossy(),
            "includePhotos": true
        }),
    );
    assert_eq!(report.get("pageCount").and_then(|v| v.as_u64()), Some(2));

    let bytes = std::fs::read(&out_path).expect("read pdf");
    let text = String::from_utf8_lossy(&bytes).to_string();
    // Both students render even though the first photo fetch failed.
    assert!(text.contains("Tomas Vik"));
    assert!(text.contains("Lena Vik"));

    drop(stdin);
    let _ = child.wait();
}

#[test]
fn empty_roster_yields_notice_document() {
    let workspace = temp_dir("littlesteps-empty-roster");
    let out_path = workspace.join("progress.pdf");

    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );

    let report = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "reports.studentProgressPdf",
        json!({
            "outPath": out_path.to_string_lossy(),
            "classLevel": "Nursery"
        }),
    );
    assert_eq!(report.get("pageCount").and_then(|v| v.as_u64()), Some(1));

    let bytes = std::fs::read(&out_path).expect("read pdf");
    let text = String::from_utf8_lossy(&bytes).to_string();
    assert!(text.contains("No students found matching the criteria."));
    assert!(text.contains("Class: Nursery"));
    assert!(text.contains("Page 1 of 1"));

    drop(stdin);
    let _ = child.wait();
}
