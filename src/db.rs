use rusqlite::Connection;
use std::path::Path;

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join("littlesteps.sqlite3");
    let conn = Connection::open(db_path)?;
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS teachers(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            email TEXT UNIQUE,
            role TEXT NOT NULL DEFAULT 'teacher',
            active INTEGER NOT NULL DEFAULT 1,
            created_at TEXT,
            updated_at TEXT
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS students(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            age INTEGER NOT NULL,
            class_level TEXT NOT NULL,
            learning_ability TEXT,
            writing_speed TEXT,
            photo_url TEXT,
            teacher_id TEXT NOT NULL,
            sort_order INTEGER NOT NULL,
            created_at TEXT,
            updated_at TEXT,
            FOREIGN KEY(teacher_id) REFERENCES teachers(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_students_teacher ON students(teacher_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_students_class_sort ON students(class_level, sort_order)",
        [],
    )?;

    // Early workspaces predate the writing-speed and photo columns.
    ensure_students_writing_speed(&conn)?;
    ensure_students_photo_url(&conn)?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS progress_entries(
            id TEXT PRIMARY KEY,
            student_id TEXT NOT NULL,
            entry_date TEXT NOT NULL,
            social TEXT NOT NULL,
            motor TEXT NOT NULL,
            language TEXT NOT NULL,
            numeracy TEXT NOT NULL,
            creativity TEXT NOT NULL,
            comments TEXT,
            created_at TEXT,
            updated_at TEXT,
            FOREIGN KEY(student_id) REFERENCES students(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_progress_student ON progress_entries(student_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_progress_student_date ON progress_entries(student_id, entry_date)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS teaching_plans(
            id TEXT PRIMARY KEY,
            plan_type TEXT NOT NULL,
            class_level TEXT NOT NULL,
            title TEXT NOT NULL,
            description TEXT,
            activities TEXT,
            goals TEXT,
            start_date TEXT NOT NULL,
            end_date TEXT NOT NULL,
            teacher_id TEXT NOT NULL,
            created_at TEXT,
            updated_at TEXT,
            FOREIGN KEY(teacher_id) REFERENCES teachers(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_plans_teacher ON teaching_plans(teacher_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_plans_type_class ON teaching_plans(plan_type, class_level)",
        [],
    )?;

    Ok(conn)
}

fn ensure_students_writing_speed(conn: &Connection) -> anyhow::Result<()> {
    if table_has_column(conn, "students", "writing_speed")? {
        return Ok(());
    }
    conn.execute("ALTER TABLE students ADD COLUMN writing_speed TEXT", [])?;
    Ok(())
}

fn ensure_students_photo_url(conn: &Connection) -> anyhow::Result<()> {
    if table_has_column(conn, "students", "photo_url")? {
        return Ok(());
    }
    conn.execute("ALTER TABLE students ADD COLUMN photo_url TEXT", [])?;
    Ok(())
}

fn table_has_column(conn: &Connection, table: &str, column: &str) -> anyhow::Result<bool> {
    let sql = format!("PRAGMA table_info({})", table);
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let name: String = row.get(1)?;
        if name == column {
            return Ok(true);
        }
    }
    Ok(false)
}
