use rusqlite::{Connection, OptionalExtension};
use std::path::Path;

use crate::roles::RoleKind;

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join("tutorsync.sqlite3");
    let conn = Connection::open(db_path)?;
    init_schema(&conn)?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> anyhow::Result<()> {
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS staff(
            id TEXT PRIMARY KEY,
            matricula TEXT NOT NULL UNIQUE,
            nombre TEXT NOT NULL,
            correo TEXT NOT NULL,
            telefono TEXT,
            roles TEXT NOT NULL,
            credential_hash TEXT NOT NULL,
            id_carrera TEXT
        )",
        [],
    )?;

    // One row per (role kind, staff matricula). A staff identity holds zero
    // or more of these; the roster lives in role_rosters.
    conn.execute(
        "CREATE TABLE IF NOT EXISTS role_profiles(
            role_kind TEXT NOT NULL,
            personal_matricula TEXT NOT NULL,
            id_carrera TEXT,
            PRIMARY KEY(role_kind, personal_matricula),
            FOREIGN KEY(personal_matricula) REFERENCES staff(matricula)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_role_profiles_matricula
         ON role_profiles(personal_matricula)",
        [],
    )?;

    // The primary key keeps each roster duplicate-free; pos preserves
    // insertion order.
    conn.execute(
        "CREATE TABLE IF NOT EXISTS role_rosters(
            role_kind TEXT NOT NULL,
            personal_matricula TEXT NOT NULL,
            student_id TEXT NOT NULL,
            pos INTEGER NOT NULL,
            PRIMARY KEY(role_kind, personal_matricula, student_id),
            FOREIGN KEY(role_kind, personal_matricula)
                REFERENCES role_profiles(role_kind, personal_matricula),
            FOREIGN KEY(student_id) REFERENCES students(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_role_rosters_student ON role_rosters(student_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS students(
            id TEXT PRIMARY KEY,
            matricula TEXT NOT NULL UNIQUE,
            nombre TEXT NOT NULL,
            correo TEXT NOT NULL,
            telefono TEXT,
            id_carrera TEXT NOT NULL,
            tutor_id TEXT,
            updated_at TEXT,
            FOREIGN KEY(tutor_id) REFERENCES staff(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_students_tutor ON students(tutor_id)",
        [],
    )?;

    // Existing workspaces may predate the updated_at column.
    ensure_students_updated_at(conn)?;

    Ok(())
}

fn ensure_students_updated_at(conn: &Connection) -> anyhow::Result<()> {
    if table_has_column(conn, "students", "updated_at")? {
        return Ok(());
    }
    conn.execute("ALTER TABLE students ADD COLUMN updated_at TEXT", [])?;
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

#[derive(Debug, Clone)]
pub struct StaffRow {
    pub id: String,
    pub matricula: String,
    pub nombre: String,
    pub correo: String,
    pub telefono: Option<String>,
    pub roles: String,
    pub id_carrera: Option<String>,
}

#[derive(Debug, Clone)]
pub struct StudentRow {
    pub id: String,
    pub matricula: String,
    pub nombre: String,
    pub correo: String,
    pub telefono: Option<String>,
    pub id_carrera: String,
    pub tutor_id: Option<String>,
    pub updated_at: Option<String>,
}

fn staff_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<StaffRow> {
    Ok(StaffRow {
        id: row.get(0)?,
        matricula: row.get(1)?,
        nombre: row.get(2)?,
        correo: row.get(3)?,
        telefono: row.get(4)?,
        roles: row.get(5)?,
        id_carrera: row.get(6)?,
    })
}

const STAFF_COLS: &str = "id, matricula, nombre, correo, telefono, roles, id_carrera";

pub fn staff_by_internal_id(conn: &Connection, id: &str) -> rusqlite::Result<Option<StaffRow>> {
    conn.query_row(
        &format!("SELECT {STAFF_COLS} FROM staff WHERE id = ?"),
        [id],
        staff_from_row,
    )
    .optional()
}

pub fn staff_by_matricula(
    conn: &Connection,
    matricula: &str,
) -> rusqlite::Result<Option<StaffRow>> {
    conn.query_row(
        &format!("SELECT {STAFF_COLS} FROM staff WHERE matricula = ?"),
        [matricula],
        staff_from_row,
    )
    .optional()
}

fn student_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<StudentRow> {
    Ok(StudentRow {
        id: row.get(0)?,
        matricula: row.get(1)?,
        nombre: row.get(2)?,
        correo: row.get(3)?,
        telefono: row.get(4)?,
        id_carrera: row.get(5)?,
        tutor_id: row.get(6)?,
        updated_at: row.get(7)?,
    })
}

const STUDENT_COLS: &str = "id, matricula, nombre, correo, telefono, id_carrera, tutor_id, updated_at";

pub fn student_by_id(conn: &Connection, id: &str) -> rusqlite::Result<Option<StudentRow>> {
    conn.query_row(
        &format!("SELECT {STUDENT_COLS} FROM students WHERE id = ?"),
        [id],
        student_from_row,
    )
    .optional()
}

/// Presence + career of one role profile: `None` if the profile does not
/// exist, `Some(career)` otherwise.
pub fn profile_career(
    conn: &Connection,
    kind: RoleKind,
    matricula: &str,
) -> rusqlite::Result<Option<Option<String>>> {
    conn.query_row(
        "SELECT id_carrera FROM role_profiles WHERE role_kind = ? AND personal_matricula = ?",
        (kind.code(), matricula),
        |r| r.get::<_, Option<String>>(0),
    )
    .optional()
}

pub fn profile_exists(
    conn: &Connection,
    kind: RoleKind,
    matricula: &str,
) -> rusqlite::Result<bool> {
    Ok(profile_career(conn, kind, matricula)?.is_some())
}

/// Roster of one role profile in insertion order. Empty if the profile does
/// not exist.
pub fn roster(conn: &Connection, kind: RoleKind, matricula: &str) -> rusqlite::Result<Vec<String>> {
    let mut stmt = conn.prepare(
        "SELECT student_id FROM role_rosters
         WHERE role_kind = ? AND personal_matricula = ?
         ORDER BY pos",
    )?;
    let rows = stmt
        .query_map((kind.code(), matricula), |r| r.get::<_, String>(0))?
        .collect();
    rows
}
