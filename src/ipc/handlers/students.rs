use crate::db;
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{get_optional_str, get_required_str, student_json, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::sync;
use crate::update_flow::{self, StudentPatch, TutorChange, UpdateError};
use rusqlite::{Connection, OptionalExtension};
use serde_json::json;
use uuid::Uuid;

/// Tri-state tutor field: absent or `""` keeps the current tutor, JSON null
/// clears it, a non-empty string names a staff internal id.
fn parse_tutor_change(params: &serde_json::Value) -> Result<TutorChange, HandlerErr> {
    match params.get("tutor") {
        None => Ok(TutorChange::Keep),
        Some(serde_json::Value::Null) => Ok(TutorChange::Clear),
        Some(v) => {
            let s = v
                .as_str()
                .ok_or_else(|| HandlerErr::bad_params("tutor must be string or null"))?;
            let t = s.trim();
            if t.is_empty() {
                Ok(TutorChange::Keep)
            } else {
                Ok(TutorChange::Set(t.to_string()))
            }
        }
    }
}

fn create_student(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let matricula = get_required_str(params, "matricula")?;
    let nombre = get_required_str(params, "nombre")?;
    let correo = get_required_str(params, "correo")?;
    let id_carrera = get_required_str(params, "idCarrera")?;
    let telefono = get_optional_str(params, "telefono");
    let tutor = match parse_tutor_change(params)? {
        // On create there is nothing to keep or clear; both mean "no tutor".
        TutorChange::Keep | TutorChange::Clear => None,
        TutorChange::Set(id) => Some(id),
    };

    let exists = conn
        .query_row(
            "SELECT 1 FROM students WHERE matricula = ?",
            [&matricula],
            |r| r.get::<_, i64>(0),
        )
        .optional()
        .map_err(|e| HandlerErr::db("db_query_failed", e))?;
    if exists.is_some() {
        return Err(HandlerErr {
            code: "conflict",
            message: format!("student matricula already exists: {}", matricula),
            details: None,
        });
    }

    let tx = conn
        .unchecked_transaction()
        .map_err(|e| HandlerErr::db("db_tx_failed", e))?;

    // Resolve the tutor before writing anything; a bad tutor id must not
    // leave a half-created student behind.
    let staff = match &tutor {
        Some(id) => Some(
            db::staff_by_internal_id(&tx, id)
                .map_err(|e| HandlerErr::db("db_query_failed", e))?
                .ok_or_else(|| HandlerErr::not_found("Tutor no encontrado"))?,
        ),
        None => None,
    };

    let student_id = Uuid::new_v4().to_string();
    tx.execute(
        "INSERT INTO students(id, matricula, nombre, correo, telefono, id_carrera, tutor_id, updated_at)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?)",
        (
            &student_id,
            &matricula,
            &nombre,
            &correo,
            &telefono,
            &id_carrera,
            staff.as_ref().map(|s| s.id.as_str()),
            chrono::Utc::now().to_rfc3339(),
        ),
    )
    .map_err(|e| HandlerErr::db("db_insert_failed", e))?;

    // Same fan-out path the bulk-import collaborator uses per row: the new
    // student lands in every profile roster of the tutor, or the whole
    // create rolls back.
    if let Some(staff) = &staff {
        sync::assign(&tx, staff, &student_id)?;
    }

    tx.commit()
        .map_err(|e| HandlerErr::db("db_commit_failed", e))?;

    let student = db::student_by_id(conn, &student_id)
        .map_err(|e| HandlerErr::db("db_query_failed", e))?
        .ok_or_else(|| HandlerErr::not_found("student not found after insert"))?;
    Ok(student_json(&student))
}

fn update_student(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let student_id = get_required_str(params, "studentId")?;
    let patch = StudentPatch {
        nombre: get_optional_str(params, "nombre"),
        correo: get_optional_str(params, "correo"),
        telefono: get_optional_str(params, "telefono"),
        id_carrera: get_optional_str(params, "idCarrera"),
        tutor: parse_tutor_change(params)?,
    };

    let tx = conn
        .unchecked_transaction()
        .map_err(|e| HandlerErr::db("db_tx_failed", e))?;
    let updated = match update_flow::run(&tx, &student_id, &patch) {
        Ok(v) => v,
        Err(e) => {
            // Dropping the transaction rolls everything back, including any
            // roster changes from earlier steps.
            return Err(match e {
                UpdateError::StudentNotFound => HandlerErr::not_found("student not found"),
                UpdateError::TutorNotFound => HandlerErr::not_found("Tutor no encontrado"),
                UpdateError::Fanout(fe) => fe.into(),
                UpdateError::Db(de) => HandlerErr::db("db_update_failed", de),
            });
        }
    };
    tx.commit()
        .map_err(|e| HandlerErr::db("db_commit_failed", e))?;

    Ok(student_json(&updated))
}

fn get_student(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let student_id = get_required_str(params, "studentId")?;
    let student = db::student_by_id(conn, &student_id)
        .map_err(|e| HandlerErr::db("db_query_failed", e))?
        .ok_or_else(|| HandlerErr::not_found("student not found"))?;
    Ok(student_json(&student))
}

fn list_students(conn: &Connection) -> Result<serde_json::Value, HandlerErr> {
    let mut stmt = conn
        .prepare(
            "SELECT id, matricula, nombre, correo, telefono, id_carrera, tutor_id, updated_at
             FROM students ORDER BY rowid",
        )
        .map_err(|e| HandlerErr::db("db_query_failed", e))?;
    let students = stmt
        .query_map([], |r| {
            Ok(json!({
                "id": r.get::<_, String>(0)?,
                "matricula": r.get::<_, String>(1)?,
                "nombre": r.get::<_, String>(2)?,
                "correo": r.get::<_, String>(3)?,
                "telefono": r.get::<_, Option<String>>(4)?,
                "idCarrera": r.get::<_, String>(5)?,
                "tutor": r.get::<_, Option<String>>(6)?,
                "updatedAt": r.get::<_, Option<String>>(7)?,
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(|e| HandlerErr::db("db_query_failed", e))?;
    Ok(json!({ "students": students }))
}

fn with_db<F>(state: &mut AppState, req: &Request, f: F) -> serde_json::Value
where
    F: FnOnce(&Connection, &serde_json::Value) -> Result<serde_json::Value, HandlerErr>,
{
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    match f(conn, &req.params) {
        Ok(result) => ok(&req.id, result),
        Err(e) => e.response(&req.id),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "students.create" => Some(with_db(state, req, create_student)),
        "students.update" => Some(with_db(state, req, update_student)),
        "students.get" => Some(with_db(state, req, get_student)),
        "students.list" => Some(with_db(state, req, |conn, _| list_students(conn))),
        _ => None,
    }
}
