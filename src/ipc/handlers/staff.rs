use crate::db;
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{get_optional_str, get_required_str, staff_json, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::roles::{join_role_tags, parse_role_tags, RoleKind};
use rusqlite::Connection;
use serde_json::json;
use sha2::{Digest, Sha256};
use uuid::Uuid;

fn parse_roles_param(params: &serde_json::Value) -> Result<Vec<RoleKind>, HandlerErr> {
    let raw = params
        .get("roles")
        .and_then(|v| v.as_array())
        .ok_or_else(|| HandlerErr::bad_params("missing roles"))?;
    let mut kinds: Vec<RoleKind> = Vec::new();
    for v in raw {
        let tag = v
            .as_str()
            .ok_or_else(|| HandlerErr::bad_params("roles must be strings"))?;
        let kind = RoleKind::from_code(tag)
            .ok_or_else(|| HandlerErr::bad_params(format!("unknown role: {}", tag)))?;
        if !kinds.contains(&kind) {
            kinds.push(kind);
        }
    }
    if kinds.is_empty() {
        return Err(HandlerErr::bad_params("roles must not be empty"));
    }
    Ok(kinds)
}

fn create_staff(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let matricula = get_required_str(params, "matricula")?;
    let nombre = get_required_str(params, "nombre")?;
    let correo = get_required_str(params, "correo")?;
    let credential = get_required_str(params, "credential")?;
    let telefono = get_optional_str(params, "telefono");
    let id_carrera = get_optional_str(params, "idCarrera");
    let kinds = parse_roles_param(params)?;

    if db::staff_by_matricula(conn, &matricula)
        .map_err(|e| HandlerErr::db("db_query_failed", e))?
        .is_some()
    {
        return Err(HandlerErr {
            code: "conflict",
            message: format!("staff matricula already exists: {}", matricula),
            details: None,
        });
    }

    let staff_id = Uuid::new_v4().to_string();
    let credential_hash = format!("{:x}", Sha256::digest(credential.as_bytes()));

    let tx = conn
        .unchecked_transaction()
        .map_err(|e| HandlerErr::db("db_tx_failed", e))?;
    tx.execute(
        "INSERT INTO staff(id, matricula, nombre, correo, telefono, roles, credential_hash, id_carrera)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?)",
        (
            &staff_id,
            &matricula,
            &nombre,
            &correo,
            &telefono,
            join_role_tags(&kinds),
            &credential_hash,
            &id_carrera,
        ),
    )
    .map_err(|e| HandlerErr::db("db_insert_failed", e))?;

    // One profile per held role, provisioned up front; rosters start empty.
    // Only coordinator and administrator profiles carry a career of their
    // own; the other kinds never do.
    for kind in &kinds {
        let profile_career = match kind {
            RoleKind::DepartmentCoordinator | RoleKind::Administrator => id_carrera.as_deref(),
            _ => None,
        };
        tx.execute(
            "INSERT INTO role_profiles(role_kind, personal_matricula, id_carrera) VALUES(?, ?, ?)",
            (kind.code(), &matricula, profile_career),
        )
        .map_err(|e| HandlerErr::db("db_insert_failed", e))?;
    }
    tx.commit()
        .map_err(|e| HandlerErr::db("db_commit_failed", e))?;

    let staff = db::staff_by_matricula(conn, &matricula)
        .map_err(|e| HandlerErr::db("db_query_failed", e))?
        .ok_or_else(|| HandlerErr::not_found("staff not found after insert"))?;
    Ok(staff_json(&staff))
}

fn rosters_by_role(conn: &Connection, matricula: &str) -> Result<serde_json::Value, HandlerErr> {
    let mut out = serde_json::Map::new();
    for kind in RoleKind::ALL {
        if !db::profile_exists(conn, kind, matricula)
            .map_err(|e| HandlerErr::db("db_query_failed", e))?
        {
            continue;
        }
        let roster = db::roster(conn, kind, matricula)
            .map_err(|e| HandlerErr::db("db_query_failed", e))?;
        out.insert(kind.code().to_string(), json!(roster));
    }
    Ok(serde_json::Value::Object(out))
}

fn get_staff(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let matricula = get_required_str(params, "matricula")?;
    let staff = db::staff_by_matricula(conn, &matricula)
        .map_err(|e| HandlerErr::db("db_query_failed", e))?
        .ok_or_else(|| HandlerErr::not_found("staff not found"))?;
    let rosters = rosters_by_role(conn, &matricula)?;
    let mut v = staff_json(&staff);
    v["rosters"] = rosters;
    Ok(v)
}

fn get_rosters(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let matricula = get_required_str(params, "matricula")?;
    if db::staff_by_matricula(conn, &matricula)
        .map_err(|e| HandlerErr::db("db_query_failed", e))?
        .is_none()
    {
        return Err(HandlerErr::not_found("staff not found"));
    }
    Ok(json!({ "rosters": rosters_by_role(conn, &matricula)? }))
}

/// Staff whose role tags intersect the tutor-like set. Administrator alone
/// is excluded. Full scan, stable insertion order.
fn list_tutors(conn: &Connection) -> Result<serde_json::Value, HandlerErr> {
    let mut stmt = conn
        .prepare(
            "SELECT id, matricula, nombre, correo, telefono, roles, id_carrera
             FROM staff ORDER BY rowid",
        )
        .map_err(|e| HandlerErr::db("db_query_failed", e))?;
    let rows = stmt
        .query_map([], |r| {
            Ok((
                r.get::<_, String>(0)?,
                r.get::<_, String>(1)?,
                r.get::<_, String>(2)?,
                r.get::<_, String>(3)?,
                r.get::<_, Option<String>>(4)?,
                r.get::<_, String>(5)?,
                r.get::<_, Option<String>>(6)?,
            ))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(|e| HandlerErr::db("db_query_failed", e))?;

    let tutors: Vec<serde_json::Value> = rows
        .into_iter()
        .filter(|(_, _, _, _, _, roles, _)| {
            parse_role_tags(roles).iter().any(|k| k.is_tutor_like())
        })
        .map(|(id, matricula, nombre, correo, telefono, roles, id_carrera)| {
            json!({
                "id": id,
                "matricula": matricula,
                "nombre": nombre,
                "correo": correo,
                "telefono": telefono,
                "roles": parse_role_tags(&roles)
                    .iter()
                    .map(|k| k.code())
                    .collect::<Vec<_>>(),
                "idCarrera": id_carrera,
            })
        })
        .collect();
    Ok(json!({ "tutors": tutors }))
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
        "staff.create" => Some(with_db(state, req, create_staff)),
        "staff.get" => Some(with_db(state, req, get_staff)),
        "staff.rosters" => Some(with_db(state, req, get_rosters)),
        "staff.listTutors" => Some(with_db(state, req, |conn, _| list_tutors(conn))),
        _ => None,
    }
}
