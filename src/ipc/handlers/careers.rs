use crate::db;
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{get_required_str, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::roles::CAREER_PROBE_ORDER;
use rusqlite::Connection;
use serde_json::json;

/// Resolve the career (program) id owned by a staff matricula. Probes the
/// DepartmentCoordinator profile, then the Administrator profile, then the
/// plain staff record; first hit with a career wins. No side effects.
fn resolve_career(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let matricula = get_required_str(params, "matricula")?;

    for kind in CAREER_PROBE_ORDER {
        let found = db::profile_career(conn, kind, &matricula)
            .map_err(|e| HandlerErr::db("db_query_failed", e))?;
        // A profile with no career recorded does not stop the probe.
        if let Some(Some(id_carrera)) = found {
            return Ok(json!({ "idCarrera": id_carrera }));
        }
    }

    let staff = db::staff_by_matricula(conn, &matricula)
        .map_err(|e| HandlerErr::db("db_query_failed", e))?;
    if let Some(staff) = staff {
        if let Some(id_carrera) = staff.id_carrera {
            return Ok(json!({ "idCarrera": id_carrera }));
        }
    }

    Err(HandlerErr::not_found(format!(
        "no career found for matricula {}",
        matricula
    )))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    if req.method != "careers.resolve" {
        return None;
    }
    let Some(conn) = state.db.as_ref() else {
        return Some(err(&req.id, "no_workspace", "select a workspace first", None));
    };
    Some(match resolve_career(conn, &req.params) {
        Ok(result) => ok(&req.id, result),
        Err(e) => e.response(&req.id),
    })
}
