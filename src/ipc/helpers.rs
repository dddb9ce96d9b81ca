use serde_json::json;

use crate::db::{StaffRow, StudentRow};
use crate::roles::parse_role_tags;
use crate::sync::{FanoutError, FanoutOp};

#[derive(Debug)]
pub struct HandlerErr {
    pub code: &'static str,
    pub message: String,
    pub details: Option<serde_json::Value>,
}

impl HandlerErr {
    pub fn response(self, id: &str) -> serde_json::Value {
        crate::ipc::error::err(id, self.code, self.message, self.details)
    }

    pub fn bad_params(message: impl Into<String>) -> HandlerErr {
        HandlerErr {
            code: "bad_params",
            message: message.into(),
            details: None,
        }
    }

    pub fn not_found(message: impl Into<String>) -> HandlerErr {
        HandlerErr {
            code: "not_found",
            message: message.into(),
            details: None,
        }
    }

    pub fn db(code: &'static str, e: rusqlite::Error) -> HandlerErr {
        HandlerErr {
            code,
            message: e.to_string(),
            details: None,
        }
    }
}

impl From<FanoutError> for HandlerErr {
    fn from(e: FanoutError) -> Self {
        // The code names the statement that failed: roster inserts on the
        // assign path, roster deletes on the unassign path.
        let code = match e.op {
            FanoutOp::Assign => "db_insert_failed",
            FanoutOp::Unassign => "db_delete_failed",
        };
        HandlerErr {
            code,
            message: e.to_string(),
            details: Some(json!({ "profile": e.kind.code(), "op": e.op.code() })),
        }
    }
}

pub fn get_required_str(params: &serde_json::Value, key: &str) -> Result<String, HandlerErr> {
    let v = params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_string())
        .ok_or_else(|| HandlerErr::bad_params(format!("missing {}", key)))?;
    if v.is_empty() {
        return Err(HandlerErr::bad_params(format!("{} must not be empty", key)));
    }
    Ok(v)
}

pub fn get_optional_str(params: &serde_json::Value, key: &str) -> Option<String> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

pub fn staff_json(staff: &StaffRow) -> serde_json::Value {
    json!({
        "id": staff.id,
        "matricula": staff.matricula,
        "nombre": staff.nombre,
        "correo": staff.correo,
        "telefono": staff.telefono,
        "roles": parse_role_tags(&staff.roles)
            .iter()
            .map(|k| k.code())
            .collect::<Vec<_>>(),
        "idCarrera": staff.id_carrera,
    })
}

pub fn student_json(student: &StudentRow) -> serde_json::Value {
    json!({
        "id": student.id,
        "matricula": student.matricula,
        "nombre": student.nombre,
        "correo": student.correo,
        "telefono": student.telefono,
        "idCarrera": student.id_carrera,
        "tutor": student.tutor_id,
        "updatedAt": student.updated_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::roles::RoleKind;

    #[test]
    fn fanout_error_code_matches_the_failed_statement() {
        let assign = HandlerErr::from(FanoutError {
            op: FanoutOp::Assign,
            kind: RoleKind::Tutor,
            source: rusqlite::Error::QueryReturnedNoRows,
        });
        assert_eq!(assign.code, "db_insert_failed");
        assert_eq!(
            assign.details,
            Some(json!({ "profile": "tutor", "op": "assign" }))
        );

        let unassign = HandlerErr::from(FanoutError {
            op: FanoutOp::Unassign,
            kind: RoleKind::Instructor,
            source: rusqlite::Error::QueryReturnedNoRows,
        });
        assert_eq!(unassign.code, "db_delete_failed");
        assert_eq!(
            unassign.details,
            Some(json!({ "profile": "instructor", "op": "unassign" }))
        );
    }
}
