//! Roster fan-out for the role-polymorphic staff model.
//!
//! A staff identity may hold up to five role profiles, each with its own
//! roster of assigned students. Every assignment change must land in all of
//! them, so callers run these inside one transaction: either every held
//! profile is updated or the whole operation rolls back and the failing
//! profile kind is reported. Combined with the sidecar's single writer
//! connection this keeps concurrent reassignments from interleaving their
//! read-modify-write cycles.

use rusqlite::Connection;

use crate::db::{self, StaffRow};
use crate::roles::RoleKind;

/// Which half of the fan-out a failure happened in, so the reported error
/// code can match the statement that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FanoutOp {
    Assign,
    Unassign,
}

impl FanoutOp {
    pub fn code(self) -> &'static str {
        match self {
            FanoutOp::Assign => "assign",
            FanoutOp::Unassign => "unassign",
        }
    }
}

/// A persistence failure during fan-out, pinned to the operation and the
/// profile kind that failed so the caller can report it instead of
/// swallowing it.
#[derive(Debug)]
pub struct FanoutError {
    pub op: FanoutOp,
    pub kind: RoleKind,
    pub source: rusqlite::Error,
}

impl std::fmt::Display for FanoutError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} on {} profile: {}",
            self.op.code(),
            self.kind.code(),
            self.source
        )
    }
}

impl std::error::Error for FanoutError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.source)
    }
}

fn pin(op: FanoutOp, kind: RoleKind) -> impl FnOnce(rusqlite::Error) -> FanoutError {
    move |source| FanoutError { op, kind, source }
}

/// Add `student_id` to the roster of every role profile held by `staff`.
/// Rosters are duplicate-free: re-adding a present student changes nothing.
/// Returns the kinds whose rosters actually gained the student.
pub fn assign(
    conn: &Connection,
    staff: &StaffRow,
    student_id: &str,
) -> Result<Vec<RoleKind>, FanoutError> {
    let mut touched = Vec::new();
    for kind in RoleKind::ALL {
        if !db::profile_exists(conn, kind, &staff.matricula)
            .map_err(pin(FanoutOp::Assign, kind))?
        {
            continue;
        }
        // MAX over an empty roster yields NULL, so this always inserts
        // exactly one row (or none when the student is already present).
        let changed = conn
            .execute(
                "INSERT OR IGNORE INTO role_rosters(role_kind, personal_matricula, student_id, pos)
                 SELECT ?1, ?2, ?3, COALESCE(MAX(pos), -1) + 1
                 FROM role_rosters WHERE role_kind = ?1 AND personal_matricula = ?2",
                (kind.code(), &staff.matricula, student_id),
            )
            .map_err(pin(FanoutOp::Assign, kind))?;
        if changed > 0 {
            touched.push(kind);
        }
    }
    Ok(touched)
}

/// Remove `student_id` from every roster belonging to `matricula`.
/// Idempotent: removing an absent student is a no-op. Returns the kinds
/// whose rosters actually changed.
pub fn unassign(
    conn: &Connection,
    matricula: &str,
    student_id: &str,
) -> Result<Vec<RoleKind>, FanoutError> {
    let mut touched = Vec::new();
    for kind in RoleKind::ALL {
        let changed = conn
            .execute(
                "DELETE FROM role_rosters
                 WHERE role_kind = ? AND personal_matricula = ? AND student_id = ?",
                (kind.code(), matricula, student_id),
            )
            .map_err(pin(FanoutOp::Unassign, kind))?;
        if changed > 0 {
            touched.push(kind);
        }
    }
    Ok(touched)
}

/// Move a student between tutors: unassign from `old_staff` (when set), then
/// assign to `new_staff` (when set). "No new tutor" never triggers assign.
pub fn reassign(
    conn: &Connection,
    student_id: &str,
    old_staff: Option<&StaffRow>,
    new_staff: Option<&StaffRow>,
) -> Result<(), FanoutError> {
    if let Some(old) = old_staff {
        unassign(conn, &old.matricula, student_id)?;
    }
    if let Some(new) = new_staff {
        assign(conn, new, student_id)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use rusqlite::Connection;

    fn mem_db() -> Connection {
        let conn = Connection::open_in_memory().expect("open in-memory db");
        db::init_schema(&conn).expect("init schema");
        conn
    }

    fn seed_staff(conn: &Connection, id: &str, matricula: &str, kinds: &[RoleKind]) -> StaffRow {
        let roles = kinds.iter().map(|k| k.code()).collect::<Vec<_>>().join(",");
        conn.execute(
            "INSERT INTO staff(id, matricula, nombre, correo, telefono, roles, credential_hash)
             VALUES(?, ?, 'Nombre', 'x@uni.mx', NULL, ?, 'hash')",
            (id, matricula, &roles),
        )
        .expect("insert staff");
        for kind in kinds {
            conn.execute(
                "INSERT INTO role_profiles(role_kind, personal_matricula) VALUES(?, ?)",
                (kind.code(), matricula),
            )
            .expect("insert profile");
        }
        db::staff_by_internal_id(conn, id)
            .expect("query staff")
            .expect("staff present")
    }

    fn seed_student(conn: &Connection, id: &str, matricula: &str) {
        conn.execute(
            "INSERT INTO students(id, matricula, nombre, correo, telefono, id_carrera)
             VALUES(?, ?, 'Alumno', 'a@uni.mx', NULL, 'ISC')",
            (id, matricula),
        )
        .expect("insert student");
    }

    #[test]
    fn assign_lands_in_every_held_profile_exactly_once() {
        let conn = mem_db();
        let staff = seed_staff(
            &conn,
            "st-1",
            "M1",
            &[RoleKind::Tutor, RoleKind::Instructor],
        );
        seed_student(&conn, "al-1", "A001");

        let touched = assign(&conn, &staff, "al-1").expect("assign");
        assert_eq!(touched, vec![RoleKind::Tutor, RoleKind::Instructor]);

        // Repeat assignment must not create duplicate roster entries.
        let touched = assign(&conn, &staff, "al-1").expect("assign again");
        assert!(touched.is_empty());

        for kind in [RoleKind::Tutor, RoleKind::Instructor] {
            let roster = db::roster(&conn, kind, "M1").expect("roster");
            assert_eq!(roster, vec!["al-1".to_string()], "{}", kind.code());
        }
        // No profile, no roster.
        assert!(db::roster(&conn, RoleKind::Administrator, "M1")
            .expect("roster")
            .is_empty());
    }

    #[test]
    fn unassign_is_idempotent_and_keeps_other_members() {
        let conn = mem_db();
        let staff = seed_staff(&conn, "st-1", "M1", &[RoleKind::Tutor]);
        seed_student(&conn, "al-1", "A001");
        seed_student(&conn, "al-2", "A002");
        assign(&conn, &staff, "al-1").expect("assign al-1");
        assign(&conn, &staff, "al-2").expect("assign al-2");

        let touched = unassign(&conn, "M1", "al-1").expect("unassign");
        assert_eq!(touched, vec![RoleKind::Tutor]);
        assert_eq!(
            db::roster(&conn, RoleKind::Tutor, "M1").expect("roster"),
            vec!["al-2".to_string()]
        );

        // Absent student: no-op, roster unchanged.
        let touched = unassign(&conn, "M1", "al-1").expect("unassign absent");
        assert!(touched.is_empty());
        assert_eq!(
            db::roster(&conn, RoleKind::Tutor, "M1").expect("roster"),
            vec!["al-2".to_string()]
        );
    }

    #[test]
    fn reassign_moves_student_between_all_profiles() {
        let conn = mem_db();
        let m1 = seed_staff(
            &conn,
            "st-1",
            "M1",
            &[RoleKind::Tutor, RoleKind::Instructor],
        );
        let m2 = seed_staff(
            &conn,
            "st-2",
            "M2",
            &[RoleKind::Tutor, RoleKind::GeneralCoordinator],
        );
        seed_student(&conn, "al-1", "A001");
        seed_student(&conn, "al-2", "A002");
        assign(&conn, &m1, "al-1").expect("assign");
        assign(&conn, &m2, "al-2").expect("assign bystander");

        reassign(&conn, "al-1", Some(&m1), Some(&m2)).expect("reassign");

        assert!(db::roster(&conn, RoleKind::Tutor, "M1").expect("r").is_empty());
        assert!(db::roster(&conn, RoleKind::Instructor, "M1").expect("r").is_empty());
        assert_eq!(
            db::roster(&conn, RoleKind::Tutor, "M2").expect("r"),
            vec!["al-2".to_string(), "al-1".to_string()]
        );
        assert_eq!(
            db::roster(&conn, RoleKind::GeneralCoordinator, "M2").expect("r"),
            vec!["al-2".to_string(), "al-1".to_string()]
        );
    }

    #[test]
    fn fanout_failure_is_pinned_to_operation_and_profile() {
        let conn = mem_db();
        let staff = seed_staff(&conn, "st-1", "M1", &[RoleKind::Tutor]);
        seed_student(&conn, "al-1", "A001");
        // Losing the roster table makes every roster statement fail.
        conn.execute("DROP TABLE role_rosters", []).expect("drop");

        let err = assign(&conn, &staff, "al-1").unwrap_err();
        assert_eq!(err.op, FanoutOp::Assign);
        assert_eq!(err.kind, RoleKind::Tutor);

        let err = unassign(&conn, "M1", "al-1").unwrap_err();
        assert_eq!(err.op, FanoutOp::Unassign);
        assert_eq!(err.kind, RoleKind::Tutor);
    }

    #[test]
    fn reassign_without_new_staff_only_unassigns() {
        let conn = mem_db();
        let m1 = seed_staff(&conn, "st-1", "M1", &[RoleKind::Tutor]);
        seed_student(&conn, "al-1", "A001");
        assign(&conn, &m1, "al-1").expect("assign");

        reassign(&conn, "al-1", Some(&m1), None).expect("reassign to none");
        assert!(db::roster(&conn, RoleKind::Tutor, "M1").expect("r").is_empty());
    }
}
