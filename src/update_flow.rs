//! Student update orchestration.
//!
//! A tutor change touches three places: the old staff's rosters, the new
//! staff's rosters, and the student record itself. The flow below walks a
//! fixed sequence of steps and runs on a caller-provided transaction, so an
//! error at any step leaves nothing half-applied.

use rusqlite::Connection;
use tracing::warn;

use crate::db::{self, StaffRow, StudentRow};
use crate::sync::{self, FanoutError};

/// What the caller asked to do with the student's tutor reference.
/// `Keep` is "field absent or empty string", `Clear` is an explicit JSON
/// null, `Set` carries a staff internal id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TutorChange {
    Keep,
    Clear,
    Set(String),
}

/// Core-field patch; absent fields keep their current value.
#[derive(Debug, Default, Clone)]
pub struct StudentPatch {
    pub nombre: Option<String>,
    pub correo: Option<String>,
    pub telefono: Option<String>,
    pub id_carrera: Option<String>,
    pub tutor: TutorChange,
}

impl Default for TutorChange {
    fn default() -> Self {
        TutorChange::Keep
    }
}

#[derive(Debug)]
pub enum UpdateError {
    StudentNotFound,
    TutorNotFound,
    Fanout(FanoutError),
    Db(rusqlite::Error),
}

impl From<FanoutError> for UpdateError {
    fn from(e: FanoutError) -> Self {
        UpdateError::Fanout(e)
    }
}

impl From<rusqlite::Error> for UpdateError {
    fn from(e: rusqlite::Error) -> Self {
        UpdateError::Db(e)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    Validating,
    ResolvingOldTutor,
    Unassigning,
    ResolvingNewTutor,
    Assigning,
    Persisting,
    Done,
}

/// Apply `patch` to the student with internal id `student_id`. Runs on the
/// caller's transaction; the caller commits on `Ok` and rolls back on `Err`.
pub fn run(
    conn: &Connection,
    student_id: &str,
    patch: &StudentPatch,
) -> Result<StudentRow, UpdateError> {
    let mut step = Step::Validating;
    let mut existing: Option<StudentRow> = None;
    let mut old_staff: Option<StaffRow> = None;
    let mut new_staff: Option<StaffRow> = None;

    loop {
        step = match step {
            Step::Validating => {
                existing = Some(
                    db::student_by_id(conn, student_id)?.ok_or(UpdateError::StudentNotFound)?,
                );
                Step::ResolvingOldTutor
            }
            Step::ResolvingOldTutor => {
                // Keep means the tutor reference and rosters stay as they
                // are; skip straight to the field update.
                if patch.tutor == TutorChange::Keep {
                    Step::Persisting
                } else {
                    let student = existing.as_ref().ok_or(UpdateError::StudentNotFound)?;
                    if let Some(tutor_id) = student.tutor_id.as_deref() {
                        old_staff = db::staff_by_internal_id(conn, tutor_id)?;
                        if old_staff.is_none() {
                            // Tolerated: a dangling tutor reference must not
                            // block the update; there is nothing to unassign.
                            warn!(
                                student = %student.id,
                                tutor = %tutor_id,
                                "old tutor identity missing, skipping unassign"
                            );
                        }
                    }
                    Step::Unassigning
                }
            }
            Step::Unassigning => {
                if let Some(old) = old_staff.as_ref() {
                    sync::unassign(conn, &old.matricula, student_id)?;
                }
                Step::ResolvingNewTutor
            }
            Step::ResolvingNewTutor => {
                if let TutorChange::Set(id) = &patch.tutor {
                    new_staff =
                        Some(db::staff_by_internal_id(conn, id)?.ok_or(UpdateError::TutorNotFound)?);
                    Step::Assigning
                } else {
                    Step::Persisting
                }
            }
            Step::Assigning => {
                if let Some(staff) = new_staff.as_ref() {
                    sync::assign(conn, staff, student_id)?;
                }
                Step::Persisting
            }
            Step::Persisting => {
                let student = existing.as_ref().ok_or(UpdateError::StudentNotFound)?;
                let tutor_id: Option<&str> = match &patch.tutor {
                    TutorChange::Keep => student.tutor_id.as_deref(),
                    TutorChange::Clear => None,
                    TutorChange::Set(_) => new_staff.as_ref().map(|s| s.id.as_str()),
                };
                conn.execute(
                    "UPDATE students
                     SET nombre = ?, correo = ?, telefono = ?, id_carrera = ?,
                         tutor_id = ?, updated_at = ?
                     WHERE id = ?",
                    (
                        patch.nombre.as_deref().unwrap_or(&student.nombre),
                        patch.correo.as_deref().unwrap_or(&student.correo),
                        patch
                            .telefono
                            .as_deref()
                            .or(student.telefono.as_deref()),
                        patch.id_carrera.as_deref().unwrap_or(&student.id_carrera),
                        tutor_id,
                        chrono::Utc::now().to_rfc3339(),
                        student_id,
                    ),
                )?;
                Step::Done
            }
            Step::Done => {
                return db::student_by_id(conn, student_id)?
                    .ok_or(UpdateError::StudentNotFound);
            }
        };
    }
}
