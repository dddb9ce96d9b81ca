/// The five profile kinds a staff identity may hold. Each kind owns its own
/// per-role roster of assigned students; one staff identity may hold any
/// subset of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoleKind {
    Tutor,
    Instructor,
    DepartmentCoordinator,
    Administrator,
    GeneralCoordinator,
}

impl RoleKind {
    /// Fixed order used for fan-out and for career-lookup precedence.
    pub const ALL: [RoleKind; 5] = [
        RoleKind::Tutor,
        RoleKind::Instructor,
        RoleKind::DepartmentCoordinator,
        RoleKind::Administrator,
        RoleKind::GeneralCoordinator,
    ];

    pub fn code(self) -> &'static str {
        match self {
            RoleKind::Tutor => "tutor",
            RoleKind::Instructor => "instructor",
            RoleKind::DepartmentCoordinator => "coordinator",
            RoleKind::Administrator => "administrator",
            RoleKind::GeneralCoordinator => "general_coordinator",
        }
    }

    pub fn from_code(code: &str) -> Option<RoleKind> {
        match code.trim() {
            "tutor" => Some(RoleKind::Tutor),
            "instructor" => Some(RoleKind::Instructor),
            "coordinator" => Some(RoleKind::DepartmentCoordinator),
            "administrator" => Some(RoleKind::Administrator),
            "general_coordinator" => Some(RoleKind::GeneralCoordinator),
            _ => None,
        }
    }

    /// Whether holders of this role belong in the tutor-like staff listing.
    /// Administrator alone is excluded.
    pub fn is_tutor_like(self) -> bool {
        !matches!(self, RoleKind::Administrator)
    }
}

/// Probe order for career resolution: DepartmentCoordinator first, then
/// Administrator. The plain staff record is the final fallback.
pub const CAREER_PROBE_ORDER: [RoleKind; 2] =
    [RoleKind::DepartmentCoordinator, RoleKind::Administrator];

/// Parse the comma-joined `roles` column into tags, dropping anything
/// unrecognized and de-duplicating while preserving order.
pub fn parse_role_tags(raw: &str) -> Vec<RoleKind> {
    let mut out: Vec<RoleKind> = Vec::new();
    for part in raw.split(',') {
        if let Some(kind) = RoleKind::from_code(part) {
            if !out.contains(&kind) {
                out.push(kind);
            }
        }
    }
    out
}

pub fn join_role_tags(tags: &[RoleKind]) -> String {
    tags.iter()
        .map(|k| k.code())
        .collect::<Vec<_>>()
        .join(",")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tags_roundtrip_and_dedupe() {
        let tags = parse_role_tags("tutor, coordinator,tutor,bogus,administrator");
        assert_eq!(
            tags,
            vec![
                RoleKind::Tutor,
                RoleKind::DepartmentCoordinator,
                RoleKind::Administrator
            ]
        );
        assert_eq!(join_role_tags(&tags), "tutor,coordinator,administrator");
    }

    #[test]
    fn administrator_alone_is_not_tutor_like() {
        assert!(!RoleKind::Administrator.is_tutor_like());
        assert!(RoleKind::Tutor.is_tutor_like());
        assert!(RoleKind::Instructor.is_tutor_like());
        assert!(RoleKind::DepartmentCoordinator.is_tutor_like());
        assert!(RoleKind::GeneralCoordinator.is_tutor_like());
    }
}
