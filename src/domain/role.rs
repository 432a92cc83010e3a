use serde::{Deserialize, Serialize};

/// Account role. Roles form a flat, totally ordered hierarchy:
/// a higher rank can do everything a lower rank can.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Employee,
    DirectManager,
    AdminOfficer,
    Admin,
}

impl Role {
    pub const ALL: [Role; 4] = [
        Role::Employee,
        Role::DirectManager,
        Role::AdminOfficer,
        Role::Admin,
    ];

    pub fn rank(&self) -> u8 {
        match self {
            Role::Employee => 1,
            Role::DirectManager => 2,
            Role::AdminOfficer => 3,
            Role::Admin => 4,
        }
    }

    /// True when this role ranks at or above `required`.
    pub fn has_at_least(&self, required: Role) -> bool {
        self.rank() >= required.rank()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Employee => "employee",
            Role::DirectManager => "direct_manager",
            Role::AdminOfficer => "admin_officer",
            Role::Admin => "admin",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "employee" => Some(Role::Employee),
            "direct_manager" | "manager" => Some(Role::DirectManager),
            "admin_officer" => Some(Role::AdminOfficer),
            "admin" => Some(Role::Admin),
            _ => None,
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_roundtrip() {
        for role in Role::ALL {
            assert_eq!(Role::from_str(role.as_str()), Some(role));
        }
    }

    #[test]
    fn test_rank_is_strictly_increasing() {
        let ranks: Vec<u8> = Role::ALL.iter().map(Role::rank).collect();
        assert_eq!(ranks, vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_has_at_least() {
        assert!(Role::Admin.has_at_least(Role::Employee));
        assert!(Role::Admin.has_at_least(Role::Admin));
        assert!(Role::AdminOfficer.has_at_least(Role::DirectManager));
        assert!(!Role::DirectManager.has_at_least(Role::AdminOfficer));
        assert!(!Role::Employee.has_at_least(Role::DirectManager));
    }

    #[test]
    fn test_from_str_accepts_dashes_and_case() {
        assert_eq!(Role::from_str("Direct-Manager"), Some(Role::DirectManager));
        assert_eq!(Role::from_str(" ADMIN_officer "), Some(Role::AdminOfficer));
        assert_eq!(Role::from_str("owner"), None);
    }
}
