use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Learner,
    Instructor,
    Administrator,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    AuthorQuestionnaire,
    BypassEligibility,
    OverridePublishDeadline,
    PreviewUnpublished,
    ActForLearner,
}

impl Role {
    pub fn can(&self, capability: Capability) -> bool {
        match self {
            Role::Administrator => true,
            Role::Instructor => matches!(capability, Capability::AuthorQuestionnaire),
            Role::Learner => false,
        }
    }

    pub fn is_administrator(&self) -> bool {
        matches!(self, Role::Administrator)
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "learner" | "student" => Ok(Role::Learner),
            "instructor" | "teacher" => Ok(Role::Instructor),
            "administrator" | "admin" => Ok(Role::Administrator),
            other => Err(format!("unknown role '{}'", other)),
        }
    }
}

/// The authenticated caller of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub user_id: Uuid,
    pub role: Role,
}

impl Principal {
    pub fn can(&self, capability: Capability) -> bool {
        self.role.can(capability)
    }

    /// Resolves the learner a respondent action targets. Only callers allowed
    /// to act for a learner may name somebody else.
    pub fn acting_for(&self, on_behalf_of: Option<Uuid>) -> crate::error::Result<Uuid> {
        match on_behalf_of {
            Some(user_id) if user_id != self.user_id => {
                if self.can(Capability::ActForLearner) {
                    Ok(user_id)
                } else {
                    Err(crate::error::Error::Forbidden(
                        "Only administrators may act on behalf of another learner".to_string(),
                    ))
                }
            }
            _ => Ok(self.user_id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capabilities_follow_role() {
        assert!(Role::Administrator.can(Capability::OverridePublishDeadline));
        assert!(Role::Administrator.can(Capability::BypassEligibility));
        assert!(Role::Instructor.can(Capability::AuthorQuestionnaire));
        assert!(!Role::Instructor.can(Capability::BypassEligibility));
        assert!(!Role::Instructor.can(Capability::OverridePublishDeadline));
        assert!(!Role::Learner.can(Capability::AuthorQuestionnaire));
        assert!(!Role::Learner.can(Capability::PreviewUnpublished));
    }

    #[test]
    fn parses_known_roles_only() {
        assert_eq!("Admin".parse::<Role>().unwrap(), Role::Administrator);
        assert_eq!("instructor".parse::<Role>().unwrap(), Role::Instructor);
        assert_eq!("learner".parse::<Role>().unwrap(), Role::Learner);
        assert!("superuser".parse::<Role>().is_err());
    }

    #[test]
    fn learners_cannot_act_for_others() {
        let learner = Principal { user_id: Uuid::new_v4(), role: Role::Learner };
        let other = Uuid::new_v4();
        assert_eq!(learner.acting_for(None).unwrap(), learner.user_id);
        assert_eq!(learner.acting_for(Some(learner.user_id)).unwrap(), learner.user_id);
        assert!(learner.acting_for(Some(other)).is_err());

        let admin = Principal { user_id: Uuid::new_v4(), role: Role::Administrator };
        assert_eq!(admin.acting_for(Some(other)).unwrap(), other);
    }
}
