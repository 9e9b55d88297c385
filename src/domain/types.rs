//! Shared domain enumerations aligned with persisted database values.

use serde::{Deserialize, Serialize};

/// Role column values. Only these two are accepted on write.
pub const ROLE_USER: i16 = 0;
pub const ROLE_ADMIN: i16 = 100;

/// Sex column values: 0 male, 1 female, 2 undisclosed.
pub const SEX_MALE: i16 = 0;
pub const SEX_FEMALE: i16 = 1;
pub const SEX_UNDISCLOSED: i16 = 2;

pub fn is_known_role(role: i16) -> bool {
    matches!(role, ROLE_USER | ROLE_ADMIN)
}

pub fn is_known_sex(sex: i16) -> bool {
    matches!(sex, SEX_MALE | SEX_FEMALE | SEX_UNDISCLOSED)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "order_status", rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Paid,
    Closed,
}

impl OrderStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Paid => "paid",
            OrderStatus::Closed => "closed",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobType {
    SendMail,
}

impl JobType {
    pub fn as_str(self) -> &'static str {
        match self {
            JobType::SendMail => "send_mail",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_two_roles_are_known() {
        assert!(is_known_role(ROLE_USER));
        assert!(is_known_role(ROLE_ADMIN));
        assert!(!is_known_role(1));
        assert!(!is_known_role(99));
    }

    #[test]
    fn sex_values_cover_three_states() {
        assert!((0..=2).all(is_known_sex));
        assert!(!is_known_sex(3));
    }
}
