use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const ADMIN_GROUP: &str = "admin";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Appointment {
    pub customer_id: String,
    pub slot: String,
    pub customer_name: String,
    pub customer_email: String,
    pub service: String,
    pub created_at: DateTime<Utc>,
}

/// Verified identity claims forwarded by the front proxy. The core
/// trusts these as given and never re-validates them.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IdentityClaims {
    pub subject_id: Option<String>,
    pub display_name: String,
    pub email: String,
    pub groups: Vec<String>,
}

impl IdentityClaims {
    pub fn from_parts(
        subject_id: Option<String>,
        given_name: &str,
        family_name: &str,
        email: &str,
        groups: Vec<String>,
    ) -> Self {
        let display_name = format!("{} {}", given_name, family_name)
            .trim()
            .to_string();
        Self {
            subject_id,
            display_name,
            email: email.to_string(),
            groups,
        }
    }

    pub fn is_admin(&self) -> bool {
        self.groups.iter().any(|g| g == ADMIN_GROUP)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Create,
    ViewSelf,
    ViewAll,
    Cancel,
    ViewAvailability,
}

/// Authorized scope derived from claims. Self-scoped operations carry
/// the caller's customer id; admin operations are unrestricted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scope {
    Customer(String),
    Admin,
    Public,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum AuthDenied {
    #[error("authentication required")]
    Unauthenticated,
    #[error("access denied: admins only")]
    Forbidden,
}

/// Pure authorization decision over the supplied claims. Admin
/// operations are denied without the admin group no matter what
/// subject is present.
pub fn authorize(claims: &IdentityClaims, operation: Operation) -> Result<Scope, AuthDenied> {
    match operation {
        Operation::ViewAvailability => Ok(Scope::Public),
        Operation::Create | Operation::ViewSelf => match &claims.subject_id {
            Some(id) if !id.is_empty() => Ok(Scope::Customer(id.clone())),
            _ => Err(AuthDenied::Unauthenticated),
        },
        Operation::ViewAll | Operation::Cancel => {
            if claims.is_admin() {
                Ok(Scope::Admin)
            } else {
                Err(AuthDenied::Forbidden)
            }
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum BookingError {
    #[error("authentication required")]
    Unauthenticated,
    #[error("access denied: admins only")]
    Forbidden,
    #[error("{0}")]
    InvalidInput(String),
    #[error("slot {0} is already booked")]
    SlotConflict(String),
    #[error("storage backend unavailable")]
    Storage,
}

impl BookingError {
    pub fn classification(&self) -> &'static str {
        match self {
            BookingError::Unauthenticated => "unauthorized",
            BookingError::Forbidden => "forbidden",
            BookingError::InvalidInput(_) => "invalid-input",
            BookingError::SlotConflict(_) => "conflict",
            BookingError::Storage => "internal-error",
        }
    }
}

impl From<AuthDenied> for BookingError {
    fn from(denied: AuthDenied) -> Self {
        match denied {
            AuthDenied::Unauthenticated => BookingError::Unauthenticated,
            AuthDenied::Forbidden => BookingError::Forbidden,
        }
    }
}
