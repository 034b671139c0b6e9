use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use shared::Appointment;

#[derive(Debug, Clone, Queryable, Insertable, Serialize, Deserialize)]
#[diesel(table_name = crate::schema::appointments)]
pub struct DbAppointment {
    pub customer_id: String,
    pub slot: String,
    pub customer_name: String,
    pub customer_email: String,
    pub service: String,
    pub created_at: DateTime<Utc>,
}

impl From<Appointment> for DbAppointment {
    fn from(appointment: Appointment) -> Self {
        Self {
            customer_id: appointment.customer_id,
            slot: appointment.slot,
            customer_name: appointment.customer_name,
            customer_email: appointment.customer_email,
            service: appointment.service,
            created_at: appointment.created_at,
        }
    }
}

impl From<DbAppointment> for Appointment {
    fn from(row: DbAppointment) -> Self {
        Self {
            customer_id: row.customer_id,
            slot: row.slot,
            customer_name: row.customer_name,
            customer_email: row.customer_email,
            service: row.service,
            created_at: row.created_at,
        }
    }
}
