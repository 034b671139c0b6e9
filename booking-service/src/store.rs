use async_trait::async_trait;
use diesel::prelude::*;
use diesel::result::DatabaseErrorKind;
use diesel_async::{
    pooled_connection::bb8::{Pool, PooledConnection},
    AsyncPgConnection, RunQueryDsl,
};
use shared::Appointment;

use crate::models::DbAppointment;
use crate::schema::appointments;

pub type DbPool = Pool<AsyncPgConnection>;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The slot already has an owner. Raised by the unique index at
    /// write time; this is the canonical conflict signal.
    #[error("slot already booked")]
    SlotTaken,
    #[error("storage backend unavailable: {0}")]
    Unavailable(String),
}

/// Durable keyed storage for appointments. Records are addressed by
/// `(customer_id, slot)`; `find_by_slot` is the secondary lookup that
/// detects a slot held by any customer.
#[async_trait]
pub trait AppointmentStore: Send + Sync {
    async fn get(&self, customer_id: &str, slot: &str)
        -> Result<Option<Appointment>, StoreError>;
    async fn find_by_slot(&self, slot: &str) -> Result<Option<Appointment>, StoreError>;
    /// Conditional write: fails with `SlotTaken` if any appointment
    /// already holds the slot.
    async fn put(&self, appointment: Appointment) -> Result<(), StoreError>;
    /// Idempotent: deleting an absent record is not an error.
    async fn delete(&self, customer_id: &str, slot: &str) -> Result<(), StoreError>;
    async fn scan_all(&self) -> Result<Vec<Appointment>, StoreError>;
}

pub struct PgAppointmentStore {
    pool: DbPool,
}

impl PgAppointmentStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn conn(&self) -> Result<PooledConnection<'_, AsyncPgConnection>, StoreError> {
        self.pool
            .get()
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))
    }
}

fn backend_error(e: diesel::result::Error) -> StoreError {
    StoreError::Unavailable(e.to_string())
}

#[async_trait]
impl AppointmentStore for PgAppointmentStore {
    async fn get(
        &self,
        customer_id: &str,
        slot: &str,
    ) -> Result<Option<Appointment>, StoreError> {
        let mut conn = self.conn().await?;
        let row = appointments::table
            .find((customer_id, slot))
            .first::<DbAppointment>(&mut conn)
            .await
            .optional()
            .map_err(backend_error)?;
        Ok(row.map(Appointment::from))
    }

    async fn find_by_slot(&self, slot: &str) -> Result<Option<Appointment>, StoreError> {
        let mut conn = self.conn().await?;
        let row = appointments::table
            .filter(appointments::slot.eq(slot))
            .first::<DbAppointment>(&mut conn)
            .await
            .optional()
            .map_err(backend_error)?;
        Ok(row.map(Appointment::from))
    }

    async fn put(&self, appointment: Appointment) -> Result<(), StoreError> {
        let mut conn = self.conn().await?;
        let row = DbAppointment::from(appointment);
        diesel::insert_into(appointments::table)
            .values(&row)
            .execute(&mut conn)
            .await
            .map_err(|e| match e {
                diesel::result::Error::DatabaseError(
                    DatabaseErrorKind::UniqueViolation,
                    _,
                ) => StoreError::SlotTaken,
                other => backend_error(other),
            })?;
        Ok(())
    }

    async fn delete(&self, customer_id: &str, slot: &str) -> Result<(), StoreError> {
        let mut conn = self.conn().await?;
        diesel::delete(appointments::table.find((customer_id, slot)))
            .execute(&mut conn)
            .await
            .map_err(backend_error)?;
        Ok(())
    }

    async fn scan_all(&self) -> Result<Vec<Appointment>, StoreError> {
        let mut conn = self.conn().await?;
        let rows = appointments::table
            .load::<DbAppointment>(&mut conn)
            .await
            .map_err(backend_error)?;
        Ok(rows.into_iter().map(Appointment::from).collect())
    }
}
