use std::sync::Arc;

use chrono::Utc;
use shared::{authorize, Appointment, BookingError, IdentityClaims, Operation, Scope};
use tracing::info;

use crate::notify::{send_confirmation, Notifier};
use crate::store::{AppointmentStore, StoreError};

#[derive(Debug, Clone)]
pub struct BookingConfig {
    pub operator_email: String,
    pub default_service: String,
}

pub struct BookingService {
    store: Arc<dyn AppointmentStore>,
    notifier: Arc<dyn Notifier>,
    config: BookingConfig,
}

fn storage_error(e: StoreError) -> BookingError {
    match e {
        // A read path never reports SlotTaken; a write path maps it
        // before reaching here.
        StoreError::SlotTaken | StoreError::Unavailable(_) => BookingError::Storage,
    }
}

impl BookingService {
    pub fn new(
        store: Arc<dyn AppointmentStore>,
        notifier: Arc<dyn Notifier>,
        config: BookingConfig,
    ) -> Self {
        Self {
            store,
            notifier,
            config,
        }
    }

    /// Books a slot for the caller. The `find_by_slot` pre-check gives
    /// fast rejection; the store's conditional write is the authority
    /// when two requests race past it for the same slot.
    pub async fn create(
        &self,
        claims: &IdentityClaims,
        slot: &str,
        service: Option<String>,
    ) -> Result<Appointment, BookingError> {
        let Scope::Customer(customer_id) = authorize(claims, Operation::Create)? else {
            return Err(BookingError::Forbidden);
        };

        let slot = slot.trim();
        if slot.is_empty() {
            return Err(BookingError::InvalidInput("slot is required".to_string()));
        }

        if let Some(existing) = self.store.find_by_slot(slot).await.map_err(storage_error)? {
            info!(slot, holder = %existing.customer_id, "slot already booked");
            return Err(BookingError::SlotConflict(slot.to_string()));
        }

        let appointment = Appointment {
            customer_id,
            slot: slot.to_string(),
            customer_name: claims.display_name.clone(),
            customer_email: claims.email.clone(),
            service: service
                .filter(|s| !s.trim().is_empty())
                .unwrap_or_else(|| self.config.default_service.clone()),
            created_at: Utc::now(),
        };

        self.store
            .put(appointment.clone())
            .await
            .map_err(|e| match e {
                StoreError::SlotTaken => BookingError::SlotConflict(slot.to_string()),
                StoreError::Unavailable(_) => BookingError::Storage,
            })?;

        info!(slot, customer = %appointment.customer_id, "appointment created");

        // Fire-and-forget: the booking is committed, so delivery
        // latency or failure must not touch the response.
        let notifier = Arc::clone(&self.notifier);
        let operator_email = self.config.operator_email.clone();
        let created = appointment.clone();
        tokio::spawn(async move {
            send_confirmation(notifier.as_ref(), &created, &operator_email).await;
        });

        Ok(appointment)
    }

    /// The caller's own appointments, in no particular order.
    pub async fn view_self(
        &self,
        claims: &IdentityClaims,
    ) -> Result<Vec<Appointment>, BookingError> {
        let Scope::Customer(customer_id) = authorize(claims, Operation::ViewSelf)? else {
            return Err(BookingError::Forbidden);
        };

        let all = self.store.scan_all().await.map_err(storage_error)?;
        Ok(all
            .into_iter()
            .filter(|a| a.customer_id == customer_id)
            .collect())
    }

    /// All appointments, sorted ascending by slot. The ordering is a
    /// contract, soonest first.
    pub async fn view_all(
        &self,
        claims: &IdentityClaims,
    ) -> Result<Vec<Appointment>, BookingError> {
        authorize(claims, Operation::ViewAll)?;

        let mut all = self.store.scan_all().await.map_err(storage_error)?;
        all.sort_by(|a, b| a.slot.cmp(&b.slot));
        Ok(all)
    }

    /// Idempotent admin cancel; a missing record is already the
    /// desired terminal state.
    pub async fn cancel(
        &self,
        claims: &IdentityClaims,
        customer_id: &str,
        slot: &str,
    ) -> Result<(), BookingError> {
        authorize(claims, Operation::Cancel)?;

        self.store
            .delete(customer_id, slot)
            .await
            .map_err(storage_error)?;
        info!(slot, customer = customer_id, "appointment cancelled");
        Ok(())
    }

    /// Booked slot values so a caller can compute free slots. Public.
    pub async fn availability(&self) -> Result<Vec<String>, BookingError> {
        let all = self.store.scan_all().await.map_err(storage_error)?;
        Ok(all.into_iter().map(|a| a.slot).collect())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::time::Duration;

    use async_trait::async_trait;

    use super::*;
    use crate::notify::doubles::{FailingNotifier, RecordingNotifier};
    use crate::store::memory::MemoryStore;

    fn config() -> BookingConfig {
        BookingConfig {
            operator_email: "ops@example.com".to_string(),
            default_service: "manicure".to_string(),
        }
    }

    fn customer(sub: &str) -> IdentityClaims {
        IdentityClaims {
            subject_id: Some(sub.to_string()),
            display_name: format!("Customer {sub}"),
            email: format!("{sub}@example.com"),
            groups: vec!["user".to_string()],
        }
    }

    fn admin() -> IdentityClaims {
        IdentityClaims {
            subject_id: Some("admin-1".to_string()),
            display_name: "The Admin".to_string(),
            email: "admin@example.com".to_string(),
            groups: vec!["admin".to_string()],
        }
    }

    fn service_with(store: Arc<dyn AppointmentStore>) -> BookingService {
        BookingService::new(store, Arc::new(RecordingNotifier::default()), config())
    }

    #[tokio::test]
    async fn second_create_for_a_slot_conflicts_and_writes_nothing() {
        let store = Arc::new(MemoryStore::new());
        let service = service_with(store.clone());

        service
            .create(&customer("a"), "2024-01-01T10:00", None)
            .await
            .unwrap();

        let err = service
            .create(&customer("b"), "2024-01-01T10:00", None)
            .await
            .unwrap_err();
        assert!(matches!(err, BookingError::SlotConflict(_)));

        let all = store.scan_all().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].customer_id, "a");
    }

    #[tokio::test]
    async fn lost_race_at_write_time_is_the_same_conflict() {
        // A store whose pre-check read misses the concurrent winner:
        // only the conditional write catches the collision.
        struct RacyStore(MemoryStore);

        #[async_trait]
        impl AppointmentStore for RacyStore {
            async fn get(
                &self,
                customer_id: &str,
                slot: &str,
            ) -> Result<Option<Appointment>, StoreError> {
                self.0.get(customer_id, slot).await
            }
            async fn find_by_slot(&self, _: &str) -> Result<Option<Appointment>, StoreError> {
                Ok(None)
            }
            async fn put(&self, appointment: Appointment) -> Result<(), StoreError> {
                self.0.put(appointment).await
            }
            async fn delete(&self, customer_id: &str, slot: &str) -> Result<(), StoreError> {
                self.0.delete(customer_id, slot).await
            }
            async fn scan_all(&self) -> Result<Vec<Appointment>, StoreError> {
                self.0.scan_all().await
            }
        }

        let store = Arc::new(RacyStore(MemoryStore::new()));
        let service = service_with(store.clone());

        service
            .create(&customer("a"), "2024-01-01T10:00", None)
            .await
            .unwrap();
        let err = service
            .create(&customer("b"), "2024-01-01T10:00", None)
            .await
            .unwrap_err();
        assert!(matches!(err, BookingError::SlotConflict(_)));

        assert_eq!(store.scan_all().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn create_captures_identity_and_default_service() {
        let store = Arc::new(MemoryStore::new());
        let service = service_with(store);

        let created = service
            .create(&customer("a"), "2024-01-01T10:00", None)
            .await
            .unwrap();
        assert_eq!(created.customer_id, "a");
        assert_eq!(created.customer_name, "Customer a");
        assert_eq!(created.customer_email, "a@example.com");
        assert_eq!(created.service, "manicure");

        let styled = service
            .create(&customer("a"), "2024-01-02T10:00", Some("pedicure".to_string()))
            .await
            .unwrap();
        assert_eq!(styled.service, "pedicure");
    }

    #[tokio::test]
    async fn empty_slot_is_rejected_before_the_store() {
        let store = Arc::new(MemoryStore::new());
        store.set_unavailable(true);
        let service = service_with(store);

        // Would be Storage if the store were consulted.
        let err = service.create(&customer("a"), "   ", None).await.unwrap_err();
        assert!(matches!(err, BookingError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn create_without_identity_is_unauthenticated() {
        let service = service_with(Arc::new(MemoryStore::new()));
        let err = service
            .create(&IdentityClaims::default(), "2024-01-01T10:00", None)
            .await
            .unwrap_err();
        assert!(matches!(err, BookingError::Unauthenticated));
    }

    #[tokio::test]
    async fn view_self_never_leaks_other_customers() {
        let service = service_with(Arc::new(MemoryStore::new()));
        service
            .create(&customer("a"), "2024-01-01T10:00", None)
            .await
            .unwrap();
        service
            .create(&customer("b"), "2024-01-02T10:00", None)
            .await
            .unwrap();

        let mine = service.view_self(&customer("a")).await.unwrap();
        assert_eq!(mine.len(), 1);
        assert!(mine.iter().all(|a| a.customer_id == "a"));
    }

    #[tokio::test]
    async fn view_all_is_sorted_ascending_by_slot() {
        let service = service_with(Arc::new(MemoryStore::new()));
        for slot in ["2024-03-01T09:00", "2024-01-01T10:00", "2024-02-01T11:00"] {
            service.create(&customer("a"), slot, None).await.unwrap();
        }

        let all = service.view_all(&admin()).await.unwrap();
        let slots: Vec<&str> = all.iter().map(|a| a.slot.as_str()).collect();
        assert_eq!(
            slots,
            vec!["2024-01-01T10:00", "2024-02-01T11:00", "2024-03-01T09:00"]
        );
    }

    #[tokio::test]
    async fn non_admin_view_all_is_forbidden_never_partial() {
        let service = service_with(Arc::new(MemoryStore::new()));
        service
            .create(&customer("a"), "2024-01-01T10:00", None)
            .await
            .unwrap();

        let err = service.view_all(&customer("a")).await.unwrap_err();
        assert!(matches!(err, BookingError::Forbidden));
    }

    #[tokio::test]
    async fn cancel_is_idempotent() {
        let service = service_with(Arc::new(MemoryStore::new()));
        service
            .create(&customer("a"), "2024-01-01T10:00", None)
            .await
            .unwrap();

        service
            .cancel(&admin(), "a", "2024-01-01T10:00")
            .await
            .unwrap();
        // Second cancel of the same key succeeds identically.
        service
            .cancel(&admin(), "a", "2024-01-01T10:00")
            .await
            .unwrap();

        assert!(service.view_all(&admin()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn cancel_requires_admin() {
        let service = service_with(Arc::new(MemoryStore::new()));
        let err = service
            .cancel(&customer("a"), "a", "2024-01-01T10:00")
            .await
            .unwrap_err();
        assert!(matches!(err, BookingError::Forbidden));
    }

    #[tokio::test]
    async fn booking_lifecycle_end_to_end() {
        let service = service_with(Arc::new(MemoryStore::new()));
        let slot = "2024-01-01T10:00";

        let created = service.create(&customer("a"), slot, None).await.unwrap();
        assert_eq!(created.customer_id, "a");

        let err = service.create(&customer("b"), slot, None).await.unwrap_err();
        assert!(matches!(err, BookingError::SlotConflict(_)));

        let all = service.view_all(&admin()).await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].customer_id, "a");

        service.cancel(&admin(), "a", slot).await.unwrap();
        assert!(service.view_all(&admin()).await.unwrap().is_empty());

        // Freed slot is bookable again, now by b.
        let rebooked = service.create(&customer("b"), slot, None).await.unwrap();
        assert_eq!(rebooked.customer_id, "b");
    }

    #[tokio::test]
    async fn notification_failure_does_not_fail_the_create() {
        let service = BookingService::new(
            Arc::new(MemoryStore::new()),
            Arc::new(FailingNotifier),
            config(),
        );

        let created = service
            .create(&customer("a"), "2024-01-01T10:00", None)
            .await
            .unwrap();
        assert_eq!(created.slot, "2024-01-01T10:00");

        // The record is durable regardless of delivery.
        let mine = service.view_self(&customer("a")).await.unwrap();
        assert_eq!(mine.len(), 1);
    }

    #[tokio::test]
    async fn confirmation_is_dispatched_after_create() {
        let notifier = Arc::new(RecordingNotifier::default());
        let service = BookingService::new(
            Arc::new(MemoryStore::new()),
            notifier.clone(),
            config(),
        );

        service
            .create(&customer("a"), "2024-01-01T10:00", None)
            .await
            .unwrap();

        // Delivery runs on a detached task; give it a beat.
        tokio::time::sleep(Duration::from_millis(50)).await;
        let sent = notifier.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(
            sent[0].0,
            vec!["a@example.com".to_string(), "ops@example.com".to_string()]
        );
    }

    #[tokio::test]
    async fn availability_lists_booked_slots() {
        let service = service_with(Arc::new(MemoryStore::new()));
        service
            .create(&customer("a"), "2024-01-01T10:00", None)
            .await
            .unwrap();
        service
            .create(&customer("b"), "2024-01-02T10:00", None)
            .await
            .unwrap();

        let booked: HashSet<String> =
            service.availability().await.unwrap().into_iter().collect();
        let expected: HashSet<String> =
            ["2024-01-01T10:00", "2024-01-02T10:00"]
                .into_iter()
                .map(String::from)
                .collect();
        assert_eq!(booked, expected);
    }

    #[tokio::test]
    async fn store_outage_surfaces_as_storage_error() {
        let store = Arc::new(MemoryStore::new());
        store.set_unavailable(true);
        let service = service_with(store);

        let err = service
            .create(&customer("a"), "2024-01-01T10:00", None)
            .await
            .unwrap_err();
        assert!(matches!(err, BookingError::Storage));

        let err = service.availability().await.unwrap_err();
        assert!(matches!(err, BookingError::Storage));
    }
}
