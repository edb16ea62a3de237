use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use readiness_core::{AggregateId, TenantId};

/// Envelope for a message on one of the buses.
///
/// - **Multi-tenancy** is carried here via `tenant_id`; workers filter on it.
/// - `subject_id` is the aggregate the message is about (a product).
/// - `sequence_number` orders messages for one subject. Inspection events use the
///   inspection version; catalog changes use whatever the catalog service assigns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventEnvelope<E> {
    event_id: Uuid,
    tenant_id: TenantId,
    subject_id: AggregateId,
    subject_type: String,
    sequence_number: u64,
    recorded_at: DateTime<Utc>,
    payload: E,
}

impl<E> EventEnvelope<E> {
    pub fn new(
        tenant_id: TenantId,
        subject_id: AggregateId,
        subject_type: impl Into<String>,
        sequence_number: u64,
        payload: E,
    ) -> Self {
        Self {
            event_id: Uuid::now_v7(),
            tenant_id,
            subject_id,
            subject_type: subject_type.into(),
            sequence_number,
            recorded_at: Utc::now(),
            payload,
        }
    }

    pub fn event_id(&self) -> Uuid {
        self.event_id
    }

    pub fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }

    pub fn subject_id(&self) -> AggregateId {
        self.subject_id
    }

    pub fn subject_type(&self) -> &str {
        &self.subject_type
    }

    pub fn sequence_number(&self) -> u64 {
        self.sequence_number
    }

    pub fn recorded_at(&self) -> DateTime<Utc> {
        self.recorded_at
    }

    pub fn payload(&self) -> &E {
        &self.payload
    }

    pub fn into_payload(self) -> E {
        self.payload
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_survives_json() {
        let env = EventEnvelope::new(TenantId::new(), AggregateId::new(), "catalog.product", 3, 42u32);
        let json = serde_json::to_string(&env).unwrap();
        let back: EventEnvelope<u32> = serde_json::from_str(&json).unwrap();
        assert_eq!(back, env);
        assert_eq!(back.sequence_number(), 3);
        assert_eq!(*back.payload(), 42);
    }
}
