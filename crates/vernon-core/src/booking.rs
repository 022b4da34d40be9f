//! Simulated booking desk: confirms every well-formed request and keeps a ledger.

use crate::collaborators::{BookingConfirmation, BookingKind, BookingRequest, BookingService};
use crate::error::{VernonError, VernonResult};
use async_trait::async_trait;
use std::sync::Mutex;
use tracing::info;
use uuid::Uuid;

/// Largest party the simulated desk accepts.
const MAX_PARTY_SIZE: u32 = 20;

#[derive(Debug, Default)]
pub struct SimulatedBookings {
    ledger: Mutex<Vec<BookingConfirmation>>,
}

impl SimulatedBookings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Confirmations issued so far.
    pub fn ledger(&self) -> Vec<BookingConfirmation> {
        self.ledger
            .lock()
            .map(|l| l.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
    }
}

#[async_trait]
impl BookingService for SimulatedBookings {
    async fn book(&self, request: &BookingRequest) -> VernonResult<BookingConfirmation> {
        if request.party_size == 0 || request.party_size > MAX_PARTY_SIZE {
            return Err(VernonError::Booking(format!(
                "party size {} is outside 1..={}",
                request.party_size, MAX_PARTY_SIZE
            )));
        }
        if request.venue.is_none() && request.kind == BookingKind::Table {
            return Err(VernonError::Booking("no venue given for the table".to_string()));
        }

        let prefix = match request.kind {
            BookingKind::Table => "TBL",
            BookingKind::Tickets => "TIX",
        };
        let simple = Uuid::new_v4().simple().to_string();
        let code = format!("{}-{}", prefix, &simple[..6].to_uppercase());
        let confirmation = BookingConfirmation {
            code,
            request: request.clone(),
        };

        info!(code = %confirmation.code, party_size = request.party_size, "booking confirmed");
        self.ledger
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(confirmation.clone());
        Ok(confirmation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(party: u32, venue: Option<&str>) -> BookingRequest {
        BookingRequest {
            kind: BookingKind::Table,
            venue: venue.map(str::to_string),
            party_size: party,
            time: Some("7pm".to_string()),
            date: None,
        }
    }

    #[tokio::test]
    async fn confirms_and_records() {
        let desk = SimulatedBookings::new();
        let c = desk.book(&table(4, Some("the steakhouse"))).await.unwrap();
        assert!(c.code.starts_with("TBL-"));
        assert_eq!(desk.ledger().len(), 1);
    }

    #[tokio::test]
    async fn rejects_impossible_party() {
        let desk = SimulatedBookings::new();
        assert!(desk.book(&table(0, Some("x"))).await.is_err());
        assert!(desk.book(&table(4, None)).await.is_err());
        assert!(desk.ledger().is_empty());
    }
}
