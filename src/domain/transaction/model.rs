//! Transaction domain entity

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Transaction status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TransactionStatus {
    Started,
    Stopped,
}

/// Charging transaction
#[derive(Debug, Clone, Serialize)]
pub struct Transaction {
    /// Server-assigned, unique for the lifetime of the server
    pub id: i32,
    pub charge_point_id: String,
    pub connector_id: u32,
    /// ID tag that started the transaction
    pub id_tag: String,
    /// Meter value at start (Wh)
    pub meter_start: i32,
    /// Start time as reported by the charge point
    pub started_at: DateTime<Utc>,
    /// Meter value at stop (Wh)
    pub meter_stop: Option<i32>,
    pub stopped_at: Option<DateTime<Utc>>,
    pub stop_reason: Option<String>,
    pub status: TransactionStatus,
}

/// Data reported by a StartTransaction request
#[derive(Debug, Clone)]
pub struct NewTransaction {
    pub charge_point_id: String,
    pub connector_id: u32,
    pub id_tag: String,
    pub meter_start: i32,
    pub started_at: DateTime<Utc>,
}

/// Data reported by a StopTransaction request
#[derive(Debug, Clone)]
pub struct StopTransaction {
    pub meter_stop: i32,
    pub stopped_at: DateTime<Utc>,
    pub reason: Option<String>,
}

impl Transaction {
    /// Open a transaction under an already issued id.
    pub fn start(id: i32, new: NewTransaction) -> Self {
        Self {
            id,
            charge_point_id: new.charge_point_id,
            connector_id: new.connector_id,
            id_tag: new.id_tag,
            meter_start: new.meter_start,
            started_at: new.started_at,
            meter_stop: None,
            stopped_at: None,
            stop_reason: None,
            status: TransactionStatus::Started,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == TransactionStatus::Started
    }

    pub fn stop(&mut self, stop: StopTransaction) {
        self.meter_stop = Some(stop.meter_stop);
        self.stopped_at = Some(stop.stopped_at);
        self.stop_reason = stop.reason;
        self.status = TransactionStatus::Stopped;
    }

    /// Energy delivered in Wh, once stopped.
    pub fn energy_consumed(&self) -> Option<i32> {
        self.meter_stop.map(|stop| stop - self.meter_start)
    }
}
