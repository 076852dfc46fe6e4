// Copyright 2026 Proforma Contributors
// SPDX-License-Identifier: Apache-2.0

//! Typed sweep events and their delivery channel.
//!
//! A sweep emits an ordered stream: one `start`, then one
//! `progress`/`result` pair per supplier, then exactly one terminal
//! `done` or `error`. Events travel through a bounded `mpsc` channel —
//! ordered and backpressure-aware — to a transport-agnostic sink (SSE
//! handler, terminal progress bar, test collector). A failed send is the
//! sink-disconnect signal: the orchestrator stops emitting and finishes
//! its bookkeeping quietly.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// Classification of one supplier's outcome within a sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OfferStatus {
    /// Extraction completed and found at least one line item.
    Ok,
    /// Extraction completed but the page carried no offer.
    NoData,
    /// Timeout, navigation/extraction fault, or persistence fault.
    Error,
}

impl OfferStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::NoData => "no-data",
            Self::Error => "error",
        }
    }
}

impl std::str::FromStr for OfferStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ok" => Ok(Self::Ok),
            "no-data" => Ok(Self::NoData),
            "error" => Ok(Self::Error),
            other => Err(format!("unknown offer status: {other}")),
        }
    }
}

/// Every event a sweep emits. Serialized to JSON for SSE streaming.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SweepEvent {
    /// The sweep started; `total` suppliers will be visited.
    Start { total: usize },
    /// About to process supplier `current` of `total`. `eta_seconds` is
    /// the running-average estimate; absent on the first supplier.
    Progress {
        current: usize,
        total: usize,
        supplier_id: String,
        name: String,
        eta_seconds: Option<u64>,
    },
    /// One supplier finished with the given classification.
    Result {
        supplier_id: String,
        status: OfferStatus,
    },
    /// Terminal: every supplier was visited.
    Done {
        ok: usize,
        no_data: usize,
        error: usize,
    },
    /// Terminal: the sweep could not run or finish.
    Error { message: String },
}

/// Sender half of a sweep's event stream.
pub type EventSender = mpsc::Sender<SweepEvent>;

/// Receiver half of a sweep's event stream.
pub type EventReceiver = mpsc::Receiver<SweepEvent>;

/// Bounded buffer: a sweep produces 2n+2 events, consumers keep up in
/// practice, and a stalled consumer should exert backpressure rather than
/// buffer a whole sweep.
const CHANNEL_CAPACITY: usize = 64;

/// Create the event channel for one sweep.
pub fn channel() -> (EventSender, EventReceiver) {
    mpsc::channel(CHANNEL_CAPACITY)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serialization_tags() {
        let json = serde_json::to_string(&SweepEvent::Start { total: 3 }).unwrap();
        assert_eq!(json, r#"{"type":"start","total":3}"#);

        let json = serde_json::to_string(&SweepEvent::Result {
            supplier_id: "1790012345001".into(),
            status: OfferStatus::NoData,
        })
        .unwrap();
        assert!(json.contains(r#""type":"result""#));
        assert!(json.contains(r#""status":"no-data""#));
    }

    #[test]
    fn test_progress_eta_serializes_null_when_absent() {
        let json = serde_json::to_string(&SweepEvent::Progress {
            current: 1,
            total: 5,
            supplier_id: "179".into(),
            name: "ACME".into(),
            eta_seconds: None,
        })
        .unwrap();
        assert!(json.contains(r#""eta_seconds":null"#));
    }

    #[test]
    fn test_status_round_trip() {
        for status in [OfferStatus::Ok, OfferStatus::NoData, OfferStatus::Error] {
            let parsed: OfferStatus = status.as_str().parse().unwrap();
            assert_eq!(parsed, status);
        }
    }

    #[test]
    fn test_done_event_round_trip() {
        let event = SweepEvent::Done {
            ok: 1,
            no_data: 1,
            error: 1,
        };
        let json = serde_json::to_string(&event).unwrap();
        let parsed: SweepEvent = serde_json::from_str(&json).unwrap();
        match parsed {
            SweepEvent::Done { ok, no_data, error } => {
                assert_eq!((ok, no_data, error), (1, 1, 1));
            }
            _ => panic!("wrong variant"),
        }
    }
}
