use std::sync::Arc;

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use serde_json::{json, Value};
use uuid::Uuid;

use shared_config::AppConfig;

use crate::clock::ManualClock;

pub struct TestConfig {
    pub clinic_api_url: String,
    pub clinic_api_key: String,
}

impl Default for TestConfig {
    fn default() -> Self {
        Self {
            clinic_api_url: "http://localhost:54321".to_string(),
            clinic_api_key: "test-api-key".to_string(),
        }
    }
}

impl TestConfig {
    pub fn with_url(url: &str) -> Self {
        Self {
            clinic_api_url: url.to_string(),
            ..Self::default()
        }
    }

    pub fn to_app_config(&self) -> AppConfig {
        AppConfig {
            clinic_api_url: self.clinic_api_url.clone(),
            clinic_api_key: self.clinic_api_key.clone(),
            clinic_api_timeout_seconds: 2,
            ..AppConfig::default()
        }
    }

    pub fn to_arc(&self) -> Arc<AppConfig> {
        Arc::new(self.to_app_config())
    }
}

/// The clinic day most fixtures are built around.
pub fn test_day() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 3, 11).expect("valid fixture date")
}

/// 09:00 UTC on [`test_day`].
pub fn test_morning() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 11, 9, 0, 0)
        .single()
        .expect("valid fixture instant")
}

pub fn test_clock() -> ManualClock {
    ManualClock::new(test_morning())
}

/// Ids whose lexical order matches their index, for tie-break assertions.
pub fn ordered_ids(count: usize) -> Vec<Uuid> {
    (0..count)
        .map(|i| Uuid::from_u128(0xA000_0000_0000_0000_0000_0000_0000_0000 + i as u128))
        .collect()
}

pub struct MockClinicResponses;

impl MockClinicResponses {
    pub fn appointment_response(id: Uuid, time: &str, status: &str, priority: Option<u32>) -> Value {
        let waiting_since = (status == "waiting").then_some("2024-03-11T08:45:00Z");
        json!({
            "id": id,
            "patient_id": Uuid::new_v4(),
            "date": test_day().to_string(),
            "time": time,
            "status": status,
            "room": null,
            "priority": priority,
            "waiting_since": waiting_since,
            "wait_duration_minutes": null,
            "payment_state": "unpaid",
            "type": "visit"
        })
    }

    pub fn waiting_room(ids: &[Uuid]) -> Value {
        Value::Array(
            ids.iter()
                .enumerate()
                .map(|(i, id)| {
                    Self::appointment_response(*id, &format!("09:{:02}:00", i * 15), "waiting", Some(i as u32))
                })
                .collect(),
        )
    }

    pub fn consultation_response(appointment_id: Uuid) -> Value {
        json!({
            "id": Uuid::new_v4(),
            "appointment_id": appointment_id,
            "created_at": "2024-03-11T09:30:00Z"
        })
    }

    pub fn error_response(message: &str, code: &str) -> Value {
        json!({
            "error": {
                "message": message,
                "code": code
            }
        })
    }
}
