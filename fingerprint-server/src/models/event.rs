//! Visitor event model

use chrono::{DateTime, Utc};
use device_fingerprint_core::logic::velocity::IncomingEvent;
use serde::{Deserialize, Serialize};
use validator::Validate;

/// Missing `visitor_id`/`timestamp` is reported by the velocity index
#[derive(Debug, Default, Deserialize, Validate)]
#[serde(default)]
pub struct EventBody {
    #[validate(length(max = 128))]
    pub visitor_id: Option<String>,

    #[validate(ip)]
    pub ip: Option<String>,

    #[validate(length(max = 256))]
    pub linked_id: Option<String>,

    #[validate(length(equal = 2))]
    pub country: Option<String>,

    pub timestamp: Option<DateTime<Utc>>,

    #[validate(length(max = 2048))]
    pub url: Option<String>,

    #[validate(length(max = 64))]
    pub event_type: Option<String>,
}

impl From<EventBody> for IncomingEvent {
    fn from(body: EventBody) -> Self {
        IncomingEvent {
            visitor_id: body.visitor_id,
            ip: body.ip,
            linked_id: body.linked_id,
            country: body.country,
            timestamp: body.timestamp,
            url: body.url,
            event_type: body.event_type,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct EventAccepted {
    pub accepted: bool,
}

#[derive(Debug, Default, Deserialize)]
pub struct VelocityQuery {
    /// Evaluation instant; defaults to now
    pub at: Option<DateTime<Utc>>,
}
