//! OCPP 1.6 action handlers
//!
//! Each handler receives the deserialized `rust_ocpp::v1_6` request, calls
//! the [`ChargePointService`](crate::application::services::ChargePointService)
//! and builds the typed response. OCPP 1.5 connections use the same handlers
//! after their payloads are upgraded by the dispatcher.

use rust_ocpp::v1_6::types::{AuthorizationStatus, IdTagInfo, MeterValue};
use serde::Serialize;

use crate::domain::{IdTagStatus, MeterReading};

mod handle_authorize;
mod handle_boot_notification;
mod handle_data_transfer;
mod handle_diagnostics_status_notification;
mod handle_firmware_status_notification;
mod handle_heartbeat;
mod handle_meter_values;
mod handle_start_transaction;
mod handle_status_notification;
mod handle_stop_transaction;

pub use handle_authorize::handle_authorize;
pub use handle_boot_notification::handle_boot_notification;
pub use handle_data_transfer::handle_data_transfer;
pub use handle_diagnostics_status_notification::handle_diagnostics_status_notification;
pub use handle_firmware_status_notification::handle_firmware_status_notification;
pub use handle_heartbeat::handle_heartbeat;
pub use handle_meter_values::handle_meter_values;
pub use handle_start_transaction::handle_start_transaction;
pub use handle_status_notification::handle_status_notification;
pub use handle_stop_transaction::handle_stop_transaction;

fn id_tag_info(status: IdTagStatus) -> IdTagInfo {
    let status = match status {
        IdTagStatus::Accepted => AuthorizationStatus::Accepted,
        IdTagStatus::Blocked => AuthorizationStatus::Blocked,
        IdTagStatus::Expired => AuthorizationStatus::Expired,
        IdTagStatus::Invalid => AuthorizationStatus::Invalid,
        IdTagStatus::ConcurrentTx => AuthorizationStatus::ConcurrentTx,
    };
    IdTagInfo {
        status,
        expiry_date: None,
        parent_id_tag: None,
    }
}

/// Wire spelling of a protocol enum (e.g. `Energy.Active.Import.Register`).
fn wire_name<T: Serialize>(value: &T) -> Option<String> {
    match serde_json::to_value(value).ok()? {
        serde_json::Value::String(s) => Some(s),
        _ => None,
    }
}

/// Flatten sampled values into domain readings.
fn readings(meter_values: &[MeterValue]) -> Vec<MeterReading> {
    meter_values
        .iter()
        .flat_map(|mv| {
            mv.sampled_value.iter().map(move |sample| MeterReading {
                timestamp: mv.timestamp,
                value: sample.value.clone(),
                measurand: sample.measurand.as_ref().and_then(wire_name),
                unit: sample.unit.as_ref().and_then(wire_name),
                context: sample.context.as_ref().and_then(wire_name),
                phase: sample.phase.as_ref().and_then(wire_name),
                location: sample.location.as_ref().and_then(wire_name),
            })
        })
        .collect()
}
