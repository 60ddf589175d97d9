//! BootNotification handler

use std::sync::Arc;

use chrono::Utc;
use rust_ocpp::v1_6::messages::boot_notification::{
    BootNotificationRequest, BootNotificationResponse,
};
use rust_ocpp::v1_6::types::RegistrationStatus;
use tracing::{error, info};

use crate::application::handlers::{CallContext, HandlerError};
use crate::application::services::ChargePointService;
use crate::domain::StationInfo;

pub async fn handle_boot_notification(
    service: Arc<ChargePointService>,
    ctx: CallContext,
    req: BootNotificationRequest,
) -> Result<BootNotificationResponse, HandlerError> {
    info!(
        charge_point_id = ctx.charge_point_id(),
        vendor = req.charge_point_vendor.as_str(),
        model = req.charge_point_model.as_str(),
        firmware = ?req.firmware_version,
        "BootNotification"
    );

    let info = StationInfo {
        vendor: req.charge_point_vendor,
        model: req.charge_point_model,
        charge_point_serial_number: req.charge_point_serial_number,
        charge_box_serial_number: req.charge_box_serial_number,
        firmware_version: req.firmware_version,
        iccid: req.iccid,
        imsi: req.imsi,
        meter_type: req.meter_type,
        meter_serial_number: req.meter_serial_number,
    };

    let response = match service
        .boot(&ctx.identity, ctx.version, ctx.remote_addr, info)
        .await
    {
        Ok(outcome) => BootNotificationResponse {
            current_time: outcome.current_time,
            interval: outcome.interval as u32,
            status: if outcome.accepted {
                RegistrationStatus::Accepted
            } else {
                RegistrationStatus::Rejected
            },
        },
        // The station retries after `interval` when told Pending.
        Err(e) => {
            error!(
                charge_point_id = ctx.charge_point_id(),
                error = %e,
                "Failed to register charging station"
            );
            BootNotificationResponse {
                current_time: Utc::now(),
                interval: service.settings().heartbeat_interval as u32,
                status: RegistrationStatus::Pending,
            }
        }
    };
    Ok(response)
}
