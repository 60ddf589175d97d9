//! StatusNotification handler

use std::sync::Arc;

use chrono::Utc;
use rust_ocpp::v1_6::messages::status_notification::{
    StatusNotificationRequest, StatusNotificationResponse,
};
use rust_ocpp::v1_6::types::ChargePointStatus;
use tracing::info;

use crate::application::handlers::{CallContext, HandlerError};
use crate::application::services::ChargePointService;
use crate::domain::{ConnectorStatus, StatusReport};

use super::wire_name;

pub async fn handle_status_notification(
    service: Arc<ChargePointService>,
    ctx: CallContext,
    req: StatusNotificationRequest,
) -> Result<StatusNotificationResponse, HandlerError> {
    info!(
        charge_point_id = ctx.charge_point_id(),
        connector_id = req.connector_id,
        status = ?req.status,
        error_code = ?req.error_code,
        "StatusNotification"
    );

    let status = match req.status {
        ChargePointStatus::Available => ConnectorStatus::Available,
        ChargePointStatus::Preparing => ConnectorStatus::Preparing,
        ChargePointStatus::Charging => ConnectorStatus::Charging,
        ChargePointStatus::SuspendedEV => ConnectorStatus::SuspendedEV,
        ChargePointStatus::SuspendedEVSE => ConnectorStatus::SuspendedEVSE,
        ChargePointStatus::Finishing => ConnectorStatus::Finishing,
        ChargePointStatus::Reserved => ConnectorStatus::Reserved,
        ChargePointStatus::Unavailable => ConnectorStatus::Unavailable,
        ChargePointStatus::Faulted => ConnectorStatus::Faulted,
    };

    let report = StatusReport {
        status,
        error_code: wire_name(&req.error_code).unwrap_or_else(|| "NoError".to_string()),
        info: req.info,
        vendor_id: req.vendor_id,
        vendor_error_code: req.vendor_error_code,
        timestamp: req.timestamp.unwrap_or_else(Utc::now),
    };

    service
        .update_status(&ctx.identity, req.connector_id, report)
        .await?;

    Ok(StatusNotificationResponse {})
}
