//! FirmwareStatusNotification handler

use std::sync::Arc;

use rust_ocpp::v1_6::messages::firmware_status_notification::{
    FirmwareStatusNotificationRequest, FirmwareStatusNotificationResponse,
};
use tracing::info;

use crate::application::handlers::{CallContext, HandlerError};
use crate::application::services::ChargePointService;

use super::wire_name;

pub async fn handle_firmware_status_notification(
    service: Arc<ChargePointService>,
    ctx: CallContext,
    req: FirmwareStatusNotificationRequest,
) -> Result<FirmwareStatusNotificationResponse, HandlerError> {
    let status = wire_name(&req.status).unwrap_or_else(|| format!("{:?}", req.status));
    info!(
        charge_point_id = ctx.charge_point_id(),
        status = status.as_str(),
        "FirmwareStatusNotification"
    );

    service.record_firmware_status(&ctx.identity, &status).await;

    Ok(FirmwareStatusNotificationResponse {})
}
