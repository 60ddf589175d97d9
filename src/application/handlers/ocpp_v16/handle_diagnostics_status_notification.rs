//! DiagnosticsStatusNotification handler

use std::sync::Arc;

use rust_ocpp::v1_6::messages::diagnostics_status_notification::{
    DiagnosticsStatusNotificationRequest, DiagnosticsStatusNotificationResponse,
};
use tracing::info;

use crate::application::handlers::{CallContext, HandlerError};
use crate::application::services::ChargePointService;

use super::wire_name;

pub async fn handle_diagnostics_status_notification(
    service: Arc<ChargePointService>,
    ctx: CallContext,
    req: DiagnosticsStatusNotificationRequest,
) -> Result<DiagnosticsStatusNotificationResponse, HandlerError> {
    let status = wire_name(&req.status).unwrap_or_else(|| format!("{:?}", req.status));
    info!(
        charge_point_id = ctx.charge_point_id(),
        status = status.as_str(),
        "DiagnosticsStatusNotification"
    );

    service.record_diagnostics_status(&ctx.identity, &status).await;

    Ok(DiagnosticsStatusNotificationResponse {})
}
