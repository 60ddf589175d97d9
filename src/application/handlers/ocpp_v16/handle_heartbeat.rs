//! Heartbeat handler

use std::sync::Arc;

use chrono::Utc;
use rust_ocpp::v1_6::messages::heart_beat::{HeartbeatRequest, HeartbeatResponse};
use tracing::{debug, error};

use crate::application::handlers::{CallContext, HandlerError};
use crate::application::services::ChargePointService;

pub async fn handle_heartbeat(
    service: Arc<ChargePointService>,
    ctx: CallContext,
    _req: HeartbeatRequest,
) -> Result<HeartbeatResponse, HandlerError> {
    debug!(charge_point_id = ctx.charge_point_id(), "Heartbeat");

    let current_time = match service.heartbeat(&ctx.identity).await {
        Ok(now) => now,
        Err(e) => {
            error!(
                charge_point_id = ctx.charge_point_id(),
                error = %e,
                "Failed to record heartbeat"
            );
            Utc::now()
        }
    };

    Ok(HeartbeatResponse { current_time })
}
