//! MeterValues handler

use std::sync::Arc;

use rust_ocpp::v1_6::messages::meter_values::{MeterValuesRequest, MeterValuesResponse};
use tracing::info;

use crate::application::handlers::{CallContext, HandlerError};
use crate::application::services::ChargePointService;

use super::readings;

pub async fn handle_meter_values(
    service: Arc<ChargePointService>,
    ctx: CallContext,
    req: MeterValuesRequest,
) -> Result<MeterValuesResponse, HandlerError> {
    let readings = readings(&req.meter_value);

    info!(
        charge_point_id = ctx.charge_point_id(),
        connector_id = req.connector_id,
        transaction_id = ?req.transaction_id,
        samples = readings.len(),
        "MeterValues"
    );

    service
        .record_meter_values(&ctx.identity, req.connector_id, req.transaction_id, readings)
        .await?;

    Ok(MeterValuesResponse {})
}
