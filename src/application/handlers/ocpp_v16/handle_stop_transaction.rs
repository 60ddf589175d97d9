//! StopTransaction handler

use std::sync::Arc;

use rust_ocpp::v1_6::messages::stop_transaction::{
    StopTransactionRequest, StopTransactionResponse,
};
use tracing::info;

use crate::application::handlers::{CallContext, HandlerError};
use crate::application::services::{ChargePointService, StopTransactionInput};

use super::{id_tag_info, readings, wire_name};

pub async fn handle_stop_transaction(
    service: Arc<ChargePointService>,
    ctx: CallContext,
    req: StopTransactionRequest,
) -> Result<StopTransactionResponse, HandlerError> {
    info!(
        charge_point_id = ctx.charge_point_id(),
        transaction_id = req.transaction_id,
        meter_stop = req.meter_stop,
        reason = ?req.reason,
        "StopTransaction"
    );

    let status = service
        .stop_transaction(
            &ctx.identity,
            StopTransactionInput {
                transaction_id: req.transaction_id,
                meter_stop: req.meter_stop,
                timestamp: req.timestamp,
                reason: req.reason.as_ref().and_then(wire_name),
                id_tag: req.id_tag,
                readings: req
                    .transaction_data
                    .as_deref()
                    .map(readings)
                    .unwrap_or_default(),
            },
        )
        .await?;

    Ok(StopTransactionResponse {
        id_tag_info: Some(id_tag_info(status)),
    })
}
