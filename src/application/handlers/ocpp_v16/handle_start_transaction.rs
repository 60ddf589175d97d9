//! StartTransaction handler

use std::sync::Arc;

use rust_ocpp::v1_6::messages::start_transaction::{
    StartTransactionRequest, StartTransactionResponse,
};
use tracing::info;

use crate::application::handlers::{CallContext, HandlerError};
use crate::application::services::{ChargePointService, StartTransactionInput};

use super::id_tag_info;

pub async fn handle_start_transaction(
    service: Arc<ChargePointService>,
    ctx: CallContext,
    req: StartTransactionRequest,
) -> Result<StartTransactionResponse, HandlerError> {
    info!(
        charge_point_id = ctx.charge_point_id(),
        connector_id = req.connector_id,
        id_tag = req.id_tag.as_str(),
        meter_start = req.meter_start,
        "StartTransaction"
    );

    let outcome = service
        .start_transaction(
            &ctx.identity,
            StartTransactionInput {
                connector_id: req.connector_id,
                id_tag: req.id_tag,
                meter_start: req.meter_start,
                timestamp: req.timestamp,
                reservation_id: req.reservation_id,
            },
        )
        .await?;

    Ok(StartTransactionResponse {
        transaction_id: outcome.transaction_id,
        id_tag_info: id_tag_info(outcome.status),
    })
}
