//! DataTransfer handler

use std::sync::Arc;

use rust_ocpp::v1_6::messages::data_transfer::{DataTransferRequest, DataTransferResponse};
use rust_ocpp::v1_6::types::DataTransferStatus;
use tracing::info;

use crate::application::handlers::{CallContext, HandlerError};
use crate::application::services::ChargePointService;
use crate::domain::DataTransferRecord;

pub async fn handle_data_transfer(
    service: Arc<ChargePointService>,
    ctx: CallContext,
    req: DataTransferRequest,
) -> Result<DataTransferResponse, HandlerError> {
    info!(
        charge_point_id = ctx.charge_point_id(),
        vendor_id = req.vendor_string.as_str(),
        message_id = ?req.message_id,
        "DataTransfer"
    );

    service
        .record_data_transfer(
            &ctx.identity,
            DataTransferRecord {
                vendor_id: req.vendor_string,
                message_id: req.message_id,
                data: req.data,
            },
        )
        .await;

    Ok(DataTransferResponse {
        status: DataTransferStatus::Accepted,
        data: None,
    })
}
