//! Authorize handler

use std::sync::Arc;

use rust_ocpp::v1_6::messages::authorize::{AuthorizeRequest, AuthorizeResponse};
use tracing::info;

use crate::application::handlers::{CallContext, HandlerError};
use crate::application::services::ChargePointService;

use super::id_tag_info;

pub async fn handle_authorize(
    service: Arc<ChargePointService>,
    ctx: CallContext,
    req: AuthorizeRequest,
) -> Result<AuthorizeResponse, HandlerError> {
    let status = service.authorize(&ctx.identity, &req.id_tag).await;

    info!(
        charge_point_id = ctx.charge_point_id(),
        id_tag = req.id_tag.as_str(),
        ?status,
        "Authorize"
    );

    Ok(AuthorizeResponse {
        id_tag_info: id_tag_info(status),
    })
}
