//! Action dispatcher
//!
//! Routes inbound Calls to their OCPP 1.6 handlers through a table built once
//! at startup. Every Call gets exactly one reply frame carrying its uniqueId:
//! the handler's typed response, or a CallError when the action is unknown,
//! the payload does not match the action's schema, or the handler fails.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use futures_util::future::BoxFuture;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{debug, error, warn};

use crate::application::services::ChargePointService;
use crate::application::session::ConnectionHandle;
use crate::domain::OcppVersion;
use crate::shared::ocpp_frame::OcppFrame;

use super::ocpp_v16;
use super::{CallContext, HandlerError};

type RouteFuture = BoxFuture<'static, Result<Value, HandlerError>>;

type Route = Box<dyn Fn(Arc<ChargePointService>, CallContext, Value) -> RouteFuture + Send + Sync>;

/// Static `action → handler` table
pub struct ActionDispatcher {
    service: Arc<ChargePointService>,
    routes: HashMap<&'static str, Route>,
}

impl ActionDispatcher {
    pub fn new(service: Arc<ChargePointService>) -> Self {
        let mut dispatcher = Self {
            service,
            routes: HashMap::new(),
        };
        dispatcher.route("Authorize", ocpp_v16::handle_authorize);
        dispatcher.route("BootNotification", ocpp_v16::handle_boot_notification);
        dispatcher.route("DataTransfer", ocpp_v16::handle_data_transfer);
        dispatcher.route(
            "DiagnosticsStatusNotification",
            ocpp_v16::handle_diagnostics_status_notification,
        );
        dispatcher.route(
            "FirmwareStatusNotification",
            ocpp_v16::handle_firmware_status_notification,
        );
        dispatcher.route("Heartbeat", ocpp_v16::handle_heartbeat);
        dispatcher.route("MeterValues", ocpp_v16::handle_meter_values);
        dispatcher.route("StartTransaction", ocpp_v16::handle_start_transaction);
        dispatcher.route("StatusNotification", ocpp_v16::handle_status_notification);
        dispatcher.route("StopTransaction", ocpp_v16::handle_stop_transaction);
        dispatcher
    }

    /// Bind `action` to a typed handler. The payload is deserialized into
    /// `Req`; a mismatch is a FormationViolation.
    fn route<Req, Resp, F, Fut>(&mut self, action: &'static str, handler: F)
    where
        Req: DeserializeOwned + Send + 'static,
        Resp: Serialize + Send + 'static,
        F: Fn(Arc<ChargePointService>, CallContext, Req) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Resp, HandlerError>> + Send + 'static,
    {
        let route: Route = Box::new(
            move |service: Arc<ChargePointService>,
                  ctx: CallContext,
                  payload: Value|
                  -> BoxFuture<'static, Result<Value, HandlerError>> {
                let pending = serde_json::from_value::<Req>(payload)
                    .map(|request| handler(service, ctx, request))
                    .map_err(|e| {
                        HandlerError::FormationViolation(format!(
                            "Invalid {} payload: {}",
                            action, e
                        ))
                    });
                Box::pin(async move {
                    let response = pending?.await?;
                    serde_json::to_value(response).map_err(|e| {
                        HandlerError::Internal(format!("Failed to serialize response: {}", e))
                    })
                })
            },
        );
        self.routes.insert(action, route);
    }

    /// Names of all routed actions
    pub fn actions(&self) -> Vec<&'static str> {
        let mut actions: Vec<&'static str> = self.routes.keys().copied().collect();
        actions.sort_unstable();
        actions
    }

    /// Run the handler for one Call and build its reply frame.
    pub async fn dispatch(
        &self,
        ctx: &CallContext,
        unique_id: String,
        action: &str,
        mut payload: Value,
    ) -> OcppFrame {
        let charge_point_id = ctx.charge_point_id();
        let (label, result) = match self.routes.get_key_value(action) {
            Some((&name, route)) => {
                if ctx.version == OcppVersion::V15 {
                    upgrade_v15_payload(action, &mut payload);
                }
                (name, route(self.service.clone(), ctx.clone(), payload).await)
            }
            None => {
                warn!(charge_point_id, action, "Unknown or unsupported action");
                ("unknown", Err(HandlerError::NotImplemented(action.to_string())))
            }
        };

        let outcome = match &result {
            Ok(_) => "ok",
            Err(e) => e.error_code().as_str(),
        };
        metrics::counter!(
            "ocpp_inbound_calls_total",
            "action" => label,
            "outcome" => outcome
        )
        .increment(1);

        match result {
            Ok(payload) => OcppFrame::CallResult { unique_id, payload },
            Err(e) => {
                match &e {
                    HandlerError::Internal(_) => {
                        error!(charge_point_id, action, error = %e, "Handler failed")
                    }
                    _ => warn!(charge_point_id, action, error = %e, "Rejecting call"),
                }
                OcppFrame::error_response(unique_id, e.error_code(), e.to_string(), json!({}))
            }
        }
    }

    /// Dispatch a Call and write the reply to its connection.
    pub async fn dispatch_and_reply(
        &self,
        handle: &ConnectionHandle,
        unique_id: String,
        action: &str,
        payload: Value,
    ) {
        let ctx = CallContext::from(handle);
        let reply = self.dispatch(&ctx, unique_id, action, payload).await;
        if handle.transmit(reply.encode()).is_err() {
            debug!(
                charge_point_id = ctx.charge_point_id(),
                action,
                "Connection closed before reply could be sent"
            );
        }
    }
}

/// Rewrite OCPP 1.5 values that have no 1.6 equivalent.
fn upgrade_v15_payload(action: &str, payload: &mut Value) {
    if action != "StatusNotification" {
        return;
    }
    if let Some(status) = payload.get_mut("status") {
        if *status == "Occupied" {
            *status = Value::from("Charging");
        }
    }
    if let Some(code) = payload.get_mut("errorCode") {
        if *code == "Mode3Error" {
            *code = Value::from("EVCommunicationError");
        }
    }
}

// ── Tests ──────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;
    use crate::application::services::LifecycleSettings;
    use crate::application::session::ChargeBoxIdentity;
    use crate::domain::{
        ChargingStation, ConnectorStatus, DataTransferRecord, DomainError, DomainResult,
        MeterValuesRecord, Storage, Transaction,
    };
    use crate::infrastructure::authorization::StaticAuthorization;
    use crate::infrastructure::pricing::NoPricing;
    use crate::infrastructure::storage::InMemoryStorage;

    fn dispatcher() -> (ActionDispatcher, Arc<InMemoryStorage>) {
        let storage = Arc::new(InMemoryStorage::new());
        let service = ChargePointService::new(
            storage.clone(),
            Arc::new(StaticAuthorization::new(
                HashSet::from(["GOOD".to_string()]),
                HashSet::new(),
            )),
            Arc::new(NoPricing),
            LifecycleSettings::default(),
        );
        (ActionDispatcher::new(Arc::new(service)), storage)
    }

    fn ctx(version: OcppVersion) -> CallContext {
        CallContext {
            identity: ChargeBoxIdentity::new("t1", "CB1"),
            version,
            remote_addr: None,
        }
    }

    fn error_code(frame: &OcppFrame) -> &str {
        match frame {
            OcppFrame::CallError { error_code, .. } => error_code,
            other => panic!("expected CallError, got {other:?}"),
        }
    }

    async fn boot(d: &ActionDispatcher, ctx: &CallContext) {
        let reply = d
            .dispatch(
                ctx,
                "b1".into(),
                "BootNotification",
                json!({"chargePointVendor": "ACME", "chargePointModel": "X1"}),
            )
            .await;
        assert!(reply.is_call_result());
    }

    #[test]
    fn table_covers_inbound_actions() {
        let (d, _) = dispatcher();
        assert_eq!(
            d.actions(),
            vec![
                "Authorize",
                "BootNotification",
                "DataTransfer",
                "DiagnosticsStatusNotification",
                "FirmwareStatusNotification",
                "Heartbeat",
                "MeterValues",
                "StartTransaction",
                "StatusNotification",
                "StopTransaction",
            ]
        );
    }

    #[tokio::test]
    async fn unknown_action_is_not_implemented() {
        let (d, _) = dispatcher();
        let reply = d
            .dispatch(&ctx(OcppVersion::V16), "42".into(), "FooBar", json!({}))
            .await;
        assert_eq!(reply.unique_id(), "42");
        assert_eq!(error_code(&reply), "NotImplemented");
    }

    #[tokio::test]
    async fn malformed_payload_is_formation_violation() {
        let (d, _) = dispatcher();
        let reply = d
            .dispatch(
                &ctx(OcppVersion::V16),
                "7".into(),
                "StartTransaction",
                json!({"connectorId": "one"}),
            )
            .await;
        assert_eq!(reply.unique_id(), "7");
        assert_eq!(error_code(&reply), "FormationViolation");
    }

    #[tokio::test]
    async fn boot_notification_is_accepted() {
        let (d, _) = dispatcher();
        let reply = d
            .dispatch(
                &ctx(OcppVersion::V16),
                "1".into(),
                "BootNotification",
                json!({"chargePointVendor": "ACME", "chargePointModel": "X1"}),
            )
            .await;
        let OcppFrame::CallResult { unique_id, payload } = reply else {
            panic!("expected CallResult");
        };
        assert_eq!(unique_id, "1");
        assert_eq!(payload["status"], "Accepted");
        assert_eq!(payload["interval"], 300);
        assert!(payload["currentTime"].is_string());
    }

    #[tokio::test]
    async fn stop_below_meter_start_is_formation_violation() {
        let (d, _) = dispatcher();
        let ctx = ctx(OcppVersion::V16);
        boot(&d, &ctx).await;
        d.dispatch(
            &ctx,
            "s1".into(),
            "StatusNotification",
            json!({"connectorId": 1, "errorCode": "NoError", "status": "Available"}),
        )
        .await;
        let reply = d
            .dispatch(
                &ctx,
                "t1".into(),
                "StartTransaction",
                json!({
                    "connectorId": 1,
                    "idTag": "GOOD",
                    "meterStart": 1000,
                    "timestamp": "2030-01-01T10:00:00Z"
                }),
            )
            .await;
        let OcppFrame::CallResult { payload, .. } = reply else {
            panic!("expected CallResult");
        };
        let tx_id = payload["transactionId"].as_i64().unwrap();
        assert!(tx_id > 0);
        assert_eq!(payload["idTagInfo"]["status"], "Accepted");

        let reply = d
            .dispatch(
                &ctx,
                "t2".into(),
                "StopTransaction",
                json!({
                    "transactionId": tx_id,
                    "meterStop": 900,
                    "timestamp": "2030-01-01T11:00:00Z"
                }),
            )
            .await;
        assert_eq!(error_code(&reply), "FormationViolation");
    }

    #[tokio::test]
    async fn v15_occupied_maps_to_charging() {
        let (d, storage) = dispatcher();
        let ctx = ctx(OcppVersion::V15);
        boot(&d, &ctx).await;
        let reply = d
            .dispatch(
                &ctx,
                "s1".into(),
                "StatusNotification",
                json!({"connectorId": 1, "errorCode": "Mode3Error", "status": "Occupied"}),
            )
            .await;
        assert!(reply.is_call_result());

        let station = storage
            .get_charging_station("t1", "CB1")
            .await
            .unwrap()
            .unwrap();
        let connector = station.connector(1).unwrap();
        assert_eq!(connector.status, ConnectorStatus::Charging);
        assert_eq!(connector.error_code.as_deref(), Some("EVCommunicationError"));
    }

    #[tokio::test]
    async fn v16_occupied_is_rejected() {
        let (d, _) = dispatcher();
        let reply = d
            .dispatch(
                &ctx(OcppVersion::V16),
                "s1".into(),
                "StatusNotification",
                json!({"connectorId": 1, "errorCode": "NoError", "status": "Occupied"}),
            )
            .await;
        assert_eq!(error_code(&reply), "FormationViolation");
    }

    #[tokio::test]
    async fn best_effort_acks_always_succeed() {
        let (d, _) = dispatcher();
        let ctx = ctx(OcppVersion::V16);

        let reply = d
            .dispatch(&ctx, "d1".into(), "DataTransfer", json!({"vendorId": "ACME", "data": "x"}))
            .await;
        let OcppFrame::CallResult { payload, .. } = reply else {
            panic!("expected CallResult");
        };
        assert_eq!(payload, json!({"status": "Accepted"}));

        for (action, status) in [
            ("DiagnosticsStatusNotification", "Uploaded"),
            ("FirmwareStatusNotification", "Installed"),
        ] {
            let reply = d
                .dispatch(&ctx, "n1".into(), action, json!({"status": status}))
                .await;
            assert_eq!(
                reply,
                OcppFrame::CallResult {
                    unique_id: "n1".into(),
                    payload: json!({})
                }
            );
        }
    }

    /// Storage whose best-effort writes always fail
    struct FailingNotificationStorage(InMemoryStorage);

    #[async_trait::async_trait]
    impl Storage for FailingNotificationStorage {
        async fn get_charging_station(
            &self,
            tenant_id: &str,
            charge_box_id: &str,
        ) -> DomainResult<Option<ChargingStation>> {
            self.0.get_charging_station(tenant_id, charge_box_id).await
        }
        async fn save_charging_station(&self, station: ChargingStation) -> DomainResult<()> {
            self.0.save_charging_station(station).await
        }
        async fn next_transaction_id(&self, tenant_id: &str) -> DomainResult<i32> {
            self.0.next_transaction_id(tenant_id).await
        }
        async fn get_transaction(
            &self,
            tenant_id: &str,
            id: i32,
        ) -> DomainResult<Option<Transaction>> {
            self.0.get_transaction(tenant_id, id).await
        }
        async fn save_transaction(&self, transaction: Transaction) -> DomainResult<()> {
            self.0.save_transaction(transaction).await
        }
        async fn append_meter_values(&self, record: MeterValuesRecord) -> DomainResult<()> {
            self.0.append_meter_values(record).await
        }
        async fn save_data_transfer(
            &self,
            _tenant_id: &str,
            _charge_box_id: &str,
            _record: DataTransferRecord,
        ) -> DomainResult<()> {
            Err(DomainError::Storage("disk full".into()))
        }
        async fn save_diagnostics_status(
            &self,
            _tenant_id: &str,
            _charge_box_id: &str,
            _status: &str,
        ) -> DomainResult<()> {
            Err(DomainError::Storage("disk full".into()))
        }
        async fn save_firmware_status(
            &self,
            _tenant_id: &str,
            _charge_box_id: &str,
            _status: &str,
        ) -> DomainResult<()> {
            Err(DomainError::Storage("disk full".into()))
        }
    }

    #[tokio::test]
    async fn best_effort_acks_survive_storage_failure() {
        let service = ChargePointService::new(
            Arc::new(FailingNotificationStorage(InMemoryStorage::new())),
            Arc::new(StaticAuthorization::new(HashSet::new(), HashSet::new())),
            Arc::new(NoPricing),
            LifecycleSettings::default(),
        );
        let d = ActionDispatcher::new(Arc::new(service));
        let ctx = ctx(OcppVersion::V16);

        let reply = d
            .dispatch(&ctx, "d1".into(), "DataTransfer", json!({"vendorId": "ACME"}))
            .await;
        assert_eq!(
            reply,
            OcppFrame::CallResult {
                unique_id: "d1".into(),
                payload: json!({"status": "Accepted"})
            }
        );

        for (action, status) in [
            ("DiagnosticsStatusNotification", "UploadFailed"),
            ("FirmwareStatusNotification", "DownloadFailed"),
        ] {
            let reply = d
                .dispatch(&ctx, "n1".into(), action, json!({"status": status}))
                .await;
            assert_eq!(
                reply,
                OcppFrame::CallResult {
                    unique_id: "n1".into(),
                    payload: json!({})
                }
            );
        }
    }
}
