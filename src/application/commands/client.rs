//! Typed outbound command client (OCPP 1.6 message set)

use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use rust_ocpp::v1_6::messages::cancel_reservation::{
    CancelReservationRequest, CancelReservationResponse,
};
use rust_ocpp::v1_6::messages::change_configuration::{
    ChangeConfigurationRequest, ChangeConfigurationResponse,
};
use rust_ocpp::v1_6::messages::get_configuration::{
    GetConfigurationRequest, GetConfigurationResponse,
};
use rust_ocpp::v1_6::messages::remote_start_transaction::{
    RemoteStartTransactionRequest, RemoteStartTransactionResponse,
};
use rust_ocpp::v1_6::messages::remote_stop_transaction::{
    RemoteStopTransactionRequest, RemoteStopTransactionResponse,
};
use rust_ocpp::v1_6::messages::reserve_now::{ReserveNowRequest, ReserveNowResponse};
use rust_ocpp::v1_6::messages::reset::{ResetRequest, ResetResponse};
use rust_ocpp::v1_6::messages::unlock_connector::{
    UnlockConnectorRequest, UnlockConnectorResponse,
};
use rust_ocpp::v1_6::types::ResetRequestStatus;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::info;

use crate::application::session::{ChargeBoxIdentity, SharedConnectionRegistry};
use crate::config::Config;

use super::CommandError;

/// Default response timeout for outbound Calls
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(30);

/// Binds an outbound request type to its action name and response type.
pub trait OutboundAction: Serialize + Send + Sync {
    const ACTION: &'static str;
    type Response: DeserializeOwned + Send;
}

macro_rules! outbound_action {
    ($($request:ty => $response:ty, $action:literal;)*) => {
        $(
            impl OutboundAction for $request {
                const ACTION: &'static str = $action;
                type Response = $response;
            }
        )*
    };
}

outbound_action! {
    RemoteStartTransactionRequest => RemoteStartTransactionResponse, "RemoteStartTransaction";
    RemoteStopTransactionRequest => RemoteStopTransactionResponse, "RemoteStopTransaction";
    ResetRequest => ResetResponse, "Reset";
    UnlockConnectorRequest => UnlockConnectorResponse, "UnlockConnector";
    ChangeConfigurationRequest => ChangeConfigurationResponse, "ChangeConfiguration";
    GetConfigurationRequest => GetConfigurationResponse, "GetConfiguration";
    ReserveNowRequest => ReserveNowResponse, "ReserveNow";
    CancelReservationRequest => CancelReservationResponse, "CancelReservation";
}

/// Reset kind for the Reset command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetKind {
    Soft,
    Hard,
}

impl From<ResetKind> for ResetRequestStatus {
    fn from(kind: ResetKind) -> Self {
        match kind {
            ResetKind::Soft => ResetRequestStatus::Soft,
            ResetKind::Hard => ResetRequestStatus::Hard,
        }
    }
}

/// Sends commands to connected stations and returns their typed responses.
#[derive(Clone)]
pub struct OutboundCommandClient {
    registry: SharedConnectionRegistry,
    timeout: Duration,
}

impl OutboundCommandClient {
    pub fn new(registry: SharedConnectionRegistry, timeout: Duration) -> Self {
        Self { registry, timeout }
    }

    /// Client using the configured outbound call timeout
    pub fn from_config(registry: SharedConnectionRegistry, config: &Config) -> Self {
        Self::new(registry, config.call_timeout)
    }

    /// Same client with a different response timeout
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        Self {
            registry: self.registry.clone(),
            timeout,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Send any outbound action and decode its response.
    pub async fn send<A: OutboundAction>(
        &self,
        target: &ChargeBoxIdentity,
        request: A,
    ) -> Result<A::Response, CommandError> {
        let handle = self
            .registry
            .lookup(target)
            .ok_or_else(|| CommandError::NotConnected(target.clone()))?;

        let payload = serde_json::to_value(&request)
            .map_err(|e| CommandError::Serialization(e.to_string()))?;

        let start = Instant::now();
        let result = self
            .registry
            .correlator()
            .send(&handle, A::ACTION, payload, self.timeout)
            .await;
        metrics::histogram!("ocpp_command_latency_seconds", "action" => A::ACTION)
            .record(start.elapsed().as_secs_f64());

        serde_json::from_value(result?).map_err(|e| {
            CommandError::InvalidResponse(format!("Failed to parse {} response: {}", A::ACTION, e))
        })
    }

    pub async fn remote_start_transaction(
        &self,
        target: &ChargeBoxIdentity,
        id_tag: &str,
        connector_id: Option<u32>,
    ) -> Result<RemoteStartTransactionResponse, CommandError> {
        info!(
            charge_point_id = target.charge_box_id.as_str(),
            id_tag,
            ?connector_id,
            "RemoteStartTransaction"
        );
        self.send(
            target,
            RemoteStartTransactionRequest {
                connector_id,
                id_tag: id_tag.to_string(),
                charging_profile: None,
            },
        )
        .await
    }

    pub async fn remote_stop_transaction(
        &self,
        target: &ChargeBoxIdentity,
        transaction_id: i32,
    ) -> Result<RemoteStopTransactionResponse, CommandError> {
        info!(
            charge_point_id = target.charge_box_id.as_str(),
            transaction_id,
            "RemoteStopTransaction"
        );
        self.send(target, RemoteStopTransactionRequest { transaction_id })
            .await
    }

    pub async fn reset(
        &self,
        target: &ChargeBoxIdentity,
        kind: ResetKind,
    ) -> Result<ResetResponse, CommandError> {
        info!(charge_point_id = target.charge_box_id.as_str(), ?kind, "Reset");
        self.send(target, ResetRequest { kind: kind.into() }).await
    }

    pub async fn unlock_connector(
        &self,
        target: &ChargeBoxIdentity,
        connector_id: u32,
    ) -> Result<UnlockConnectorResponse, CommandError> {
        info!(
            charge_point_id = target.charge_box_id.as_str(),
            connector_id,
            "UnlockConnector"
        );
        self.send(target, UnlockConnectorRequest { connector_id })
            .await
    }

    pub async fn change_configuration(
        &self,
        target: &ChargeBoxIdentity,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Result<ChangeConfigurationResponse, CommandError> {
        let request = ChangeConfigurationRequest {
            key: key.into(),
            value: value.into(),
        };
        info!(
            charge_point_id = target.charge_box_id.as_str(),
            key = request.key.as_str(),
            "ChangeConfiguration"
        );
        self.send(target, request).await
    }

    pub async fn get_configuration(
        &self,
        target: &ChargeBoxIdentity,
        keys: Option<Vec<String>>,
    ) -> Result<GetConfigurationResponse, CommandError> {
        info!(charge_point_id = target.charge_box_id.as_str(), ?keys, "GetConfiguration");
        self.send(target, GetConfigurationRequest { key: keys }).await
    }

    pub async fn reserve_now(
        &self,
        target: &ChargeBoxIdentity,
        reservation_id: i32,
        connector_id: u32,
        id_tag: &str,
        parent_id_tag: Option<&str>,
        expiry_date: DateTime<Utc>,
    ) -> Result<ReserveNowResponse, CommandError> {
        info!(
            charge_point_id = target.charge_box_id.as_str(),
            reservation_id,
            connector_id,
            id_tag,
            %expiry_date,
            "ReserveNow"
        );
        self.send(
            target,
            ReserveNowRequest {
                connector_id,
                expiry_date,
                id_tag: id_tag.to_string(),
                parent_id_tag: parent_id_tag.map(str::to_string),
                reservation_id,
            },
        )
        .await
    }

    pub async fn cancel_reservation(
        &self,
        target: &ChargeBoxIdentity,
        reservation_id: i32,
    ) -> Result<CancelReservationResponse, CommandError> {
        info!(charge_point_id = target.charge_box_id.as_str(), reservation_id, "CancelReservation");
        self.send(target, CancelReservationRequest { reservation_id })
            .await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::{json, Value};
    use tokio::sync::mpsc;

    use super::*;
    use crate::application::commands::RequestCorrelator;
    use crate::application::session::{ConnectionHandle, ConnectionRegistry, Outbound};
    use crate::domain::OcppVersion;
    use crate::shared::ocpp_frame::OcppFrame;

    fn setup() -> (
        OutboundCommandClient,
        ConnectionHandle,
        mpsc::UnboundedReceiver<Outbound>,
    ) {
        let registry = Arc::new(ConnectionRegistry::new(Arc::new(RequestCorrelator::new())));
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = registry.register(
            ChargeBoxIdentity::new("t1", "CP001"),
            OcppVersion::V16,
            None,
            tx,
        );
        (
            OutboundCommandClient::new(registry, DEFAULT_CALL_TIMEOUT),
            handle,
            rx,
        )
    }

    /// Simulated station: answers the next Call with `reply` and reports
    /// what it received.
    fn answer_next(
        client: &OutboundCommandClient,
        handle: ConnectionHandle,
        mut rx: mpsc::UnboundedReceiver<Outbound>,
        reply: Value,
    ) -> tokio::task::JoinHandle<(String, Value)> {
        let correlator = client.registry.correlator().clone();
        tokio::spawn(async move {
            let Some(Outbound::Frame(text)) = rx.recv().await else {
                panic!("no frame sent");
            };
            let OcppFrame::Call {
                unique_id,
                action,
                payload,
            } = OcppFrame::decode(&text).unwrap()
            else {
                panic!("expected a Call");
            };
            correlator.resolve(
                &handle,
                OcppFrame::CallResult {
                    unique_id,
                    payload: reply,
                },
            );
            (action, payload)
        })
    }

    fn cp001() -> ChargeBoxIdentity {
        ChargeBoxIdentity::new("t1", "CP001")
    }

    #[tokio::test]
    async fn reset_sends_typed_request() {
        let (client, handle, rx) = setup();
        let station = answer_next(&client, handle, rx, json!({"status": "Accepted"}));

        let response = client.reset(&cp001(), ResetKind::Hard).await.unwrap();
        assert_eq!(
            serde_json::to_value(&response).unwrap(),
            json!({"status": "Accepted"})
        );

        let (action, payload) = station.await.unwrap();
        assert_eq!(action, "Reset");
        assert_eq!(payload, json!({"type": "Hard"}));
    }

    #[tokio::test]
    async fn get_configuration_decodes_keys() {
        let (client, handle, rx) = setup();
        let station = answer_next(
            &client,
            handle,
            rx,
            json!({
                "configurationKey": [
                    {"key": "HeartbeatInterval", "readonly": false, "value": "300"}
                ],
                "unknownKey": ["Foo"]
            }),
        );

        let response = client
            .get_configuration(&cp001(), Some(vec!["HeartbeatInterval".into(), "Foo".into()]))
            .await
            .unwrap();
        let keys = response.configuration_key.unwrap();
        assert_eq!(keys[0].key, "HeartbeatInterval");
        assert_eq!(keys[0].value.as_deref(), Some("300"));
        assert_eq!(response.unknown_key, Some(vec!["Foo".to_string()]));

        let (action, _) = station.await.unwrap();
        assert_eq!(action, "GetConfiguration");
    }

    #[tokio::test]
    async fn remote_stop_carries_transaction_id() {
        let (client, handle, rx) = setup();
        let station = answer_next(&client, handle, rx, json!({"status": "Rejected"}));

        client.remote_stop_transaction(&cp001(), 42).await.unwrap();
        let (action, payload) = station.await.unwrap();
        assert_eq!(action, "RemoteStopTransaction");
        assert_eq!(payload, json!({"transactionId": 42}));
    }

    #[tokio::test]
    async fn malformed_response_is_invalid() {
        let (client, handle, rx) = setup();
        let _station = answer_next(&client, handle, rx, json!({"status": "Maybe"}));

        let result = client.unlock_connector(&cp001(), 1).await;
        assert!(matches!(result, Err(CommandError::InvalidResponse(_))));
    }

    #[tokio::test]
    async fn unknown_station_is_not_connected() {
        let (client, _handle, _rx) = setup();
        let target = ChargeBoxIdentity::new("t1", "CP404");
        let result = client.cancel_reservation(&target, 7).await;
        assert!(matches!(result, Err(CommandError::NotConnected(id)) if id == target));
    }

    #[tokio::test]
    async fn with_timeout_bounds_the_wait() {
        let (client, _handle, _rx) = setup();
        let short = client.with_timeout(Duration::from_millis(30));
        assert_eq!(client.timeout(), DEFAULT_CALL_TIMEOUT);

        let result = short
            .change_configuration(&cp001(), "MeterValueSampleInterval", "60")
            .await;
        assert!(matches!(result, Err(CommandError::Timeout { .. })));
    }

    #[test]
    fn timeout_follows_configuration() {
        let app = crate::config::AppConfig::from_toml("[ocpp]\ncall_timeout_secs = 12\n").unwrap();
        let registry = Arc::new(ConnectionRegistry::new(Arc::new(RequestCorrelator::new())));

        let client = OutboundCommandClient::from_config(registry, &Config::from(&app));
        assert_eq!(client.timeout(), Duration::from_secs(12));
    }
}
