//! Websocket client session against a Zigbee runtime server.
//!
//! A [`WsSession`] owns the socket in a background task. Commands are
//! correlated with their acknowledgements by `message_id`; unsolicited
//! events are fanned out on a broadcast channel.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

use zrt::command::{ClientRequest, CommandRequest, CommandResponse, EntityRef};
use zrt::config::RuntimeServer;
use zrt::event::{RuntimeEvent, ServerMessage};
use zrt::model::{DeviceModel, Eui64, GroupModel};

use crate::error::{ApiError, ApiResult};

const EVENT_BUFFER_SIZE: usize = 128;
const REQUEST_BUFFER_SIZE: usize = 32;

/// Transport abstraction for one runtime connection.
///
/// The production implementation is [`WsSession`]; tests substitute a
/// scripted double.
#[async_trait]
pub trait Session: Send + Sync {
    /// Send one command and wait for its acknowledgement.
    async fn request(&self, command: CommandRequest) -> ApiResult<CommandResponse>;

    /// Subscribe to unsolicited runtime events.
    fn events(&self) -> broadcast::Receiver<RuntimeEvent>;

    /// Tear down the connection. Pending requests fail with
    /// [`ApiError::NotReady`].
    fn shutdown(&self);
}

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

struct Outbound {
    command: CommandRequest,
    reply: oneshot::Sender<CommandResponse>,
}

/// Live websocket session.
pub struct WsSession {
    requests: mpsc::Sender<Outbound>,
    events: broadcast::Sender<RuntimeEvent>,
    task: JoinHandle<()>,
}

impl WsSession {
    pub async fn connect(server: &RuntimeServer) -> ApiResult<Arc<Self>> {
        let url = server.websocket_url();
        log::debug!("Connecting to runtime at {url}");
        let (socket, _) = connect_async(url.as_str()).await?;

        let (requests, outbox) = mpsc::channel(REQUEST_BUFFER_SIZE);
        let events = broadcast::Sender::new(EVENT_BUFFER_SIZE);
        let task = tokio::spawn(run_socket(socket, outbox, events.clone()));

        Ok(Arc::new(Self {
            requests,
            events,
            task,
        }))
    }
}

impl Drop for WsSession {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[async_trait]
impl Session for WsSession {
    async fn request(&self, command: CommandRequest) -> ApiResult<CommandResponse> {
        let (reply, slot) = oneshot::channel();
        self.requests
            .send(Outbound { command, reply })
            .await
            .map_err(|_| ApiError::not_ready("runtime connection closed"))?;
        /* the socket task drops the reply slot when the connection dies */
        slot.await
            .map_err(|_| ApiError::not_ready("runtime connection closed"))
    }

    fn events(&self) -> broadcast::Receiver<RuntimeEvent> {
        self.events.subscribe()
    }

    fn shutdown(&self) {
        self.task.abort();
    }
}

async fn run_socket(
    mut socket: Socket,
    mut outbox: mpsc::Receiver<Outbound>,
    events: broadcast::Sender<RuntimeEvent>,
) {
    let mut pending: HashMap<u64, oneshot::Sender<CommandResponse>> = HashMap::new();
    let mut next_id: u64 = 1;

    loop {
        tokio::select! {
            outbound = outbox.recv() => {
                let Some(Outbound { command, reply }) = outbound else {
                    break;
                };

                let message_id = next_id;
                next_id += 1;

                let request = ClientRequest { message_id, command };
                let text = match serde_json::to_string(&request) {
                    Ok(text) => text,
                    Err(err) => {
                        log::error!("Failed to encode request: {err}");
                        continue;
                    }
                };

                if let Err(err) = socket.send(Message::text(text)).await {
                    log::error!("Websocket send failed: {err}");
                    break;
                }

                pending.insert(message_id, reply);
            }

            incoming = socket.next() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => {
                        handle_message(text.as_str(), &mut pending, &events);
                    }
                    Some(Ok(Message::Close(frame))) => {
                        log::warn!("Runtime closed the connection: {frame:?}");
                        break;
                    }
                    /* ping/pong are handled by the protocol layer */
                    Some(Ok(_)) => {}
                    Some(Err(err)) => {
                        log::error!("Websocket read failed: {err}");
                        break;
                    }
                    None => {
                        log::warn!("Websocket stream ended");
                        break;
                    }
                }
            }
        }
    }

    /* dropping `pending` wakes every waiter with a channel error */
    drop(pending);
}

fn handle_message(
    text: &str,
    pending: &mut HashMap<u64, oneshot::Sender<CommandResponse>>,
    events: &broadcast::Sender<RuntimeEvent>,
) {
    let msg: ServerMessage = match serde_json::from_str(text) {
        Ok(msg) => msg,
        Err(err) => {
            log::warn!("Undecodable runtime message ({err}): {text}");
            return;
        }
    };

    match msg {
        ServerMessage::Result(response) => {
            if let Some(reply) = pending.remove(&response.message_id) {
                let _ = reply.send(response);
            } else {
                log::warn!("Unmatched acknowledgement for id {}", response.message_id);
            }
        }
        ServerMessage::Event(event) => {
            let _ = events.send(event);
        }
    }
}

/// High-level handle for one runtime connection.
///
/// Cheap to clone; all clones share the underlying session.
#[derive(Clone)]
pub struct Controller {
    session: Arc<dyn Session>,
}

impl Controller {
    #[must_use]
    pub fn new(session: Arc<dyn Session>) -> Self {
        Self { session }
    }

    pub async fn connect(server: &RuntimeServer) -> ApiResult<Self> {
        Ok(Self::new(WsSession::connect(server).await?))
    }

    pub fn disconnect(&self) {
        self.session.shutdown();
    }

    #[must_use]
    pub fn events(&self) -> broadcast::Receiver<RuntimeEvent> {
        self.session.events()
    }

    /// Raw request. Callers inspect `success` themselves.
    pub async fn request(&self, command: CommandRequest) -> ApiResult<CommandResponse> {
        self.session.request(command).await
    }

    /// Full device inventory, keyed by IEEE address.
    pub async fn load_devices(&self) -> ApiResult<BTreeMap<Eui64, DeviceModel>> {
        let response = self.request(CommandRequest::GetDevices).await?;
        if !response.success {
            return Err(ApiError::CommandRejected(
                "get_devices".to_string(),
                response.error_text(),
            ));
        }
        let Some(devices) = response.data.get("devices") else {
            return Ok(BTreeMap::new());
        };
        Ok(serde_json::from_value(devices.clone())?)
    }

    /// Full group inventory, keyed by group id.
    pub async fn load_groups(&self) -> ApiResult<BTreeMap<u16, GroupModel>> {
        let response = self.request(CommandRequest::GetGroups).await?;
        if !response.success {
            return Err(ApiError::CommandRejected(
                "get_groups".to_string(),
                response.error_text(),
            ));
        }
        let Some(groups) = response.data.get("groups") else {
            return Ok(BTreeMap::new());
        };
        Ok(serde_json::from_value(groups.clone())?)
    }

    #[must_use]
    pub const fn switches(&self) -> SwitchCommands<'_> {
        SwitchCommands(self)
    }

    #[must_use]
    pub const fn lights(&self) -> LightCommands<'_> {
        LightCommands(self)
    }

    #[must_use]
    pub const fn covers(&self) -> CoverCommands<'_> {
        CoverCommands(self)
    }

    #[must_use]
    pub const fn locks(&self) -> LockCommands<'_> {
        LockCommands(self)
    }

    #[must_use]
    pub const fn sirens(&self) -> SirenCommands<'_> {
        SirenCommands(self)
    }

    #[must_use]
    pub const fn selects(&self) -> SelectCommands<'_> {
        SelectCommands(self)
    }

    #[must_use]
    pub const fn buttons(&self) -> ButtonCommands<'_> {
        ButtonCommands(self)
    }

    #[must_use]
    pub const fn alarm_panels(&self) -> AlarmCommands<'_> {
        AlarmCommands(self)
    }

    #[must_use]
    pub const fn entities(&self) -> EntityCommands<'_> {
        EntityCommands(self)
    }
}

pub struct SwitchCommands<'a>(&'a Controller);

impl SwitchCommands<'_> {
    pub async fn turn_on(&self, entity: EntityRef) -> ApiResult<CommandResponse> {
        self.0.request(CommandRequest::SwitchTurnOn { entity }).await
    }

    pub async fn turn_off(&self, entity: EntityRef) -> ApiResult<CommandResponse> {
        self.0.request(CommandRequest::SwitchTurnOff { entity }).await
    }
}

pub struct LightCommands<'a>(&'a Controller);

impl LightCommands<'_> {
    pub async fn turn_on(
        &self,
        entity: EntityRef,
        brightness: Option<u8>,
        transition: Option<f32>,
    ) -> ApiResult<CommandResponse> {
        self.0
            .request(CommandRequest::LightTurnOn {
                entity,
                brightness,
                transition,
            })
            .await
    }

    pub async fn turn_off(
        &self,
        entity: EntityRef,
        transition: Option<f32>,
    ) -> ApiResult<CommandResponse> {
        self.0
            .request(CommandRequest::LightTurnOff { entity, transition })
            .await
    }
}

pub struct CoverCommands<'a>(&'a Controller);

impl CoverCommands<'_> {
    pub async fn open(&self, entity: EntityRef) -> ApiResult<CommandResponse> {
        self.0.request(CommandRequest::CoverOpen { entity }).await
    }

    pub async fn close(&self, entity: EntityRef) -> ApiResult<CommandResponse> {
        self.0.request(CommandRequest::CoverClose { entity }).await
    }

    pub async fn stop(&self, entity: EntityRef) -> ApiResult<CommandResponse> {
        self.0.request(CommandRequest::CoverStop { entity }).await
    }

    /// `position` uses the runtime's orientation (0 = open, 100 = closed).
    pub async fn set_position(
        &self,
        entity: EntityRef,
        position: u8,
    ) -> ApiResult<CommandResponse> {
        self.0
            .request(CommandRequest::CoverSetPosition { entity, position })
            .await
    }
}

pub struct LockCommands<'a>(&'a Controller);

impl LockCommands<'_> {
    pub async fn lock(&self, entity: EntityRef) -> ApiResult<CommandResponse> {
        self.0.request(CommandRequest::LockLock { entity }).await
    }

    pub async fn unlock(&self, entity: EntityRef) -> ApiResult<CommandResponse> {
        self.0.request(CommandRequest::LockUnlock { entity }).await
    }

    /// `code_slot` is the runtime's zero-indexed slot.
    pub async fn set_user_code(
        &self,
        entity: EntityRef,
        code_slot: u16,
        user_code: String,
    ) -> ApiResult<CommandResponse> {
        self.0
            .request(CommandRequest::LockSetUserCode {
                entity,
                code_slot,
                user_code,
            })
            .await
    }

    pub async fn enable_user_code(
        &self,
        entity: EntityRef,
        code_slot: u16,
    ) -> ApiResult<CommandResponse> {
        self.0
            .request(CommandRequest::LockEnableUserCode { entity, code_slot })
            .await
    }

    pub async fn disable_user_code(
        &self,
        entity: EntityRef,
        code_slot: u16,
    ) -> ApiResult<CommandResponse> {
        self.0
            .request(CommandRequest::LockDisableUserCode { entity, code_slot })
            .await
    }

    pub async fn clear_user_code(
        &self,
        entity: EntityRef,
        code_slot: u16,
    ) -> ApiResult<CommandResponse> {
        self.0
            .request(CommandRequest::LockClearUserCode { entity, code_slot })
            .await
    }

    pub async fn get_user_code(
        &self,
        entity: EntityRef,
        code_slot: u16,
    ) -> ApiResult<CommandResponse> {
        self.0
            .request(CommandRequest::LockGetUserCode { entity, code_slot })
            .await
    }
}

pub struct SirenCommands<'a>(&'a Controller);

impl SirenCommands<'_> {
    pub async fn turn_on(
        &self,
        entity: EntityRef,
        duration: Option<u16>,
        tone: Option<u8>,
        volume_level: Option<u8>,
    ) -> ApiResult<CommandResponse> {
        self.0
            .request(CommandRequest::SirenTurnOn {
                entity,
                duration,
                tone,
                volume_level,
            })
            .await
    }

    pub async fn turn_off(&self, entity: EntityRef) -> ApiResult<CommandResponse> {
        self.0.request(CommandRequest::SirenTurnOff { entity }).await
    }
}

pub struct SelectCommands<'a>(&'a Controller);

impl SelectCommands<'_> {
    pub async fn select_option(
        &self,
        entity: EntityRef,
        option: String,
    ) -> ApiResult<CommandResponse> {
        self.0
            .request(CommandRequest::SelectOption { entity, option })
            .await
    }
}

pub struct ButtonCommands<'a>(&'a Controller);

impl ButtonCommands<'_> {
    pub async fn press(&self, entity: EntityRef) -> ApiResult<CommandResponse> {
        self.0.request(CommandRequest::ButtonPress { entity }).await
    }
}

pub struct AlarmCommands<'a>(&'a Controller);

impl AlarmCommands<'_> {
    pub async fn disarm(
        &self,
        entity: EntityRef,
        code: Option<String>,
    ) -> ApiResult<CommandResponse> {
        self.0.request(CommandRequest::AlarmDisarm { entity, code }).await
    }

    pub async fn arm_home(
        &self,
        entity: EntityRef,
        code: Option<String>,
    ) -> ApiResult<CommandResponse> {
        self.0.request(CommandRequest::AlarmArmHome { entity, code }).await
    }

    pub async fn arm_away(
        &self,
        entity: EntityRef,
        code: Option<String>,
    ) -> ApiResult<CommandResponse> {
        self.0.request(CommandRequest::AlarmArmAway { entity, code }).await
    }

    pub async fn arm_night(
        &self,
        entity: EntityRef,
        code: Option<String>,
    ) -> ApiResult<CommandResponse> {
        self.0.request(CommandRequest::AlarmArmNight { entity, code }).await
    }

    pub async fn trigger(&self, entity: EntityRef) -> ApiResult<CommandResponse> {
        self.0.request(CommandRequest::AlarmTrigger { entity }).await
    }
}

pub struct EntityCommands<'a>(&'a Controller);

impl EntityCommands<'_> {
    /// Ask the runtime to re-read and re-publish an entity's state.
    pub async fn refresh_state(&self, entity: EntityRef) -> ApiResult<CommandResponse> {
        self.0.request(CommandRequest::RefreshState { entity }).await
    }
}


#[cfg(test)]
mod tests {
    use serde_json::json;

    use zrt::command::{CommandRequest, CommandResponse};

    use super::testing::MockSession;

    #[tokio::test]
    async fn load_devices_decodes_inventory() {
        let session = MockSession::new();
        let mut response = CommandResponse::ok(1);
        response.data.insert(
            "devices".to_string(),
            json!({
                "00:0d:6f:00:0a:bc:de:f0": {
                    "ieee": "00:0d:6f:00:0a:bc:de:f0",
                    "nwk": 0x1234,
                    "name": "Bulb",
                },
            }),
        );
        session.enqueue(response);

        let controller = session.controller();
        let devices = controller.load_devices().await.unwrap();
        assert_eq!(devices.len(), 1);
        let device = devices.values().next().unwrap();
        assert_eq!(device.nwk, 0x1234);
        assert!(matches!(
            session.requests().as_slice(),
            [CommandRequest::GetDevices]
        ));
    }

    #[tokio::test]
    async fn load_devices_propagates_rejection() {
        let session = MockSession::new();
        session.enqueue(CommandResponse::fail(1, "network down"));

        let controller = session.controller();
        assert!(controller.load_devices().await.is_err());
    }
}
