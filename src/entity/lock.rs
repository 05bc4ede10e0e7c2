use async_trait::async_trait;
use serde_json::{Value, json};

use zrt::event::StateChangedEvent;
use zrt::state::{self, LockState};

use crate::error::ApiResult;
use crate::model::Cached;

use super::{EntityCommand, EntityCore, PlatformEntity, initial_state, unsupported};

/// Door lock.
///
/// Code slots are one-indexed on the host side and zero-indexed on the
/// wire; the shift happens here for every user-code operation.
pub struct LockEntity {
    core: EntityCore,
    state: Cached<LockState>,
}

/// Raw lock values as reported by the runtime.
const RAW_LOCKED: u8 = 1;
const RAW_UNLOCKED: u8 = 2;

const fn wire_slot(code_slot: u16) -> u16 {
    code_slot.saturating_sub(1)
}

impl LockEntity {
    #[must_use]
    pub fn new(core: EntityCore) -> Self {
        let state = Cached::new(initial_state(core.descriptor()));
        Self { core, state }
    }

    /// Tri-state view: locked, unlocked, or unknown (covers "not fully
    /// locked" raw values and missing data).
    fn is_locked(state: &LockState) -> Option<bool> {
        match state.state {
            Some(RAW_LOCKED) => Some(true),
            Some(RAW_UNLOCKED) => Some(false),
            Some(_) => None,
            None => state.is_locked,
        }
    }

    async fn lock(&self) -> ApiResult<()> {
        let response = self
            .core
            .controller()
            .locks()
            .lock(self.core.entity_ref())
            .await?;
        self.core.ensure_accepted("lock", &response)?;
        if self.core.still_attached() {
            self.state.update(|current| {
                current.state = Some(RAW_LOCKED);
                current.is_locked = Some(true);
            });
            self.core.write_state(&self.state_json());
        }
        Ok(())
    }

    async fn unlock(&self) -> ApiResult<()> {
        let response = self
            .core
            .controller()
            .locks()
            .unlock(self.core.entity_ref())
            .await?;
        self.core.ensure_accepted("unlock", &response)?;
        if self.core.still_attached() {
            self.state.update(|current| {
                current.state = Some(RAW_UNLOCKED);
                current.is_locked = Some(false);
            });
            self.core.write_state(&self.state_json());
        }
        Ok(())
    }

    async fn set_user_code(&self, code_slot: u16, user_code: String) -> ApiResult<()> {
        let response = self
            .core
            .controller()
            .locks()
            .set_user_code(self.core.entity_ref(), wire_slot(code_slot), user_code)
            .await?;
        self.core.ensure_accepted("set_user_code", &response)?;
        Ok(())
    }

    async fn enable_user_code(&self, code_slot: u16) -> ApiResult<()> {
        let response = self
            .core
            .controller()
            .locks()
            .enable_user_code(self.core.entity_ref(), wire_slot(code_slot))
            .await?;
        self.core.ensure_accepted("enable_user_code", &response)?;
        Ok(())
    }

    async fn disable_user_code(&self, code_slot: u16) -> ApiResult<()> {
        let response = self
            .core
            .controller()
            .locks()
            .disable_user_code(self.core.entity_ref(), wire_slot(code_slot))
            .await?;
        self.core.ensure_accepted("disable_user_code", &response)?;
        Ok(())
    }

    async fn clear_user_code(&self, code_slot: u16) -> ApiResult<()> {
        let response = self
            .core
            .controller()
            .locks()
            .clear_user_code(self.core.entity_ref(), wire_slot(code_slot))
            .await?;
        self.core.ensure_accepted("clear_user_code", &response)?;
        Ok(())
    }

    /// Read back the code stored in a slot (one-indexed).
    pub async fn get_user_code(&self, code_slot: u16) -> ApiResult<Option<String>> {
        let response = self
            .core
            .controller()
            .locks()
            .get_user_code(self.core.entity_ref(), wire_slot(code_slot))
            .await?;
        self.core.ensure_accepted("get_user_code", &response)?;
        Ok(response
            .data
            .get("code")
            .and_then(Value::as_str)
            .map(str::to_string))
    }
}

#[async_trait]
impl PlatformEntity for LockEntity {
    fn core(&self) -> &EntityCore {
        &self.core
    }

    fn state_json(&self) -> Value {
        json!({"is_locked": Self::is_locked(&self.state.get())})
    }

    fn handle_state_changed(&self, event: &StateChangedEvent) {
        let incoming: LockState = state::decode(&event.state);
        self.state.update(|current| {
            if incoming.is_locked.is_some() {
                current.is_locked = incoming.is_locked;
                /* a bare is_locked report supersedes an older raw value */
                if incoming.state.is_none() {
                    current.state = None;
                }
            }
            if incoming.state.is_some() {
                current.state = incoming.state;
            }
        });
        self.core.write_state(&self.state_json());
    }

    async fn invoke(&self, command: EntityCommand) -> ApiResult<()> {
        match command {
            EntityCommand::Lock => self.lock().await,
            EntityCommand::Unlock => self.unlock().await,
            EntityCommand::SetLockUserCode {
                code_slot,
                user_code,
            } => self.set_user_code(code_slot, user_code).await,
            EntityCommand::EnableLockUserCode { code_slot } => {
                self.enable_user_code(code_slot).await
            }
            EntityCommand::DisableLockUserCode { code_slot } => {
                self.disable_user_code(code_slot).await
            }
            EntityCommand::ClearLockUserCode { code_slot } => {
                self.clear_user_code(code_slot).await
            }
            EntityCommand::Refresh => self.core.refresh().await,
            other => unsupported(&self.core, &other),
        }
    }
}
