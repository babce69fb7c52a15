use log::{info, warn};
use std::{str::FromStr, sync::Arc};

use crate::controller::EnclosureController;
use crate::error::ApiError;
use crate::notify::PowerState;

/// Commands accepted from external callers such as the host UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiCommand {
    TurnPowerOn,
    TurnPowerOff,
    TogglePower,
    TurnLightOn,
    GetPowerState,
}

impl FromStr for ApiCommand {
    type Err = ApiError;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        match name {
            "turnPowerOn" => Ok(ApiCommand::TurnPowerOn),
            "turnPowerOff" => Ok(ApiCommand::TurnPowerOff),
            "togglePower" => Ok(ApiCommand::TogglePower),
            "turnLightOn" => Ok(ApiCommand::TurnLightOn),
            "getPowerState" => Ok(ApiCommand::GetPowerState),
            other => Err(ApiError::UnknownCommand(other.to_string())),
        }
    }
}

/// Identity presented with a command API call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Caller {
    pub token: Option<String>,
}

/// Decides whether a caller may control the enclosure.
pub trait Authorizer: Send + Sync {
    fn is_authorized(&self, caller: &Caller) -> bool;
}

/// Authorizes callers presenting a shared token.
///
/// Without a configured token every caller is trusted.
pub struct TokenAuthorizer {
    token: Option<String>,
}

impl TokenAuthorizer {
    pub fn new(token: Option<String>) -> Self {
        Self { token }
    }
}

impl Authorizer for TokenAuthorizer {
    fn is_authorized(&self, caller: &Caller) -> bool {
        match &self.token {
            Some(expected) => caller.token.as_deref() == Some(expected.as_str()),
            None => true,
        }
    }
}

/// Command API in front of an [`EnclosureController`].
pub struct CommandApi {
    controller: Arc<EnclosureController>,
    authorizer: Box<dyn Authorizer>,
}

impl CommandApi {
    pub fn new(controller: Arc<EnclosureController>, authorizer: Box<dyn Authorizer>) -> Self {
        Self {
            controller,
            authorizer,
        }
    }

    /// Run `command` on behalf of `caller`.
    ///
    /// `GetPowerState` answers with the current state; every other command
    /// answers with `None`.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::PermissionDenied`] without touching the controller
    /// when the caller is not authorized.
    pub fn handle(
        &self,
        command: ApiCommand,
        caller: &Caller,
    ) -> Result<Option<PowerState>, ApiError> {
        if !self.authorizer.is_authorized(caller) {
            warn!("Rejected unauthorized command {:?}", command);
            return Err(ApiError::PermissionDenied);
        }

        info!("Command API: {:?}", command);
        match command {
            ApiCommand::TurnPowerOn => self.controller.turn_power_on(),
            ApiCommand::TurnPowerOff => self.controller.turn_power_off(),
            ApiCommand::TogglePower => self.controller.toggle_power(),
            ApiCommand::TurnLightOn => self.controller.toggle_light(),
            ApiCommand::GetPowerState => return Ok(Some(self.controller.power_state())),
        }
        Ok(None)
    }
}
