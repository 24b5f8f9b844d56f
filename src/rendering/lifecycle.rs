//! Device lifecycle state machine.
//!
//! State only changes through explicit health checks. The machine itself is pure;
//! the presenter performs the resets and invokes the callbacks it asks for.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{PresentError, PresentResult};

use super::device::DeviceStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DeviceState {
    Ready,
    Lost,
    NotReset,
}

/// What the presenter has to do after a health check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Nothing changed.
    Stay,
    /// Entered `Lost`; fire the lost callback.
    BecameLost,
    /// A reset is due. `notify` asks for the reset callback first, which happens
    /// only on the `Lost -> NotReset` edge.
    ResetPending { notify: bool },
    /// The device came back on its own; rebuild display resources.
    Recovered,
}

#[derive(Debug)]
pub struct Lifecycle {
    state: DeviceState,
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self {
            state: DeviceState::Ready,
        }
    }
}

impl Lifecycle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> DeviceState {
        self.state
    }

    /// Feed a health probe result into the machine.
    pub fn observe(&mut self, status: DeviceStatus) -> Transition {
        use DeviceState as S;
        use DeviceStatus as H;

        let (next, transition) = match (self.state, status) {
            (S::Ready, H::Ok) => (S::Ready, Transition::Stay),
            (S::Lost, H::Lost) => (S::Lost, Transition::Stay),
            (_, H::Lost) => (S::Lost, Transition::BecameLost),
            (S::Lost, H::NotReset) => (S::NotReset, Transition::ResetPending { notify: true }),
            (_, H::NotReset) => (S::NotReset, Transition::ResetPending { notify: false }),
            (S::Lost | S::NotReset, H::Ok) => (self.state, Transition::Recovered),
        };
        self.state = next;
        transition
    }

    /// Resources were rebuilt after a reset or recovery.
    pub fn mark_ready(&mut self) {
        self.state = DeviceState::Ready;
    }

    /// Presentation entry points call this before touching the device.
    pub fn ensure_ready(&self) -> PresentResult<()> {
        match self.state {
            DeviceState::Ready => Ok(()),
            state => Err(PresentError::DeviceUnavailable(state)),
        }
    }
}

pub type DeviceCallback = Arc<dyn Fn() + Send + Sync>;

/// Registered device-loss handlers.
#[derive(Clone, Default)]
pub struct DeviceCallbacks {
    pub lost: Option<DeviceCallback>,
    pub reset: Option<DeviceCallback>,
}

impl fmt::Debug for DeviceCallbacks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceCallbacks")
            .field("lost", &self.lost.is_some())
            .field("reset", &self.reset.is_some())
            .finish()
    }
}
