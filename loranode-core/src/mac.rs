//! MAC collaborator interface: events the MAC delivers, commands it accepts.

use crate::session::Session;

/// Session parameters handed to the MAC (ABP-style static session).
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct SessionParams {
    pub net_id: u32,
    pub device_address: u32,
    pub network_key: [u8; 16],
    pub application_key: [u8; 16],
    pub uplink_counter: u32,
    pub downlink_counter: u32,
}

impl SessionParams {
    pub fn from_session(net_id: u32, session: &Session) -> Self {
        Self {
            net_id,
            device_address: session.keys.device_address,
            network_key: session.keys.network_key,
            application_key: session.keys.application_key,
            uplink_counter: session.uplink_counter,
            downlink_counter: session.downlink_counter,
        }
    }
}

/// Transmission finished; optionally carries a downlink received in the RX windows.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct TxComplete {
    /// MAC uplink frame counter after this transmission.
    pub uplink_counter: u32,
    /// MAC delivery-order downlink counter. Not the application counter.
    pub mac_downlink_counter: u32,
    pub ack: bool,
    /// Empty when nothing was received.
    pub payload: Vec<u8>,
}

/// Events delivered by the MAC on the run loop.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum MacEvent {
    Joined,
    TransmissionComplete(TxComplete),
    JoinFailed,
    Reset,
    /// Any other MAC notification (beacon, link dead, ...). Logged only.
    Other(String),
}

/// Commands the node issues to the MAC.
pub trait MacLayer {
    /// Discard MAC session state and any pending transmission.
    fn reset_session(&mut self) -> Result<(), MacError>;

    fn set_session(&mut self, params: &SessionParams) -> Result<(), MacError>;

    /// Queue an uplink for the next possible slot. Err if the MAC refused it.
    fn submit_uplink(&mut self, port: u8, payload: &[u8]) -> Result<(), MacError>;

    /// True while a TX/RX cycle is in flight.
    fn is_transmission_pending(&self) -> bool;
}

#[derive(Debug, thiserror::Error)]
pub enum MacError {
    #[error("transmission already pending")]
    Busy,
    #[error("payload of {0} bytes exceeds the maximum")]
    PayloadTooLarge(usize),
    #[error("mac link unavailable: {0}")]
    Unavailable(String),
}

/// Scripted MAC for tests: records submissions, pending flag set by the test.
#[cfg(test)]
#[derive(Debug, Default)]
pub(crate) struct FakeMac {
    pub pending: bool,
    pub refuse: bool,
    pub submitted: Vec<(u8, Vec<u8>)>,
    pub sessions: Vec<SessionParams>,
    pub resets: u32,
}

#[cfg(test)]
impl MacLayer for FakeMac {
    fn reset_session(&mut self) -> Result<(), MacError> {
        self.resets += 1;
        self.pending = false;
        Ok(())
    }

    fn set_session(&mut self, params: &SessionParams) -> Result<(), MacError> {
        self.sessions.push(*params);
        Ok(())
    }

    fn submit_uplink(&mut self, port: u8, payload: &[u8]) -> Result<(), MacError> {
        if self.refuse {
            return Err(MacError::Unavailable("refused".into()));
        }
        if self.pending {
            return Err(MacError::Busy);
        }
        self.submitted.push((port, payload.to_vec()));
        self.pending = true;
        Ok(())
    }

    fn is_transmission_pending(&self) -> bool {
        self.pending
    }
}
