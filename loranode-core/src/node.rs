//! Host-driven API: NodeCore receives timer ticks and MAC events from the host and drives the
//! MAC through the `MacLayer` the host passes in. Both entry points run on the host's single
//! run loop and never overlap.

use crate::downlink::{CommandSink, Decryptor, DownlinkEnvelope, DownlinkOutcome, DownlinkProcessor};
use crate::mac::{MacError, MacEvent, MacLayer, SessionParams, TxComplete};
use crate::session::{Session, SessionKeys, SessionStore, StoreError};
use crate::uplink::{CycleOutcome, DataSource, UplinkScheduler};

/// Default network id handed to the MAC with a static session.
pub const DEFAULT_NET_ID: u32 = 0x1;

/// Main coordinator. Owns the session; the store is the only other place counters live.
pub struct NodeCore<S, D, K> {
    session: Session,
    store: S,
    downlink: DownlinkProcessor<D, K>,
    uplink: UplinkScheduler,
    net_id: u32,
}

impl<S, D, K> NodeCore<S, D, K>
where
    S: SessionStore,
    D: Decryptor,
    K: CommandSink,
{
    /// Load the persisted session. An unreadable record falls back to zero counters with `keys`.
    pub fn start(
        store: S,
        keys: SessionKeys,
        downlink: DownlinkProcessor<D, K>,
        uplink: UplinkScheduler,
    ) -> Self {
        let session = match store.load(keys) {
            Ok(s) => {
                tracing::info!(
                    uplink = s.uplink_counter,
                    downlink = s.downlink_counter,
                    "loaded frame counters"
                );
                s
            }
            Err(e) => {
                tracing::error!(error = %e, "could not load session, counters start from zero");
                Session::new(keys)
            }
        };
        if session.keys != keys {
            tracing::warn!(
                device_address = %format!("{:08x}", session.device_address()),
                "persisted session identity differs from connection file, keeping persisted"
            );
        }
        Self {
            session,
            store,
            downlink,
            uplink,
            net_id: DEFAULT_NET_ID,
        }
    }

    pub fn set_net_id(&mut self, net_id: u32) {
        self.net_id = net_id;
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn downlink(&self) -> &DownlinkProcessor<D, K> {
        &self.downlink
    }

    pub fn uplink(&self) -> &UplinkScheduler {
        &self.uplink
    }

    /// Reset the MAC and hand it the stored session, counters included.
    pub fn establish<M: MacLayer + ?Sized>(&self, mac: &mut M) -> Result<(), MacError> {
        mac.reset_session()?;
        mac.set_session(&SessionParams::from_session(self.net_id, &self.session))?;
        tracing::info!(
            device_address = %format!("{:08x}", self.session.device_address()),
            uplink = self.session.uplink_counter,
            downlink = self.session.downlink_counter,
            "session handed to mac"
        );
        Ok(())
    }

    /// Timer callback: one uplink cycle. Performs the MAC reset the scheduler asks for.
    pub fn on_timer<Src, M>(&mut self, source: &Src, mac: &mut M) -> Result<CycleOutcome, NodeError>
    where
        Src: DataSource + ?Sized,
        M: MacLayer + ?Sized,
    {
        let outcome = self.uplink.run_cycle(source, mac);
        if let CycleOutcome::Backpressure {
            reset_requested: true,
            ..
        } = outcome
        {
            tracing::warn!("mac stuck with pending transmission, resetting");
            self.establish(mac)?;
        }
        Ok(outcome)
    }

    /// MAC event callback. Returns the downlink outcome when the event carried a payload.
    pub fn on_event(&mut self, event: MacEvent) -> Result<Option<DownlinkOutcome>, StoreError> {
        match event {
            MacEvent::TransmissionComplete(tx) => self.on_tx_complete(tx),
            MacEvent::Joined => {
                tracing::info!("joined network");
                Ok(None)
            }
            MacEvent::JoinFailed => {
                tracing::warn!("join failed");
                Ok(None)
            }
            MacEvent::Reset => {
                tracing::info!("mac reset");
                Ok(None)
            }
            MacEvent::Other(name) => {
                tracing::info!(event = %name, "mac event");
                Ok(None)
            }
        }
    }

    fn on_tx_complete(&mut self, tx: TxComplete) -> Result<Option<DownlinkOutcome>, StoreError> {
        tracing::info!(
            uplink_counter = tx.uplink_counter,
            ack = tx.ack,
            received = tx.payload.len(),
            "transmission complete"
        );
        if !self.session.observe_uplink_counter(tx.uplink_counter) {
            tracing::debug!(
                reported = tx.uplink_counter,
                stored = self.session.uplink_counter,
                "mac uplink counter not ahead of stored"
            );
        }
        self.store.persist(&self.session)?;
        tracing::debug!(
            uplink = self.session.uplink_counter,
            downlink = self.session.downlink_counter,
            "frame counters persisted"
        );

        if tx.payload.is_empty() {
            return Ok(None);
        }
        let envelope = DownlinkEnvelope {
            ciphertext: tx.payload,
            mac_downlink_counter: tx.mac_downlink_counter,
        };
        self.downlink
            .process(&mut self.session, &mut self.store, &envelope)
            .map(Some)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum NodeError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Mac(#[from] MacError),
}
