//! Notification gate.
//!
//! Holds the CCCD value of every notifiable characteristic (keyed by the
//! characteristic's value handle) and decides whether an outbound value
//! may be pushed to the central.  The checks run in a fixed order so the
//! caller always gets the most fundamental reason first:
//!
//! 1. a central is connected
//! 2. the handle names a notifiable value
//! 3. the central enabled notifications or indications
//! 4. the link is encrypted, if the characteristic demands it
//! 5. the payload fits in `mtu - 3`

use heapless::FnvIndexMap;
use log::{debug, warn};

use crate::app::ports::HostStack;
use crate::error::{AttError, SendError};
use crate::fsm::context::Connection;
use crate::gatt::formats::Cccd;
use crate::gatt::registry::{Attribute, AttrKind, Caps};

/// Notifiable characteristics this gate can track.
pub const MAX_SUBSCRIPTIONS: usize = 8;

/// ATT notification header (opcode + handle).
const ATT_NOTIFY_OVERHEAD: usize = 3;

pub struct NotificationGate {
    cccds: FnvIndexMap<u16, Cccd, MAX_SUBSCRIPTIONS>,
}

impl NotificationGate {
    pub fn new() -> Self {
        Self {
            cccds: FnvIndexMap::new(),
        }
    }

    /// Start tracking a notifiable value handle (CCCD initially disabled).
    pub fn enroll(&mut self, value_handle: u16) -> Result<(), AttError> {
        self.cccds
            .insert(value_handle, Cccd::DISABLED)
            .map(|_| ())
            .map_err(|_| AttError::InsufficientResources)
    }

    pub fn set_subscription(&mut self, value_handle: u16, cccd: Cccd) -> Result<(), AttError> {
        let slot = self
            .cccds
            .get_mut(&value_handle)
            .ok_or(AttError::NotFound)?;
        *slot = cccd;
        debug!(
            "GATT: handle {} subscription notify={} indicate={}",
            value_handle, cccd.notify, cccd.indicate
        );
        Ok(())
    }

    pub fn subscription(&self, value_handle: u16) -> Option<Cccd> {
        self.cccds.get(&value_handle).copied()
    }

    pub fn is_subscribed(&self, value_handle: u16) -> bool {
        self.subscription(value_handle)
            .is_some_and(Cccd::is_enabled)
    }

    /// Clear every CCCD; called when the link goes away.
    pub fn reset(&mut self) {
        for cccd in self.cccds.values_mut() {
            *cccd = Cccd::DISABLED;
        }
    }

    /// Push `data` on `attr` if every precondition holds.
    ///
    /// Notification is preferred when both bits are set; indication is
    /// used only when the central asked for it and the value supports it.
    pub fn send<H: HostStack>(
        &self,
        link: Option<&Connection>,
        attr: Option<&Attribute>,
        data: &[u8],
        stack: &mut H,
    ) -> Result<(), SendError> {
        let link = link.ok_or(SendError::NotConnected)?;
        let attr = attr
            .filter(|a| a.kind == AttrKind::Value && a.caps.notifiable())
            .ok_or(SendError::UnknownHandle)?;
        let cccd = self
            .subscription(attr.handle)
            .ok_or(SendError::UnknownHandle)?;

        let use_notify = cccd.notify && attr.caps.contains(Caps::NOTIFY);
        let use_indicate = cccd.indicate && attr.caps.contains(Caps::INDICATE);
        if !use_notify && !use_indicate {
            return Err(SendError::NotSubscribed);
        }
        if attr.caps.contains(Caps::ENCRYPTED) && !link.encrypted {
            warn!(
                "GATT: handle {} requires encryption; dropping {} bytes",
                attr.handle,
                data.len()
            );
            return Err(SendError::Unencrypted);
        }
        if data.len() > usize::from(link.mtu).saturating_sub(ATT_NOTIFY_OVERHEAD) {
            return Err(SendError::TooLarge);
        }

        let rc = if use_notify {
            stack.notify(link.handle, attr.handle, data)
        } else {
            stack.indicate(link.handle, attr.handle, data)
        };
        rc.map_err(|e| {
            warn!("GATT: notify on handle {} failed: {}", attr.handle, e);
            SendError::Transport(e)
        })
    }
}

impl Default for NotificationGate {
    fn default() -> Self {
        Self::new()
    }
}
