//! Attribute access dispatcher.
//!
//! Every read or write the peer issues lands in [`Dispatcher::dispatch`].
//! The attribute is resolved through the [`Registry`], its declared
//! capabilities are checked against the requested operation, and the
//! value is served by the handler registered for its [`AttrKey`].
//!
//! Handlers are plain function pointers in a table indexed by `AttrKey`,
//! so adding a characteristic means adding one table row.

use core::fmt;

use log::{debug, warn};

use crate::app::events::AppEvent;
use crate::error::AttError;
use crate::gatt::gate::NotificationGate;
use crate::gatt::registry::{AttrKey, AttrKind, Attribute, Registry};
use crate::services::ServiceValues;

// ───────────────────────────────────────────────────────────────
// Output buffer
// ───────────────────────────────────────────────────────────────

/// Response buffer for reads.  Appends are all-or-nothing.
pub struct AttBuf<'a> {
    buf: &'a mut [u8],
    len: usize,
}

impl<'a> AttBuf<'a> {
    pub fn new(buf: &'a mut [u8]) -> Self {
        Self { buf, len: 0 }
    }

    /// Append `bytes` in full, or leave the buffer untouched.
    pub fn append(&mut self, bytes: &[u8]) -> Result<(), AttError> {
        let end = self.len + bytes.len();
        let dst = self
            .buf
            .get_mut(self.len..end)
            .ok_or(AttError::InsufficientResources)?;
        dst.copy_from_slice(bytes);
        self.len = end;
        Ok(())
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.buf[..self.len]
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

// ───────────────────────────────────────────────────────────────
// Access request
// ───────────────────────────────────────────────────────────────

/// One ATT operation as reported by the stack.
pub enum Access<'a, 'b> {
    ReadChr(&'a mut AttBuf<'b>),
    WriteChr(&'a [u8]),
    ReadDsc(&'a mut AttBuf<'b>),
    WriteDsc(&'a [u8]),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessOp {
    ReadChr,
    WriteChr,
    ReadDsc,
    WriteDsc,
}

impl Access<'_, '_> {
    pub fn op(&self) -> AccessOp {
        match self {
            Self::ReadChr(_) => AccessOp::ReadChr,
            Self::WriteChr(_) => AccessOp::WriteChr,
            Self::ReadDsc(_) => AccessOp::ReadDsc,
            Self::WriteDsc(_) => AccessOp::WriteDsc,
        }
    }
}

impl AccessOp {
    pub const fn is_write(self) -> bool {
        matches!(self, Self::WriteChr | Self::WriteDsc)
    }

    fn target(self) -> AttrKind {
        match self {
            Self::ReadChr | Self::WriteChr => AttrKind::Value,
            Self::ReadDsc | Self::WriteDsc => AttrKind::Descriptor,
        }
    }
}

impl fmt::Display for AccessOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::ReadChr => "read-chr",
            Self::WriteChr => "write-chr",
            Self::ReadDsc => "read-dsc",
            Self::WriteDsc => "write-dsc",
        })
    }
}

// ───────────────────────────────────────────────────────────────
// Handler table
// ───────────────────────────────────────────────────────────────

/// State a handler may read or mutate.
pub struct AccessCtx<'a> {
    pub attr: &'a Attribute,
    pub values: &'a mut ServiceValues,
    pub gate: &'a mut NotificationGate,
}

pub type ReadFn = fn(&AccessCtx<'_>, &mut AttBuf<'_>) -> Result<(), AttError>;

/// A successful write may surface an event for the application.
pub type WriteFn = fn(&mut AccessCtx<'_>, &[u8]) -> Result<Option<AppEvent>, AttError>;

pub struct AttrHandler {
    pub key: AttrKey,
    pub read: Option<ReadFn>,
    pub write: Option<WriteFn>,
}

pub struct Dispatcher {
    handlers: [AttrHandler; AttrKey::COUNT],
}

impl Dispatcher {
    /// The table must list every `AttrKey` at its own index.
    pub fn new(handlers: [AttrHandler; AttrKey::COUNT]) -> Self {
        debug_assert!(
            handlers
                .iter()
                .enumerate()
                .all(|(i, h)| h.key as usize == i),
            "handler table out of order"
        );
        Self { handlers }
    }

    /// Serve one access.  Errors are logged here and mapped to ATT codes
    /// by the adapter.
    pub fn dispatch(
        &self,
        registry: &Registry,
        values: &mut ServiceValues,
        gate: &mut NotificationGate,
        handle: u16,
        access: Access<'_, '_>,
    ) -> Result<Option<AppEvent>, AttError> {
        let op = access.op();
        let result = self.dispatch_inner(registry, values, gate, handle, access);
        match &result {
            Ok(_) => debug!("ATT {} handle={} ok", op, handle),
            Err(e) => warn!("ATT {} handle={} rejected: {}", op, handle, e),
        }
        result
    }

    fn dispatch_inner(
        &self,
        registry: &Registry,
        values: &mut ServiceValues,
        gate: &mut NotificationGate,
        handle: u16,
        access: Access<'_, '_>,
    ) -> Result<Option<AppEvent>, AttError> {
        let attr = registry.lookup(handle)?;
        let key = attr.key.ok_or(AttError::Unsupported)?;
        if attr.kind != access.op().target() {
            return Err(AttError::Unsupported);
        }
        let handler = &self.handlers[key as usize];
        let mut ctx = AccessCtx { attr, values, gate };

        match access {
            Access::ReadChr(out) | Access::ReadDsc(out) => {
                let read = handler
                    .read
                    .filter(|_| attr.caps.readable())
                    .ok_or(AttError::Unsupported)?;
                read(&ctx, out)?;
                Ok(None)
            }
            Access::WriteChr(data) | Access::WriteDsc(data) => {
                let write = handler
                    .write
                    .filter(|_| attr.caps.writable())
                    .ok_or(AttError::Unsupported)?;
                write(&mut ctx, data)
            }
        }
    }
}
