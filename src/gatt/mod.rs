//! GATT server core: handle space, access dispatch and notification gating.

pub mod dispatcher;
pub mod formats;
pub mod gate;
pub mod registry;
pub mod uuids;
