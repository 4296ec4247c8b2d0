//! Recording host-stack simulation.
//!
//! Implements [`HostStack`] without a radio: every command is appended to
//! [`SimStack::calls`] so tests can assert on exactly what the peripheral
//! asked the stack to do.  Individual commands can be made to fail via
//! [`SimFaults`].

use log::debug;

use crate::adv::AdvParams;
use crate::app::events::{ConnHandle, PeerAddr};
use crate::app::ports::HostStack;
use crate::config::SecurityConfig;
use crate::error::StackError;
use crate::gatt::registry::ServiceDecl;

/// First handle the simulated stack hands out (GAP/GATT services sit below).
pub const FIRST_HANDLE: u16 = 0x0010;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StackCall {
    RegisterService { uuid: u16, base: u16 },
    ConfigureSecurity(SecurityConfig),
    SetAdvData(Vec<u8>),
    SetScanResponse(Vec<u8>),
    StartAdvertising(AdvParams),
    StopAdvertising,
    Notify {
        conn: ConnHandle,
        handle: u16,
        data: Vec<u8>,
    },
    Indicate {
        conn: ConnHandle,
        handle: u16,
        data: Vec<u8>,
    },
    InitiateSecurity(ConnHandle),
    DeleteBond(PeerAddr),
}

/// Per-command failure injection.  `None` means the command succeeds.
#[derive(Debug, Clone, Default)]
pub struct SimFaults {
    /// Fail registration of the service with this UUID.
    pub register_service: Option<(u16, StackError)>,
    pub security_config: Option<StackError>,
    pub adv_data: Option<StackError>,
    pub scan_response: Option<StackError>,
    pub adv_start: Option<StackError>,
    pub notify: Option<StackError>,
    pub initiate_security: Option<StackError>,
    pub delete_bond: Option<StackError>,
}

#[derive(Debug, Clone)]
pub struct SimStack {
    pub calls: Vec<StackCall>,
    pub faults: SimFaults,
    pub tx_power: i8,
    next_handle: u16,
}

impl SimStack {
    pub fn new() -> Self {
        Self {
            calls: Vec::new(),
            faults: SimFaults::default(),
            tx_power: 3,
            next_handle: FIRST_HANDLE,
        }
    }

    /// Forget recorded calls (handle allocation is kept).
    pub fn clear(&mut self) {
        self.calls.clear();
    }

    pub fn adv_starts(&self) -> usize {
        self.count(|c| matches!(c, StackCall::StartAdvertising(_)))
    }

    pub fn security_requests(&self) -> usize {
        self.count(|c| matches!(c, StackCall::InitiateSecurity(_)))
    }

    /// `(handle, payload)` of every notification and indication sent.
    pub fn notifications(&self) -> Vec<(u16, Vec<u8>)> {
        self.calls
            .iter()
            .filter_map(|c| match c {
                StackCall::Notify { handle, data, .. } | StackCall::Indicate { handle, data, .. } => {
                    Some((*handle, data.clone()))
                }
                _ => None,
            })
            .collect()
    }

    pub fn count(&self, pred: impl Fn(&StackCall) -> bool) -> usize {
        self.calls.iter().filter(|c| pred(c)).count()
    }

    fn record(&mut self, call: StackCall, fault: Option<StackError>) -> Result<(), StackError> {
        debug!("SIM: {:?}", call);
        self.calls.push(call);
        fault.map_or(Ok(()), Err)
    }
}

impl Default for SimStack {
    fn default() -> Self {
        Self::new()
    }
}

impl HostStack for SimStack {
    fn register_service(&mut self, service: &'static ServiceDecl) -> Result<u16, StackError> {
        if let Some((uuid, err)) = self.faults.register_service {
            if uuid == service.uuid {
                return Err(err);
            }
        }
        let base = self.next_handle;
        self.next_handle += service.attribute_count() as u16;
        self.calls.push(StackCall::RegisterService {
            uuid: service.uuid,
            base,
        });
        Ok(base)
    }

    fn configure_security(&mut self, security: &SecurityConfig) -> Result<(), StackError> {
        let fault = self.faults.security_config;
        self.record(StackCall::ConfigureSecurity(*security), fault)
    }

    fn set_adv_data(&mut self, data: &[u8]) -> Result<(), StackError> {
        let fault = self.faults.adv_data;
        self.record(StackCall::SetAdvData(data.to_vec()), fault)
    }

    fn set_scan_response(&mut self, data: &[u8]) -> Result<(), StackError> {
        let fault = self.faults.scan_response;
        self.record(StackCall::SetScanResponse(data.to_vec()), fault)
    }

    fn start_advertising(&mut self, params: &AdvParams) -> Result<(), StackError> {
        // A refused start is not recorded: nothing is on air.
        if let Some(err) = self.faults.adv_start {
            return Err(err);
        }
        self.record(StackCall::StartAdvertising(*params), None)
    }

    fn stop_advertising(&mut self) -> Result<(), StackError> {
        self.record(StackCall::StopAdvertising, None)
    }

    fn tx_power_dbm(&self) -> i8 {
        self.tx_power
    }

    fn notify(
        &mut self,
        conn: ConnHandle,
        attr_handle: u16,
        data: &[u8],
    ) -> Result<(), StackError> {
        if let Some(err) = self.faults.notify {
            return Err(err);
        }
        self.record(
            StackCall::Notify {
                conn,
                handle: attr_handle,
                data: data.to_vec(),
            },
            None,
        )
    }

    fn indicate(
        &mut self,
        conn: ConnHandle,
        attr_handle: u16,
        data: &[u8],
    ) -> Result<(), StackError> {
        if let Some(err) = self.faults.notify {
            return Err(err);
        }
        self.record(
            StackCall::Indicate {
                conn,
                handle: attr_handle,
                data: data.to_vec(),
            },
            None,
        )
    }

    fn initiate_security(&mut self, conn: ConnHandle) -> Result<(), StackError> {
        let fault = self.faults.initiate_security;
        self.record(StackCall::InitiateSecurity(conn), fault)
    }

    fn delete_bond(&mut self, peer: &PeerAddr) -> Result<(), StackError> {
        let fault = self.faults.delete_bond;
        self.record(StackCall::DeleteBond(*peer), fault)
    }
}
