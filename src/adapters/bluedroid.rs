//! Bluedroid host-stack adapter (ESP32).
//!
//! Implements [`HostStack`] over the raw `esp_idf_svc::sys` Bluedroid API
//! and translates GAP/GATTS callbacks into [`GapEvent`]s and attribute
//! accesses for the installed [`SharedPeripheral`].
//!
//! Bluedroid callbacks are C function pointers that cannot capture Rust
//! closures, so the peripheral is reached through a process-wide
//! `OnceLock` filled by [`install`].
//!
//! Every characteristic value and descriptor is registered with
//! `ESP_GATT_RSP_BY_APP`: reads and writes arrive as GATTS events and are
//! answered from the dispatcher.  Only the declarations are served by the
//! stack itself.
//!
//! Bluedroid has no repeat-pairing event.  A failed authentication with a
//! peer we still hold a bond for is reported as
//! [`GapEvent::RepeatPairing`]; a `RetryPairing` reply re-requests
//! encryption once the stale bond is gone.

use core::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Mutex, OnceLock};
use std::time::Duration;

use esp_idf_svc::sys::*;
use log::{debug, error, info, warn};

use crate::adv::{AdvParams, ConnectMode};
use crate::app::events::{ConnHandle, GapEvent, GapReply, PeerAddr};
use crate::app::ports::HostStack;
use crate::app::service::SharedPeripheral;
use crate::config::SecurityConfig;
use crate::error::StackError;
use crate::gatt::dispatcher::{Access, AttBuf};
use crate::gatt::registry::{AttrKind, Caps, ServiceDecl};
use crate::gatt::uuids;

// ───────────────────────────────────────────────────────────────
// Constants
// ───────────────────────────────────────────────────────────────

const APP_ID: u16 = 0;
const GATT_IF_NONE: u8 = 0xFF;

/// Largest value the dispatcher may return for one read.
const MAX_ATTR_LEN: usize = 512;

/// Default advertising interval, 20-40 ms in 0.625 ms units.
const ADV_INTERVAL: (u16, u16) = (0x20, 0x40);

const WAIT_STEP: Duration = Duration::from_millis(10);
const WAIT_STEPS: u32 = 200;

// ───────────────────────────────────────────────────────────────
// Callback bridge state
// ───────────────────────────────────────────────────────────────

static PERIPHERAL: OnceLock<SharedPeripheral<BluedroidStack>> = OnceLock::new();

static GATTS_IF: AtomicU8 = AtomicU8::new(GATT_IF_NONE);

/// Outcome of the last `esp_ble_gatts_create_attr_tab`: first handle, or
/// the stack status.
static ATTR_TAB_RESULT: Mutex<Option<Result<u16, i32>>> = Mutex::new(None);

/// Route stack callbacks to `peripheral`.  Must be called after
/// `Peripheral::init`, since registration waits on callbacks that would
/// otherwise contend for the peripheral lock.
pub fn install(peripheral: SharedPeripheral<BluedroidStack>) -> bool {
    PERIPHERAL.set(peripheral).is_ok()
}

fn peripheral() -> Option<&'static SharedPeripheral<BluedroidStack>> {
    PERIPHERAL.get()
}

fn check(rc: esp_err_t) -> Result<(), StackError> {
    if rc == ESP_OK as esp_err_t {
        Ok(())
    } else {
        Err(StackError(rc))
    }
}

fn wait_for<T>(what: &str, mut poll: impl FnMut() -> Option<T>) -> Result<T, StackError> {
    for _ in 0..WAIT_STEPS {
        if let Some(v) = poll() {
            return Ok(v);
        }
        std::thread::sleep(WAIT_STEP);
    }
    error!("BLE: timed out waiting for {}", what);
    Err(StackError(ESP_ERR_TIMEOUT as i32))
}

// ───────────────────────────────────────────────────────────────
// Adapter
// ───────────────────────────────────────────────────────────────

pub struct BluedroidStack {
    gatts_if: u8,
    /// The live link and its peer address, for calls keyed by address.
    link: Option<(ConnHandle, [u8; 6])>,
}

impl BluedroidStack {
    /// Bring up the controller and Bluedroid, register callbacks and the
    /// GATT application, and set the GAP device name.
    pub fn init(device_name: &str) -> Result<Self, StackError> {
        // SAFETY: one-time bring-up from the main task before any other
        // BT call; the callbacks are `extern "C"` with the expected ABI.
        unsafe {
            // BLE-only mode releases the classic BT memory.
            let _ = esp_bt_controller_mem_release(esp_bt_mode_t_ESP_BT_MODE_CLASSIC_BT);

            let mut bt_cfg = esp_bt_controller_config_t::default();
            check(esp_bt_controller_init(&mut bt_cfg))
                .inspect_err(|e| error!("BLE: bt_controller_init failed ({})", e))?;
            check(esp_bt_controller_enable(esp_bt_mode_t_ESP_BT_MODE_BLE))
                .inspect_err(|e| error!("BLE: bt_controller_enable failed ({})", e))?;
            check(esp_bluedroid_init())
                .inspect_err(|e| error!("BLE: bluedroid_init failed ({})", e))?;
            check(esp_bluedroid_enable())
                .inspect_err(|e| error!("BLE: bluedroid_enable failed ({})", e))?;

            check(esp_ble_gap_register_callback(Some(gap_event_handler)))?;
            check(esp_ble_gatts_register_callback(Some(gatts_event_handler)))?;
            check(esp_ble_gatts_app_register(APP_ID))?;
        }

        let gatts_if = wait_for("GATTS app registration", || {
            let gatts_if = GATTS_IF.load(Ordering::Acquire);
            (gatts_if != GATT_IF_NONE).then_some(gatts_if)
        })?;

        let mut name = heapless::Vec::<u8, 32>::new();
        let _ = name.extend_from_slice(&device_name.as_bytes()[..device_name.len().min(31)]);
        let _ = name.push(0);
        // SAFETY: `name` is NUL-terminated and outlives the call.
        check(unsafe { esp_ble_gap_set_device_name(name.as_ptr() as *const _) })?;

        info!("BLE(espidf): Bluedroid ready (gatts_if={})", gatts_if);
        Ok(Self {
            gatts_if,
            link: None,
        })
    }

    fn note_link(&mut self, conn: ConnHandle, bda: [u8; 6]) {
        self.link = Some((conn, bda));
    }

    fn peer_of(&self, conn: ConnHandle) -> Option<[u8; 6]> {
        self.link.filter(|(c, _)| *c == conn).map(|(_, bda)| bda)
    }

    fn conn_of(&self, bda: &[u8; 6]) -> Option<ConnHandle> {
        self.link.filter(|(_, a)| a == bda).map(|(c, _)| c)
    }
}

// ── Attribute table construction ──────────────────────────────

/// Backing storage for one row of an `esp_gatts_attr_db_t` table.
struct AttrRow {
    uuid: [u8; 2],
    value: [u8; 2],
    value_len: u16,
    max_len: u16,
    perm: u16,
    auto_rsp: u8,
}

fn char_properties(caps: Caps) -> u8 {
    let mut props = 0u32;
    if caps.contains(Caps::READ) {
        props |= ESP_GATT_CHAR_PROP_BIT_READ;
    }
    if caps.contains(Caps::WRITE) {
        props |= ESP_GATT_CHAR_PROP_BIT_WRITE;
    }
    if caps.contains(Caps::WRITE_NO_RSP) {
        props |= ESP_GATT_CHAR_PROP_BIT_WRITE_NR;
    }
    if caps.contains(Caps::NOTIFY) {
        props |= ESP_GATT_CHAR_PROP_BIT_NOTIFY;
    }
    if caps.contains(Caps::INDICATE) {
        props |= ESP_GATT_CHAR_PROP_BIT_INDICATE;
    }
    props as u8
}

/// `Caps::ENCRYPTED` gates notifications in the core, not access here.
fn permissions(caps: Caps) -> u16 {
    let mut perm = 0u32;
    if caps.readable() {
        perm |= ESP_GATT_PERM_READ;
    }
    if caps.writable() {
        perm |= ESP_GATT_PERM_WRITE;
    }
    perm as u16
}

/// Rows in the handle order `Registry::register` expects.
fn attr_rows(decl: &ServiceDecl) -> Vec<AttrRow> {
    let mut rows = Vec::with_capacity(decl.attribute_count());
    rows.push(AttrRow {
        uuid: uuids::PRIMARY_SERVICE.to_le_bytes(),
        value: decl.uuid.to_le_bytes(),
        value_len: 2,
        max_len: 2,
        perm: ESP_GATT_PERM_READ as u16,
        auto_rsp: ESP_GATT_AUTO_RSP as u8,
    });
    for chr in decl.characteristics {
        rows.push(AttrRow {
            uuid: uuids::CHARACTERISTIC.to_le_bytes(),
            value: [char_properties(chr.caps), 0],
            value_len: 1,
            max_len: 1,
            perm: ESP_GATT_PERM_READ as u16,
            auto_rsp: ESP_GATT_AUTO_RSP as u8,
        });
        rows.push(AttrRow {
            uuid: chr.uuid.to_le_bytes(),
            value: [0; 2],
            value_len: 0,
            max_len: MAX_ATTR_LEN as u16,
            perm: permissions(chr.caps),
            auto_rsp: ESP_GATT_RSP_BY_APP as u8,
        });
        for dsc in chr.descriptors {
            rows.push(AttrRow {
                uuid: dsc.uuid.to_le_bytes(),
                value: [0; 2],
                value_len: 0,
                max_len: MAX_ATTR_LEN as u16,
                perm: permissions(dsc.caps),
                auto_rsp: ESP_GATT_RSP_BY_APP as u8,
            });
        }
    }
    rows
}

// ── HostStack ─────────────────────────────────────────────────

impl HostStack for BluedroidStack {
    fn register_service(&mut self, service: &'static ServiceDecl) -> Result<u16, StackError> {
        let mut rows = attr_rows(service);
        let db: Vec<esp_gatts_attr_db_t> = rows
            .iter_mut()
            .map(|row| esp_gatts_attr_db_t {
                attr_control: esp_attr_control_t {
                    auto_rsp: row.auto_rsp,
                },
                att_desc: esp_attr_desc_t {
                    uuid_length: ESP_UUID_LEN_16 as u16,
                    uuid_p: row.uuid.as_mut_ptr(),
                    perm: row.perm,
                    max_length: row.max_len,
                    length: row.value_len,
                    value: row.value.as_mut_ptr(),
                },
            })
            .collect();

        if let Ok(mut slot) = ATTR_TAB_RESULT.lock() {
            *slot = None;
        }
        // SAFETY: `db` and the `rows` it points into stay alive until the
        // CREAT_ATTR_TAB event below; Bluedroid copies the table.
        check(unsafe {
            esp_ble_gatts_create_attr_tab(db.as_ptr(), self.gatts_if, db.len() as _, 0)
        })?;

        let base = wait_for("attribute table", || {
            ATTR_TAB_RESULT.lock().ok().and_then(|mut slot| slot.take())
        })?
        .map_err(StackError)?;
        drop(db);
        drop(rows);

        // SAFETY: `base` is the service handle Bluedroid just returned.
        check(unsafe { esp_ble_gatts_start_service(base) })?;
        info!(
            "BLE GATTS: service 0x{:04X} started at handle {}",
            service.uuid, base
        );
        Ok(base)
    }

    fn configure_security(&mut self, security: &SecurityConfig) -> Result<(), StackError> {
        let mut auth_req: esp_ble_auth_req_t = 0;
        if security.bonding {
            auth_req |= ESP_LE_AUTH_BOND as esp_ble_auth_req_t;
        }
        if security.mitm {
            auth_req |= ESP_LE_AUTH_REQ_MITM as esp_ble_auth_req_t;
        }
        let iocap: esp_ble_io_cap_t = security.io_capability as u8 as _;
        let key_size: u8 = 16;
        let keys: u8 = security.key_distribution;

        let params: [(esp_ble_sm_param_t, *const u8, u32); 5] = [
            (
                esp_ble_sm_param_t_ESP_BLE_SM_AUTHEN_REQ_MODE,
                &auth_req as *const _ as *const u8,
                core::mem::size_of_val(&auth_req) as u32,
            ),
            (
                esp_ble_sm_param_t_ESP_BLE_SM_IOCAP_MODE,
                &iocap as *const _ as *const u8,
                core::mem::size_of_val(&iocap) as u32,
            ),
            (
                esp_ble_sm_param_t_ESP_BLE_SM_MAX_KEY_SIZE,
                &key_size as *const u8,
                1,
            ),
            (esp_ble_sm_param_t_ESP_BLE_SM_SET_INIT_KEY, &keys as *const u8, 1),
            (esp_ble_sm_param_t_ESP_BLE_SM_SET_RSP_KEY, &keys as *const u8, 1),
        ];
        for (param, value, len) in params {
            // SAFETY: each pointer refers to a local that outlives the call.
            check(unsafe { esp_ble_gap_set_security_param(param, value as *mut _, len as _) })?;
        }
        info!(
            "BLE: security bonding={} mitm={} io={:?}",
            security.bonding, security.mitm, security.io_capability
        );
        Ok(())
    }

    fn set_adv_data(&mut self, data: &[u8]) -> Result<(), StackError> {
        // SAFETY: Bluedroid copies the payload before returning.
        check(unsafe { esp_ble_gap_config_adv_data_raw(data.as_ptr() as *mut u8, data.len() as u32) })
    }

    fn set_scan_response(&mut self, data: &[u8]) -> Result<(), StackError> {
        // SAFETY: as above.
        check(unsafe {
            esp_ble_gap_config_scan_rsp_data_raw(data.as_ptr() as *mut u8, data.len() as u32)
        })
    }

    fn start_advertising(&mut self, params: &AdvParams) -> Result<(), StackError> {
        let (min, max) = params.interval.unwrap_or(ADV_INTERVAL);
        if params.duration_ms.is_some() {
            debug!("BLE: Bluedroid advertising has no duration; advertising until stopped");
        }
        // SAFETY: zeroed is a valid bit pattern for this plain C struct.
        let mut adv_params = unsafe {
            esp_ble_adv_params_t {
                adv_int_min: min,
                adv_int_max: max,
                adv_type: match params.connect {
                    ConnectMode::Undirected => esp_ble_adv_type_t_ADV_TYPE_IND,
                    ConnectMode::NonConnectable => esp_ble_adv_type_t_ADV_TYPE_NONCONN_IND,
                },
                own_addr_type: esp_ble_addr_type_t_BLE_ADDR_TYPE_PUBLIC,
                channel_map: esp_ble_adv_channel_t_ADV_CHNL_ALL,
                adv_filter_policy: esp_ble_adv_filter_t_ADV_FILTER_ALLOW_SCAN_ANY_CON_ANY,
                ..core::mem::zeroed()
            }
        };
        check(unsafe { esp_ble_gap_start_advertising(&mut adv_params) })
    }

    fn stop_advertising(&mut self) -> Result<(), StackError> {
        check(unsafe { esp_ble_gap_stop_advertising() })
    }

    fn tx_power_dbm(&self) -> i8 {
        // Power levels are 3 dB steps starting at -12 dBm.
        let level = unsafe { esp_ble_tx_power_get(esp_ble_power_type_t_ESP_BLE_PWR_TYPE_ADV) };
        -12 + 3 * (level as i8)
    }

    fn notify(
        &mut self,
        conn: ConnHandle,
        attr_handle: u16,
        data: &[u8],
    ) -> Result<(), StackError> {
        // SAFETY: Bluedroid copies `data` into its own buffer.
        check(unsafe {
            esp_ble_gatts_send_indicate(
                self.gatts_if,
                conn.0,
                attr_handle,
                data.len() as u16,
                data.as_ptr() as *mut u8,
                false,
            )
        })
    }

    fn indicate(
        &mut self,
        conn: ConnHandle,
        attr_handle: u16,
        data: &[u8],
    ) -> Result<(), StackError> {
        check(unsafe {
            esp_ble_gatts_send_indicate(
                self.gatts_if,
                conn.0,
                attr_handle,
                data.len() as u16,
                data.as_ptr() as *mut u8,
                true,
            )
        })
    }

    fn initiate_security(&mut self, conn: ConnHandle) -> Result<(), StackError> {
        let mut bda = self
            .peer_of(conn)
            .ok_or(StackError(ESP_ERR_NOT_FOUND as i32))?;
        check(unsafe {
            esp_ble_set_encryption(bda.as_mut_ptr(), esp_ble_sec_act_t_ESP_BLE_SEC_ENCRYPT_MITM)
        })
    }

    fn delete_bond(&mut self, peer: &PeerAddr) -> Result<(), StackError> {
        let mut bda = peer.addr;
        check(unsafe { esp_ble_remove_bond_device(bda.as_mut_ptr()) })
    }
}

fn is_bonded(bda: &[u8; 6]) -> bool {
    let count = unsafe { esp_ble_get_bond_device_num() };
    if count <= 0 {
        return false;
    }
    let mut num = count;
    // SAFETY: zeroed is a valid bit pattern for esp_ble_bond_dev_t.
    let mut list: Vec<esp_ble_bond_dev_t> =
        (0..count).map(|_| unsafe { core::mem::zeroed() }).collect();
    if unsafe { esp_ble_get_bond_device_list(&mut num, list.as_mut_ptr()) } != ESP_OK as esp_err_t {
        return false;
    }
    list.iter()
        .take(num.max(0) as usize)
        .any(|dev| dev.bd_addr == *bda)
}

// ───────────────────────────────────────────────────────────────
// GAP callback
// ───────────────────────────────────────────────────────────────

unsafe extern "C" fn gap_event_handler(
    event: esp_gap_ble_cb_event_t,
    param: *mut esp_ble_gap_cb_param_t,
) {
    match event {
        esp_gap_ble_cb_event_t_ESP_GAP_BLE_ADV_DATA_RAW_SET_COMPLETE_EVT => {
            debug!("BLE GAP: advertising data set");
        }
        esp_gap_ble_cb_event_t_ESP_GAP_BLE_SCAN_RSP_DATA_RAW_SET_COMPLETE_EVT => {
            debug!("BLE GAP: scan response set");
        }
        esp_gap_ble_cb_event_t_ESP_GAP_BLE_ADV_START_COMPLETE_EVT => {
            let status = unsafe { (*param).adv_start_cmpl.status };
            if status == esp_bt_status_t_ESP_BT_STATUS_SUCCESS {
                info!("BLE GAP: advertising started");
            } else {
                warn!("BLE GAP: advertising start failed (status={})", status);
            }
        }
        esp_gap_ble_cb_event_t_ESP_GAP_BLE_SEC_REQ_EVT => unsafe {
            esp_ble_gap_security_rsp((*param).ble_security.ble_req.bd_addr.as_mut_ptr(), true);
        },
        esp_gap_ble_cb_event_t_ESP_GAP_BLE_AUTH_CMPL_EVT => {
            let auth = unsafe { &(*param).ble_security.auth_cmpl };
            on_auth_complete(auth.bd_addr, auth.success, auth.fail_reason as i32);
        }
        _ => {}
    }
}

fn on_auth_complete(mut bda: [u8; 6], success: bool, reason: i32) {
    let Some(shared) = peripheral() else {
        return;
    };
    let Some(conn) = shared.with(|p| p.stack().conn_of(&bda)) else {
        warn!("BLE GAP: auth complete for unknown peer");
        return;
    };

    let event = if success {
        GapEvent::EncryptionChange { conn, status: 0 }
    } else if is_bonded(&bda) {
        warn!("BLE GAP: auth failed with bonded peer (reason={})", reason);
        GapEvent::RepeatPairing { conn }
    } else {
        GapEvent::EncryptionChange {
            conn,
            status: reason,
        }
    };

    if shared.handle_gap_event(event) == GapReply::RetryPairing {
        let rc = unsafe {
            esp_ble_set_encryption(bda.as_mut_ptr(), esp_ble_sec_act_t_ESP_BLE_SEC_ENCRYPT_MITM)
        };
        if rc != ESP_OK as esp_err_t {
            warn!("BLE GAP: pairing retry failed ({})", rc);
        }
    }
}

// ───────────────────────────────────────────────────────────────
// GATTS callback
// ───────────────────────────────────────────────────────────────

unsafe extern "C" fn gatts_event_handler(
    event: esp_gatts_cb_event_t,
    gatts_if: esp_gatt_if_t,
    param: *mut esp_ble_gatts_cb_param_t,
) {
    match event {
        esp_gatts_cb_event_t_ESP_GATTS_REG_EVT => {
            let status = unsafe { (*param).reg.status };
            if status == esp_gatt_status_t_ESP_GATT_OK {
                info!("BLE GATTS: app registered (if={})", gatts_if);
                GATTS_IF.store(gatts_if, Ordering::Release);
            } else {
                error!("BLE GATTS: app registration failed (status={})", status);
            }
        }
        esp_gatts_cb_event_t_ESP_GATTS_CREAT_ATTR_TAB_EVT => {
            let tab = unsafe { &(*param).add_attr_tab };
            let result = if tab.status == esp_gatt_status_t_ESP_GATT_OK && tab.num_handle > 0 {
                Ok(unsafe { *tab.handles })
            } else {
                Err(tab.status as i32)
            };
            if let Ok(mut slot) = ATTR_TAB_RESULT.lock() {
                *slot = Some(result);
            }
        }
        esp_gatts_cb_event_t_ESP_GATTS_CONNECT_EVT => {
            let p = unsafe { &(*param).connect };
            let conn = ConnHandle(p.conn_id);
            let peer = if p.ble_addr_type == esp_ble_addr_type_t_BLE_ADDR_TYPE_PUBLIC {
                PeerAddr::public(p.remote_bda)
            } else {
                PeerAddr::random(p.remote_bda)
            };
            if let Some(shared) = peripheral() {
                shared.with(|per| {
                    per.stack_mut().note_link(conn, p.remote_bda);
                    per.handle_gap_event(GapEvent::Connect {
                        status: 0,
                        conn,
                        peer,
                    })
                });
            }
        }
        esp_gatts_cb_event_t_ESP_GATTS_DISCONNECT_EVT => {
            let p = unsafe { &(*param).disconnect };
            let conn = ConnHandle(p.conn_id);
            if let Some(shared) = peripheral() {
                shared.with(|per| {
                    per.handle_gap_event(GapEvent::Disconnect {
                        conn,
                        reason: p.reason as i32,
                    });
                    per.stack_mut().link = None;
                });
            }
        }
        esp_gatts_cb_event_t_ESP_GATTS_MTU_EVT => {
            let p = unsafe { &(*param).mtu };
            if let Some(shared) = peripheral() {
                shared.handle_gap_event(GapEvent::Mtu {
                    conn: ConnHandle(p.conn_id),
                    value: p.mtu,
                });
            }
        }
        esp_gatts_cb_event_t_ESP_GATTS_READ_EVT => {
            let p = unsafe { &(*param).read };
            on_read(gatts_if, p.conn_id, p.trans_id, p.handle, p.offset, p.need_rsp);
        }
        esp_gatts_cb_event_t_ESP_GATTS_WRITE_EVT => {
            let p = unsafe { &(*param).write };
            let data = if p.value.is_null() {
                &[][..]
            } else {
                unsafe { core::slice::from_raw_parts(p.value, p.len as usize) }
            };
            on_write(gatts_if, p, data);
        }
        esp_gatts_cb_event_t_ESP_GATTS_EXEC_WRITE_EVT => {
            let p = unsafe { &(*param).exec_write };
            send_response(gatts_if, p.conn_id, p.trans_id, esp_gatt_status_t_ESP_GATT_OK, None);
        }
        _ => {}
    }
}

fn is_descriptor(shared: &SharedPeripheral<BluedroidStack>, handle: u16) -> bool {
    shared.with(|p| p.attribute(handle).map(|a| a.kind)) == Some(AttrKind::Descriptor)
}

fn on_read(gatts_if: u8, conn_id: u16, trans_id: u32, handle: u16, offset: u16, need_rsp: bool) {
    let Some(shared) = peripheral() else {
        return;
    };
    let mut storage = [0u8; MAX_ATTR_LEN];
    let mut buf = AttBuf::new(&mut storage);
    let access = if is_descriptor(shared, handle) {
        Access::ReadDsc(&mut buf)
    } else {
        Access::ReadChr(&mut buf)
    };
    let result = shared.on_access(ConnHandle(conn_id), handle, access);
    if !need_rsp {
        return;
    }
    match result {
        Ok(()) => {
            let value = buf.as_slice();
            let offset = offset as usize;
            if offset > value.len() {
                send_response(
                    gatts_if,
                    conn_id,
                    trans_id,
                    esp_gatt_status_t_ESP_GATT_INVALID_OFFSET,
                    None,
                );
                return;
            }
            send_response(
                gatts_if,
                conn_id,
                trans_id,
                esp_gatt_status_t_ESP_GATT_OK,
                Some((handle, offset as u16, &value[offset..])),
            );
        }
        Err(e) => send_response(gatts_if, conn_id, trans_id, e.att_code() as _, None),
    }
}

fn on_write(gatts_if: u8, p: &esp_ble_gatts_cb_param_t_gatts_write_evt_param, data: &[u8]) {
    let Some(shared) = peripheral() else {
        return;
    };
    let status = if p.is_prep {
        // Long writes are not needed by any attribute this server exposes.
        esp_gatt_status_t_ESP_GATT_REQ_NOT_SUPPORTED
    } else if p.offset != 0 {
        esp_gatt_status_t_ESP_GATT_INVALID_OFFSET
    } else {
        let access = if is_descriptor(shared, p.handle) {
            Access::WriteDsc(data)
        } else {
            Access::WriteChr(data)
        };
        match shared.on_access(ConnHandle(p.conn_id), p.handle, access) {
            Ok(()) => esp_gatt_status_t_ESP_GATT_OK,
            Err(e) => e.att_code() as _,
        }
    };
    if p.need_rsp {
        send_response(gatts_if, p.conn_id, p.trans_id, status, None);
    }
}

fn send_response(
    gatts_if: u8,
    conn_id: u16,
    trans_id: u32,
    status: esp_gatt_status_t,
    value: Option<(u16, u16, &[u8])>,
) {
    // SAFETY: zeroed is a valid bit pattern for the response union.
    let mut rsp: esp_gatt_rsp_t = unsafe { core::mem::zeroed() };
    if let Some((handle, offset, data)) = value {
        // SAFETY: `attr_value` is the active union member for reads.
        let attr = unsafe { &mut rsp.attr_value };
        let len = data.len().min(attr.value.len());
        attr.value[..len].copy_from_slice(&data[..len]);
        attr.handle = handle;
        attr.offset = offset;
        attr.len = len as u16;
    }
    let rc = unsafe { esp_ble_gatts_send_response(gatts_if, conn_id, trans_id, status, &mut rsp) };
    if rc != ESP_OK as esp_err_t {
        warn!("BLE GATTS: send_response failed ({})", rc);
    }
}
