//! NVS (Non-Volatile Storage) adapter.
//!
//! Implements [`ConfigPort`] for the peripheral configuration.  The blob
//! is the postcard encoding of [`PeripheralConfig`], stored under a single
//! key in the `blekbd` namespace.
//!
//! - Validation: [`PeripheralConfig::to_postcard`] range-checks before
//!   anything is written; invalid configs never reach flash.
//! - Atomic writes: ESP-IDF NVS commits are atomic per `nvs_commit()`.
//! - Host builds keep the blob in an in-memory map (dev/test only).

use log::{info, warn};

use crate::app::ports::ConfigPort;
use crate::config::PeripheralConfig;
use crate::error::ConfigError;

#[cfg(not(feature = "espidf"))]
use std::collections::HashMap;

#[cfg(feature = "espidf")]
use esp_idf_svc::sys::*;

const CONFIG_NAMESPACE: &str = "blekbd";
#[cfg_attr(not(feature = "espidf"), allow(dead_code))]
const CONFIG_KEY: &[u8] = b"cfg\0";

#[cfg_attr(not(feature = "espidf"), allow(dead_code))]
const MAX_BLOB_SIZE: usize = 512;

pub struct NvsAdapter {
    #[cfg(not(feature = "espidf"))]
    store: HashMap<&'static str, Vec<u8>>,
}

impl NvsAdapter {
    /// Create the adapter and initialise NVS flash.
    ///
    /// On first boot or after a version mismatch the partition is erased
    /// and re-initialised.
    pub fn new() -> Result<Self, ConfigError> {
        #[cfg(feature = "espidf")]
        {
            // SAFETY: called once from the main task before any other NVS user.
            let ret = unsafe { nvs_flash_init() };
            if ret == ESP_ERR_NVS_NO_FREE_PAGES || ret == ESP_ERR_NVS_NEW_VERSION_FOUND {
                warn!("NVS: erasing and re-initialising flash partition");
                if unsafe { nvs_flash_erase() } != ESP_OK {
                    return Err(ConfigError::Io);
                }
                if unsafe { nvs_flash_init() } != ESP_OK {
                    return Err(ConfigError::Io);
                }
            } else if ret != ESP_OK {
                return Err(ConfigError::Io);
            }
            info!("NvsAdapter: ESP-IDF NVS initialised");
        }

        #[cfg(not(feature = "espidf"))]
        info!("NvsAdapter: simulation backend");

        Ok(Self {
            #[cfg(not(feature = "espidf"))]
            store: HashMap::new(),
        })
    }

    /// Load the stored config, falling back to defaults when the blob is
    /// unreadable.  Storage errors are logged, never fatal at boot.
    pub fn load_or_default(&self) -> PeripheralConfig {
        match self.load() {
            Ok(cfg) => cfg,
            Err(e) => {
                warn!("NvsAdapter: {}; using defaults", e);
                PeripheralConfig::default()
            }
        }
    }

    /// Open the config namespace, run `f` with the handle, then close.
    #[cfg(feature = "espidf")]
    fn with_nvs_handle<F, T>(write: bool, f: F) -> Result<T, i32>
    where
        F: FnOnce(nvs_handle_t) -> Result<T, i32>,
    {
        let mut ns_buf = [0u8; 16];
        let ns = CONFIG_NAMESPACE.as_bytes();
        ns_buf[..ns.len()].copy_from_slice(ns);

        let mut handle: nvs_handle_t = 0;
        let mode = if write {
            nvs_open_mode_t_NVS_READWRITE
        } else {
            nvs_open_mode_t_NVS_READONLY
        };

        let ret = unsafe { nvs_open(ns_buf.as_ptr() as *const _, mode, &mut handle) };
        if ret != ESP_OK {
            return Err(ret);
        }

        let result = f(handle);
        unsafe {
            nvs_close(handle);
        }
        result
    }

    #[cfg(feature = "espidf")]
    fn read_blob() -> Result<Option<Vec<u8>>, i32> {
        let result = Self::with_nvs_handle(false, |handle| {
            let mut size: usize = 0;
            let ret = unsafe {
                nvs_get_blob(
                    handle,
                    CONFIG_KEY.as_ptr() as *const _,
                    core::ptr::null_mut(),
                    &mut size,
                )
            };
            if ret != ESP_OK {
                return Err(ret);
            }
            if size == 0 || size > MAX_BLOB_SIZE {
                return Err(ESP_ERR_NVS_INVALID_LENGTH);
            }

            let mut buf = vec![0u8; size];
            let ret = unsafe {
                nvs_get_blob(
                    handle,
                    CONFIG_KEY.as_ptr() as *const _,
                    buf.as_mut_ptr() as *mut _,
                    &mut size,
                )
            };
            if ret != ESP_OK {
                return Err(ret);
            }
            buf.truncate(size);
            Ok(buf)
        });
        match result {
            Ok(buf) => Ok(Some(buf)),
            // A missing namespace or key both mean "never saved".
            Err(e) if e == ESP_ERR_NVS_NOT_FOUND => Ok(None),
            Err(e) => Err(e),
        }
    }

    #[cfg(feature = "espidf")]
    fn write_blob(bytes: &[u8]) -> Result<(), i32> {
        Self::with_nvs_handle(true, |handle| {
            let ret = unsafe {
                nvs_set_blob(
                    handle,
                    CONFIG_KEY.as_ptr() as *const _,
                    bytes.as_ptr() as *const _,
                    bytes.len(),
                )
            };
            if ret != ESP_OK {
                return Err(ret);
            }
            let ret = unsafe { nvs_commit(handle) };
            if ret != ESP_OK {
                return Err(ret);
            }
            Ok(())
        })
    }

    /// Remove the stored config; the next load returns defaults.
    pub fn erase(&mut self) -> Result<(), ConfigError> {
        #[cfg(not(feature = "espidf"))]
        {
            self.store.remove(CONFIG_NAMESPACE);
            Ok(())
        }

        #[cfg(feature = "espidf")]
        {
            let result = Self::with_nvs_handle(true, |handle| {
                let ret = unsafe { nvs_erase_key(handle, CONFIG_KEY.as_ptr() as *const _) };
                if ret != ESP_OK && ret != ESP_ERR_NVS_NOT_FOUND {
                    return Err(ret);
                }
                let ret = unsafe { nvs_commit(handle) };
                if ret != ESP_OK {
                    return Err(ret);
                }
                Ok(())
            });
            match result {
                Ok(()) | Err(ESP_ERR_NVS_NOT_FOUND) => Ok(()),
                Err(e) => {
                    warn!("NvsAdapter: NVS erase error {}", e);
                    Err(ConfigError::Io)
                }
            }
        }
    }

    /// Overwrite the stored blob without validation.  Test hook for
    /// exercising the corruption path.
    #[cfg(not(feature = "espidf"))]
    pub fn put_raw(&mut self, bytes: &[u8]) {
        self.store.insert(CONFIG_NAMESPACE, bytes.to_vec());
    }
}

impl ConfigPort for NvsAdapter {
    fn load(&self) -> Result<PeripheralConfig, ConfigError> {
        #[cfg(not(feature = "espidf"))]
        let stored = self.store.get(CONFIG_NAMESPACE).cloned();

        #[cfg(feature = "espidf")]
        let stored = Self::read_blob().map_err(|e| {
            warn!("NvsAdapter: NVS read error {}", e);
            ConfigError::Io
        })?;

        match stored {
            Some(bytes) => {
                let cfg = PeripheralConfig::from_postcard(&bytes)?;
                info!("NvsAdapter: loaded config ({} bytes)", bytes.len());
                Ok(cfg)
            }
            None => {
                info!("NvsAdapter: no stored config, using defaults");
                Ok(PeripheralConfig::default())
            }
        }
    }

    fn save(&mut self, config: &PeripheralConfig) -> Result<(), ConfigError> {
        let bytes = config.to_postcard()?;
        if bytes.len() > MAX_BLOB_SIZE {
            return Err(ConfigError::Invalid("encoded config too large"));
        }

        #[cfg(not(feature = "espidf"))]
        self.store.insert(CONFIG_NAMESPACE, bytes.clone());

        #[cfg(feature = "espidf")]
        Self::write_blob(&bytes).map_err(|e| {
            warn!("NvsAdapter: NVS write error {}", e);
            ConfigError::Io
        })?;

        info!("NvsAdapter: config saved ({} bytes)", bytes.len());
        Ok(())
    }
}
