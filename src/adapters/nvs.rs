//! NVS (Non-Volatile Storage) adapter.
//!
//! Implements [`ConfigPort`] (postcard blob) and [`CountStore`] (plain
//! `u32`) in the `wattmeter` namespace.
//!
//! - Config validation: the config is validated before it is persisted
//!   and again after it is loaded.
//! - Atomic writes: ESP-IDF NVS commits are atomic per `nvs_commit()`.
//! - The simulation backend keeps everything in memory (dev/test only).

use crate::app::ports::{ConfigPort, CountStore};
use crate::config::MeterConfig;
use crate::error::{Error, StorageError};
use log::info;

#[cfg(target_os = "espidf")]
use log::warn;

#[cfg(not(target_os = "espidf"))]
use std::collections::HashMap;

#[cfg(target_os = "espidf")]
use esp_idf_svc::sys::*;

#[cfg(target_os = "espidf")]
const NAMESPACE: &[u8] = b"wattmeter\0";
const CONFIG_KEY: &[u8] = b"metercfg\0";
#[cfg(target_os = "espidf")]
const COUNT_KEY: &[u8] = b"count\0";

#[cfg(target_os = "espidf")]
const MAX_BLOB_SIZE: usize = 256;

pub struct NvsAdapter {
    #[cfg(not(target_os = "espidf"))]
    blobs: std::cell::RefCell<HashMap<&'static [u8], Vec<u8>>>,
    #[cfg(not(target_os = "espidf"))]
    count: Option<u32>,
}

impl NvsAdapter {
    /// Create a new NvsAdapter and initialise NVS flash.
    ///
    /// On first boot or after a version mismatch the NVS partition is
    /// erased and re-initialised automatically.
    pub fn new() -> Result<Self, StorageError> {
        #[cfg(target_os = "espidf")]
        {
            // SAFETY: nvs_flash_init / nvs_flash_erase are called from the
            // single main-task context before any concurrent NVS access.
            let ret = unsafe { nvs_flash_init() };
            if ret == ESP_ERR_NVS_NO_FREE_PAGES || ret == ESP_ERR_NVS_NEW_VERSION_FOUND {
                warn!("NVS: erasing and re-initialising flash partition");
                let ret2 = unsafe { nvs_flash_erase() };
                if ret2 != ESP_OK {
                    return Err(StorageError::IoError);
                }
                let ret3 = unsafe { nvs_flash_init() };
                if ret3 != ESP_OK {
                    return Err(StorageError::IoError);
                }
            } else if ret != ESP_OK {
                return Err(StorageError::IoError);
            }
            info!("NvsAdapter: ESP-IDF NVS initialised");
        }

        #[cfg(not(target_os = "espidf"))]
        info!("NvsAdapter: simulation backend");

        Ok(Self {
            #[cfg(not(target_os = "espidf"))]
            blobs: std::cell::RefCell::new(HashMap::new()),
            #[cfg(not(target_os = "espidf"))]
            count: None,
        })
    }

    /// Open the namespace, execute a closure with the handle, then close.
    #[cfg(target_os = "espidf")]
    fn with_nvs_handle<F, T>(write: bool, f: F) -> Result<T, i32>
    where
        F: FnOnce(nvs_handle_t) -> Result<T, i32>,
    {
        let mut handle: nvs_handle_t = 0;
        let mode = if write {
            nvs_open_mode_t_NVS_READWRITE
        } else {
            nvs_open_mode_t_NVS_READONLY
        };

        let ret = unsafe { nvs_open(NAMESPACE.as_ptr() as *const _, mode, &mut handle) };
        if ret != ESP_OK {
            return Err(ret);
        }

        let result = f(handle);
        unsafe {
            nvs_close(handle);
        }
        result
    }

    #[cfg(target_os = "espidf")]
    fn commit(handle: nvs_handle_t) -> Result<(), i32> {
        let ret = unsafe { nvs_commit(handle) };
        if ret != ESP_OK {
            return Err(ret);
        }
        Ok(())
    }
}

fn decode_config(bytes: &[u8]) -> Result<MeterConfig, Error> {
    let cfg: MeterConfig =
        postcard::from_bytes(bytes).map_err(|_| Error::Storage(StorageError::Corrupted))?;
    cfg.validate()?;
    Ok(cfg)
}

impl ConfigPort for NvsAdapter {
    fn load(&self) -> Result<MeterConfig, Error> {
        #[cfg(not(target_os = "espidf"))]
        {
            if let Some(bytes) = self.blobs.borrow().get(CONFIG_KEY) {
                let cfg = decode_config(bytes)?;
                info!("NvsAdapter: loaded config from store");
                Ok(cfg)
            } else {
                info!("NvsAdapter: no stored config, using defaults");
                Ok(MeterConfig::default())
            }
        }

        #[cfg(target_os = "espidf")]
        {
            let result = Self::with_nvs_handle(false, |handle| {
                let mut size: usize = 0;

                // First call: get size
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
                Ok(buf)
            });

            match result {
                Ok(bytes) => {
                    let cfg = decode_config(&bytes)?;
                    info!("NvsAdapter: loaded config from NVS ({} bytes)", bytes.len());
                    Ok(cfg)
                }
                // A namespace that was never written cannot be opened
                // read-only; both cases mean "nothing stored".
                Err(e) if e == ESP_ERR_NVS_NOT_FOUND => {
                    info!("NvsAdapter: no stored config, using defaults");
                    Ok(MeterConfig::default())
                }
                Err(e) => {
                    warn!("NvsAdapter: NVS read error {}, using defaults", e);
                    Ok(MeterConfig::default())
                }
            }
        }
    }

    fn save(&mut self, config: &MeterConfig) -> Result<(), Error> {
        config.validate()?;
        let bytes =
            postcard::to_allocvec(config).map_err(|_| Error::Storage(StorageError::IoError))?;

        #[cfg(not(target_os = "espidf"))]
        {
            let len = bytes.len();
            self.blobs.borrow_mut().insert(CONFIG_KEY, bytes);
            info!("NvsAdapter: config saved (simulation, {} bytes)", len);
            Ok(())
        }

        #[cfg(target_os = "espidf")]
        {
            let result = Self::with_nvs_handle(true, |handle| {
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
                Self::commit(handle)
            });
            match result {
                Ok(()) => {
                    info!("NvsAdapter: config saved to NVS ({} bytes)", bytes.len());
                    Ok(())
                }
                Err(e) if e == ESP_ERR_NVS_NOT_ENOUGH_SPACE => {
                    warn!("NvsAdapter: NVS full");
                    Err(Error::Storage(StorageError::Full))
                }
                Err(e) => {
                    warn!("NvsAdapter: NVS write error {}", e);
                    Err(Error::Storage(StorageError::IoError))
                }
            }
        }
    }
}

impl CountStore for NvsAdapter {
    fn load_count(&self) -> Result<Option<u32>, StorageError> {
        #[cfg(not(target_os = "espidf"))]
        {
            Ok(self.count)
        }

        #[cfg(target_os = "espidf")]
        {
            let result = Self::with_nvs_handle(false, |handle| {
                let mut value: u32 = 0;
                let ret = unsafe { nvs_get_u32(handle, COUNT_KEY.as_ptr() as *const _, &mut value) };
                if ret != ESP_OK {
                    return Err(ret);
                }
                Ok(value)
            });
            match result {
                Ok(value) => Ok(Some(value)),
                Err(e) if e == ESP_ERR_NVS_NOT_FOUND => Ok(None),
                Err(e) => {
                    warn!("NvsAdapter: count read error {}", e);
                    Err(StorageError::IoError)
                }
            }
        }
    }

    fn save_count(&mut self, count: u32) -> Result<(), StorageError> {
        #[cfg(not(target_os = "espidf"))]
        {
            self.count = Some(count);
            Ok(())
        }

        #[cfg(target_os = "espidf")]
        {
            let result = Self::with_nvs_handle(true, |handle| {
                let ret = unsafe { nvs_set_u32(handle, COUNT_KEY.as_ptr() as *const _, count) };
                if ret != ESP_OK {
                    return Err(ret);
                }
                Self::commit(handle)
            });
            result.map_err(|e| {
                warn!("NvsAdapter: count write error {}", e);
                if e == ESP_ERR_NVS_NOT_ENOUGH_SPACE {
                    StorageError::Full
                } else {
                    StorageError::IoError
                }
            })
        }
    }
}
