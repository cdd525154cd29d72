//! `web-sys` bindings for [`Browser`] and [`SessionStore`].
//!
//! Both types are stateless handles that look up `window` on every call, so
//! they satisfy the `Send + Sync` bounds of the traits.

use wasm_bindgen::JsValue;
use web_sys::{Storage, Window};

use crate::browser::{Browser, SessionStore};
use crate::error::{ClientError, ClientResult};

fn window() -> ClientResult<Window> {
    web_sys::window().ok_or_else(|| ClientError::Browser("no window".to_string()))
}

fn browser_error(context: &str, err: JsValue) -> ClientError {
    ClientError::Browser(format!("{context}: {err:?}"))
}

fn storage_error(context: &str, err: JsValue) -> ClientError {
    ClientError::Storage(format!("{context}: {err:?}"))
}

#[derive(Debug, Default, Clone, Copy)]
pub struct WebBrowser;

impl Browser for WebBrowser {
    fn href(&self) -> ClientResult<String> {
        window()?
            .location()
            .href()
            .map_err(|e| browser_error("location.href", e))
    }

    fn pathname(&self) -> ClientResult<String> {
        window()?
            .location()
            .pathname()
            .map_err(|e| browser_error("location.pathname", e))
    }

    fn origin(&self) -> ClientResult<String> {
        window()?
            .location()
            .origin()
            .map_err(|e| browser_error("location.origin", e))
    }

    fn replace_history(&self, url: &str) -> ClientResult<()> {
        window()?
            .history()
            .map_err(|e| browser_error("history", e))?
            .replace_state_with_url(&JsValue::NULL, "", Some(url))
            .map_err(|e| browser_error("history.replaceState", e))
    }

    fn navigate(&self, url: &str) -> ClientResult<()> {
        window()?
            .location()
            .assign(url)
            .map_err(|e| browser_error("location.assign", e))
    }
}

/// `window.sessionStorage`
#[derive(Debug, Default, Clone, Copy)]
pub struct WebSessionStorage;

impl WebSessionStorage {
    fn storage(&self) -> ClientResult<Storage> {
        window()?
            .session_storage()
            .map_err(|e| storage_error("sessionStorage", e))?
            .ok_or_else(|| ClientError::Storage("sessionStorage unavailable".to_string()))
    }
}

impl SessionStore for WebSessionStorage {
    fn get(&self, key: &str) -> ClientResult<Option<String>> {
        self.storage()?
            .get_item(key)
            .map_err(|e| storage_error("getItem", e))
    }

    fn set(&self, key: &str, value: &str) -> ClientResult<()> {
        self.storage()?
            .set_item(key, value)
            .map_err(|e| storage_error("setItem", e))
    }

    fn remove(&self, key: &str) -> ClientResult<()> {
        self.storage()?
            .remove_item(key)
            .map_err(|e| storage_error("removeItem", e))
    }

    fn keys(&self) -> ClientResult<Vec<String>> {
        let storage = self.storage()?;
        let length = storage.length().map_err(|e| storage_error("length", e))?;

        let mut keys = Vec::with_capacity(length as usize);
        for index in 0..length {
            if let Some(key) = storage.key(index).map_err(|e| storage_error("key", e))? {
                keys.push(key);
            }
        }
        Ok(keys)
    }
}
