//! FFI bindings for DriveGuard
//!
//! This module provides C-compatible functions for calling DriveGuard from other languages.
//! All functions use C strings (null-terminated) and return allocated memory that
//! must be freed by the caller using `dg_free_string`.

use std::cell::RefCell;
use std::ffi::{CStr, CString};
use std::os::raw::c_char;
use std::ptr;

use crate::config::EngineConfig;
use crate::fallback::{FallbackPolicy, UnavailableReason};
use crate::pipeline::DashboardEngine;

// Thread-local storage for the last error message
thread_local! {
    static LAST_ERROR: RefCell<Option<CString>> = const { RefCell::new(None) };
}

/// Set the last error message
fn set_last_error(msg: &str) {
    LAST_ERROR.with(|e| {
        *e.borrow_mut() = CString::new(msg).ok();
    });
}

/// Clear the last error message
fn clear_last_error() {
    LAST_ERROR.with(|e| {
        *e.borrow_mut() = None;
    });
}

/// Helper to convert C string to Rust string
unsafe fn cstr_to_string(ptr: *const c_char) -> Option<String> {
    if ptr.is_null() {
        return None;
    }
    CStr::from_ptr(ptr).to_str().ok().map(|s| s.to_string())
}

/// Helper to convert Rust string to C string (caller must free)
fn string_to_cstr(s: &str) -> *mut c_char {
    match CString::new(s) {
        Ok(cstr) => cstr.into_raw(),
        Err(_) => ptr::null_mut(),
    }
}

fn to_json_cstr<T: serde::Serialize>(value: &T) -> *mut c_char {
    match serde_json::to_string(value) {
        Ok(json) => string_to_cstr(&json),
        Err(e) => {
            set_last_error(&e.to_string());
            ptr::null_mut()
        }
    }
}

// ============================================================================
// Engine Lifecycle
// ============================================================================

/// Opaque handle to a DashboardEngine
pub struct EngineHandle {
    engine: DashboardEngine,
}

/// Create an engine from a JSON config, or with defaults if `config_json` is NULL.
///
/// # Safety
/// - `config_json` must be NULL or a valid null-terminated C string.
/// - Returns a pointer that must be freed with `dg_engine_free`.
/// - Returns NULL on error; call `dg_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn dg_engine_new(config_json: *const c_char) -> *mut EngineHandle {
    clear_last_error();

    let config = if config_json.is_null() {
        EngineConfig::default()
    } else {
        let json_str = match cstr_to_string(config_json) {
            Some(s) => s,
            None => {
                set_last_error("Invalid config string pointer");
                return ptr::null_mut();
            }
        };
        match EngineConfig::from_json(&json_str) {
            Ok(config) => config,
            Err(e) => {
                set_last_error(&e.to_string());
                return ptr::null_mut();
            }
        }
    };

    match DashboardEngine::from_config(&config) {
        Ok(engine) => Box::into_raw(Box::new(EngineHandle { engine })),
        Err(e) => {
            set_last_error(&e.to_string());
            ptr::null_mut()
        }
    }
}

/// Free an engine.
///
/// # Safety
/// - `engine` must be a valid pointer returned by `dg_engine_new`, or NULL.
/// - After calling this function, the pointer is invalid.
#[no_mangle]
pub unsafe extern "C" fn dg_engine_free(engine: *mut EngineHandle) {
    if !engine.is_null() {
        drop(Box::from_raw(engine));
    }
}

// ============================================================================
// Resolution & Aggregation
// ============================================================================

/// Resolve a raw incident identifier given as JSON (`3`, `"phone"`, `null`, ...).
///
/// # Safety
/// - `engine` must be a valid pointer returned by `dg_engine_new`.
/// - `raw_json` must be a valid null-terminated C string.
/// - Returns NormalizationResult JSON that must be freed with `dg_free_string`.
/// - Returns NULL on error; call `dg_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn dg_resolve(
    engine: *const EngineHandle,
    raw_json: *const c_char,
) -> *mut c_char {
    clear_last_error();

    if engine.is_null() {
        set_last_error("Null engine pointer");
        return ptr::null_mut();
    }

    let handle = &*engine;

    let json_str = match cstr_to_string(raw_json) {
        Some(s) => s,
        None => {
            set_last_error("Invalid JSON string pointer");
            return ptr::null_mut();
        }
    };

    // Unparseable text is itself treated as a free-text identifier
    let value = serde_json::from_str::<serde_json::Value>(&json_str)
        .unwrap_or(serde_json::Value::String(json_str));

    to_json_cstr(&handle.engine.resolve_value(&value))
}

/// Build a dashboard snapshot from a request body
/// (`{"tripCount": .., "incidents": [..], "scores": [..]}`).
///
/// A malformed body yields the fallback snapshot rather than NULL.
///
/// # Safety
/// - `engine` must be a valid pointer returned by `dg_engine_new`.
/// - `request_json` must be a valid null-terminated C string.
/// - Returns snapshot JSON that must be freed with `dg_free_string`.
/// - Returns NULL only for invalid pointers; call `dg_last_error` for details.
#[no_mangle]
pub unsafe extern "C" fn dg_dashboard(
    engine: *const EngineHandle,
    request_json: *const c_char,
) -> *mut c_char {
    clear_last_error();

    if engine.is_null() {
        set_last_error("Null engine pointer");
        return ptr::null_mut();
    }

    let handle = &*engine;

    let snapshot = match cstr_to_string(request_json) {
        Some(json_str) => handle.engine.snapshot_from_json(&json_str),
        None => FallbackPolicy::snapshot(UnavailableReason::Malformed),
    };

    to_json_cstr(&snapshot)
}

/// Get the fallback snapshot served when upstream data is unavailable.
///
/// # Safety
/// - Returns snapshot JSON that must be freed with `dg_free_string`.
#[no_mangle]
pub unsafe extern "C" fn dg_fallback_snapshot() -> *mut c_char {
    clear_last_error();
    to_json_cstr(&FallbackPolicy::snapshot(UnavailableReason::Transport))
}

// ============================================================================
// Memory Management
// ============================================================================

/// Free a string returned by DriveGuard functions.
///
/// # Safety
/// - `ptr` must be a valid pointer returned by a DriveGuard function, or NULL.
/// - After calling this function, the pointer is invalid.
#[no_mangle]
pub unsafe extern "C" fn dg_free_string(ptr: *mut c_char) {
    if !ptr.is_null() {
        drop(CString::from_raw(ptr));
    }
}

// ============================================================================
// Error Handling
// ============================================================================

/// Get the last error message.
///
/// # Safety
/// - Returns a pointer to a thread-local error string.
/// - The returned pointer is valid until the next DriveGuard call on this thread.
/// - Do NOT free the returned pointer.
/// - Returns NULL if no error occurred.
#[no_mangle]
pub unsafe extern "C" fn dg_last_error() -> *const c_char {
    LAST_ERROR.with(|e| match &*e.borrow() {
        Some(cstr) => cstr.as_ptr(),
        None => ptr::null(),
    })
}

// ============================================================================
// Version Information
// ============================================================================

/// Get the DriveGuard library version.
///
/// # Safety
/// - Returns a pointer to a static string. Do NOT free.
#[no_mangle]
pub unsafe extern "C" fn dg_version() -> *const c_char {
    static VERSION: &[u8] = concat!(env!("CARGO_PKG_VERSION"), "\0").as_bytes();
    VERSION.as_ptr() as *const c_char
}
