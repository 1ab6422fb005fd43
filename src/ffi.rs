//! FFI bindings for Synheart Wayfind
//!
//! This module provides C-compatible functions for driving a recognizer from other languages.
//! All functions use C strings (null-terminated) and return allocated memory that
//! must be freed by the caller using `wayfind_free_string`.

use std::cell::RefCell;
use std::ffi::{CStr, CString};
use std::os::raw::c_char;
use std::ptr;

use serde::Serialize;

use crate::adapter::EventAdapter;
use crate::config::RecognizerConfig;
use crate::pipeline::PatternRecognizer;
use crate::types::PredictionContext;

// Thread-local storage for the last error message
thread_local! {
    static LAST_ERROR: RefCell<Option<CString>> = const { RefCell::new(None) };
}

fn set_last_error(msg: &str) {
    LAST_ERROR.with(|e| {
        *e.borrow_mut() = CString::new(msg).ok();
    });
}

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

/// Serialize `value` into a newly allocated C string, NULL on failure
fn json_to_cstr<T: Serialize>(value: &T) -> *mut c_char {
    match serde_json::to_string(value) {
        Ok(json) => string_to_cstr(&json),
        Err(e) => {
            set_last_error(&e.to_string());
            ptr::null_mut()
        }
    }
}

// ============================================================================
// Recognizer API
// ============================================================================

/// Opaque handle to a PatternRecognizer
pub struct WayfindRecognizerHandle {
    recognizer: PatternRecognizer,
}

unsafe fn handle_mut<'a>(
    handle: *mut WayfindRecognizerHandle,
) -> Option<&'a mut WayfindRecognizerHandle> {
    if handle.is_null() {
        set_last_error("Null recognizer pointer");
        return None;
    }
    Some(&mut *handle)
}

/// Create a new recognizer.
///
/// # Safety
/// - `config_json` may be NULL (defaults) or a valid null-terminated C string holding a
///   JSON configuration object; absent fields take their defaults.
/// - Returns a pointer that must be freed with `wayfind_recognizer_free`.
/// - Returns NULL on an invalid configuration; call `wayfind_last_error` for details.
#[no_mangle]
pub unsafe extern "C" fn wayfind_recognizer_new(
    config_json: *const c_char,
) -> *mut WayfindRecognizerHandle {
    clear_last_error();

    let config = if config_json.is_null() {
        RecognizerConfig::default()
    } else {
        let json = match cstr_to_string(config_json) {
            Some(s) => s,
            None => {
                set_last_error("Invalid config string pointer");
                return ptr::null_mut();
            }
        };
        match RecognizerConfig::from_json(&json) {
            Ok(config) => config,
            Err(e) => {
                set_last_error(&e.to_string());
                return ptr::null_mut();
            }
        }
    };

    match PatternRecognizer::with_config(config) {
        Ok(recognizer) => Box::into_raw(Box::new(WayfindRecognizerHandle { recognizer })),
        Err(e) => {
            set_last_error(&e.to_string());
            ptr::null_mut()
        }
    }
}

/// Free a recognizer.
///
/// # Safety
/// - `recognizer` must be a valid pointer returned by `wayfind_recognizer_new`, or NULL.
/// - After calling this function, the pointer is invalid.
#[no_mangle]
pub unsafe extern "C" fn wayfind_recognizer_free(recognizer: *mut WayfindRecognizerHandle) {
    if !recognizer.is_null() {
        drop(Box::from_raw(recognizer));
    }
}

/// Ingest navigation events: a single JSON object, a JSON array, or NDJSON.
///
/// # Safety
/// - `recognizer` must be a valid pointer returned by `wayfind_recognizer_new`.
/// - `events_json` must be a valid null-terminated C string.
/// - Returns the number of events ingested, or -1 if the payload could not be parsed.
#[no_mangle]
pub unsafe extern "C" fn wayfind_recognizer_ingest(
    recognizer: *mut WayfindRecognizerHandle,
    events_json: *const c_char,
) -> i64 {
    clear_last_error();

    let Some(handle) = handle_mut(recognizer) else {
        return -1;
    };
    let json = match cstr_to_string(events_json) {
        Some(s) => s,
        None => {
            set_last_error("Invalid events string pointer");
            return -1;
        }
    };

    match EventAdapter::parse(&json) {
        Ok(events) => {
            let count = events.len() as i64;
            handle.recognizer.ingest_all(events);
            count
        }
        Err(e) => {
            set_last_error(&e.to_string());
            -1
        }
    }
}

/// Predict likely next destinations as a JSON array.
///
/// # Safety
/// - `recognizer` must be a valid pointer returned by `wayfind_recognizer_new`.
/// - `current_url` must be a valid null-terminated C string.
/// - `context_json` may be NULL or a JSON object with optional `time_of_day`,
///   `session_duration_ms` and `recent_searches`.
/// - Returns a newly allocated string that must be freed with `wayfind_free_string`.
/// - Returns NULL on error; call `wayfind_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn wayfind_recognizer_predict(
    recognizer: *mut WayfindRecognizerHandle,
    current_url: *const c_char,
    context_json: *const c_char,
) -> *mut c_char {
    clear_last_error();

    let Some(handle) = handle_mut(recognizer) else {
        return ptr::null_mut();
    };
    let url = match cstr_to_string(current_url) {
        Some(s) => s,
        None => {
            set_last_error("Invalid url string pointer");
            return ptr::null_mut();
        }
    };

    let context = if context_json.is_null() {
        None
    } else {
        let json = match cstr_to_string(context_json) {
            Some(s) => s,
            None => {
                set_last_error("Invalid context string pointer");
                return ptr::null_mut();
            }
        };
        match serde_json::from_str::<PredictionContext>(&json) {
            Ok(context) => Some(context),
            Err(e) => {
                set_last_error(&e.to_string());
                return ptr::null_mut();
            }
        }
    };

    json_to_cstr(&handle.recognizer.predict(&url, context.as_ref()))
}

/// Top patterns as a JSON array.
///
/// # Safety
/// - `recognizer` must be a valid pointer returned by `wayfind_recognizer_new`.
/// - Returns a newly allocated string that must be freed with `wayfind_free_string`.
#[no_mangle]
pub unsafe extern "C" fn wayfind_recognizer_top_patterns(
    recognizer: *mut WayfindRecognizerHandle,
    n: u32,
    min_confidence: f64,
) -> *mut c_char {
    clear_last_error();

    let Some(handle) = handle_mut(recognizer) else {
        return ptr::null_mut();
    };
    json_to_cstr(&handle.recognizer.top_patterns(n as usize, min_confidence))
}

/// Performance metrics as a JSON object.
///
/// # Safety
/// - `recognizer` must be a valid pointer returned by `wayfind_recognizer_new`.
/// - Returns a newly allocated string that must be freed with `wayfind_free_string`.
#[no_mangle]
pub unsafe extern "C" fn wayfind_recognizer_metrics(
    recognizer: *mut WayfindRecognizerHandle,
) -> *mut c_char {
    clear_last_error();

    let Some(handle) = handle_mut(recognizer) else {
        return ptr::null_mut();
    };
    json_to_cstr(&handle.recognizer.performance_metrics())
}

/// Export the full model state as a JSON snapshot.
///
/// # Safety
/// - `recognizer` must be a valid pointer returned by `wayfind_recognizer_new`.
/// - Returns a newly allocated string that must be freed with `wayfind_free_string`.
/// - Returns NULL on error; call `wayfind_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn wayfind_recognizer_export(
    recognizer: *mut WayfindRecognizerHandle,
) -> *mut c_char {
    clear_last_error();

    let Some(handle) = handle_mut(recognizer) else {
        return ptr::null_mut();
    };
    match handle.recognizer.export_json() {
        Ok(json) => string_to_cstr(&json),
        Err(e) => {
            set_last_error(&e.to_string());
            ptr::null_mut()
        }
    }
}

/// Replace the model state with a JSON snapshot.
///
/// # Safety
/// - `recognizer` must be a valid pointer returned by `wayfind_recognizer_new`.
/// - `snapshot_json` must be a valid null-terminated C string.
/// - Returns 0 on success, non-zero on error.
/// - On error, call `wayfind_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn wayfind_recognizer_import(
    recognizer: *mut WayfindRecognizerHandle,
    snapshot_json: *const c_char,
) -> i32 {
    clear_last_error();

    let Some(handle) = handle_mut(recognizer) else {
        return -1;
    };
    let json = match cstr_to_string(snapshot_json) {
        Some(s) => s,
        None => {
            set_last_error("Invalid snapshot string pointer");
            return -1;
        }
    };

    match handle.recognizer.import_json(&json) {
        Ok(()) => 0,
        Err(e) => {
            set_last_error(&e.to_string());
            -1
        }
    }
}

// ============================================================================
// Memory Management
// ============================================================================

/// Free a string returned by Wayfind functions.
///
/// # Safety
/// - `ptr` must be a valid pointer returned by a Wayfind function, or NULL.
/// - After calling this function, the pointer is invalid.
#[no_mangle]
pub unsafe extern "C" fn wayfind_free_string(ptr: *mut c_char) {
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
/// - The returned pointer is valid until the next Wayfind function call on this thread.
/// - Do NOT free the returned pointer.
/// - Returns NULL if no error occurred.
#[no_mangle]
pub unsafe extern "C" fn wayfind_last_error() -> *const c_char {
    LAST_ERROR.with(|e| match &*e.borrow() {
        Some(cstr) => cstr.as_ptr(),
        None => ptr::null(),
    })
}

// ============================================================================
// Version Information
// ============================================================================

/// Get the Wayfind library version.
///
/// # Safety
/// - Returns a pointer to a static string. Do NOT free.
#[no_mangle]
pub unsafe extern "C" fn wayfind_version() -> *const c_char {
    static VERSION: &[u8] = concat!(env!("CARGO_PKG_VERSION"), "\0").as_bytes();
    VERSION.as_ptr() as *const c_char
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::CString;

    fn sample_events() -> CString {
        CString::new(
            r#"[
                {"url": "https://a.com", "timestamp": "2024-01-16T14:00:00Z"},
                {"url": "https://b.com", "referrer": "https://a.com", "timestamp": "2024-01-16T14:00:30Z"},
                {"url": "https://a.com", "timestamp": "2024-01-16T15:00:00Z"},
                {"url": "https://b.com", "referrer": "https://a.com", "timestamp": "2024-01-16T15:00:30Z"}
            ]"#,
        )
        .unwrap()
    }

    unsafe fn take_string(ptr: *mut c_char) -> String {
        assert!(!ptr.is_null());
        let s = CStr::from_ptr(ptr).to_str().unwrap().to_string();
        wayfind_free_string(ptr);
        s
    }

    #[test]
    fn test_ffi_recognizer_lifecycle() {
        unsafe {
            let recognizer = wayfind_recognizer_new(ptr::null());
            assert!(!recognizer.is_null());

            let events = sample_events();
            assert_eq!(wayfind_recognizer_ingest(recognizer, events.as_ptr()), 4);

            let url = CString::new("https://a.com").unwrap();
            let predictions = take_string(wayfind_recognizer_predict(
                recognizer,
                url.as_ptr(),
                ptr::null(),
            ));
            let parsed: serde_json::Value = serde_json::from_str(&predictions).unwrap();
            assert_eq!(parsed[0]["target_url"], "b.com");
            assert_eq!(parsed[0]["type"], "markov");

            let metrics = take_string(wayfind_recognizer_metrics(recognizer));
            let parsed: serde_json::Value = serde_json::from_str(&metrics).unwrap();
            assert_eq!(parsed["events_processed"], 4);

            let patterns = take_string(wayfind_recognizer_top_patterns(recognizer, 10, 0.0));
            assert!(patterns.starts_with('['));

            // Export and import into a fresh recognizer
            let snapshot = wayfind_recognizer_export(recognizer);
            assert!(!snapshot.is_null());
            let recognizer2 = wayfind_recognizer_new(ptr::null());
            assert_eq!(wayfind_recognizer_import(recognizer2, snapshot), 0);
            wayfind_free_string(snapshot);

            let restored = take_string(wayfind_recognizer_predict(
                recognizer2,
                url.as_ptr(),
                ptr::null(),
            ));
            assert_eq!(restored, predictions);

            wayfind_recognizer_free(recognizer);
            wayfind_recognizer_free(recognizer2);
        }
    }

    #[test]
    fn test_ffi_config_and_context() {
        unsafe {
            let bad = CString::new(r#"{"history_capacity": 0}"#).unwrap();
            assert!(wayfind_recognizer_new(bad.as_ptr()).is_null());
            assert!(!wayfind_last_error().is_null());

            let huge_gap = CString::new(r#"{"session_gap_minutes": 4611686018427387903}"#).unwrap();
            assert!(wayfind_recognizer_new(huge_gap.as_ptr()).is_null());

            let config = CString::new(r#"{"max_predictions": 1}"#).unwrap();
            let recognizer = wayfind_recognizer_new(config.as_ptr());
            assert!(!recognizer.is_null());

            let url = CString::new("https://a.com").unwrap();
            let context = CString::new(r#"{"timeOfDay": 14, "recentSearches": ["rust"]}"#).unwrap();
            let result = take_string(wayfind_recognizer_predict(
                recognizer,
                url.as_ptr(),
                context.as_ptr(),
            ));
            assert_eq!(result, "[]");

            wayfind_recognizer_free(recognizer);
        }
    }

    #[test]
    fn test_ffi_error_handling() {
        unsafe {
            let recognizer = wayfind_recognizer_new(ptr::null());
            let invalid = CString::new("not json").unwrap();
            assert_eq!(wayfind_recognizer_ingest(recognizer, invalid.as_ptr()), -1);

            let error = wayfind_last_error();
            assert!(!error.is_null());
            let error_str = CStr::from_ptr(error).to_str().unwrap();
            assert!(error_str.contains("line 1"));

            assert_eq!(wayfind_recognizer_import(recognizer, invalid.as_ptr()), -1);
            assert!(wayfind_recognizer_metrics(ptr::null_mut()).is_null());

            wayfind_recognizer_free(recognizer);
        }
    }

    #[test]
    fn test_ffi_version() {
        unsafe {
            let version = wayfind_version();
            assert!(!version.is_null());
            let version_str = CStr::from_ptr(version).to_str().unwrap();
            assert!(!version_str.is_empty());
        }
    }
}
