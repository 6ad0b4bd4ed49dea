//! C ABI shim.
//!
//! The game server loads this library and calls [`RVExtension`] with an
//! output buffer and a command string. The extension singleton is built on
//! first use; a missing config file is fatal at that point, matching the
//! deliberate no-degraded-mode policy.

use std::ffi::CStr;
use std::os::raw::{c_char, c_int};

use extdb_core::{Extension, WorkerGuard};
use once_cell::sync::Lazy;

struct Runtime {
    extension: Extension,
    // keeps the logging channel alive for the process lifetime
    _log_guard: WorkerGuard,
}

static RUNTIME: Lazy<Runtime> = Lazy::new(|| match Extension::start() {
    Ok((extension, guard)) => Runtime {
        extension,
        _log_guard: guard,
    },
    Err(e) => {
        // no config, no safe degraded mode: refuse to come up at all
        eprintln!("extdb: fatal: {}", e);
        std::process::exit(1);
    }
});

/// Copy `response` into the host buffer, truncated to `cap - 1` bytes plus
/// the NUL terminator.
///
/// # Safety
///
/// `output` must point to at least `cap` writable bytes.
unsafe fn write_response(output: *mut c_char, cap: usize, response: &str) {
    if cap == 0 {
        return;
    }
    let bytes = response.as_bytes();
    let n = bytes.len().min(cap - 1);
    std::ptr::copy_nonoverlapping(bytes.as_ptr(), output as *mut u8, n);
    *output.add(n) = 0;
}

/// The host entry point.
///
/// # Safety
///
/// `output` must point to `output_size` writable bytes; `function` must be
/// a NUL-terminated string or null.
#[no_mangle]
pub unsafe extern "C" fn RVExtension(
    output: *mut c_char,
    output_size: c_int,
    function: *const c_char,
) {
    if output.is_null() || output_size <= 0 {
        return;
    }
    let cap = output_size as usize;
    if function.is_null() {
        write_response(output, cap, "");
        return;
    }
    let input = CStr::from_ptr(function).to_string_lossy();
    let response = RUNTIME.extension.call(&input, cap);
    write_response(output, cap, &response);
}
