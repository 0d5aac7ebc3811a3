//! Cheap monotonic counters used to stamp harvested events.
//!
//! The stamp only has to be cheap and strictly non-decreasing on one core;
//! its absolute value carries no meaning.

// ---------------------------------------------------------------------------
// Cycle counter
// ---------------------------------------------------------------------------

/// Read the cheapest high-resolution counter on this machine.
///
/// On x86_64 this is the time-stamp counter (`rdtsc`).
#[cfg(target_arch = "x86_64")]
pub fn cycle_count() -> u64 {
    // SAFETY: rdtsc is available on every x86_64 CPU and has no side effects.
    unsafe { core::arch::x86_64::_rdtsc() }
}

/// Read the cheapest high-resolution counter on this machine.
///
/// On macOS (non-x86) this reads the system counter via `mach_absolute_time()`.
#[cfg(all(target_os = "macos", not(target_arch = "x86_64")))]
pub fn cycle_count() -> u64 {
    unsafe extern "C" {
        fn mach_absolute_time() -> u64;
    }
    // SAFETY: mach_absolute_time() is a stable macOS API that returns the
    // current value of the system absolute time counter. Always safe to call.
    unsafe { mach_absolute_time() }
}

/// Read the cheapest high-resolution counter on this machine.
///
/// Falls back to nanoseconds since a process-local epoch.
#[cfg(not(any(target_arch = "x86_64", target_os = "macos")))]
pub fn cycle_count() -> u64 {
    use std::sync::OnceLock;
    use std::time::Instant;
    static EPOCH: OnceLock<Instant> = OnceLock::new();
    let epoch = EPOCH.get_or_init(Instant::now);
    epoch.elapsed().as_nanos() as u64
}
