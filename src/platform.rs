//! Platform services: monotonic time and randomness.
//!
//! The scheduler core needs exactly two things from the outside world — a
//! millisecond tick and a jitter source.  Both are behind the [`Platform`]
//! trait so the whole lifecycle machinery can be driven on a host machine
//! (tests, simulation) with a fake clock.
//!
//! - **`target_os = "espidf"` + `espidf` feature** — wraps
//!   `esp_timer_get_time()` and the hardware RNG (`esp_fill_random`).
//! - **everything else** — `std::time::Instant` plus a xorshift generator
//!   seeded from `RandomState` entropy.

use std::cell::Cell;
use std::rc::Rc;

/// Monotonic clock + random source consumed by every component core.
///
/// `millis()` wraps at `u32::MAX` (~49.7 days); all schedule arithmetic
/// uses wrapping subtraction so rollover is harmless.
pub trait Platform {
    /// Milliseconds since boot (monotonic, wraps).
    fn millis(&self) -> u32;

    /// A uniformly distributed random `u32`, used for interval jitter.
    fn random_u32(&self) -> u32;
}

/// Shared handle to the process-wide platform.
///
/// Single-threaded firmware: `Rc`, never `Arc`.
pub type PlatformHandle = Rc<dyn Platform>;

// ───────────────────────────────────────────────────────────────
// Real platform
// ───────────────────────────────────────────────────────────────

/// Production platform implementation.
pub struct SystemPlatform {
    #[cfg(not(all(target_os = "espidf", feature = "espidf")))]
    start: std::time::Instant,
    #[cfg(not(all(target_os = "espidf", feature = "espidf")))]
    rng_state: Cell<u32>,
}

impl SystemPlatform {
    pub fn new() -> Self {
        Self {
            #[cfg(not(all(target_os = "espidf", feature = "espidf")))]
            start: std::time::Instant::now(),
            #[cfg(not(all(target_os = "espidf", feature = "espidf")))]
            rng_state: Cell::new(host_seed()),
        }
    }

    /// Convenience constructor returning the shared handle form.
    pub fn shared() -> PlatformHandle {
        Rc::new(Self::new())
    }
}

impl Default for SystemPlatform {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(all(target_os = "espidf", feature = "espidf"))]
impl Platform for SystemPlatform {
    fn millis(&self) -> u32 {
        ((unsafe { esp_idf_svc::sys::esp_timer_get_time() }) / 1000) as u32
    }

    fn random_u32(&self) -> u32 {
        let mut buf = [0u8; 4];
        // SAFETY: esp_fill_random writes to the provided buffer using
        // the hardware RNG. Buffer is valid and exclusively owned.
        unsafe {
            esp_idf_svc::sys::esp_fill_random(buf.as_mut_ptr().cast(), buf.len());
        }
        u32::from_le_bytes(buf)
    }
}

#[cfg(not(all(target_os = "espidf", feature = "espidf")))]
impl Platform for SystemPlatform {
    fn millis(&self) -> u32 {
        self.start.elapsed().as_millis() as u32
    }

    fn random_u32(&self) -> u32 {
        // xorshift32 — jitter staggering needs uniformity, not crypto.
        let mut x = self.rng_state.get();
        x ^= x << 13;
        x ^= x >> 17;
        x ^= x << 5;
        self.rng_state.set(x);
        x
    }
}

/// Non-zero seed from `RandomState` entropy (host targets only).
#[cfg(not(all(target_os = "espidf", feature = "espidf")))]
fn host_seed() -> u32 {
    use std::collections::hash_map::RandomState;
    use std::hash::{BuildHasher, Hasher};

    let seed = RandomState::new().build_hasher().finish() as u32;
    if seed == 0 { 0x9E37_79B9 } else { seed }
}

// ───────────────────────────────────────────────────────────────
// Simulation platform
// ───────────────────────────────────────────────────────────────

/// Manually driven platform for host-side simulation and tests.
///
/// Time only moves when [`advance`](SimPlatform::advance) is called and
/// `random_u32` returns whatever was last planted with
/// [`set_next_random`](SimPlatform::set_next_random), so jitter offsets
/// are fully scripted.
pub struct SimPlatform {
    now_ms: Cell<u32>,
    next_random: Cell<u32>,
}

impl SimPlatform {
    pub fn new() -> Self {
        Self {
            now_ms: Cell::new(0),
            next_random: Cell::new(0),
        }
    }

    /// Shared-handle form, ready to hand to component cores.
    pub fn shared() -> Rc<Self> {
        Rc::new(Self::new())
    }

    /// Move the simulated clock forward.
    pub fn advance(&self, ms: u32) {
        self.now_ms.set(self.now_ms.get().wrapping_add(ms));
    }

    /// Jump the simulated clock to an absolute tick (wrap tests).
    pub fn set_millis(&self, ms: u32) {
        self.now_ms.set(ms);
    }

    /// Plant the value the next `random_u32` calls will return.
    pub fn set_next_random(&self, value: u32) {
        self.next_random.set(value);
    }
}

impl Default for SimPlatform {
    fn default() -> Self {
        Self::new()
    }
}

impl Platform for SimPlatform {
    fn millis(&self) -> u32 {
        self.now_ms.get()
    }

    fn random_u32(&self) -> u32 {
        self.next_random.get()
    }
}
