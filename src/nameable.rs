//! Human names and their derived machine-safe identifiers.
//!
//! Anything advertised to the outside world (sensors, switches, the
//! device itself) carries a friendly display name plus a derived slug
//! used in hostnames and topic paths.  The slug is computed once and
//! cached: identifiers handed to the network must never change under a
//! running process, even if the display name is edited later.

use std::cell::OnceCell;

/// Characters allowed in a machine id — safe for use as a hostname
/// component.
const HOSTNAME_WHITELIST: &str = "abcdefghijklmnopqrstuvwxyz0123456789-_";

/// Hostname labels top out at 63 octets; 64 gives the slug headroom
/// without heap allocation.
pub type MachineId = heapless::String<64>;

/// Derive a hostname-safe slug from a display name: lower-cased,
/// whitespace collapsed to underscores, everything outside the
/// whitelist dropped, truncated at capacity.
pub fn slugify(name: &str) -> MachineId {
    let mut id = MachineId::new();
    for ch in name.chars() {
        let mapped = if ch.is_whitespace() {
            '_'
        } else {
            ch.to_ascii_lowercase()
        };
        if HOSTNAME_WHITELIST.contains(mapped) && id.push(mapped).is_err() {
            break;
        }
    }
    id
}

/// A display name plus its lazily derived, memoized machine id.
///
/// The machine id is computed on first access and frozen from then on;
/// a later [`set_name`](Nameable::set_name) changes only the display
/// name.
#[derive(Debug, Default)]
pub struct Nameable {
    name: String,
    machine_id: OnceCell<MachineId>,
}

impl Nameable {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            machine_id: OnceCell::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Replace the display name.  Deliberately does not invalidate an
    /// already-computed machine id.
    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    /// The derived slug; computed from the current display name on first
    /// call, identical on every call after that.
    pub fn machine_id(&self) -> &str {
        self.machine_id.get_or_init(|| slugify(&self.name)).as_str()
    }
}
