//! The orchestrator: owns the component registry and drives the run loop.
//!
//! ```text
//!   main()                         App
//!     │  register(sensor) ───▶  ┌──────────────────────────────┐
//!     │  register(light)  ───▶  │ components (Rc handles)      │
//!     │  run_setup()      ───▶  │   sorted by setup priority,  │
//!     │                         │   setup_once() each          │
//!     │  loop {                 │                              │
//!     │    run_loop()     ───▶  │ fixed loop order:            │
//!     │  }                      │   loop_once() each           │
//!                               └──────────────────────────────┘
//! ```
//!
//! Exactly one `App` exists for the process lifetime.  It is constructed
//! in `main` before any registration and passed around by explicit
//! handle — no global lookup, so tests can spin up their own instance.
//!
//! Registration does not transfer ownership: callers keep their
//! `Rc<RefCell<..>>` handle (and `register` hands it straight back, so a
//! component can be constructed and registered inline), while the app
//! retains a clone for driving the lifecycle.

use std::cell::RefCell;
use std::rc::Rc;

use log::{info, warn};

use crate::component::{Component, ComponentState, Lifecycle};
use crate::config::{ConfigError, DeviceConfig};
use crate::nameable::Nameable;
use crate::platform::PlatformHandle;

/// Shared handle to a registered component.
pub type Handle<T> = Rc<RefCell<T>>;

/// Wrap a component for registration.
pub fn handle<T>(value: T) -> Handle<T> {
    Rc::new(RefCell::new(value))
}

/// Opaque consumer category (MQTT client, discovery, state sync).  The
/// core holds and exposes controllers but never interprets them.
pub trait Controller: 'static {}

/// The process-wide orchestrator.
pub struct App {
    /// All registered components, in registration order.
    components: Vec<Handle<dyn Lifecycle>>,
    /// Fixed iteration order for `run_loop`, established by `run_setup`.
    loop_order: Vec<Handle<dyn Lifecycle>>,
    controllers: Vec<Handle<dyn Controller>>,
    identity: Nameable,
    platform: PlatformHandle,
    state: ComponentState,
    /// Network stack component, held for out-of-scope consumers.
    network: Option<Handle<dyn Lifecycle>>,
    /// MQTT client controller, held for out-of-scope consumers.
    mqtt_client: Option<Handle<dyn Controller>>,
}

impl App {
    pub fn new(name: impl Into<String>, platform: PlatformHandle) -> Self {
        Self {
            components: Vec::new(),
            loop_order: Vec::new(),
            controllers: Vec::new(),
            identity: Nameable::new(name),
            platform,
            state: ComponentState::Construction,
            network: None,
            mqtt_client: None,
        }
    }

    /// Construct from a validated [`DeviceConfig`].
    pub fn from_config(config: &DeviceConfig, platform: PlatformHandle) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self::new(config.name.clone(), platform))
    }

    // ── Registration ──────────────────────────────────────────

    /// Register a component and hand the same handle back.
    pub fn register<C: Component>(&mut self, component: Handle<C>) -> Handle<C> {
        let dyn_handle: Handle<dyn Lifecycle> = component.clone();
        if self.state != ComponentState::Construction {
            // Late registration: joins the loop order at the back.
            self.loop_order.push(dyn_handle.clone());
        }
        self.components.push(dyn_handle);
        component
    }

    /// Register a controller and hand the same handle back.
    pub fn register_controller<K: Controller>(&mut self, controller: Handle<K>) -> Handle<K> {
        self.controllers.push(controller.clone());
        controller
    }

    /// Register the network stack component and remember it as *the*
    /// canonical network handle.
    pub fn register_network<C: Component>(&mut self, network: Handle<C>) -> Handle<C> {
        let registered = self.register(network);
        self.network = Some(registered.clone());
        registered
    }

    /// Register the MQTT client controller and remember it as *the*
    /// canonical client handle.
    pub fn register_mqtt_client<K: Controller>(&mut self, client: Handle<K>) -> Handle<K> {
        let registered = self.register_controller(client);
        self.mqtt_client = Some(registered.clone());
        registered
    }

    pub fn network(&self) -> Option<&Handle<dyn Lifecycle>> {
        self.network.as_ref()
    }

    pub fn mqtt_client(&self) -> Option<&Handle<dyn Controller>> {
        self.mqtt_client.as_ref()
    }

    pub fn controllers(&self) -> &[Handle<dyn Controller>] {
        &self.controllers
    }

    pub fn component_count(&self) -> usize {
        self.components.len()
    }

    // ── Lifecycle drive ───────────────────────────────────────

    /// One-time setup of every registered component, highest setup
    /// priority first (stable: ties keep registration order).
    ///
    /// A component failing during its own setup does not halt the rest.
    /// Calling this twice is a wiring defect and panics.
    pub fn run_setup(&mut self) {
        assert!(
            self.state == ComponentState::Construction,
            "run_setup called twice"
        );
        self.state = ComponentState::Setup;
        info!(
            "'{}': setting up {} components",
            self.identity.name(),
            self.components.len()
        );

        let mut order = self.components.clone();
        order.sort_by(|a, b| {
            let (pa, pb) = (a.borrow().setup_priority(), b.borrow().setup_priority());
            pb.partial_cmp(&pa).unwrap_or(std::cmp::Ordering::Equal)
        });
        for component in &order {
            component.borrow_mut().setup_once();
            if component.borrow().state() == ComponentState::Failed {
                warn!("component failed during setup; continuing with the rest");
            }
        }

        // Freeze the loop order: descending loop priority, ties in
        // registration order. The same order is used every iteration.
        self.loop_order = self.components.clone();
        self.loop_order.sort_by(|a, b| {
            let (pa, pb) = (a.borrow().loop_priority(), b.borrow().loop_priority());
            pb.partial_cmp(&pa).unwrap_or(std::cmp::Ordering::Equal)
        });
    }

    /// One loop iteration over every component, in the fixed loop order.
    ///
    /// Components registered after [`run_setup`] are set up lazily on
    /// their first iteration.
    pub fn run_loop(&mut self) {
        assert!(
            self.state != ComponentState::Construction,
            "run_loop called before run_setup"
        );
        self.state = ComponentState::Loop;
        for component in &self.loop_order {
            let mut component = component.borrow_mut();
            if component.state() == ComponentState::Construction {
                component.setup_once();
            }
            component.loop_once();
        }
    }

    // ── Identity ──────────────────────────────────────────────

    pub fn name(&self) -> &str {
        self.identity.name()
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.identity.set_name(name);
    }

    /// Hostname-safe device identifier (MQTT client id, mDNS hostname).
    /// Computed once, stable for the process lifetime.
    pub fn machine_id(&self) -> &str {
        self.identity.machine_id()
    }

    pub fn platform(&self) -> &PlatformHandle {
        &self.platform
    }
}
