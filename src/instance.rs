//! Graphics instance.
//!
//! The [`GraphicsInstance`] is the top-level entry point for the graphics
//! system. It selects and owns the GPU backend and manages one or more
//! [`GraphicsDevice`]s.

use std::sync::{Arc, RwLock, Weak};

use raw_window_handle::{HasDisplayHandle, HasWindowHandle};

use crate::backend::{self, GpuBackend};
use crate::device::GraphicsDevice;
use crate::error::GraphicsError;
use crate::swapchain::Surface;

/// Which backend the instance should try to create.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BackendPreference {
    /// Best available: Vulkan, then wgpu, then dummy.
    #[default]
    Auto,
    /// Force the dummy backend (headless, no GPU work executed).
    Dummy,
}

/// Parameters for creating a [`GraphicsInstance`].
#[derive(Debug, Clone)]
pub struct InstanceParameters {
    /// Application name reported to the native API.
    pub application_name: String,
    /// Enable native validation layers where the backend supports them.
    pub validation: bool,
    /// Backend selection preference.
    pub backend: BackendPreference,
}

impl InstanceParameters {
    /// Create parameters with defaults (auto backend, validation in debug).
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the application name.
    pub fn with_application_name(mut self, name: impl Into<String>) -> Self {
        self.application_name = name.into();
        self
    }

    /// Enable or disable native validation layers.
    pub fn with_validation(mut self, validation: bool) -> Self {
        self.validation = validation;
        self
    }

    /// Set the backend preference.
    pub fn with_backend(mut self, backend: BackendPreference) -> Self {
        self.backend = backend;
        self
    }
}

impl Default for InstanceParameters {
    fn default() -> Self {
        Self {
            application_name: env!("CARGO_PKG_NAME").to_string(),
            validation: cfg!(debug_assertions),
            backend: BackendPreference::Auto,
        }
    }
}

/// Information about a graphics adapter.
#[derive(Debug, Clone)]
pub struct AdapterInfo {
    /// Adapter name.
    pub name: String,
    /// Adapter vendor.
    pub vendor: String,
    /// Device type (discrete, integrated, etc.).
    pub device_type: AdapterType,
}

/// Type of graphics adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AdapterType {
    /// Discrete GPU (dedicated graphics card).
    Discrete,
    /// Integrated GPU (shared with CPU).
    Integrated,
    /// Software renderer.
    Software,
    /// Unknown adapter type.
    Unknown,
}

/// The graphics instance manages devices and adapters.
///
/// This is the top-level entry point for the graphics system. Create an
/// instance to enumerate available adapters and create devices.
///
/// # Thread Safety
///
/// `GraphicsInstance` is `Send + Sync` and can be safely shared across
/// threads.
///
/// # Example
///
/// ```ignore
/// let instance = GraphicsInstance::new()?;
/// let device = instance.create_device()?;
/// ```
pub struct GraphicsInstance {
    /// Weak self-reference for creating devices.
    self_ref: RwLock<Weak<GraphicsInstance>>,
    /// Devices created by this instance.
    devices: RwLock<Vec<Arc<GraphicsDevice>>>,
    /// GPU backend for this instance.
    backend: Arc<dyn GpuBackend>,
    /// Parameters the instance was created with.
    parameters: InstanceParameters,
}

impl GraphicsInstance {
    /// Create a new graphics instance with default parameters.
    ///
    /// # Errors
    ///
    /// Returns an error if no backend can be initialized.
    pub fn new() -> Result<Arc<Self>, GraphicsError> {
        Self::with_parameters(InstanceParameters::default())
    }

    /// Create a new graphics instance with explicit parameters.
    pub fn with_parameters(parameters: InstanceParameters) -> Result<Arc<Self>, GraphicsError> {
        log::info!("Creating GraphicsInstance ({})", parameters.application_name);

        let backend = backend::create_backend(&parameters)?;
        log::info!("Using GPU backend: {}", backend.name());

        let instance = Arc::new(Self {
            self_ref: RwLock::new(Weak::new()),
            devices: RwLock::new(Vec::new()),
            backend,
            parameters,
        });

        // Store self-reference
        if let Ok(mut self_ref) = instance.self_ref.write() {
            *self_ref = Arc::downgrade(&instance);
        }

        Ok(instance)
    }

    /// Get the GPU backend (internal use only).
    pub(crate) fn backend(&self) -> &Arc<dyn GpuBackend> {
        &self.backend
    }

    /// Get the parameters the instance was created with.
    pub fn parameters(&self) -> &InstanceParameters {
        &self.parameters
    }

    /// Get the strong self-reference.
    fn arc_self(&self) -> Option<Arc<GraphicsInstance>> {
        self.self_ref.read().ok().and_then(|r| r.upgrade())
    }

    /// Enumerate available graphics adapters.
    pub fn enumerate_adapters(&self) -> Vec<AdapterInfo> {
        self.backend.enumerate_adapters()
    }

    /// Create a graphics device.
    ///
    /// Creates a device using the default (best available) adapter.
    ///
    /// # Errors
    ///
    /// Returns an error if device creation fails.
    pub fn create_device(&self) -> Result<Arc<GraphicsDevice>, GraphicsError> {
        self.create_device_with_adapter(0)
    }

    /// Create a graphics device with a specific adapter.
    ///
    /// # Arguments
    ///
    /// * `adapter_index` - Index of the adapter to use (from
    ///   [`enumerate_adapters`](Self::enumerate_adapters))
    ///
    /// # Errors
    ///
    /// Returns an error if the adapter index is invalid or device creation
    /// fails.
    pub fn create_device_with_adapter(
        &self,
        adapter_index: usize,
    ) -> Result<Arc<GraphicsDevice>, GraphicsError> {
        let adapters = self.enumerate_adapters();
        if adapter_index >= adapters.len() {
            return Err(GraphicsError::InvalidParameter(format!(
                "adapter index {adapter_index} out of range ({})",
                adapters.len()
            )));
        }

        let adapter = &adapters[adapter_index];
        log::info!("Creating device on adapter: {}", adapter.name);

        let instance = self.arc_self().ok_or_else(|| {
            GraphicsError::ResourceCreationFailed("instance has been dropped".to_string())
        })?;
        let device = Arc::new(GraphicsDevice::new(
            instance,
            Arc::clone(&self.backend),
            adapter.name.clone(),
        ));

        // Track the device
        if let Ok(mut devices) = self.devices.write() {
            devices.push(device.clone());
        }

        Ok(device)
    }

    /// Get all devices created by this instance.
    pub fn devices(&self) -> Vec<Arc<GraphicsDevice>> {
        self.devices
            .read()
            .map(|d| d.clone())
            .unwrap_or_else(|_| Vec::new())
    }

    /// Get the number of devices created by this instance.
    pub fn device_count(&self) -> usize {
        self.devices.read().map(|d| d.len()).unwrap_or(0)
    }

    /// Create a surface for presenting to a window.
    ///
    /// # Arguments
    ///
    /// * `window` - A window that implements the raw-window-handle traits
    ///
    /// # Errors
    ///
    /// Returns an error if surface creation fails.
    ///
    /// # Example
    ///
    /// ```ignore
    /// let surface = instance.create_surface(&window)?;
    /// surface.configure(&device, &SurfaceConfiguration::new(800, 600))?;
    /// ```
    pub fn create_surface<W>(&self, window: &W) -> Result<Arc<Surface>, GraphicsError>
    where
        W: HasWindowHandle + HasDisplayHandle,
    {
        let instance = self.arc_self().ok_or_else(|| {
            GraphicsError::ResourceCreationFailed("instance has been dropped".to_string())
        })?;

        let surface = Surface::new(instance, window)?;
        Ok(Arc::new(surface))
    }
}

impl std::fmt::Debug for GraphicsInstance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphicsInstance")
            .field("backend", &self.backend.name())
            .field("device_count", &self.device_count())
            .finish()
    }
}

// Ensure GraphicsInstance is Send + Sync
static_assertions::assert_impl_all!(GraphicsInstance: Send, Sync);
