//! Swapchain and surface management.
//!
//! This module provides abstractions for presenting rendered frames to a
//! window.
//!
//! # Overview
//!
//! - [`Surface`] - Represents a window surface that can display rendered content
//! - [`SurfaceConfiguration`] - Configuration for the surface (format, size, present mode)
//! - [`SurfaceTexture`] - A texture from the swapchain that will be presented
//! - [`PresentMode`] - Controls vsync behavior
//!
//! # Example
//!
//! ```ignore
//! let instance = GraphicsInstance::new()?;
//! let surface = instance.create_surface(&window)?;
//!
//! let config = SurfaceConfiguration::new(1920, 1080)
//!     .with_format(surface.preferred_format())
//!     .with_present_mode(PresentMode::Fifo);
//! surface.configure(&device, &config)?;
//!
//! // In render loop:
//! let frame = match surface.acquire_texture() {
//!     Ok(frame) => frame,
//!     Err(GraphicsError::SurfaceOutdated | GraphicsError::SurfaceLost) => {
//!         surface.configure(&device, &config)?;
//!         return Ok(()); // skip this frame
//!     }
//!     Err(e) => return Err(e),
//! };
//! // ... render to frame.texture() ...
//! frame.present();
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use raw_window_handle::{HasDisplayHandle, HasWindowHandle};

use crate::device::GraphicsDevice;
use crate::error::GraphicsError;
use crate::instance::GraphicsInstance;
use crate::resources::Texture;
use crate::types::{TextureDescriptor, TextureFormat, TextureUsage};

/// Presentation mode for the swapchain.
///
/// Controls how frames are synchronized with the display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PresentMode {
    /// No synchronization. May cause tearing but has lowest latency.
    Immediate,
    /// Triple buffering. Low latency without tearing.
    Mailbox,
    /// VSync enabled. No tearing, but may have higher latency.
    #[default]
    Fifo,
    /// VSync with relaxed timing. May tear if a frame is late.
    FifoRelaxed,
}

/// Configuration for a surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SurfaceConfiguration {
    /// The texture format for the swapchain.
    pub format: TextureFormat,
    /// Width of the surface in pixels.
    pub width: u32,
    /// Height of the surface in pixels.
    pub height: u32,
    /// Presentation mode (vsync behavior).
    pub present_mode: PresentMode,
    /// Number of back-buffer images.
    pub back_buffer_count: u32,
}

impl SurfaceConfiguration {
    /// Create a new surface configuration with triple buffering.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            format: TextureFormat::Bgra8Unorm,
            width,
            height,
            present_mode: PresentMode::default(),
            back_buffer_count: 3,
        }
    }

    /// Set the texture format.
    pub fn with_format(mut self, format: TextureFormat) -> Self {
        self.format = format;
        self
    }

    /// Set the present mode.
    pub fn with_present_mode(mut self, present_mode: PresentMode) -> Self {
        self.present_mode = present_mode;
        self
    }

    /// Set the back-buffer count.
    pub fn with_back_buffer_count(mut self, count: u32) -> Self {
        self.back_buffer_count = count;
        self
    }
}

/// A surface for presenting rendered frames to a window.
///
/// The surface is created from a window using
/// [`GraphicsInstance::create_surface`]. It must be configured with
/// [`Surface::configure`] before use, and reconfigured after the window is
/// resized (acquire reports [`GraphicsError::SurfaceOutdated`] until then).
pub struct Surface {
    instance: Arc<GraphicsInstance>,
    config: RwLock<Option<SurfaceConfiguration>>,
    device: RwLock<Option<Arc<GraphicsDevice>>>,
    /// Back-buffer images owned by the surface.
    back_buffers: RwLock<Vec<Arc<Texture>>>,
    /// Current frame index (cycles through back buffers).
    frame_index: RwLock<u64>,
    /// Set when the window was resized; cleared by configure.
    outdated: AtomicBool,
}

impl Surface {
    /// Create a new surface from a window.
    ///
    /// The window handle must remain valid for the lifetime of the surface.
    pub(crate) fn new<W>(
        instance: Arc<GraphicsInstance>,
        window: &W,
    ) -> Result<Self, GraphicsError>
    where
        W: HasWindowHandle + HasDisplayHandle,
    {
        // Validate the handles up front so a dead window fails here rather
        // than at first configure.
        window.window_handle().map_err(|e| {
            GraphicsError::ResourceCreationFailed(format!("failed to get window handle: {e}"))
        })?;
        window.display_handle().map_err(|e| {
            GraphicsError::ResourceCreationFailed(format!("failed to get display handle: {e}"))
        })?;

        log::info!("Creating surface from window");

        Ok(Self {
            instance,
            config: RwLock::new(None),
            device: RwLock::new(None),
            back_buffers: RwLock::new(Vec::new()),
            frame_index: RwLock::new(0),
            outdated: AtomicBool::new(false),
        })
    }

    /// Get the parent graphics instance.
    pub fn instance(&self) -> &Arc<GraphicsInstance> {
        &self.instance
    }

    /// Get the preferred texture format for this surface.
    ///
    /// This format is guaranteed to be supported and is typically the most
    /// efficient.
    pub fn preferred_format(&self) -> TextureFormat {
        // Most platforms prefer BGRA8 for swapchain
        TextureFormat::Bgra8Unorm
    }

    /// Get the supported texture formats for this surface.
    pub fn supported_formats(&self) -> Vec<TextureFormat> {
        vec![
            TextureFormat::Bgra8Unorm,
            TextureFormat::Bgra8UnormSrgb,
            TextureFormat::Rgba8Unorm,
            TextureFormat::Rgba8UnormSrgb,
        ]
    }

    /// Get the supported present modes for this surface.
    pub fn supported_present_modes(&self) -> Vec<PresentMode> {
        vec![
            PresentMode::Fifo, // Always supported
            PresentMode::Immediate,
            PresentMode::Mailbox,
            PresentMode::FifoRelaxed,
        ]
    }

    /// Configure the surface for rendering.
    ///
    /// This must be called before acquiring textures, and again whenever the
    /// window is resized. Recreates the back-buffer images.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration has zero dimensions, an
    /// unsupported format, or a back-buffer count of zero.
    pub fn configure(
        &self,
        device: &Arc<GraphicsDevice>,
        config: &SurfaceConfiguration,
    ) -> Result<(), GraphicsError> {
        if config.width == 0 || config.height == 0 {
            return Err(GraphicsError::InvalidParameter(
                "surface dimensions cannot be zero".to_string(),
            ));
        }
        if config.back_buffer_count == 0 {
            return Err(GraphicsError::InvalidParameter(
                "back buffer count cannot be zero".to_string(),
            ));
        }
        if !self.supported_formats().contains(&config.format) {
            return Err(GraphicsError::InvalidParameter(format!(
                "unsupported surface format: {:?}",
                config.format
            )));
        }

        log::info!(
            "Configuring surface: {}x{} {:?} {:?}, {} back buffers",
            config.width,
            config.height,
            config.format,
            config.present_mode,
            config.back_buffer_count
        );

        // Recreate the back-buffer images.
        let mut new_buffers = Vec::with_capacity(config.back_buffer_count as usize);
        for i in 0..config.back_buffer_count {
            let descriptor = TextureDescriptor::new_2d(
                config.width,
                config.height,
                config.format,
                TextureUsage::RENDER_ATTACHMENT | TextureUsage::COPY_DST,
            )
            .with_label(format!("back_buffer_{i}"));
            new_buffers.push(device.create_texture(&descriptor)?);
        }

        if let Ok(mut back_buffers) = self.back_buffers.write() {
            *back_buffers = new_buffers;
        }
        if let Ok(mut current_config) = self.config.write() {
            *current_config = Some(config.clone());
        }
        if let Ok(mut current_device) = self.device.write() {
            *current_device = Some(Arc::clone(device));
        }
        self.outdated.store(false, Ordering::Release);

        Ok(())
    }

    /// Get the current configuration, if set.
    pub fn config(&self) -> Option<SurfaceConfiguration> {
        self.config.read().ok().and_then(|c| c.clone())
    }

    /// Get the current width, if configured.
    pub fn width(&self) -> Option<u32> {
        self.config().map(|c| c.width)
    }

    /// Get the current height, if configured.
    pub fn height(&self) -> Option<u32> {
        self.config().map(|c| c.height)
    }

    /// Mark the surface as outdated (called on window resize).
    ///
    /// Subsequent [`acquire_texture`](Self::acquire_texture) calls return
    /// [`GraphicsError::SurfaceOutdated`] until the surface is reconfigured.
    pub fn mark_outdated(&self) {
        self.outdated.store(true, Ordering::Release);
    }

    /// Acquire the next texture from the swapchain.
    ///
    /// The returned [`SurfaceTexture`] should be presented or dropped before
    /// the next frame is acquired.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The surface is not configured
    /// - The surface is outdated (window was resized) - reconfigure and skip
    ///   the frame
    pub fn acquire_texture(&self) -> Result<SurfaceTexture, GraphicsError> {
        if self.outdated.load(Ordering::Acquire) {
            return Err(GraphicsError::SurfaceOutdated);
        }

        let config = self
            .config
            .read()
            .ok()
            .and_then(|c| c.clone())
            .ok_or_else(|| GraphicsError::InvalidParameter("surface not configured".to_string()))?;

        let device = self
            .device
            .read()
            .ok()
            .and_then(|d| d.clone())
            .ok_or_else(|| GraphicsError::InvalidParameter("surface not configured".to_string()))?;

        // Advance the frame index through the back buffers.
        let frame_index = {
            let mut idx = self.frame_index.write().map_err(|_| {
                GraphicsError::Internal("failed to acquire frame index lock".to_string())
            })?;
            let current = *idx;
            *idx = (*idx + 1) % u64::from(config.back_buffer_count);
            current
        };

        let texture = self
            .back_buffers
            .read()
            .ok()
            .and_then(|b| b.get(frame_index as usize).cloned())
            .ok_or(GraphicsError::SurfaceLost)?;

        log::trace!("Acquired surface texture, frame index: {}", frame_index);

        Ok(SurfaceTexture {
            device,
            texture,
            format: config.format,
            width: config.width,
            height: config.height,
            frame_index,
            presented: RwLock::new(false),
        })
    }
}

impl std::fmt::Debug for Surface {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Surface")
            .field("config", &self.config())
            .finish()
    }
}

// Ensure Surface is Send + Sync
static_assertions::assert_impl_all!(Surface: Send, Sync);

/// A texture acquired from the swapchain for rendering.
///
/// This represents the current frame's render target. After rendering,
/// call [`SurfaceTexture::present`] to display the frame.
///
/// If dropped without presenting, the frame is discarded.
pub struct SurfaceTexture {
    device: Arc<GraphicsDevice>,
    texture: Arc<Texture>,
    format: TextureFormat,
    width: u32,
    height: u32,
    frame_index: u64,
    presented: RwLock<bool>,
}

impl SurfaceTexture {
    /// Get the device associated with this texture.
    pub fn device(&self) -> &Arc<GraphicsDevice> {
        &self.device
    }

    /// Get the back-buffer texture to render into.
    pub fn texture(&self) -> &Arc<Texture> {
        &self.texture
    }

    /// Get the texture format.
    pub fn format(&self) -> TextureFormat {
        self.format
    }

    /// Get the texture width.
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Get the texture height.
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Get the frame index (for debugging/profiling).
    pub fn frame_index(&self) -> u64 {
        self.frame_index
    }

    /// Present the texture to the screen.
    ///
    /// This displays the rendered content in the window. After calling this,
    /// the texture is no longer valid for rendering.
    pub fn present(self) {
        if let Ok(mut presented) = self.presented.write() {
            *presented = true;
        }
        log::trace!("Presenting frame {}", self.frame_index);
    }
}

impl std::fmt::Debug for SurfaceTexture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SurfaceTexture")
            .field("format", &self.format)
            .field("width", &self.width)
            .field("height", &self.height)
            .field("frame_index", &self.frame_index)
            .finish()
    }
}

impl Drop for SurfaceTexture {
    fn drop(&mut self) {
        let presented = self.presented.read().map(|p| *p).unwrap_or(false);
        if !presented {
            log::trace!(
                "SurfaceTexture dropped without presenting (frame {})",
                self.frame_index
            );
        }
    }
}

// Ensure SurfaceTexture is Send + Sync
static_assertions::assert_impl_all!(SurfaceTexture: Send, Sync);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_surface_configuration() {
        let config = SurfaceConfiguration::new(1920, 1080)
            .with_format(TextureFormat::Rgba8Unorm)
            .with_present_mode(PresentMode::Mailbox);

        assert_eq!(config.width, 1920);
        assert_eq!(config.height, 1080);
        assert_eq!(config.format, TextureFormat::Rgba8Unorm);
        assert_eq!(config.present_mode, PresentMode::Mailbox);
        assert_eq!(config.back_buffer_count, 3);
    }

    #[test]
    fn test_present_mode_default() {
        assert_eq!(PresentMode::default(), PresentMode::Fifo);
    }

    #[test]
    fn test_surface_configuration_default_format() {
        let config = SurfaceConfiguration::new(800, 600);
        assert_eq!(config.format, TextureFormat::Bgra8Unorm);
        assert_eq!(config.present_mode, PresentMode::Fifo);
    }
}
