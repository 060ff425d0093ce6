use std::borrow::Cow;

use arboard::{ImageData, SetExtLinux};
use image::RgbaImage;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClipboardError {
    #[error("failed to access the clipboard: {source}")]
    Unavailable {
        #[source]
        source: arboard::Error,
    },
    #[error("failed to set clipboard content: {source}")]
    SetContent {
        #[source]
        source: arboard::Error,
    },
}

pub type ClipboardResult<T> = std::result::Result<T, ClipboardError>;

pub trait ClipboardBackend {
    /// Takes clipboard ownership with `image` and returns as soon as it is served.
    fn publish_image(&mut self, image: &RgbaImage) -> ClipboardResult<()>;

    /// Keeps serving `image` and returns once another client has taken ownership.
    fn hold_image(&mut self, image: &RgbaImage) -> ClipboardResult<()>;
}

/// Clipboard owner backed by `arboard`. The connection lives as long as the backend so
/// the image stays available between publishing and holding.
#[derive(Default)]
pub struct ArboardBackend {
    clipboard: Option<arboard::Clipboard>,
}

impl ArboardBackend {
    fn clipboard(&mut self) -> ClipboardResult<&mut arboard::Clipboard> {
        if self.clipboard.is_none() {
            let clipboard = arboard::Clipboard::new()
                .map_err(|source| ClipboardError::Unavailable { source })?;
            self.clipboard = Some(clipboard);
        }
        self.clipboard
            .as_mut()
            .ok_or_else(|| ClipboardError::Unavailable {
                source: arboard::Error::ClipboardNotSupported,
            })
    }
}

impl ClipboardBackend for ArboardBackend {
    fn publish_image(&mut self, image: &RgbaImage) -> ClipboardResult<()> {
        self.clipboard()?
            .set_image(image_data(image))
            .map_err(|source| ClipboardError::SetContent { source })?;
        tracing::debug!(
            width = image.width(),
            height = image.height(),
            "image published to the clipboard"
        );
        Ok(())
    }

    fn hold_image(&mut self, image: &RgbaImage) -> ClipboardResult<()> {
        tracing::info!("holding the clipboard until ownership changes");
        self.clipboard()?
            .set()
            .wait()
            .image(image_data(image))
            .map_err(|source| ClipboardError::SetContent { source })?;
        tracing::info!("clipboard ownership changed");
        Ok(())
    }
}

fn image_data(image: &RgbaImage) -> ImageData<'_> {
    ImageData {
        width: image.width() as usize,
        height: image.height() as usize,
        bytes: Cow::Borrowed(image.as_raw()),
    }
}
