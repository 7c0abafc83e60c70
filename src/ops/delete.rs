//! delete an image from its transport

use crate::error::Result;
use crate::reference::ImageReference;

/// delete the referenced image
pub fn delete(reference: &ImageReference) -> Result<()> {
    reference.delete_image()?;
    tracing::info!("deleted {}", reference);
    Ok(())
}
