use std::sync::Arc;

use gpui::{Context, RenderImage, Window};
use image::{Frame as ImageFrame, ImageBuffer, Rgba};

use gesture_capture::pipeline::overlay::Canvas;

use super::AppView;

pub(super) fn canvas_to_image(canvas: Canvas) -> Option<Arc<RenderImage>> {
    let (width, height) = (canvas.width(), canvas.height());
    let mut rgba = canvas.into_rgba();

    // GPUI expects BGRA; convert in place to avoid the async asset pipeline and flicker.
    for px in rgba.chunks_exact_mut(4) {
        px.swap(0, 2);
    }

    let buffer = ImageBuffer::<Rgba<u8>, Vec<u8>>::from_raw(width, height, rgba)?;
    Some(Arc::new(RenderImage::new(vec![ImageFrame::new(buffer)])))
}

pub(super) fn format_countdown(secs: u32) -> String {
    format!("{:02}:{:02}", secs / 60, secs % 60)
}

impl AppView {
    pub(super) fn replace_latest_image(
        &mut self,
        new_image: Arc<RenderImage>,
        window: &mut Window,
        cx: &mut Context<'_, Self>,
    ) {
        if let Some(old_image) = self.latest_image.replace(new_image) {
            // The sprite atlas keeps every frame unless the old texture is dropped explicitly.
            cx.drop_image(old_image, Some(window));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn countdown_is_minutes_and_seconds() {
        assert_eq!(format_countdown(180), "03:00");
        assert_eq!(format_countdown(59), "00:59");
        assert_eq!(format_countdown(0), "00:00");
    }
}
