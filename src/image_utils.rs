use crate::{detection::Detection, labels::ClassLabel};
use image::{DynamicImage, ImageFormat, ImageReader, Rgb, RgbImage};
use imageproc::{drawing::draw_hollow_rect_mut, rect::Rect};
use std::io::Cursor;
use thiserror::Error;

/// Boxes for class ids missing from the label table.
const FALLBACK_COLOR: Rgb<u8> = Rgb([255, 0, 0]);

#[derive(Error, Debug)]
pub enum ImageUtilsError {
    #[error("failed to read image format: {0}")]
    FormatDetection(std::io::Error),
    #[error("failed to decode image: {0}")]
    Decode(image::ImageError),
    #[error("failed to encode image: {0}")]
    Encode(image::ImageError),
}

/// Decodes an uploaded image, guessing the format from its content.
pub fn decode_image(image_data: &[u8]) -> Result<DynamicImage, ImageUtilsError> {
    ImageReader::new(Cursor::new(image_data))
        .with_guessed_format()
        .map_err(ImageUtilsError::FormatDetection)?
        .decode()
        .map_err(ImageUtilsError::Decode)
}

/// Draws each detection's bounding box onto a copy of the image, colored by
/// class label.
pub fn annotate(image: &DynamicImage, detections: &[Detection], labels: &[ClassLabel]) -> RgbImage {
    let mut canvas = image.to_rgb8();

    for detection in detections {
        let color = labels
            .get(detection.class_id as usize)
            .map(|label| Rgb([label.red, label.green, label.blue]))
            .unwrap_or(FALLBACK_COLOR);
        draw_box(&mut canvas, detection, color);
    }

    canvas
}

fn draw_box(canvas: &mut RgbImage, detection: &Detection, color: Rgb<u8>) {
    let (width, height) = canvas.dimensions();
    if width < 2 || height < 2 {
        return;
    }

    let x1 = (detection.xmin.round() as i32).clamp(0, width as i32 - 1);
    let y1 = (detection.ymin.round() as i32).clamp(0, height as i32 - 1);
    let x2 = (detection.xmax.round() as i32).clamp(0, width as i32 - 1);
    let y2 = (detection.ymax.round() as i32).clamp(0, height as i32 - 1);
    let box_width = (x2 - x1).max(1) as u32;
    let box_height = (y2 - y1).max(1) as u32;

    draw_hollow_rect_mut(canvas, Rect::at(x1, y1).of_size(box_width, box_height), color);
    // Second outline one pixel in for a 2 px stroke.
    if box_width > 2 && box_height > 2 {
        draw_hollow_rect_mut(
            canvas,
            Rect::at(x1 + 1, y1 + 1).of_size(box_width - 2, box_height - 2),
            color,
        );
    }
}

/// Encodes the annotated frame as JPEG for the alert payload.
pub fn encode_jpeg(image: &RgbImage) -> Result<Vec<u8>, ImageUtilsError> {
    let mut buffer = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut buffer), ImageFormat::Jpeg)
        .map_err(ImageUtilsError::Encode)?;
    Ok(buffer)
}
