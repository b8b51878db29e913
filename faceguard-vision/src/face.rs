use anyhow::{bail, Context, Result};
use image::{imageops, DynamicImage, GenericImageView, Rgb, RgbImage};
use ndarray::Array4;
use ort::{session::Session, value::Value};

use crate::provider::Embedding;
use crate::yunet;

/// Side of the square canvas the detector runs on.
pub const DETECTOR_INPUT: u32 = 640;
/// Side of the aligned crop the recognizer expects.
pub const FACE_SIZE: u32 = 112;

/// Canonical eye positions inside a 112x112 ArcFace crop.
const REF_RIGHT_EYE: (f32, f32) = (38.2946, 51.6963);
const REF_LEFT_EYE: (f32, f32) = (73.5318, 51.5014);

/// A detected face in source image coordinates.
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    /// x, y, w, h
    pub bbox: [f32; 4],
    pub score: f32,
    pub landmarks: [f32; 10],
}

/// Pack an RGB image into a `[1, 3, H, W]` tensor in BGR order, values in [0, 255].
fn bgr_tensor(img: &RgbImage) -> Array4<f32> {
    let (w, h) = img.dimensions();
    Array4::from_shape_fn((1, 3, h as usize, w as usize), |(_, c, y, x)| {
        img.get_pixel(x as u32, y as u32)[2 - c] as f32
    })
}

/// Detect faces with YuNet, returning them best-first after NMS.
pub fn detect_faces(
    session: &mut Session,
    img: &DynamicImage,
    score_threshold: f32,
    nms_threshold: f32,
) -> Result<Vec<Detection>> {
    let (width, height) = img.dimensions();
    if width == 0 || height == 0 {
        bail!("image has no pixels");
    }

    // letterbox onto a square canvas so the aspect ratio survives
    let scale = DETECTOR_INPUT as f32 / width.max(height) as f32;
    let new_w = ((width as f32 * scale) as u32).max(1);
    let new_h = ((height as f32 * scale) as u32).max(1);
    let resized = img.resize_exact(new_w, new_h, imageops::FilterType::Triangle).to_rgb8();

    let mut canvas = RgbImage::new(DETECTOR_INPUT, DETECTOR_INPUT);
    let off_x = (DETECTOR_INPUT - new_w) / 2;
    let off_y = (DETECTOR_INPUT - new_h) / 2;
    imageops::overlay(&mut canvas, &resized, off_x as i64, off_y as i64);

    let input = Value::from_array(bgr_tensor(&canvas))?;
    let outputs = session.run(ort::inputs![input])?;
    let mut raw: Vec<(Vec<i64>, Vec<f32>)> = Vec::new();
    for (_name, value) in outputs.iter() {
        let (shape, data) = value
            .try_extract_tensor::<f32>()
            .context("reading detector output")?;
        raw.push((shape.iter().copied().collect(), data.to_vec()));
    }
    drop(outputs);

    let input_size = DETECTOR_INPUT as usize;
    let heads = yunet::heads(&raw, input_size)?;
    let unmap_x = |v: f32| (v - off_x as f32) / scale;
    let unmap_y = |v: f32| (v - off_y as f32) / scale;

    let detections: Vec<Detection> = yunet::decode(&heads, input_size, score_threshold)
        .into_iter()
        .map(|d| {
            let mut landmarks = d.landmarks;
            for p in landmarks.chunks_exact_mut(2) {
                p[0] = unmap_x(p[0]);
                p[1] = unmap_y(p[1]);
            }
            Detection {
                bbox: [
                    unmap_x(d.bbox[0]),
                    unmap_y(d.bbox[1]),
                    d.bbox[2] / scale,
                    d.bbox[3] / scale,
                ],
                score: d.score,
                landmarks,
            }
        })
        .collect();

    log::debug!("detector kept {} candidate(s)", detections.len());
    Ok(nms(detections, nms_threshold))
}

/// Greedy non-maximum suppression; result is sorted by descending score.
pub fn nms(mut detections: Vec<Detection>, iou_threshold: f32) -> Vec<Detection> {
    detections.sort_by(|a, b| b.score.total_cmp(&a.score));

    let mut keep: Vec<Detection> = Vec::new();
    for d in detections {
        if keep.iter().all(|k| iou(&k.bbox, &d.bbox) <= iou_threshold) {
            keep.push(d);
        }
    }
    keep
}

fn iou(a: &[f32; 4], b: &[f32; 4]) -> f32 {
    let x1 = a[0].max(b[0]);
    let y1 = a[1].max(b[1]);
    let x2 = (a[0] + a[2]).min(b[0] + b[2]);
    let y2 = (a[1] + a[3]).min(b[1] + b[3]);
    if x2 <= x1 || y2 <= y1 {
        return 0.0;
    }
    let inter = (x2 - x1) * (y2 - y1);
    inter / (a[2] * a[3] + b[2] * b[3] - inter)
}

fn bilinear(img: &RgbImage, x: f32, y: f32) -> Rgb<u8> {
    let (w, h) = img.dimensions();
    let x0 = x.floor() as u32;
    let y0 = y.floor() as u32;
    let x1 = (x0 + 1).min(w - 1);
    let y1 = (y0 + 1).min(h - 1);
    let fx = x - x0 as f32;
    let fy = y - y0 as f32;

    let (p00, p10) = (img.get_pixel(x0, y0), img.get_pixel(x1, y0));
    let (p01, p11) = (img.get_pixel(x0, y1), img.get_pixel(x1, y1));
    let mut px = [0u8; 3];
    for (c, out) in px.iter_mut().enumerate() {
        let top = p00[c] as f32 * (1.0 - fx) + p10[c] as f32 * fx;
        let bottom = p01[c] as f32 * (1.0 - fx) + p11[c] as f32 * fx;
        *out = (top * (1.0 - fy) + bottom * fy).round().clamp(0.0, 255.0) as u8;
    }
    Rgb(px)
}

/// Rotate, scale and crop so the eyes land on the canonical positions.
pub fn align_face(img: &DynamicImage, detection: &Detection) -> Result<RgbImage> {
    let src = img.to_rgb8();
    let (src_w, src_h) = src.dimensions();

    let right = (detection.landmarks[0], detection.landmarks[1]);
    let left = (detection.landmarks[2], detection.landmarks[3]);
    let (dx, dy) = (left.0 - right.0, left.1 - right.1);
    let eye_dist = (dx * dx + dy * dy).sqrt();
    if !eye_dist.is_finite() || eye_dist < 1.0 {
        bail!("degenerate eye landmarks");
    }

    let (rdx, rdy) = (REF_LEFT_EYE.0 - REF_RIGHT_EYE.0, REF_LEFT_EYE.1 - REF_RIGHT_EYE.1);
    let scale = (rdx * rdx + rdy * rdy).sqrt() / eye_dist;
    let angle = dy.atan2(dx) - rdy.atan2(rdx);
    let (sin, cos) = angle.sin_cos();

    let center = ((right.0 + left.0) / 2.0, (right.1 + left.1) / 2.0);
    let ref_center = (
        (REF_RIGHT_EYE.0 + REF_LEFT_EYE.0) / 2.0,
        (REF_RIGHT_EYE.1 + REF_LEFT_EYE.1) / 2.0,
    );

    // inverse map: output pixel -> source pixel
    let mut out = RgbImage::new(FACE_SIZE, FACE_SIZE);
    for (ox, oy, px) in out.enumerate_pixels_mut() {
        let u = (ox as f32 - ref_center.0) / scale;
        let v = (oy as f32 - ref_center.1) / scale;
        let sx = center.0 + u * cos - v * sin;
        let sy = center.1 + u * sin + v * cos;
        if sx >= 0.0 && sy >= 0.0 && sx < src_w as f32 && sy < src_h as f32 {
            *px = bilinear(&src, sx, sy);
        }
    }
    Ok(out)
}

/// Run the recognizer on an aligned crop. The result is L2-normalized.
pub fn encode_face(session: &mut Session, face: &RgbImage) -> Result<Embedding> {
    let input = Value::from_array(bgr_tensor(face))?;
    let outputs = session.run(ort::inputs![input])?;
    let (_, data) = outputs[0].try_extract_tensor::<f32>()?;

    if data.is_empty() {
        bail!("recognizer returned an empty tensor");
    }
    if data.iter().any(|v| !v.is_finite()) {
        bail!("recognizer returned non-finite values");
    }

    let norm = data.iter().map(|v| v * v).sum::<f32>().sqrt();
    let vector = if norm > 0.0 {
        data.iter().map(|v| v / norm).collect()
    } else {
        data.to_vec()
    };
    Ok(Embedding::new(vector))
}
