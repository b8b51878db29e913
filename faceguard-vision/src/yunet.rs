//! Post-processing for the YuNet face detector.
//!
//! YuNet is anchor-free. For every stride in [`STRIDES`] it emits four heads
//! over an `(input / stride)^2` grid, in this output order:
//! `cls_8, cls_16, cls_32, obj_8, obj_16, obj_32, bbox_8, .., kps_8, ..`.
//!
//! A cell `(row, col)` decodes as
//! `cx = (col + dx) * stride`, `cy = (row + dy) * stride`,
//! `w = dw * stride`, `h = dh * stride`, landmarks likewise.

use anyhow::{bail, Result};
use ndarray::ArrayView2;

pub const STRIDES: [usize; 3] = [8, 16, 32];

/// A candidate face in pixel coordinates of the detector input.
#[derive(Debug, Clone, PartialEq)]
pub struct RawDetection {
    /// x, y, w, h
    pub bbox: [f32; 4],
    pub score: f32,
    /// Five (x, y) points: right eye, left eye, nose tip, mouth corners.
    pub landmarks: [f32; 10],
}

/// Borrowed view of the four heads belonging to one stride.
#[derive(Debug, Clone, Copy)]
pub struct Head<'a> {
    pub stride: usize,
    pub cls: ArrayView2<'a, f32>,
    pub obj: ArrayView2<'a, f32>,
    pub bbox: ArrayView2<'a, f32>,
    pub kps: ArrayView2<'a, f32>,
}

impl Head<'_> {
    fn score(&self, idx: usize) -> f32 {
        // cls and obj come out of the network already activated
        let s = self.cls[[idx, 0]].clamp(0.0, 1.0) * self.obj[[idx, 0]].clamp(0.0, 1.0);
        s.sqrt()
    }
}

fn view<'a>(
    outputs: &'a [(Vec<i64>, Vec<f32>)],
    index: usize,
    cells: usize,
    width: usize,
) -> Result<ArrayView2<'a, f32>> {
    let Some((shape, data)) = outputs.get(index) else {
        bail!("detector output {index} missing");
    };
    let flat: i64 = shape.iter().product();
    if flat as usize != cells * width {
        bail!("detector output {index} has shape {shape:?}, expected [1, {cells}, {width}]");
    }
    Ok(ArrayView2::from_shape((cells, width), data.as_slice())?)
}

/// Split the twelve raw detector outputs into per-stride heads.
pub fn heads(outputs: &[(Vec<i64>, Vec<f32>)], input_size: usize) -> Result<Vec<Head<'_>>> {
    if outputs.len() < 4 * STRIDES.len() {
        bail!("detector produced {} outputs, expected 12", outputs.len());
    }

    let n = STRIDES.len();
    STRIDES
        .iter()
        .enumerate()
        .map(|(i, &stride)| {
            let side = input_size / stride;
            let cells = side * side;
            Ok(Head {
                stride,
                cls: view(outputs, i, cells, 1)?,
                obj: view(outputs, n + i, cells, 1)?,
                bbox: view(outputs, 2 * n + i, cells, 4)?,
                kps: view(outputs, 3 * n + i, cells, 10)?,
            })
        })
        .collect()
}

/// Decode every grid cell scoring at least `score_threshold`.
pub fn decode(heads: &[Head<'_>], input_size: usize, score_threshold: f32) -> Vec<RawDetection> {
    let mut out = Vec::new();

    for head in heads {
        let side = input_size / head.stride;
        let stride = head.stride as f32;

        for row in 0..side {
            for col in 0..side {
                let idx = row * side + col;
                let score = head.score(idx);
                if score < score_threshold {
                    continue;
                }

                let cx = (col as f32 + head.bbox[[idx, 0]]) * stride;
                let cy = (row as f32 + head.bbox[[idx, 1]]) * stride;
                let w = head.bbox[[idx, 2]] * stride;
                let h = head.bbox[[idx, 3]] * stride;

                let mut landmarks = [0.0f32; 10];
                for k in 0..5 {
                    landmarks[2 * k] = (col as f32 + head.kps[[idx, 2 * k]]) * stride;
                    landmarks[2 * k + 1] = (row as f32 + head.kps[[idx, 2 * k + 1]]) * stride;
                }

                out.push(RawDetection {
                    bbox: [cx - w / 2.0, cy - h / 2.0, w, h],
                    score,
                    landmarks,
                });
            }
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const INPUT: usize = 640;

    fn blank_outputs() -> Vec<(Vec<i64>, Vec<f32>)> {
        let mut outputs = Vec::new();
        for width in [1usize, 1, 4, 10] {
            for stride in STRIDES {
                let cells = (INPUT / stride).pow(2);
                outputs.push((vec![1, cells as i64, width as i64], vec![0.0; cells * width]));
            }
        }
        outputs
    }

    #[test]
    fn decodes_single_cell_on_coarsest_grid() {
        let mut outputs = blank_outputs();
        let side = INPUT / 32;
        let idx = 10 * side + 10;

        // stride 32 lives at slot 2 of each group of three
        outputs[2].1[idx] = 0.81;
        outputs[5].1[idx] = 1.0;
        let bbox = &mut outputs[8].1;
        bbox[idx * 4] = 0.5;
        bbox[idx * 4 + 1] = 0.25;
        bbox[idx * 4 + 2] = 4.0;
        bbox[idx * 4 + 3] = 4.0;

        let heads = heads(&outputs, INPUT).unwrap();
        let dets = decode(&heads, INPUT, 0.5);
        assert_eq!(dets.len(), 1);

        let d = &dets[0];
        assert!((d.score - 0.9).abs() < 1e-5);
        // center (10.5 * 32, 10.25 * 32) = (336, 328), size 128
        assert!((d.bbox[0] - 272.0).abs() < 1e-3);
        assert!((d.bbox[1] - 264.0).abs() < 1e-3);
        assert!((d.bbox[2] - 128.0).abs() < 1e-3);
        assert!((d.landmarks[0] - 320.0).abs() < 1e-3);
        assert!((d.landmarks[1] - 320.0).abs() < 1e-3);
    }

    #[test]
    fn nothing_above_threshold() {
        let outputs = blank_outputs();
        let heads = heads(&outputs, INPUT).unwrap();
        assert!(decode(&heads, INPUT, 0.5).is_empty());
    }

    #[test]
    fn rejects_truncated_outputs() {
        let mut outputs = blank_outputs();
        outputs.truncate(11);
        assert!(heads(&outputs, INPUT).is_err());

        let mut outputs = blank_outputs();
        outputs[7].1.pop();
        outputs[7].0 = vec![1, 1599, 4];
        assert!(heads(&outputs, INPUT).is_err());
    }
}
