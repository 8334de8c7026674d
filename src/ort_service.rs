use crate::{
    config::ModelConfig,
    detection::Detection,
    labels::{class_name, ClassLabel},
    model_service::{ModelService, PredictionError},
};
use async_trait::async_trait;
use image::{imageops::FilterType, DynamicImage, GenericImageView};
use ndarray::{Array, ArrayD, Axis, Ix4};
use ort::{
    session::{builder::GraphOptimizationLevel, Session},
    value::TensorRef,
};
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc, Mutex,
};

/// Input edge the detector was exported for.
const INPUT_SIZE: u32 = 640;

fn intersection(box1: &Detection, box2: &Detection) -> f32 {
    let width = box1.xmax.min(box2.xmax) - box1.xmin.max(box2.xmin);
    let height = box1.ymax.min(box2.ymax) - box1.ymin.max(box2.ymin);
    width.max(0.) * height.max(0.)
}

fn union(box1: &Detection, box2: &Detection) -> f32 {
    let area1 = (box1.xmax - box1.xmin).max(0.) * (box1.ymax - box1.ymin).max(0.);
    let area2 = (box2.xmax - box2.xmin).max(0.) * (box2.ymax - box2.ymin).max(0.);
    area1 + area2 - intersection(box1, box2)
}

fn iou(box1: &Detection, box2: &Detection) -> f32 {
    let union_area = union(box1, box2);
    if union_area <= 0. {
        return 0.;
    }
    intersection(box1, box2) / union_area
}

/// Resizes and normalizes a decoded image into the CHW input tensor, keeping
/// the original dimensions for mapping boxes back.
fn transform_image(image: &DynamicImage) -> (Array<f32, Ix4>, u32, u32) {
    let (img_width, img_height) = image.dimensions();
    let resized = image.resize_exact(INPUT_SIZE, INPUT_SIZE, FilterType::CatmullRom);

    let mut input = Array::zeros((1, 3, INPUT_SIZE as usize, INPUT_SIZE as usize));
    for pixel in resized.pixels() {
        let x = pixel.0 as _;
        let y = pixel.1 as _;
        let [r, g, b, _] = pixel.2 .0;
        input[[0, 0, y, x]] = (r as f32) / 255.;
        input[[0, 1, y, x]] = (g as f32) / 255.;
        input[[0, 2, y, x]] = (b as f32) / 255.;
    }

    (input, img_width, img_height)
}

/// Decodes a raw `[1, 4 + classes, candidates]` output tensor into scored
/// boxes in original-image pixels.
fn extract_candidates(
    output: &ArrayD<f32>,
    img_width: u32,
    img_height: u32,
    confidence_threshold: f32,
    labels: &[ClassLabel],
) -> Result<Vec<Detection>, PredictionError> {
    let shape = output.shape();
    if shape.len() != 3 || shape[0] != 1 || shape[1] < 5 {
        return Err(PredictionError::InvalidOutput(format!(
            "unexpected output tensor shape {:?}",
            shape
        )));
    }

    let grid = output.index_axis(Axis(0), 0);
    let mut boxes = Vec::new();

    for candidate in grid.axis_iter(Axis(1)) {
        let (class_id, confidence) = candidate
            .iter()
            .skip(4)
            .enumerate()
            .fold((0, f32::NEG_INFINITY), |best, (index, &score)| {
                if score > best.1 {
                    (index, score)
                } else {
                    best
                }
            });

        if confidence < confidence_threshold {
            continue;
        }

        let xc = candidate[0] / INPUT_SIZE as f32 * img_width as f32;
        let yc = candidate[1] / INPUT_SIZE as f32 * img_height as f32;
        let w = candidate[2] / INPUT_SIZE as f32 * img_width as f32;
        let h = candidate[3] / INPUT_SIZE as f32 * img_height as f32;

        boxes.push(Detection {
            xmin: xc - w / 2.,
            ymin: yc - h / 2.,
            xmax: xc + w / 2.,
            ymax: yc + h / 2.,
            confidence,
            class_id: class_id as u32,
            name: class_name(labels, class_id),
        });
    }

    Ok(boxes)
}

/// Greedy NMS suppressing within a class only; overlapping boxes of
/// different classes all survive.
fn non_max_suppression(
    mut boxes: Vec<Detection>,
    iou_threshold: f32,
    max_detections: usize,
) -> Vec<Detection> {
    boxes.sort_by(|box1, box2| box2.confidence.total_cmp(&box1.confidence));

    let mut result = Vec::new();
    while !boxes.is_empty() && result.len() < max_detections {
        let best = boxes.remove(0);
        boxes.retain(|candidate| {
            candidate.class_id != best.class_id || iou(&best, candidate) < iou_threshold
        });
        result.push(best);
    }

    result
}

#[derive(Clone)]
pub struct OrtModelService {
    sessions: Arc<Vec<Arc<Mutex<Session>>>>,
    counter: Arc<AtomicUsize>,
    labels: Arc<Vec<ClassLabel>>,
    confidence_threshold: f32,
    iou_threshold: f32,
    max_detections: usize,
}

impl OrtModelService {
    pub fn new(model_config: &ModelConfig, labels: Vec<ClassLabel>) -> anyhow::Result<Self> {
        ort::init().commit();

        let num_instances = model_config.num_instances.max(1);
        let sessions = (0..num_instances)
            .map(|_| {
                let session = Session::builder()?
                    .with_optimization_level(GraphOptimizationLevel::Level3)?
                    .commit_from_file(model_config.get_model_path())?;
                Ok(Arc::new(Mutex::new(session)))
            })
            .collect::<Result<Vec<_>, ort::Error>>()?;

        tracing::info!("Created {} ONNX sessions", num_instances);

        Ok(Self {
            counter: Arc::new(AtomicUsize::new(0)),
            sessions: Arc::new(sessions),
            labels: Arc::new(labels),
            confidence_threshold: model_config.confidence_threshold,
            iou_threshold: model_config.iou_threshold,
            max_detections: model_config.max_detections,
        })
    }

    fn run_inference(&self, input: &Array<f32, Ix4>) -> Result<ArrayD<f32>, PredictionError> {
        let index = self.counter.fetch_add(1, Ordering::SeqCst) % self.sessions.len();
        let session_arc = &self.sessions[index];
        let mut session = session_arc
            .lock()
            .map_err(|e| PredictionError::Inference(format!("session mutex poisoned: {}", e)))?;

        tracing::debug!("Handling request with session {}", index);
        let owned_buffer;
        let input_view = if input.view().is_standard_layout() {
            input.view()
        } else {
            owned_buffer = input.to_owned();
            owned_buffer.view()
        };

        let tensor_ref = TensorRef::from_array_view(input_view)
            .map_err(|e| PredictionError::Inference(format!("failed to build tensor: {}", e)))?;

        let input_tensor = ort::inputs![tensor_ref];

        let outputs = session
            .run(input_tensor)
            .map_err(|e| PredictionError::Inference(e.to_string()))?;

        let (shape, data) = outputs["output0"]
            .try_extract_tensor::<f32>()
            .map_err(|e| PredictionError::Inference(format!("failed to extract tensor: {}", e)))?;

        let ix = shape.to_ixdyn();
        let array = ArrayD::from_shape_vec(ix, data.to_vec())
            .map_err(|e| PredictionError::InvalidOutput(format!("invalid tensor shape: {}", e)))?;

        Ok(array)
    }
}

#[async_trait]
impl ModelService for OrtModelService {
    async fn predict(&self, image: &DynamicImage) -> Result<Vec<Detection>, PredictionError> {
        let (input, img_width, img_height) = transform_image(image);
        let outputs = self.run_inference(&input)?;

        let candidates = extract_candidates(
            &outputs,
            img_width,
            img_height,
            self.confidence_threshold,
            &self.labels,
        )?;
        let candidate_count = candidates.len();
        let detections = non_max_suppression(candidates, self.iou_threshold, self.max_detections);

        tracing::debug!("Kept {} of {} candidate boxes", detections.len(), candidate_count);
        Ok(detections)
    }
}
