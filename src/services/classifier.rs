use crate::config::{ChannelOrder, ModelConfig};
use crate::error::Result;
use crate::services::CaptureFrame;
use crate::{app_error, debug_if_enabled};
use image::imageops::{self, FilterType};
use smallvec::SmallVec;
use std::fmt;
use std::path::Path;
use tracing::info;
use tract_onnx::prelude::*;

/// Входной тензор NCHW с N = 1 и C = 3
#[derive(Debug, Clone, PartialEq)]
pub struct InputTensor {
    pub data: Vec<f32>,
    pub width: usize,
    pub height: usize,
}

impl InputTensor {
    pub fn zeros(width: usize, height: usize) -> Self {
        Self {
            data: vec![0.0; 3 * width * height],
            width,
            height,
        }
    }
}

/// Прямой проход модели: один тензор изображения → вектор оценок
pub trait ModelBackend: Send + Sync {
    fn forward(&self, input: InputTensor) -> Result<Vec<f32>>;
}

/// Результат классификации одного кадра
#[derive(Debug, Clone, PartialEq)]
pub struct ClassificationResult {
    pub label: String,
    pub index: usize,
    pub scores: SmallVec<[f32; 8]>,
}

impl ClassificationResult {
    pub fn score(&self) -> f32 {
        self.scores[self.index]
    }
}

impl fmt::Display for ClassificationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({:.3})", self.label, self.score())
    }
}

/// Метка с максимальной оценкой; при равенстве побеждает меньший индекс.
/// NaN не выигрывает у чисел.
pub fn select_label(labels: &[String], scores: &[f32]) -> Result<ClassificationResult> {
    if scores.len() != labels.len() {
        return Err(app_error!(
            inference,
            "модель вернула {} оценок, ожидалось {}",
            scores.len(),
            labels.len()
        ));
    }
    if scores.is_empty() {
        return Err(app_error!(inference, "пустой вектор оценок"));
    }

    let key = |v: f32| if v.is_nan() { f32::NEG_INFINITY } else { v };
    let mut best = 0;
    for (i, &score) in scores.iter().enumerate().skip(1) {
        if key(score) > key(scores[best]) {
            best = i;
        }
    }

    Ok(ClassificationResult {
        label: labels[best].clone(),
        index: best,
        scores: scores.iter().copied().collect(),
    })
}

pub struct Classifier {
    backend: Box<dyn ModelBackend>,
    labels: Vec<String>,
    input_width: u32,
    input_height: u32,
    scale: f32,
    channel_order: ChannelOrder,
}

impl Classifier {
    /// Загрузить ONNX модель. Ошибка здесь фатальна для запуска.
    pub fn load(path: &Path, config: &ModelConfig) -> Result<Self> {
        info!("Загрузка модели {:?}", path);
        if !path.is_file() {
            return Err(app_error!(model_load, "файл {:?} не найден", path));
        }

        let backend = TractModel::load(path, config.input_width, config.input_height)?;
        Self::with_backend(Box::new(backend), config)
    }

    /// Проверяет модель пробным проходом: число оценок должно совпасть с числом меток
    pub fn with_backend(backend: Box<dyn ModelBackend>, config: &ModelConfig) -> Result<Self> {
        let probe = InputTensor::zeros(config.input_width as usize, config.input_height as usize);
        let scores = backend
            .forward(probe)
            .map_err(|e| app_error!(model_load, "пробный проход не удался: {}", e))?;

        if scores.len() != config.labels.len() {
            return Err(app_error!(
                model_load,
                "модель выдаёт {} оценок, а меток {}: {:?}",
                scores.len(),
                config.labels.len(),
                config.labels
            ));
        }

        info!(
            "Модель готова: вход {}x{}, метки {:?}",
            config.input_width, config.input_height, config.labels
        );

        Ok(Self {
            backend,
            labels: config.labels.clone(),
            input_width: config.input_width,
            input_height: config.input_height,
            scale: config.scale,
            channel_order: config.channel_order,
        })
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    /// Кадр → метка. Порога уверенности нет: любой кадр получает метку.
    pub fn classify(&self, frame: &CaptureFrame) -> Result<ClassificationResult> {
        let input = self.preprocess(frame)?;
        let scores = self.backend.forward(input)?;
        let result = select_label(&self.labels, &scores)?;

        debug_if_enabled!("Оценки {:?} → {}", result.scores.as_slice(), result);
        Ok(result)
    }

    /// Масштабирование до входа модели, нормализация и планарная раскладка каналов
    pub fn preprocess(&self, frame: &CaptureFrame) -> Result<InputTensor> {
        if frame.width() == 0 || frame.height() == 0 {
            return Err(app_error!(inference, "пустой кадр {}x{}", frame.width(), frame.height()));
        }

        let resized = imageops::resize(
            frame.image(),
            self.input_width,
            self.input_height,
            FilterType::Triangle,
        );

        let (w, h) = (self.input_width as usize, self.input_height as usize);
        let plane = w * h;
        let channels: [usize; 3] = match self.channel_order {
            ChannelOrder::Rgb => [0, 1, 2],
            ChannelOrder::Bgr => [2, 1, 0],
        };

        let mut data = vec![0.0f32; 3 * plane];
        for (x, y, pixel) in resized.enumerate_pixels() {
            let offset = y as usize * w + x as usize;
            for (c, &source) in channels.iter().enumerate() {
                data[c * plane + offset] = pixel.0[source] as f32 * self.scale;
            }
        }

        Ok(InputTensor {
            data,
            width: w,
            height: h,
        })
    }
}

/// ONNX модель через tract
pub struct TractModel {
    plan: TypedRunnableModel<TypedModel>,
}

impl TractModel {
    pub fn load(path: &Path, width: u32, height: u32) -> Result<Self> {
        let shape = [1, 3, height as usize, width as usize];
        let plan = tract_onnx::onnx()
            .model_for_path(path)
            .and_then(|model| model.with_input_fact(0, f32::fact(shape).into()))
            .and_then(|model| model.into_optimized())
            .and_then(|model| model.into_runnable())
            .map_err(|e| app_error!(model_load, "{:?}: {}", path, e))?;

        Ok(Self { plan })
    }
}

impl ModelBackend for TractModel {
    fn forward(&self, input: InputTensor) -> Result<Vec<f32>> {
        let array = tract_ndarray::Array4::from_shape_vec((1, 3, input.height, input.width), input.data)
            .map_err(|e| app_error!(inference, "неверная форма тензора: {}", e))?;

        let outputs = self
            .plan
            .run(tvec!(Tensor::from(array).into()))
            .map_err(|e| app_error!(inference, "прямой проход: {}", e))?;

        let output = outputs
            .first()
            .ok_or_else(|| app_error!(inference, "модель не вернула выходов"))?;
        let scores = output
            .to_array_view::<f32>()
            .map_err(|e| app_error!(inference, "выход не f32: {}", e))?;

        Ok(scores.iter().copied().collect())
    }
}
