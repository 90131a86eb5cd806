//! Image decoding and normalization into the network's input tensor

use cervixnet_core::{Error, Result};
use image::imageops::{self, FilterType};
use ndarray::Array4;

use crate::config::{InputLayout, Preprocessing, INPUT_SIZE};

const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];
const CAFFE_MEAN_BGR: [f32; 3] = [103.939, 116.779, 123.68];

/// Options for [`normalize`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NormalizeOptions {
    /// Square side length
    pub size: u32,
    pub layout: InputLayout,
    pub preprocessing: Preprocessing,
}

impl Default for NormalizeOptions {
    fn default() -> Self {
        Self {
            size: INPUT_SIZE,
            layout: InputLayout::default(),
            preprocessing: Preprocessing::default(),
        }
    }
}

impl Preprocessing {
    /// Map one RGB pixel to the three network channels, in channel order
    fn apply(&self, [r, g, b]: [u8; 3]) -> [f32; 3] {
        let rgb = [f32::from(r), f32::from(g), f32::from(b)];
        match self {
            Self::Torch => {
                let mut out = [0.0; 3];
                for c in 0..3 {
                    out[c] = (rgb[c] / 255.0 - IMAGENET_MEAN[c]) / IMAGENET_STD[c];
                }
                out
            }
            Self::Tf => rgb.map(|v| v / 127.5 - 1.0),
            Self::Caffe => [
                rgb[2] - CAFFE_MEAN_BGR[0],
                rgb[1] - CAFFE_MEAN_BGR[1],
                rgb[0] - CAFFE_MEAN_BGR[2],
            ],
        }
    }
}

/// Decode `bytes` and produce a `[1, size, size, 3]` (or NCHW) tensor.
///
/// The image is converted to RGB and resized without preserving aspect
/// ratio, using a bicubic filter. Allocates fresh buffers on every call.
pub fn normalize(bytes: &[u8], options: &NormalizeOptions) -> Result<Array4<f32>> {
    let decoded = image::load_from_memory(bytes).map_err(|e| Error::invalid_image(e.to_string()))?;

    let rgb = decoded.to_rgb8();
    let size = options.size;
    let resized = imageops::resize(&rgb, size, size, FilterType::CatmullRom);

    let side = size as usize;
    let mut tensor = match options.layout {
        InputLayout::Nhwc => Array4::<f32>::zeros((1, side, side, 3)),
        InputLayout::Nchw => Array4::<f32>::zeros((1, 3, side, side)),
    };

    for (x, y, pixel) in resized.enumerate_pixels() {
        let (x, y) = (x as usize, y as usize);
        let channels = options.preprocessing.apply(pixel.0);
        for (c, value) in channels.into_iter().enumerate() {
            match options.layout {
                InputLayout::Nhwc => tensor[[0, y, x, c]] = value,
                InputLayout::Nchw => tensor[[0, c, y, x]] = value,
            }
        }
    }

    Ok(tensor)
}
