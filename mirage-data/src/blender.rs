//! Blender-style synthetic dataset loading.
//!
//! A scene directory holds `transforms_<split>.json` (shared camera angle and
//! one pose matrix per frame) plus the referenced PNG frames. Frames with an
//! alpha channel are composited over a white background, matching how the
//! synthetic scenes were rendered.

use std::fmt;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use glam::Mat4;
use image::imageops::FilterType;
use serde::Deserialize;
use tracing::info;

/// Near bound used by the synthetic scenes.
pub const BLENDER_NEAR: f32 = 2.0;
/// Far bound used by the synthetic scenes.
pub const BLENDER_FAR: f32 = 6.0;

/// Errors that can occur while loading a dataset.
#[derive(Debug, thiserror::Error)]
pub enum DataError {
    #[error("unknown dataset kind: {0}")]
    UnknownDataset(String),
    #[error("missing transforms file: {0}")]
    MissingTransforms(PathBuf),
    #[error("transforms reference no frames: {0}")]
    EmptySplit(PathBuf),
    #[error("frame size mismatch: expected {expected_w}x{expected_h}, got {got_w}x{got_h} for {path}")]
    FrameSizeMismatch {
        expected_w: u32,
        expected_h: u32,
        got_w: u32,
        got_h: u32,
        path: PathBuf,
    },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("image decoding error: {0}")]
    Image(#[from] image::ImageError),
    #[error("malformed transforms: {0}")]
    Json(#[from] serde_json::Error),
}

/// Which half of the posed data to load.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Split {
    Train,
    Test,
}

impl fmt::Display for Split {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Split::Train => write!(f, "train"),
            Split::Test => write!(f, "test"),
        }
    }
}

/// A loaded scene split: ground-truth pixels plus camera geometry.
#[derive(Debug, Clone)]
pub struct SceneData {
    /// Per-frame RGB pixels, row-major, `height * width * 3` each, 0-1 range.
    pub pixels: Vec<Vec<f32>>,
    /// Camera-to-world pose per frame.
    pub poses: Vec<Mat4>,
    /// Frame height after downsampling.
    pub height: usize,
    /// Frame width after downsampling.
    pub width: usize,
    /// Horizontal field of view shared by all frames, radians.
    pub camera_angle_x: f32,
    /// Focal length in pixels at `width`.
    pub focal: f32,
    /// Scene near bound.
    pub near: f32,
    /// Scene far bound.
    pub far: f32,
}

impl SceneData {
    /// Focal length in pixels for a horizontal field of view at a given width.
    pub fn focal_for(camera_angle_x: f32, width: usize) -> f32 {
        0.5 * width as f32 / (0.5 * camera_angle_x).tan()
    }

    /// Number of frames in the split.
    pub fn len(&self) -> usize {
        self.poses.len()
    }

    /// True when the split holds no frames.
    pub fn is_empty(&self) -> bool {
        self.poses.is_empty()
    }
}

#[derive(Debug, Deserialize)]
struct TransformsFile {
    camera_angle_x: f32,
    frames: Vec<TransformFrame>,
}

#[derive(Debug, Deserialize)]
struct TransformFrame {
    file_path: String,
    transform_matrix: [[f32; 4]; 4],
}

/// Load one split of a posed-image dataset.
///
/// `factor` > 1 downsamples every frame (and the focal length) by that
/// integer factor. Only the `blender` dataset kind is recognized.
pub fn load_scene(
    dataset_name: &str,
    base_dir: &Path,
    split: Split,
    factor: usize,
) -> Result<SceneData, DataError> {
    if dataset_name != "blender" {
        return Err(DataError::UnknownDataset(dataset_name.to_string()));
    }

    let transforms_path = base_dir.join(format!("transforms_{split}.json"));
    if !transforms_path.exists() {
        return Err(DataError::MissingTransforms(transforms_path));
    }
    let reader = BufReader::new(File::open(&transforms_path)?);
    let transforms: TransformsFile = serde_json::from_reader(reader)?;
    if transforms.frames.is_empty() {
        return Err(DataError::EmptySplit(transforms_path));
    }

    let factor = factor.max(1);
    let mut pixels = Vec::with_capacity(transforms.frames.len());
    let mut poses = Vec::with_capacity(transforms.frames.len());
    let mut size: Option<(u32, u32)> = None;

    for frame in &transforms.frames {
        let path = frame_path(base_dir, &frame.file_path);
        let mut img = image::open(&path)?;
        if factor > 1 {
            let (w, h) = (img.width() / factor as u32, img.height() / factor as u32);
            img = img.resize_exact(w, h, FilterType::Triangle);
        }
        let rgba = img.to_rgba8();
        match size {
            None => size = Some(rgba.dimensions()),
            Some((ew, eh)) if (ew, eh) != rgba.dimensions() => {
                let (got_w, got_h) = rgba.dimensions();
                return Err(DataError::FrameSizeMismatch {
                    expected_w: ew,
                    expected_h: eh,
                    got_w,
                    got_h,
                    path,
                });
            }
            Some(_) => {}
        }

        let mut rgb = Vec::with_capacity((rgba.width() * rgba.height() * 3) as usize);
        for px in rgba.pixels() {
            let a = px[3] as f32 / 255.0;
            for c in 0..3 {
                let v = px[c] as f32 / 255.0;
                // Composite over white so transparent background reads as 1.0.
                rgb.push(v * a + (1.0 - a));
            }
        }
        pixels.push(rgb);

        // Transform matrices are stored as rows; glam wants columns.
        poses.push(Mat4::from_cols_array_2d(&frame.transform_matrix).transpose());
    }

    let Some((width, height)) = size else {
        return Err(DataError::EmptySplit(transforms_path));
    };
    let (width, height) = (width as usize, height as usize);
    let focal = SceneData::focal_for(transforms.camera_angle_x, width);
    info!(
        split = %split,
        frames = poses.len(),
        width,
        height,
        "loaded scene"
    );

    Ok(SceneData {
        pixels,
        poses,
        height,
        width,
        camera_angle_x: transforms.camera_angle_x,
        focal,
        near: BLENDER_NEAR,
        far: BLENDER_FAR,
    })
}

/// Read only the shared camera angle of a scene, without decoding frames.
pub fn load_camera_angle(base_dir: &Path) -> Result<f32, DataError> {
    let transforms_path = base_dir.join("transforms_train.json");
    if !transforms_path.exists() {
        return Err(DataError::MissingTransforms(transforms_path));
    }
    let reader = BufReader::new(File::open(&transforms_path)?);
    let transforms: TransformsFile = serde_json::from_reader(reader)?;
    Ok(transforms.camera_angle_x)
}

fn frame_path(base_dir: &Path, file_path: &str) -> PathBuf {
    let relative = file_path.trim_start_matches("./");
    let mut path = base_dir.join(relative);
    if path.extension().is_none() {
        path.set_extension("png");
    }
    path
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_focal_from_angle() {
        // 90 degree fov: focal equals half the width.
        let focal = SceneData::focal_for(std::f32::consts::FRAC_PI_2, 200);
        assert!((focal - 100.0).abs() < 1e-3);
    }

    #[test]
    fn test_unknown_dataset_rejected() {
        let err = load_scene("llff", Path::new("/nonexistent"), Split::Train, 1).unwrap_err();
        assert!(matches!(err, DataError::UnknownDataset(_)));
    }

    #[test]
    fn test_missing_transforms_rejected() {
        let err = load_scene("blender", Path::new("/nonexistent"), Split::Test, 1).unwrap_err();
        assert!(matches!(err, DataError::MissingTransforms(_)));
    }

    #[test]
    fn test_frame_path_appends_extension() {
        let path = frame_path(Path::new("/data/lego"), "./train/r_0");
        assert_eq!(path, PathBuf::from("/data/lego/train/r_0.png"));
        let path = frame_path(Path::new("/data/lego"), "./train/r_0.png");
        assert_eq!(path, PathBuf::from("/data/lego/train/r_0.png"));
    }

    #[test]
    fn test_split_display() {
        assert_eq!(Split::Train.to_string(), "train");
        assert_eq!(Split::Test.to_string(), "test");
    }
}
