// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Label volume and sizing field readers

use crate::domain::{LabelVolume, SizingField};
use crate::error::{MeshError, MeshResult};
use image::DynamicImage;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;
use walkdir::WalkDir;

fn read_json<T: DeserializeOwned>(path: &Path) -> MeshResult<T> {
    let content = fs::read_to_string(path).map_err(|e| MeshError::io(path, e))?;
    serde_json::from_str(&content).map_err(|e| MeshError::format(path, e.to_string()))
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> MeshResult<()> {
    let content = serde_json::to_string(value).map_err(|e| MeshError::format(path, e.to_string()))?;
    fs::write(path, content).map_err(|e| MeshError::io(path, e))
}

/// Load a label volume from a JSON file or a directory of PNG slices
pub fn read_label_volume(path: impl AsRef<Path>) -> MeshResult<LabelVolume> {
    let path = path.as_ref();
    if path.is_dir() {
        return read_png_stack(path, [1.0, 1.0, 1.0], [0.0, 0.0, 0.0]);
    }
    let volume: LabelVolume = read_json(path)?;
    volume.validate()?;
    debug!(path = %path.display(), dims = ?volume.dims, "label volume loaded");
    Ok(volume)
}

pub fn write_label_volume(path: impl AsRef<Path>, volume: &LabelVolume) -> MeshResult<()> {
    write_json(path.as_ref(), volume)
}

/// Load a directory of grayscale PNG slices, one z-slice per file in file name order
///
/// Pixel `(x, y)` of slice `k` becomes voxel `(x, y, k)`. 8-bit and 16-bit
/// grayscale slices keep their raw values as labels; color slices are
/// reduced to luma first.
pub fn read_png_stack(dir: impl AsRef<Path>, spacing: [f64; 3], origin: [f64; 3]) -> MeshResult<LabelVolume> {
    let dir = dir.as_ref();
    let mut slices: Vec<PathBuf> = WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.into_path())
        .filter(|p| p.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("png")))
        .collect();
    slices.sort();

    if slices.is_empty() {
        return Err(MeshError::format(dir, "no PNG slices found"));
    }

    let mut width = 0;
    let mut height = 0;
    let mut labels = Vec::new();
    for (k, slice) in slices.iter().enumerate() {
        let img = image::open(slice).map_err(|e| MeshError::format(slice, e.to_string()))?;
        let (w, h) = (img.width() as usize, img.height() as usize);
        if k == 0 {
            width = w;
            height = h;
        } else if (w, h) != (width, height) {
            return Err(MeshError::format(
                slice,
                format!("slice is {}x{}, expected {}x{}", w, h, width, height),
            ));
        }
        let values: Vec<u16> = match img {
            DynamicImage::ImageLuma16(buffer) => buffer.into_raw(),
            other => other.into_luma8().into_raw().into_iter().map(u16::from).collect(),
        };
        labels.extend(values);
    }

    debug!(dir = %dir.display(), slices = slices.len(), width, height, "PNG stack loaded");
    LabelVolume::new([width, height, slices.len()], spacing, origin, labels)
}

/// Load a sizing field from JSON
pub fn read_sizing_field(path: impl AsRef<Path>) -> MeshResult<SizingField> {
    let path = path.as_ref();
    let field: SizingField = read_json(path)?;
    field.validate()?;
    Ok(field)
}

pub fn write_sizing_field(path: impl AsRef<Path>, field: &SizingField) -> MeshResult<()> {
    write_json(path.as_ref(), field)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageBuffer, Luma};

    #[test]
    fn test_label_volume_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("volume.json");
        let volume = LabelVolume::from_fn([3, 2, 2], [0.5, 1.0, 2.0], [1.0, 0.0, -1.0], |p| {
            u16::from(p.x > 1.5)
        })
        .unwrap();
        write_label_volume(&path, &volume).unwrap();
        assert_eq!(read_label_volume(&path).unwrap(), volume);
    }

    #[test]
    fn test_png_stack() {
        let dir = tempfile::tempdir().unwrap();
        for k in 0..3u8 {
            let img: ImageBuffer<Luma<u8>, Vec<u8>> = ImageBuffer::from_fn(4, 2, |x, _| Luma([if x >= 2 { 2 + k } else { 0 }]));
            img.save(dir.path().join(format!("slice_{:03}.png", k))).unwrap();
        }
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let volume = read_label_volume(dir.path()).unwrap();
        assert_eq!(volume.dims, [4, 2, 3]);
        assert_eq!(volume.labels[0], 0);
        assert_eq!(volume.labels[2], 2);
        assert_eq!(volume.labels[4 * 2 * 2 + 3], 4);
    }

    #[test]
    fn test_malformed_inputs() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(read_label_volume(dir.path()), Err(MeshError::Format { .. })));

        let path = dir.path().join("broken.json");
        std::fs::write(&path, "{\"dims\": [2, 2]}").unwrap();
        assert!(matches!(read_label_volume(&path), Err(MeshError::Format { .. })));

        let missing = dir.path().join("missing.json");
        assert!(matches!(read_sizing_field(&missing), Err(MeshError::Io { .. })));

        std::fs::write(&path, r#"{"dims":[1,1,1],"spacing":[1,1,1],"origin":[0,0,0],"values":[-1.0]}"#).unwrap();
        assert!(read_sizing_field(&path).is_err());
    }
}
