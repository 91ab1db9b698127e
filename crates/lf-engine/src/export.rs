//! Dataset export into the archive layout the training service consumes.
//!
//! ```text
//! data.yaml
//! training/0/17_cat.jpg
//! training/0/17_cat.txt        YOLO label lines (detection, segmentation)
//! dev/_background/21_empty.jpg no-class image, empty label file
//! ```
//!
//! Class directories are the zero-based index of the class in ascending
//! class-id order; the same index is used inside label files. An image with
//! several classes is filed under its lowest index. Entry names are prefixed
//! with the image id so predictions can be traced back.

use crate::blobs::ImageBlobStore;
use crate::error::{EngineError, EngineResult};
use duckdb::Connection;
use flate2::write::GzEncoder;
use flate2::Compression;
use lf_core::{Image, ImageLabel, LabelPosition, ProjectClass, ProjectType, Split};
use lf_store::repo::{classes, images, labels};
use lf_store::DatasetScope;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;

/// Directory used for images labeled as containing no class.
pub const BACKGROUND_DIR: &str = "_background";

/// Counts of what went into an archive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportSummary {
    pub training: i64,
    pub dev: i64,
    pub test: i64,
    pub labels: i64,
    pub skipped_unassigned: usize,
    pub skipped_unlabeled: usize,
    pub missing_images: usize,
}

impl ExportSummary {
    pub fn image_count(&self) -> i64 {
        self.training + self.dev + self.test
    }

    fn count(&mut self, split: Split) {
        match split {
            Split::Training => self.training += 1,
            Split::Dev => self.dev += 1,
            Split::Test => self.test += 1,
            Split::Unassigned => {}
        }
    }
}

/// A built archive.
#[derive(Debug, Clone)]
pub struct DatasetExport {
    /// gzip-compressed tar
    pub archive: Vec<u8>,
    pub summary: ExportSummary,
    /// Class names in label-index order
    pub class_names: Vec<String>,
    /// Class ids in label-index order
    pub class_ids: Vec<i64>,
}

#[derive(Serialize)]
struct DataYaml<'a> {
    path: &'a str,
    train: &'a str,
    val: &'a str,
    test: &'a str,
    task: &'a str,
    nc: usize,
    names: &'a [String],
}

/// Zero-based label index of each class, by ascending class id.
pub fn class_index_map(classes: &[ProjectClass]) -> HashMap<i64, usize> {
    let mut ids: Vec<i64> = classes.iter().map(|c| c.id).collect();
    ids.sort_unstable();
    ids.into_iter().enumerate().map(|(idx, id)| (id, idx)).collect()
}

struct ArchiveWriter {
    builder: tar::Builder<GzEncoder<Vec<u8>>>,
}

impl ArchiveWriter {
    fn new() -> Self {
        Self {
            builder: tar::Builder::new(GzEncoder::new(Vec::new(), Compression::default())),
        }
    }

    fn append(&mut self, path: &str, data: &[u8]) -> EngineResult<()> {
        let mut header = tar::Header::new_gnu();
        header.set_size(data.len() as u64);
        header.set_mode(0o644);
        header.set_mtime(0);
        self.builder
            .append_data(&mut header, path, data)
            .map_err(|e| EngineError::Export(format!("{path}: {e}")))
    }

    fn finish(self) -> EngineResult<Vec<u8>> {
        let encoder = self
            .builder
            .into_inner()
            .map_err(|e| EngineError::Export(format!("tar: {e}")))?;
        encoder
            .finish()
            .map_err(|e| EngineError::Export(format!("gzip: {e}")))
    }
}

/// Build the training archive for `scope`.
///
/// Unassigned images and labeled images without labels are left out.
/// Missing image files are logged and counted, their label files are
/// still written.
pub fn export_dataset(
    conn: &Connection,
    scope: DatasetScope,
    project_type: ProjectType,
    blobs: &dyn ImageBlobStore,
) -> EngineResult<DatasetExport> {
    let classes = classes::list_classes(conn, scope)?;
    let index_of = class_index_map(&classes);
    let class_names: Vec<String> = classes.iter().map(|c| c.class_name.clone()).collect();
    let class_ids: Vec<i64> = classes.iter().map(|c| c.id).collect();

    let mut labels_by_image: BTreeMap<i64, Vec<ImageLabel>> = BTreeMap::new();
    for label in labels::list_labels(conn, scope)? {
        labels_by_image.entry(label.image_id).or_default().push(label);
    }

    let mut writer = ArchiveWriter::new();
    let mut summary = ExportSummary::default();

    for image in images::list_images(conn, scope)? {
        if !image.split.is_assigned() {
            summary.skipped_unassigned += 1;
            continue;
        }
        let image_labels = labels_by_image
            .get(&image.id)
            .map(Vec::as_slice)
            .unwrap_or(&[]);

        let dir = if image.is_no_class {
            if project_type == ProjectType::Classification {
                summary.skipped_unlabeled += 1;
                continue;
            }
            format!("{}/{BACKGROUND_DIR}", image.split)
        } else {
            let primary = image_labels
                .iter()
                .map(|l| class_index(&index_of, l))
                .collect::<EngineResult<Vec<_>>>()?
                .into_iter()
                .min();
            match primary {
                Some(idx) => format!("{}/{idx}", image.split),
                None => {
                    summary.skipped_unlabeled += 1;
                    continue;
                }
            }
        };

        write_image(&mut writer, blobs, &image, &dir, &mut summary)?;
        if project_type != ProjectType::Classification {
            let text = label_file(&image, image_labels, &index_of, project_type)?;
            writer.append(&format!("{dir}/{}.txt", entry_stem(&image)), text.as_bytes())?;
        }
        summary.count(image.split);
        if !image.is_no_class {
            summary.labels += image_labels.len() as i64;
        }
    }

    let data_yaml = serde_yaml::to_string(&DataYaml {
        path: ".",
        train: Split::Training.as_str(),
        val: Split::Dev.as_str(),
        test: Split::Test.as_str(),
        task: project_type.as_str(),
        nc: class_names.len(),
        names: &class_names,
    })
    .map_err(|e| EngineError::Export(format!("data.yaml: {e}")))?;
    writer.append("data.yaml", data_yaml.as_bytes())?;

    log::debug!(
        "Exported {scope}: {} images ({}/{}/{}), {} labels",
        summary.image_count(),
        summary.training,
        summary.dev,
        summary.test,
        summary.labels
    );

    Ok(DatasetExport {
        archive: writer.finish()?,
        summary,
        class_names,
        class_ids,
    })
}

fn class_index(index_of: &HashMap<i64, usize>, label: &ImageLabel) -> EngineResult<usize> {
    index_of.get(&label.class_id).copied().ok_or_else(|| {
        EngineError::Export(format!(
            "label {} references class {} outside the dataset",
            label.id, label.class_id
        ))
    })
}

fn entry_stem(image: &Image) -> String {
    let stem = Path::new(&image.file_name)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| image.file_name.clone());
    format!("{}_{stem}", image.id)
}

fn write_image(
    writer: &mut ArchiveWriter,
    blobs: &dyn ImageBlobStore,
    image: &Image,
    dir: &str,
    summary: &mut ExportSummary,
) -> EngineResult<()> {
    match blobs.read(image.project_id, &image.file_name)? {
        Some(bytes) => writer.append(&format!("{dir}/{}_{}", image.id, image.file_name), &bytes),
        None => {
            log::warn!(
                "Image file {} of project {} is missing, exporting labels only",
                image.file_name,
                image.project_id
            );
            summary.missing_images += 1;
            Ok(())
        }
    }
}

fn label_file(
    image: &Image,
    image_labels: &[ImageLabel],
    index_of: &HashMap<i64, usize>,
    project_type: ProjectType,
) -> EngineResult<String> {
    if image.is_no_class {
        return Ok(String::new());
    }
    let mut out = String::new();
    for label in image_labels {
        let idx = class_index(index_of, label)?;
        let position = LabelPosition::parse(&label.position)?;
        if let Some(line) = position.to_yolo(idx, image.width, image.height, project_type)? {
            out.push_str(&line.to_string());
            out.push('\n');
        }
    }
    Ok(out)
}

#[cfg(test)]
#[path = "export_test.rs"]
mod tests;
