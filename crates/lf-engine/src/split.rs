//! Split Assignment Engine.
//!
//! Assigns eligible images to training/dev/test per class. Classes are
//! visited in the order given by [`ClaimPolicy`]; each class shuffles its
//! unclaimed candidates with a seed derived from `(project_id, class_id)`
//! and partitions them floor-first with the remainder going to test. An
//! image carrying several classes is claimed by the first class that
//! reaches it and is not reconsidered later.

use crate::error::{EngineError, EngineResult};
use duckdb::Connection;
use lf_core::{Image, ProjectClass, Split, SplitRatio};
use lf_core::split::SplitSizes;
use lf_store::repo::{classes, images, labels, projects, splits};
use lf_store::{DatasetScope, StoreDb};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

/// Which class gets an image that carries labels of several classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClaimPolicy {
    /// Classes in ascending id order; the lowest id claims shared images
    #[default]
    FirstClassById,
    /// Classes with fewer candidates go first so small classes keep their
    /// images; ties by ascending id
    RarestClassFirst,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignSplitsRequest {
    pub project_id: i64,
    /// Applied to every class without an entry in `class_ratios`
    #[serde(default)]
    pub ratio: Option<SplitRatio>,
    #[serde(default)]
    pub class_ratios: BTreeMap<i64, SplitRatio>,
    /// Also assign no-class and unlabeled images, with the overall ratio
    #[serde(default)]
    pub adjust_all_together: bool,
    /// Reassign images that already have a split
    #[serde(default)]
    pub include_assigned: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassAssignment {
    pub class_id: i64,
    pub class_name: String,
    pub ratio: SplitRatio,
    /// Images assigned through this class
    pub candidates: usize,
    /// Eligible images already taken by an earlier class
    pub claimed_elsewhere: usize,
    #[serde(flatten)]
    pub sizes: SplitSizes,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignSplitsResult {
    /// Rows written, including ones that already held the assigned value
    pub updated_count: usize,
    pub classes: Vec<ClassAssignment>,
    /// Sizes of the final no-class/unlabeled pass, when it ran
    pub unclassified: Option<SplitSizes>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassStat {
    pub class_id: i64,
    pub class_name: String,
    pub color: String,
    pub image_count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AutoSplitStats {
    /// Distinct images eligible through at least one class
    pub total_images_to_split: usize,
    pub class_stats: Vec<ClassStat>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassSplitRow {
    pub class_id: i64,
    pub class_name: String,
    pub color: String,
    pub training: i64,
    pub dev: i64,
    pub test: i64,
    pub unassigned: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SplitClassCount {
    pub class_id: i64,
    pub class_name: String,
    pub count: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SplitBreakdown {
    pub split: Split,
    /// All images of the project holding this split
    pub total: i64,
    pub classes: Vec<SplitClassCount>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SplitPreview {
    pub by_class: Vec<ClassSplitRow>,
    pub by_split: Vec<SplitBreakdown>,
}

/// Ratio lookup: request per-class, request overall, stored per-class,
/// stored project default, configured default.
struct RatioResolver<'a> {
    request: &'a AssignSplitsRequest,
    stored: HashMap<Option<i64>, SplitRatio>,
    fallback: SplitRatio,
}

impl RatioResolver<'_> {
    fn for_class(&self, class_id: i64) -> SplitRatio {
        self.request
            .class_ratios
            .get(&class_id)
            .copied()
            .or(self.request.ratio)
            .or_else(|| self.stored.get(&Some(class_id)).copied())
            .unwrap_or_else(|| self.overall())
    }

    fn overall(&self) -> SplitRatio {
        self.request
            .ratio
            .or_else(|| self.stored.get(&None).copied())
            .unwrap_or(self.fallback)
    }
}

/// Stable shuffle seed for one class (or the unclassified pass) of a project.
pub fn shuffle_seed(project_id: i64, class_id: Option<i64>) -> u64 {
    let mut hasher = Sha256::new();
    hasher.update(project_id.to_le_bytes());
    match class_id {
        Some(id) => {
            hasher.update([1u8]);
            hasher.update(id.to_le_bytes());
        }
        None => hasher.update([0u8]),
    }
    let digest = hasher.finalize();
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest[..8]);
    u64::from_le_bytes(bytes)
}

/// Shuffle `ids` deterministically and cut them into the three splits.
fn partition_group(ids: &mut [i64], ratio: SplitRatio, seed: u64) -> (SplitSizes, Vec<(i64, Split)>) {
    ids.sort_unstable();
    let mut rng = StdRng::seed_from_u64(seed);
    ids.shuffle(&mut rng);
    let sizes = ratio.partition(ids.len());
    let assignments = ids
        .iter()
        .enumerate()
        .map(|(idx, id)| (*id, SplitRatio::split_for_index(&sizes, idx)))
        .collect();
    (sizes, assignments)
}

fn is_class_eligible(image: &Image, include_assigned: bool) -> bool {
    image.is_labeled && !image.is_no_class && (include_assigned || !image.split.is_assigned())
}

/// Images of a project and their class-pass eligibility.
struct Candidates {
    images: Vec<Image>,
    /// Eligible image ids per class, ascending
    per_class: BTreeMap<i64, Vec<i64>>,
    /// Every image carrying at least one label, eligible or not
    with_labels: HashSet<i64>,
}

fn class_candidates(
    conn: &Connection,
    project_id: i64,
    include_assigned: bool,
) -> EngineResult<Candidates> {
    let scope = DatasetScope::Live { project_id };
    let all_images = images::list_images(conn, scope)?;
    let eligible: HashSet<i64> = all_images
        .iter()
        .filter(|img| is_class_eligible(img, include_assigned))
        .map(|img| img.id)
        .collect();
    let mut per_class: BTreeMap<i64, Vec<i64>> = BTreeMap::new();
    let mut with_labels = HashSet::new();
    for (image_id, class_id) in labels::image_class_pairs(conn, scope)? {
        with_labels.insert(image_id);
        if eligible.contains(&image_id) {
            per_class.entry(class_id).or_default().push(image_id);
        }
    }
    Ok(Candidates {
        images: all_images,
        per_class,
        with_labels,
    })
}

fn require_project(conn: &Connection, project_id: i64) -> EngineResult<()> {
    projects::get_project(conn, project_id)?
        .map(|_| ())
        .ok_or_else(|| EngineError::not_found("project", project_id))
}

pub struct SplitEngine {
    store: Arc<StoreDb>,
    default_ratio: SplitRatio,
    policy: ClaimPolicy,
}

impl SplitEngine {
    pub fn new(store: Arc<StoreDb>, default_ratio: SplitRatio) -> Self {
        Self {
            store,
            default_ratio,
            policy: ClaimPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: ClaimPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Per-class counts of images eligible for assignment.
    pub fn get_auto_split_stats(
        &self,
        project_id: i64,
        include_assigned: bool,
    ) -> EngineResult<AutoSplitStats> {
        self.store.with_conn(|conn| {
            require_project(conn, project_id)?;
            let per_class = class_candidates(conn, project_id, include_assigned)?.per_class;
            let classes = classes::list_classes(conn, DatasetScope::Live { project_id })?;
            let distinct: HashSet<i64> = per_class.values().flatten().copied().collect();
            let class_stats = classes
                .into_iter()
                .map(|c| ClassStat {
                    image_count: per_class.get(&c.id).map_or(0, Vec::len),
                    class_id: c.id,
                    class_name: c.class_name,
                    color: c.color_code,
                })
                .collect();
            Ok(AutoSplitStats {
                total_images_to_split: distinct.len(),
                class_stats,
            })
        })
    }

    /// Compute and persist split membership in one transaction.
    pub fn assign_splits(
        &self,
        request: &AssignSplitsRequest,
        user: &str,
    ) -> EngineResult<AssignSplitsResult> {
        if let Some(ratio) = &request.ratio {
            ratio.validate()?;
        }
        for ratio in request.class_ratios.values() {
            ratio.validate()?;
        }
        let project_id = request.project_id;

        let result = self.store.transaction(|conn| {
            require_project(conn, project_id)?;
            let scope = DatasetScope::Live { project_id };
            let classes = classes::list_classes(conn, scope)?;
            let known: HashSet<i64> = classes.iter().map(|c| c.id).collect();
            if let Some(unknown) = request.class_ratios.keys().find(|id| !known.contains(*id)) {
                return Err(EngineError::Validation(format!(
                    "class {unknown} does not belong to project {project_id}"
                )));
            }

            let resolver = RatioResolver {
                request,
                stored: splits::list_splits(conn, scope)?
                    .into_iter()
                    .map(|s| (s.class_id, s.ratio))
                    .collect(),
                fallback: self.default_ratio,
            };

            let candidates = class_candidates(conn, project_id, request.include_assigned)?;
            let per_class = &candidates.per_class;
            let ordered = self.order_classes(&classes, per_class);

            let mut claimed: HashSet<i64> = HashSet::new();
            let mut assignments: Vec<(i64, Split)> = Vec::new();
            let mut class_results = Vec::with_capacity(ordered.len());

            for class in ordered {
                let eligible = per_class.get(&class.id).map(Vec::as_slice).unwrap_or(&[]);
                let mut pool: Vec<i64> = eligible
                    .iter()
                    .copied()
                    .filter(|id| !claimed.contains(id))
                    .collect();
                let claimed_elsewhere = eligible.len() - pool.len();
                let ratio = resolver.for_class(class.id);
                let (sizes, assigned) =
                    partition_group(&mut pool, ratio, shuffle_seed(project_id, Some(class.id)));
                claimed.extend(pool.iter().copied());
                assignments.extend(assigned);
                class_results.push(ClassAssignment {
                    class_id: class.id,
                    class_name: class.class_name.clone(),
                    ratio,
                    candidates: pool.len(),
                    claimed_elsewhere,
                    sizes,
                });
            }

            let unclassified = if request.adjust_all_together {
                let mut rest: Vec<i64> = candidates
                    .images
                    .iter()
                    .filter(|img| {
                        (img.is_no_class || !img.is_labeled || !candidates.with_labels.contains(&img.id))
                            && !claimed.contains(&img.id)
                            && (request.include_assigned || !img.split.is_assigned())
                    })
                    .map(|img| img.id)
                    .collect();
                let (sizes, assigned) =
                    partition_group(&mut rest, resolver.overall(), shuffle_seed(project_id, None));
                assignments.extend(assigned);
                Some(sizes)
            } else {
                None
            };

            let updated_count = images::update_splits(conn, &assignments)?;
            Ok(AssignSplitsResult {
                updated_count,
                classes: class_results,
                unclassified,
            })
        })?;

        log::info!(
            "Assigned splits for project {project_id} by {user}: {} images across {} classes",
            result.updated_count,
            result.classes.len()
        );
        Ok(result)
    }

    fn order_classes<'a>(
        &self,
        classes: &'a [ProjectClass],
        per_class: &BTreeMap<i64, Vec<i64>>,
    ) -> Vec<&'a ProjectClass> {
        let mut ordered: Vec<&ProjectClass> = classes.iter().collect();
        match self.policy {
            ClaimPolicy::FirstClassById => ordered.sort_by_key(|c| c.id),
            ClaimPolicy::RarestClassFirst => ordered
                .sort_by_key(|c| (per_class.get(&c.id).map_or(0, Vec::len), c.id)),
        }
        ordered
    }

    /// Current persisted split membership, per class and per split.
    pub fn get_split_preview(&self, project_id: i64) -> EngineResult<SplitPreview> {
        self.store.with_conn(|conn| {
            require_project(conn, project_id)?;
            let scope = DatasetScope::Live { project_id };
            let classes = classes::list_classes(conn, scope)?;
            let counts = images::class_split_counts(conn, scope)?;
            let totals = images::dataset_counts(conn, scope)?;

            let by_class: Vec<ClassSplitRow> = classes
                .iter()
                .map(|c| {
                    let mut row = ClassSplitRow {
                        class_id: c.id,
                        class_name: c.class_name.clone(),
                        color: c.color_code.clone(),
                        ..ClassSplitRow::default()
                    };
                    for count in counts.iter().filter(|r| r.class_id == c.id) {
                        match count.split {
                            Split::Training => row.training = count.image_count,
                            Split::Dev => row.dev = count.image_count,
                            Split::Test => row.test = count.image_count,
                            Split::Unassigned => row.unassigned = count.image_count,
                        }
                    }
                    row
                })
                .collect();

            let by_split = [Split::Training, Split::Dev, Split::Test, Split::Unassigned]
                .into_iter()
                .map(|split| SplitBreakdown {
                    split,
                    total: match split {
                        Split::Training => totals.train_count,
                        Split::Dev => totals.dev_count,
                        Split::Test => totals.test_count,
                        Split::Unassigned => totals.unassigned_count,
                    },
                    classes: classes
                        .iter()
                        .filter_map(|c| {
                            counts
                                .iter()
                                .find(|r| r.class_id == c.id && r.split == split)
                                .map(|r| SplitClassCount {
                                    class_id: c.id,
                                    class_name: c.class_name.clone(),
                                    count: r.image_count,
                                })
                        })
                        .collect(),
                })
                .collect();

            Ok(SplitPreview { by_class, by_split })
        })
    }

    /// Manually place one image. Case-insensitive; last write wins.
    pub fn set_image_split(&self, image_id: i64, value: &str, user: &str) -> EngineResult<Image> {
        let split = Split::parse(value)?;
        let image = self.store.with_conn(|conn| {
            images::get_image(conn, image_id)?
                .ok_or_else(|| EngineError::not_found("image", image_id))?;
            images::update_split(conn, image_id, split)?;
            images::get_image(conn, image_id)?
                .ok_or_else(|| EngineError::not_found("image", image_id))
        })?;
        log::debug!("Image {image_id} set to split '{}' by {user}", split.as_str());
        Ok(image)
    }
}

#[cfg(test)]
#[path = "split_test.rs"]
mod tests;
