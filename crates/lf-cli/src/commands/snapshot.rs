//! Snapshot command implementation

use anyhow::{Context, Result};
use lf_core::Snapshot;
use lf_store::repo::images;
use lf_store::DatasetScope;

use crate::cli::{GlobalArgs, SnapshotArgs, SnapshotCommand};
use crate::commands::common::{fmt_time, print_json, print_table};
use crate::context::RuntimeContext;

/// Execute the snapshot command
pub async fn execute(args: &SnapshotArgs, global: &GlobalArgs) -> Result<()> {
    let ctx = RuntimeContext::new(global)?;
    let engine = ctx.snapshots();

    match &args.command {
        SnapshotCommand::Create {
            project,
            name,
            description,
            user,
        } => {
            let snapshot = engine
                .create_snapshot(*project, name, description.as_deref(), &user.user)
                .with_context(|| format!("Failed to create snapshot '{name}'"))?;
            if ctx.json {
                return print_json(&snapshot);
            }
            println!(
                "Created snapshot {} '{}' for project {}",
                snapshot.id, snapshot.snapshot_name, snapshot.project_id
            );
        }
        SnapshotCommand::List { project } => {
            let snapshots = engine.list_snapshots(*project)?;
            if ctx.json {
                return print_json(&snapshots);
            }
            if snapshots.is_empty() {
                println!("No snapshots for project {project}");
                return Ok(());
            }
            print_snapshots(&snapshots);
        }
        SnapshotCommand::Show { snapshot } => {
            let snapshot = engine.get_snapshot(*snapshot)?;
            let scope = DatasetScope::Snapshot {
                snapshot_id: snapshot.id,
            };
            let counts = ctx
                .store
                .with_conn(|conn| images::dataset_counts(conn, scope))
                .context("Failed to count snapshot rows")?;
            if ctx.json {
                return print_json(&serde_json::json!({
                    "snapshot": snapshot,
                    "counts": counts,
                }));
            }
            print_snapshots(std::slice::from_ref(&snapshot));
            if let Some(description) = &snapshot.description {
                println!("\n{description}");
            }
            println!(
                "\nlabeled {}  unlabeled {}  no-class {}",
                counts.labeled, counts.unlabeled, counts.no_class
            );
            println!(
                "training {}  dev {}  test {}  unassigned {}",
                counts.train_count, counts.dev_count, counts.test_count, counts.unassigned_count
            );
        }
        SnapshotCommand::Preview { project } => {
            let stats = engine.preview_stats(*project)?;
            if ctx.json {
                return print_json(&stats);
            }
            let rows = vec![
                vec!["labeled".to_string(), stats.labeled.to_string()],
                vec!["unlabeled".to_string(), stats.unlabeled.to_string()],
                vec!["no-class".to_string(), stats.no_class.to_string()],
                vec!["training".to_string(), stats.train_count.to_string()],
                vec!["dev".to_string(), stats.dev_count.to_string()],
                vec!["test".to_string(), stats.test_count.to_string()],
                vec!["unassigned".to_string(), stats.unassigned_count.to_string()],
            ];
            print_table(&["IMAGES", "COUNT"], &rows);
        }
        SnapshotCommand::Images { snapshot } => {
            let images = engine.snapshot_images(*snapshot)?;
            if ctx.json {
                return print_json(&images);
            }
            let rows: Vec<Vec<String>> = images
                .iter()
                .map(|image| {
                    vec![
                        image.id.to_string(),
                        image.file_name.clone(),
                        format!("{}x{}", image.width, image.height),
                        image.split.to_string(),
                        if image.is_no_class {
                            "no-class".to_string()
                        } else if image.is_labeled {
                            "labeled".to_string()
                        } else {
                            "unlabeled".to_string()
                        },
                    ]
                })
                .collect();
            print_table(&["ID", "FILE", "SIZE", "SPLIT", "STATE"], &rows);
        }
        SnapshotCommand::Delete { snapshot, user } => {
            engine.delete_snapshot(*snapshot, &user.user)?;
            println!("Deleted snapshot {snapshot}");
        }
        SnapshotCommand::Revert {
            snapshot,
            project,
            user,
        } => {
            engine
                .revert_project_to_snapshot(*snapshot, *project, &user.user)
                .with_context(|| format!("Failed to revert project {project}"))?;
            println!("Project {project} reverted to snapshot {snapshot}");
        }
        SnapshotCommand::Fork {
            snapshot,
            name,
            user,
        } => {
            let project = engine
                .create_project_from_snapshot(*snapshot, name, &user.user)
                .with_context(|| format!("Failed to create project from snapshot {snapshot}"))?;
            if ctx.json {
                return print_json(&project);
            }
            println!(
                "Created project {} '{}' from snapshot {snapshot}",
                project.id, project.name
            );
        }
        SnapshotCommand::Download { snapshot, output } => {
            let export = engine.download_snapshot_dataset(*snapshot)?;
            std::fs::write(output, &export.archive)
                .with_context(|| format!("Failed to write {}", output.display()))?;
            if ctx.json {
                return print_json(&export.summary);
            }
            let summary = &export.summary;
            println!(
                "Wrote {} ({} images: {} training, {} dev, {} test; {} labels)",
                output.display(),
                summary.image_count(),
                summary.training,
                summary.dev,
                summary.test,
                summary.labels
            );
            if summary.missing_images > 0 {
                log::warn!(
                    "{} image files were missing from storage",
                    summary.missing_images
                );
            }
        }
    }

    Ok(())
}

fn print_snapshots(snapshots: &[Snapshot]) {
    let rows: Vec<Vec<String>> = snapshots
        .iter()
        .map(|s| {
            vec![
                s.id.to_string(),
                s.snapshot_name.clone(),
                fmt_time(&s.created_at),
                s.created_by.clone(),
            ]
        })
        .collect();
    print_table(&["ID", "NAME", "CREATED", "BY"], &rows);
}
