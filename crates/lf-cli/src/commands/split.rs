//! Split command implementation

use anyhow::{Context, Result};
use lf_core::split::SplitSizes;
use lf_engine::split::{AssignSplitsResult, SplitPreview};
use lf_engine::AssignSplitsRequest;

use crate::cli::{GlobalArgs, SplitArgs, SplitCommand};
use crate::commands::common::{print_json, print_table};
use crate::context::RuntimeContext;

/// Execute the split command
pub async fn execute(args: &SplitArgs, global: &GlobalArgs) -> Result<()> {
    let ctx = RuntimeContext::new(global)?;

    match &args.command {
        SplitCommand::Stats {
            project,
            include_assigned,
        } => {
            let stats = ctx
                .splits()
                .get_auto_split_stats(*project, *include_assigned)?;
            if ctx.json {
                return print_json(&stats);
            }
            let rows: Vec<Vec<String>> = stats
                .class_stats
                .iter()
                .map(|c| {
                    vec![
                        c.class_id.to_string(),
                        c.class_name.clone(),
                        c.image_count.to_string(),
                    ]
                })
                .collect();
            print_table(&["ID", "CLASS", "IMAGES"], &rows);
            println!("\n{} distinct images to split", stats.total_images_to_split);
        }
        SplitCommand::Assign {
            project,
            ratio,
            class_ratios,
            adjust_all_together,
            include_assigned,
            policy,
            user,
        } => {
            let request = AssignSplitsRequest {
                project_id: *project,
                ratio: *ratio,
                class_ratios: class_ratios.iter().copied().collect(),
                adjust_all_together: *adjust_all_together,
                include_assigned: *include_assigned,
            };
            let result = ctx
                .splits()
                .with_policy((*policy).into())
                .assign_splits(&request, &user.user)
                .with_context(|| format!("Failed to assign splits for project {project}"))?;
            if ctx.json {
                return print_json(&result);
            }
            print_assignment(&result);
        }
        SplitCommand::Preview { project } => {
            let preview = ctx.splits().get_split_preview(*project)?;
            if ctx.json {
                return print_json(&preview);
            }
            print_preview(&preview);
        }
        SplitCommand::Set { image, split, user } => {
            let image = ctx.splits().set_image_split(*image, split, &user.user)?;
            if ctx.json {
                return print_json(&image);
            }
            println!("Image {} is now in {}", image.id, image.split);
        }
    }

    Ok(())
}

fn size_cells(sizes: &SplitSizes) -> [String; 3] {
    [
        sizes.training.to_string(),
        sizes.dev.to_string(),
        sizes.test.to_string(),
    ]
}

fn print_assignment(result: &AssignSplitsResult) {
    let mut rows: Vec<Vec<String>> = result
        .classes
        .iter()
        .map(|c| {
            let mut row = vec![
                c.class_name.clone(),
                c.ratio.to_string(),
                c.candidates.to_string(),
                c.claimed_elsewhere.to_string(),
            ];
            row.extend(size_cells(&c.sizes));
            row
        })
        .collect();
    if let Some(sizes) = &result.unclassified {
        let mut row = vec![
            "(no class)".to_string(),
            "-".to_string(),
            sizes.total().to_string(),
            "0".to_string(),
        ];
        row.extend(size_cells(sizes));
        rows.push(row);
    }
    print_table(
        &["CLASS", "RATIO", "IMAGES", "CLAIMED", "TRAINING", "DEV", "TEST"],
        &rows,
    );
    println!("\n{} images updated", result.updated_count);
}

fn print_preview(preview: &SplitPreview) {
    let rows: Vec<Vec<String>> = preview
        .by_class
        .iter()
        .map(|c| {
            vec![
                c.class_name.clone(),
                c.training.to_string(),
                c.dev.to_string(),
                c.test.to_string(),
                c.unassigned.to_string(),
            ]
        })
        .collect();
    print_table(&["CLASS", "TRAINING", "DEV", "TEST", "UNASSIGNED"], &rows);

    println!();
    let rows: Vec<Vec<String>> = preview
        .by_split
        .iter()
        .map(|s| vec![s.split.to_string(), s.total.to_string()])
        .collect();
    print_table(&["SPLIT", "IMAGES"], &rows);
}
