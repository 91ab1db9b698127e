//! Train command implementation

use anyhow::{bail, Context, Result};
use lf_core::{ModelConfig, TrainingRecord};
use lf_engine::StartTrainingRequest;
use lf_store::repo::training;
use std::path::Path;

use crate::cli::{GlobalArgs, TrainArgs, TrainCommand};
use crate::commands::common::{fmt_opt_time, print_json, print_table, ExitCode};
use crate::context::RuntimeContext;

/// Execute the train command
pub async fn execute(args: &TrainArgs, global: &GlobalArgs) -> Result<()> {
    let ctx = RuntimeContext::new(global)?;

    match &args.command {
        TrainCommand::Start {
            project,
            snapshot,
            configs,
            alias,
            epochs,
            model_size,
            model_param,
            user,
        } => {
            let configs = match configs {
                Some(path) => load_configs(path)?,
                None => configs_from_aliases(alias, *epochs, model_size, model_param.as_deref())?,
            };
            let request = StartTrainingRequest {
                project_id: *project,
                snapshot_id: *snapshot,
                configs,
            };
            let result = ctx
                .orchestrator()?
                .start_multi_config_training(&request, &user.user)
                .await
                .with_context(|| format!("Failed to start training for project {project}"))?;

            if ctx.json {
                print_json(&result)?;
            } else {
                let rows: Vec<Vec<String>> = result
                    .outcomes
                    .iter()
                    .map(|o| {
                        let (id, status, track) = match &o.record {
                            Some(r) => (
                                r.id.to_string(),
                                r.status.to_string(),
                                r.track_id.clone().unwrap_or_else(|| "-".to_string()),
                            ),
                            None => ("-".to_string(), "-".to_string(), "-".to_string()),
                        };
                        vec![
                            o.model_alias.clone(),
                            id,
                            status,
                            track,
                            o.error.clone().unwrap_or_default(),
                        ]
                    })
                    .collect();
                print_table(&["ALIAS", "RECORD", "STATUS", "TRACK", "ERROR"], &rows);
            }
            if result.summary.failure_count > 0 {
                return Err(ExitCode(1).into());
            }
        }
        TrainCommand::Status { id } => {
            let view = ctx.orchestrator()?.get_training_status(*id).await?;
            if ctx.json {
                return print_json(&view);
            }
            println!("Record {}: {}", view.id, view.status);
            if let Some(progress) = view.progress {
                println!("  progress   {:.0}%", progress * 100.0);
            }
            if let Some(phase) = &view.current_phase {
                println!("  phase      {phase}");
            }
            println!("  started    {}", fmt_opt_time(view.started_at.as_ref()));
            if view.estimated_completion_at.is_some() {
                println!(
                    "  estimated  {}",
                    fmt_opt_time(view.estimated_completion_at.as_ref())
                );
            }
            if let Some(error) = &view.error_message {
                println!("  error      {error}");
            }
            for model_id in &view.model_ids {
                println!("  model      {model_id}");
            }
        }
        TrainCommand::List { project } => {
            // Store only; works without a training_service section.
            let records = ctx
                .store
                .with_conn(|conn| training::list_training_records(conn, *project))
                .context("Failed to list training records")?;
            if ctx.json {
                return print_json(&records);
            }
            print_records(&records);
        }
        TrainCommand::Cancel { id, user } => {
            let record = ctx
                .orchestrator()?
                .cancel_training(*id, &user.user)
                .await?;
            if ctx.json {
                return print_json(&record);
            }
            println!("Record {} is {}", record.id, record.status);
        }
    }

    Ok(())
}

/// Read a YAML (or JSON) list of model configurations.
pub(crate) fn load_configs(path: &Path) -> Result<Vec<ModelConfig>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let configs: Vec<ModelConfig> = serde_yaml::from_str(&content)
        .with_context(|| format!("Failed to parse model configurations in {}", path.display()))?;
    if configs.is_empty() {
        bail!("{} lists no model configurations", path.display());
    }
    Ok(configs)
}

pub(crate) fn configs_from_aliases(
    aliases: &[String],
    epochs: u32,
    model_size: &str,
    model_param: Option<&str>,
) -> Result<Vec<ModelConfig>> {
    if aliases.is_empty() {
        bail!("pass --configs FILE or at least one --alias");
    }
    Ok(aliases
        .iter()
        .map(|alias| ModelConfig {
            model_param: model_param.map(str::to_string),
            ..ModelConfig::new(alias.as_str(), epochs, model_size)
        })
        .collect())
}

fn print_records(records: &[TrainingRecord]) {
    let rows: Vec<Vec<String>> = records
        .iter()
        .map(|r| {
            vec![
                r.id.to_string(),
                r.model_alias.clone(),
                r.status.to_string(),
                r.snapshot_id.map_or_else(|| "live".to_string(), |s| s.to_string()),
                format!("{}/{}/{}", r.training_count, r.dev_count, r.test_count),
                fmt_opt_time(r.started_at.as_ref()),
                fmt_opt_time(r.completed_at.as_ref()),
            ]
        })
        .collect();
    print_table(
        &["ID", "ALIAS", "STATUS", "DATASET", "IMAGES", "STARTED", "COMPLETED"],
        &rows,
    );
}

#[cfg(test)]
#[path = "train_test.rs"]
mod tests;
