//! Model command implementation

use anyhow::{Context, Result};
use lf_core::Model;
use lf_engine::metrics::ModelDetail;
use lf_engine::{ConfusionMatrix, RecalculatedMetrics};

use crate::cli::{GlobalArgs, ModelArgs, ModelCommand};
use crate::commands::common::{fmt_rate, fmt_time, print_json, print_table};
use crate::context::RuntimeContext;

/// Execute the model command
pub async fn execute(args: &ModelArgs, global: &GlobalArgs) -> Result<()> {
    let ctx = RuntimeContext::new(global)?;
    let metrics = ctx.metrics();

    match &args.command {
        ModelCommand::List { project, all } => {
            let models = metrics.list_models(*project, *all)?;
            if ctx.json {
                return print_json(&models);
            }
            if models.is_empty() {
                println!("No models for project {project}");
                return Ok(());
            }
            print_models(&models);
        }
        ModelCommand::Show { model } => {
            let detail = metrics.get_model(*model)?;
            if ctx.json {
                return print_json(&detail);
            }
            print_detail(&detail);
        }
        ModelCommand::Matrix { model } => {
            let matrix = metrics
                .compute_confusion_matrix(*model)
                .with_context(|| format!("Failed to build confusion matrix for model {model}"))?;
            if ctx.json {
                return print_json(&matrix);
            }
            print_matrix(&matrix);
        }
        ModelCommand::Threshold {
            model,
            threshold,
            training_rate,
            dev_rate,
            test_rate,
            user,
        } => {
            let recalculated = RecalculatedMetrics {
                training_correct_rate: *training_rate,
                dev_correct_rate: *dev_rate,
                test_correct_rate: *test_rate,
                ..RecalculatedMetrics::default()
            };
            let generated = metrics
                .generate_model_with_new_threshold(*model, *threshold, recalculated, &user.user)
                .with_context(|| format!("Failed to regenerate model {model}"))?;
            if ctx.json {
                return print_json(&generated);
            }
            println!(
                "Created model {} ({} v{}) at threshold {} from model {}",
                generated.model.id,
                generated.model.model_alias,
                generated.model.model_version,
                generated.report.confidence_threshold,
                generated.source_model_id
            );
            println!(
                "Copied {} predictions and {} chart points",
                generated.copied_predictions, generated.copied_chart_points
            );
        }
        ModelCommand::Delete { model, user } => {
            metrics.delete_model(*model, &user.user)?;
            println!("Model {model} deactivated");
        }
    }

    Ok(())
}

fn print_models(models: &[Model]) {
    let rows: Vec<Vec<String>> = models
        .iter()
        .map(|m| {
            vec![
                m.id.to_string(),
                m.model_alias.clone(),
                m.model_version.to_string(),
                m.status.to_string(),
                m.image_count.to_string(),
                fmt_rate(m.test.f1),
                fmt_time(&m.created_at),
            ]
        })
        .collect();
    print_table(
        &["ID", "ALIAS", "VERSION", "STATUS", "IMAGES", "TEST F1", "CREATED"],
        &rows,
    );
}

fn print_detail(detail: &ModelDetail) {
    print_models(std::slice::from_ref(&detail.model));
    let model = &detail.model;

    println!();
    let rows = vec![
        score_row("training", model.training.f1, model.training.precision, model.training.recall),
        score_row("dev", model.dev.f1, model.dev.precision, model.dev.recall),
        score_row("test", model.test.f1, model.test.precision, model.test.recall),
    ];
    print_table(&["SET", "F1", "PRECISION", "RECALL"], &rows);

    if let Some(report) = &detail.report {
        println!(
            "\nthreshold {}  correct: training {}  dev {}  test {}",
            report.confidence_threshold,
            fmt_rate(Some(report.training_correct_rate)),
            fmt_rate(Some(report.dev_correct_rate)),
            fmt_rate(Some(report.test_correct_rate)),
        );
    }
    println!(
        "{} loss points, {} validation points",
        detail.loss_chart.len(),
        detail.validation_chart.len()
    );
}

fn score_row(set: &str, f1: Option<f64>, precision: Option<f64>, recall: Option<f64>) -> Vec<String> {
    vec![set.to_string(), fmt_rate(f1), fmt_rate(precision), fmt_rate(recall)]
}

fn print_matrix(cm: &ConfusionMatrix) {
    let mut headers: Vec<&str> = vec!["GROUND TRUTH"];
    headers.extend(cm.classes.iter().map(|c| c.class_name.as_str()));
    headers.push("(none)");

    let rows: Vec<Vec<String>> = cm
        .matrix
        .iter()
        .enumerate()
        .map(|(i, counts)| {
            let label = cm
                .classes
                .get(i)
                .map_or_else(|| "(none)".to_string(), |c| c.class_name.clone());
            std::iter::once(label)
                .chain(counts.iter().map(i64::to_string))
                .collect()
        })
        .collect();
    println!("Threshold {}", cm.confidence_threshold);
    print_table(&headers, &rows);

    println!();
    let rows: Vec<Vec<String>> = cm
        .classes
        .iter()
        .zip(&cm.class_metrics)
        .map(|(class, m)| {
            vec![
                class.class_name.clone(),
                m.true_positives.to_string(),
                m.false_positives.to_string(),
                m.false_negatives.to_string(),
                fmt_rate(m.precision),
                fmt_rate(m.recall),
            ]
        })
        .collect();
    print_table(&["CLASS", "TP", "FP", "FN", "PRECISION", "RECALL"], &rows);
}
