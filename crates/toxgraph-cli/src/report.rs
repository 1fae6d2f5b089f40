//! Prediction and evaluation reports, rendered as text tables or JSON.

use std::fmt::Write;

use serde::Serialize;

pub fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskPrediction {
    pub task: String,
    pub probability: f32,
    /// `None` where the dataset has no label for this task
    pub label: Option<f32>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PredictionReport {
    pub model: String,
    pub index: usize,
    pub smiles: String,
    pub tasks: Vec<TaskPrediction>,
}

impl PredictionReport {
    pub fn new(
        model: &str,
        index: usize,
        smiles: String,
        tasks: &[String],
        logits: &[f32],
        labels: &[f32],
        masks: &[f32],
    ) -> Self {
        let tasks = tasks
            .iter()
            .enumerate()
            .map(|(i, task)| TaskPrediction {
                task: task.clone(),
                probability: logits.get(i).copied().map(sigmoid).unwrap_or(f32::NAN),
                label: match (labels.get(i), masks.get(i)) {
                    (Some(l), Some(m)) if *m > 0.0 => Some(*l),
                    _ => None,
                },
            })
            .collect();
        Self {
            model: model.to_string(),
            index,
            smiles,
            tasks,
        }
    }

    pub fn to_table(&self) -> String {
        let width = name_width(self.tasks.iter().map(|t| t.task.as_str()));
        let mut out = String::new();
        let _ = writeln!(out, "{} | sample {}: {}", self.model, self.index, self.smiles);
        let _ = writeln!(out, "{:<width$}  {:>8}  {:>5}", "task", "p(toxic)", "label");
        for t in &self.tasks {
            let label = t.label.map(|l| format!("{}", l as i32)).unwrap_or_else(|| "-".to_string());
            let _ = writeln!(out, "{:<width$}  {:>8.4}  {:>5}", t.task, t.probability, label);
        }
        out
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskScore {
    pub task: String,
    pub roc_auc: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct EvaluationReport {
    pub model: String,
    pub split: String,
    pub molecules: usize,
    pub tasks: Vec<TaskScore>,
    pub mean_roc_auc: Option<f64>,
}

impl EvaluationReport {
    pub fn new(model: &str, split: &str, molecules: usize, tasks: &[String], scores: &[Option<f64>], mean: Option<f64>) -> Self {
        Self {
            model: model.to_string(),
            split: split.to_string(),
            molecules,
            tasks: tasks
                .iter()
                .zip(scores)
                .map(|(task, score)| TaskScore {
                    task: task.clone(),
                    roc_auc: *score,
                })
                .collect(),
            mean_roc_auc: mean,
        }
    }

    pub fn to_table(&self) -> String {
        let width = name_width(self.tasks.iter().map(|t| t.task.as_str()));
        let mut out = String::new();
        for t in &self.tasks {
            let _ = writeln!(out, "{:<width$}  {:>7}", t.task, fmt_score(t.roc_auc));
        }
        let _ = writeln!(out, "{:<width$}  {:>7}", "mean", fmt_score(self.mean_roc_auc));
        out
    }
}

fn name_width<'a>(names: impl Iterator<Item = &'a str>) -> usize {
    names.map(str::len).max().unwrap_or(0).max(4)
}

fn fmt_score(score: Option<f64>) -> String {
    score.map(|s| format!("{:.4}", s)).unwrap_or_else(|| "n/a".to_string())
}
