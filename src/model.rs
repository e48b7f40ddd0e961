use std::fmt;

use linfa::prelude::Predict;
use linfa::traits::Fit;
use linfa::Dataset;
use linfa_trees::DecisionTree;
use ndarray::{Array1, Array2, Axis};
use serde::Serialize;
use tracing::info;

use crate::config::ModelConfig;
use crate::error::{PipelineError, Result};
use crate::features::Split;

// Standardizes each feature column to zero mean and unit variance
// Statistics come from the training partition only and are reused on the
// test partition. Constant columns are centered but not scaled.
#[derive(Debug, Clone)]
pub struct StandardScaler {
    mean: Array1<f64>,
    std: Array1<f64>,
}

impl StandardScaler {
    pub fn fit(x: &Array2<f64>) -> Self {
        let n_features = x.ncols();
        let mean = x
            .mean_axis(Axis(0))
            .unwrap_or_else(|| Array1::zeros(n_features));
        let std = x
            .std_axis(Axis(0), 0.0)
            .mapv(|s| if s > 0.0 && s.is_finite() { s } else { 1.0 });
        StandardScaler { mean, std }
    }

    pub fn transform(&self, x: &Array2<f64>) -> Array2<f64> {
        (x - &self.mean) / &self.std
    }
}

/// Weights n_samples / (2 * n_class) for classes 0 and 1; an absent class
/// gets weight 0
pub fn balanced_class_weights(targets: &Array1<usize>) -> [f64; 2] {
    let n = targets.len() as f64;
    let mut counts = [0usize; 2];
    for &t in targets {
        if t < 2 {
            counts[t] += 1;
        }
    }
    counts.map(|c| if c == 0 { 0.0 } else { n / (2.0 * c as f64) })
}

pub fn sample_weights(targets: &Array1<usize>) -> Array1<f64> {
    let class_weights = balanced_class_weights(targets);
    targets.mapv(|t| class_weights[t.min(1)])
}

fn sigmoid(z: f64) -> f64 {
    1.0 / (1.0 + (-z).exp())
}

/// Logistic regression fitted by batch gradient descent on the
/// sample-weighted log loss with an L2 penalty on the coefficients
#[derive(Debug, Clone)]
pub struct WeightedLogisticRegression {
    coefficients: Array1<f64>,
    intercept: f64,
}

impl WeightedLogisticRegression {
    pub fn fit(
        x: &Array2<f64>,
        y: &Array1<usize>,
        weights: &Array1<f64>,
        config: &ModelConfig,
    ) -> Result<Self> {
        let total_weight = weights.sum();
        if x.nrows() == 0 || total_weight <= 0.0 {
            return Err(PipelineError::Model(
                "logistic regression needs weighted training samples".to_string(),
            ));
        }
        if config.inverse_regularization <= 0.0 {
            return Err(PipelineError::Model(
                "inverse regularization must be positive".to_string(),
            ));
        }

        let y = y.mapv(|t| t as f64);
        let penalty = 1.0 / (config.inverse_regularization * total_weight);
        let mut coefficients = Array1::<f64>::zeros(x.ncols());
        let mut intercept = 0.0;

        for _ in 0..config.max_iterations {
            let p = (x.dot(&coefficients) + intercept).mapv(sigmoid);
            let residual = (&p - &y) * weights;

            let grad = x.t().dot(&residual) / total_weight + &coefficients * penalty;
            let grad_intercept = residual.sum() / total_weight;

            coefficients.scaled_add(-config.learning_rate, &grad);
            intercept -= config.learning_rate * grad_intercept;
        }

        Ok(WeightedLogisticRegression {
            coefficients,
            intercept,
        })
    }

    /// Probability of the positive (fraud) class per row
    pub fn predict_proba(&self, x: &Array2<f64>) -> Array1<f64> {
        (x.dot(&self.coefficients) + self.intercept).mapv(sigmoid)
    }

    pub fn coefficients(&self) -> &Array1<f64> {
        &self.coefficients
    }
}

pub fn threshold(scores: &Array1<f64>, cutoff: f64) -> Array1<usize> {
    scores.mapv(|s| usize::from(s >= cutoff))
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ConfusionMatrix {
    pub true_negatives: usize,
    pub false_positives: usize,
    pub false_negatives: usize,
    pub true_positives: usize,
}

impl ConfusionMatrix {
    pub fn from_predictions(y_true: &Array1<usize>, y_pred: &Array1<usize>) -> Self {
        let mut cm = ConfusionMatrix::default();
        for (&t, &p) in y_true.iter().zip(y_pred) {
            match (t > 0, p > 0) {
                (false, false) => cm.true_negatives += 1,
                (false, true) => cm.false_positives += 1,
                (true, false) => cm.false_negatives += 1,
                (true, true) => cm.true_positives += 1,
            }
        }
        cm
    }

    pub fn total(&self) -> usize {
        self.true_negatives + self.false_positives + self.false_negatives + self.true_positives
    }
}

fn ratio(num: usize, den: usize) -> f64 {
    if den == 0 {
        0.0
    } else {
        num as f64 / den as f64
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Evaluation {
    pub accuracy: f64,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub roc_auc: f64,
    pub confusion: ConfusionMatrix,
    /// false positives and false negatives priced by the configured costs
    pub business_cost: f64,
}

pub fn evaluate(
    y_true: &Array1<usize>,
    y_pred: &Array1<usize>,
    scores: &Array1<f64>,
    config: &ModelConfig,
) -> Evaluation {
    let cm = ConfusionMatrix::from_predictions(y_true, y_pred);
    let precision = ratio(cm.true_positives, cm.true_positives + cm.false_positives);
    let recall = ratio(cm.true_positives, cm.true_positives + cm.false_negatives);
    let f1 = if precision + recall > 0.0 {
        2.0 * precision * recall / (precision + recall)
    } else {
        0.0
    };

    Evaluation {
        accuracy: ratio(cm.true_positives + cm.true_negatives, cm.total()),
        precision,
        recall,
        f1,
        roc_auc: roc_auc(y_true, scores),
        business_cost: cm.false_positives as f64 * config.false_positive_cost
            + cm.false_negatives as f64 * config.false_negative_cost,
        confusion: cm,
    }
}

// Area under the ROC curve as the Mann-Whitney statistic: the probability
// that a random positive scores above a random negative, ties counting half.
// 0.5 when either class is absent.
pub fn roc_auc(y_true: &Array1<usize>, scores: &Array1<f64>) -> f64 {
    let mut order: Vec<usize> = (0..scores.len().min(y_true.len())).collect();
    order.sort_by(|&a, &b| scores[a].total_cmp(&scores[b]));

    // 1-based ranks, tied scores share their average rank
    let mut ranks = vec![0.0; order.len()];
    let mut i = 0;
    while i < order.len() {
        let mut j = i;
        while j + 1 < order.len() && scores[order[j + 1]] == scores[order[i]] {
            j += 1;
        }
        let avg = (i + j) as f64 / 2.0 + 1.0;
        for &idx in &order[i..=j] {
            ranks[idx] = avg;
        }
        i = j + 1;
    }

    let n_pos = order.iter().filter(|&&i| y_true[i] > 0).count();
    let n_neg = order.len() - n_pos;
    if n_pos == 0 || n_neg == 0 {
        return 0.5;
    }
    let pos_rank_sum: f64 = order
        .iter()
        .filter(|&&i| y_true[i] > 0)
        .map(|&i| ranks[i])
        .sum();
    let n_pos = n_pos as f64;
    (pos_rank_sum - n_pos * (n_pos + 1.0) / 2.0) / (n_pos * n_neg as f64)
}

#[derive(Debug, Clone, Serialize)]
pub struct FeatureWeight {
    pub feature: String,
    pub weight: f64,
}

/// Coefficients or importances ranked by magnitude, largest first
pub fn rank_coefficients(names: &[String], coefficients: &Array1<f64>) -> Vec<FeatureWeight> {
    let mut ranked: Vec<FeatureWeight> = names
        .iter()
        .zip(coefficients)
        .map(|(name, &weight)| FeatureWeight {
            feature: name.clone(),
            weight,
        })
        .collect();
    ranked.sort_by(|a, b| b.weight.abs().total_cmp(&a.weight.abs()));
    ranked
}

#[derive(Debug, Clone, Serialize)]
pub struct ModelResult {
    pub name: String,
    pub evaluation: Evaluation,
    pub top_features: Vec<FeatureWeight>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TrainingSummary {
    pub train_samples: usize,
    pub test_samples: usize,
    pub train_fraud: usize,
    pub test_fraud: usize,
    pub models: Vec<ModelResult>,
    /// Name of the model with the highest F1 on the test partition
    pub best_model: Option<String>,
}

fn fit_logistic(split: &Split, weights: &Array1<f64>, config: &ModelConfig) -> Result<ModelResult> {
    let scaler = StandardScaler::fit(&split.train.records);
    let x_train = scaler.transform(&split.train.records);
    let x_test = scaler.transform(&split.test.records);

    let model = WeightedLogisticRegression::fit(&x_train, &split.train.targets, weights, config)?;
    let scores = model.predict_proba(&x_test);
    let predictions = threshold(&scores, config.decision_threshold);

    let mut top_features = rank_coefficients(&split.feature_names, model.coefficients());
    top_features.truncate(config.top_features);

    Ok(ModelResult {
        name: "Logistic Regression".to_string(),
        evaluation: evaluate(&split.test.targets, &predictions, &scores, config),
        top_features,
    })
}

fn fit_tree(split: &Split, weights: &Array1<f64>, config: &ModelConfig) -> Result<ModelResult> {
    // trees are scale invariant, so the raw features go in directly
    let dataset = Dataset::new(split.train.records.clone(), split.train.targets.clone())
        .with_weights(weights.mapv(|w| w as f32));

    let model = DecisionTree::params()
        .max_depth(Some(config.tree_max_depth))
        .fit(&dataset)
        .map_err(|e| PipelineError::Model(format!("decision tree: {e}")))?;

    let predictions: Array1<usize> = model.predict(&split.test.records);
    let scores = predictions.mapv(|p| p as f64);

    let importance = Array1::from(model.feature_importance());
    let mut top_features = rank_coefficients(&split.feature_names, &importance);
    top_features.truncate(config.top_features);

    Ok(ModelResult {
        name: "Decision Tree".to_string(),
        evaluation: evaluate(&split.test.targets, &predictions, &scores, config),
        top_features,
    })
}

// Fits and evaluates every baseline model
// Inputs: stratified split, model configuration
// Outputs: per-model evaluation on the test partition and the best model by F1
// Key steps:
// 1. Check both classes are present for training
// 2. Compute balanced sample weights from the training labels
// 3. Fit the weighted logistic regression on standardized features
// 4. Fit the weighted decision tree on raw features
pub fn train_and_evaluate(split: &Split, config: &ModelConfig) -> Result<TrainingSummary> {
    let train_fraud = split.train.class_count(1);
    if train_fraud == 0 || train_fraud == split.train.len() {
        return Err(PipelineError::Model(
            "training partition must contain both fraudulent and legitimate samples".to_string(),
        ));
    }

    let weights = sample_weights(&split.train.targets);
    info!(
        class_weights = ?balanced_class_weights(&split.train.targets),
        "Balanced class weights"
    );

    let models = vec![fit_logistic(split, &weights, config)?, fit_tree(split, &weights, config)?];
    for m in &models {
        info!(
            model = %m.name,
            accuracy = m.evaluation.accuracy,
            precision = m.evaluation.precision,
            recall = m.evaluation.recall,
            f1 = m.evaluation.f1,
            roc_auc = m.evaluation.roc_auc,
            "Model evaluated"
        );
    }

    let best_model = models
        .iter()
        .fold(None::<&ModelResult>, |best, m| match best {
            Some(b) if b.evaluation.f1 >= m.evaluation.f1 => Some(b),
            _ => Some(m),
        })
        .map(|m| m.name.clone());

    Ok(TrainingSummary {
        train_samples: split.train.len(),
        test_samples: split.test.len(),
        train_fraud,
        test_fraud: split.test.class_count(1),
        models,
        best_model,
    })
}

impl fmt::Display for TrainingSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Training set: {} samples ({} fraud)", self.train_samples, self.train_fraud)?;
        writeln!(f, "Test set: {} samples ({} fraud)", self.test_samples, self.test_fraud)?;

        for m in &self.models {
            let e = &m.evaluation;
            writeln!(f, "\n{} Performance:", m.name)?;
            writeln!(f, "  Accuracy: {:.4}", e.accuracy)?;
            writeln!(f, "  Precision: {:.4}", e.precision)?;
            writeln!(f, "  Recall: {:.4}", e.recall)?;
            writeln!(f, "  F1-Score: {:.4}", e.f1)?;
            writeln!(f, "  ROC-AUC: {:.4}", e.roc_auc)?;
            let cm = &e.confusion;
            writeln!(
                f,
                "  Confusion: TN={} FP={} FN={} TP={}",
                cm.true_negatives, cm.false_positives, cm.false_negatives, cm.true_positives
            )?;
            writeln!(f, "  Business Cost: ${:.2}", e.business_cost)?;
            if !m.top_features.is_empty() {
                writeln!(f, "  Top Features:")?;
                for fw in &m.top_features {
                    writeln!(f, "    {}: {:.6}", fw.feature, fw.weight)?;
                }
            }
        }

        writeln!(f, "\nModel Comparison:")?;
        writeln!(
            f,
            "  {:<20} {:>9} {:>9} {:>9} {:>9} {:>9} {:>12}",
            "Model", "Accuracy", "Precision", "Recall", "F1", "ROC-AUC", "Cost"
        )?;
        for m in &self.models {
            let e = &m.evaluation;
            writeln!(
                f,
                "  {:<20} {:>9.4} {:>9.4} {:>9.4} {:>9.4} {:>9.4} {:>12.2}",
                m.name, e.accuracy, e.precision, e.recall, e.f1, e.roc_auc, e.business_cost
            )?;
        }

        match &self.best_model {
            Some(name) => write!(f, "\nBest Model by F1-Score: {name}"),
            None => write!(f, "\nNo model was trained"),
        }
    }
}
