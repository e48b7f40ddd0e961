//! Feature derivation and the stratified train/test split

use std::collections::BTreeSet;

use ndarray::{Array1, Array2, Axis};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::cleaner::{canonical_label, AMOUNT, DEVICE_ID, FRAUD, LABEL_NO, LABEL_YES, TIME};
use crate::error::{PipelineError, Result};
use crate::report::{CATEGORY, PAYMENT_METHOD, USER_ID};
use crate::table::Table;

pub const FEATURE_NAMES: [&str; 9] = [
    "user_id",
    "device_id",
    "amount",
    "time",
    "payment_method",
    "category",
    "amount_log",
    "time_hour",
    "time_day",
];

pub fn hour_of_day(time: f64) -> u32 {
    (time / 3600.0).floor().rem_euclid(24.0) as u32
}

pub fn day_of_week(time: f64) -> u32 {
    (time / 86400.0).floor().rem_euclid(7.0) as u32
}

/// Mapping between the values of a categorical column and
/// integer codes. Classes are kept sorted, so a code is the value's rank.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelEncoding {
    pub column: String,
    pub classes: Vec<String>,
}

impl LabelEncoding {
    pub fn fit<'a, I>(column: &str, values: I) -> Self
    where
        I: IntoIterator<Item = &'a str>,
    {
        let classes: BTreeSet<String> = values.into_iter().map(|v| v.to_string()).collect();
        LabelEncoding {
            column: column.to_string(),
            classes: classes.into_iter().collect(),
        }
    }

    pub fn encode(&self, value: &str) -> Option<usize> {
        self.classes.binary_search_by(|c| c.as_str().cmp(value)).ok()
    }
}

#[derive(Debug, Clone)]
pub struct FeatureTable {
    pub feature_names: Vec<String>,
    pub records: Array2<f64>,
    /// Encoded fraud label: 0 = NO, 1 = YES
    pub targets: Array1<usize>,
    /// fraud, payment_method, category
    pub encodings: Vec<LabelEncoding>,
    /// Rows left out for a missing or non-finite feature value
    pub rows_skipped: usize,
}

impl FeatureTable {
    pub fn n_samples(&self) -> usize {
        self.records.nrows()
    }
}

struct Candidate<'a> {
    numeric: [f64; 4],
    payment_method: &'a str,
    category: &'a str,
    fraud: &'static str,
}

// Derives the model feature table
// Inputs: cleaned table
// Outputs: feature matrix, encoded targets and the encodings used
// Key steps:
// 1. Collect complete rows (every feature present, amount_log finite)
// 2. Fit alphabetical encodings for payment_method and category
// 3. Append amount_log = ln(1 + amount), time_hour, time_day
pub fn derive_features(table: &Table) -> Result<FeatureTable> {
    let users = table.numeric_column(USER_ID)?;
    let devices = table.numeric_column(DEVICE_ID)?;
    let amounts = table.numeric_column(AMOUNT)?;
    let times = table.numeric_column(TIME)?;
    let payments = table.text_column(PAYMENT_METHOD)?;
    let categories = table.text_column(CATEGORY)?;
    let fraud = table.text_column(FRAUD)?;

    let mut candidates = Vec::with_capacity(table.row_count());
    let mut rows_skipped = 0;
    for i in 0..table.row_count() {
        let label = match fraud[i] {
            Some(raw) => Some(canonical_label(raw).ok_or_else(|| {
                PipelineError::UnrecognizedLabel {
                    row: i + 1,
                    value: raw.to_string(),
                }
            })?),
            None => None,
        };
        match (users[i], devices[i], amounts[i], times[i], payments[i], categories[i], label) {
            (Some(u), Some(d), Some(a), Some(t), Some(p), Some(c), Some(l)) if a.ln_1p().is_finite() => {
                candidates.push(Candidate {
                    numeric: [u, d, a, t],
                    payment_method: p.trim(),
                    category: c.trim(),
                    fraud: l,
                });
            }
            _ => rows_skipped += 1,
        }
    }
    if rows_skipped > 0 {
        warn!(rows = rows_skipped, "Rows without a complete feature set were left out");
    }

    let fraud_encoding = LabelEncoding::fit(FRAUD, [LABEL_NO, LABEL_YES]);
    let payment_encoding = LabelEncoding::fit(PAYMENT_METHOD, candidates.iter().map(|c| c.payment_method));
    let category_encoding = LabelEncoding::fit(CATEGORY, candidates.iter().map(|c| c.category));

    let mut records = Array2::zeros((candidates.len(), FEATURE_NAMES.len()));
    let mut targets = Array1::zeros(candidates.len());
    for (i, c) in candidates.iter().enumerate() {
        let [user, device, amount, time] = c.numeric;
        // every candidate value was fed to its encoder above
        let payment = payment_encoding.encode(c.payment_method).unwrap_or_default();
        let category = category_encoding.encode(c.category).unwrap_or_default();
        let row = [
            user,
            device,
            amount,
            time,
            payment as f64,
            category as f64,
            amount.ln_1p(),
            hour_of_day(time) as f64,
            day_of_week(time) as f64,
        ];
        for (j, value) in row.iter().enumerate() {
            records[[i, j]] = *value;
        }
        targets[i] = fraud_encoding.encode(c.fraud).unwrap_or_default();
    }

    for encoding in [&fraud_encoding, &payment_encoding, &category_encoding] {
        info!(column = %encoding.column, classes = ?encoding.classes, "Encoded column");
    }

    Ok(FeatureTable {
        feature_names: FEATURE_NAMES.iter().map(|n| n.to_string()).collect(),
        records,
        targets,
        encodings: vec![fraud_encoding, payment_encoding, category_encoding],
        rows_skipped,
    })
}

#[derive(Debug, Clone)]
pub struct Partition {
    pub records: Array2<f64>,
    pub targets: Array1<usize>,
    /// Row positions in the source feature table
    pub indices: Vec<usize>,
}

impl Partition {
    fn select(features: &FeatureTable, indices: Vec<usize>) -> Self {
        Partition {
            records: features.records.select(Axis(0), &indices),
            targets: features.targets.select(Axis(0), &indices),
            indices,
        }
    }

    pub fn len(&self) -> usize {
        self.indices.len()
    }

    /// Number of samples labelled with `class`
    pub fn class_count(&self, class: usize) -> usize {
        self.targets.iter().filter(|&&t| t == class).count()
    }
}

#[derive(Debug, Clone)]
pub struct Split {
    pub feature_names: Vec<String>,
    pub train: Partition,
    pub test: Partition,
}

// Stratified split: each class is shuffled with the seeded generator and
// round(n_class * test_fraction) of its rows go to the test partition.
pub fn stratified_split(features: &FeatureTable, test_fraction: f64, seed: u64) -> Result<Split> {
    if !(test_fraction > 0.0 && test_fraction < 1.0) {
        return Err(PipelineError::Model(format!(
            "test fraction must be in (0, 1), got {test_fraction}"
        )));
    }

    let mut rng = StdRng::seed_from_u64(seed);
    let classes: BTreeSet<usize> = features.targets.iter().copied().collect();
    let mut train = Vec::new();
    let mut test = Vec::new();

    for class in classes {
        let mut members: Vec<usize> = features
            .targets
            .iter()
            .enumerate()
            .filter(|&(_, &t)| t == class)
            .map(|(i, _)| i)
            .collect();
        members.shuffle(&mut rng);

        let n_test = ((members.len() as f64 * test_fraction).round() as usize).min(members.len());
        test.extend_from_slice(&members[..n_test]);
        train.extend_from_slice(&members[n_test..]);
    }

    if train.is_empty() || test.is_empty() {
        return Err(PipelineError::Model(format!(
            "split of {} samples leaves an empty partition",
            features.n_samples()
        )));
    }
    train.sort_unstable();
    test.sort_unstable();

    let split = Split {
        feature_names: features.feature_names.clone(),
        train: Partition::select(features, train),
        test: Partition::select(features, test),
    };
    info!(
        train = split.train.len(),
        test = split.test.len(),
        seed,
        "Stratified train/test split"
    );
    Ok(split)
}
