//! Exploratory fraud report over a cleaned table
//!
//! Nothing here mutates the table; every section is computed from a single
//! pass that reads each row into a `TxView`.

use std::collections::{BTreeMap, HashSet};
use std::fmt;

use serde::Serialize;
use tracing::{debug, info};

use crate::cleaner::{canonical_label, AMOUNT, DEVICE_ID, FRAUD, LABEL_YES, TIME};
use crate::config::ReportConfig;
use crate::error::{PipelineError, Result};
use crate::features::hour_of_day;
use crate::stats::{mean, point_biserial, Correlation, Describe};
use crate::table::{parse_number, ColumnKind, Table};

pub const USER_ID: &str = "user_id";
pub const PAYMENT_METHOD: &str = "payment_method";
pub const CATEGORY: &str = "category";

#[derive(Debug, Clone, Serialize)]
pub struct ColumnSummary {
    pub name: String,
    pub kind: ColumnKind,
    pub nulls: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct Overview {
    pub rows: usize,
    pub columns: Vec<ColumnSummary>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ImbalanceLevel {
    Severe,
    Moderate,
    Balanced,
}

impl ImbalanceLevel {
    /// Classify a fraud:legitimate ratio
    pub fn from_ratio(ratio: f64) -> Self {
        if ratio < 0.15 {
            ImbalanceLevel::Severe
        } else if ratio < 0.25 {
            ImbalanceLevel::Moderate
        } else {
            ImbalanceLevel::Balanced
        }
    }
}

impl fmt::Display for ImbalanceLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ImbalanceLevel::Severe => "SEVERE",
            ImbalanceLevel::Moderate => "MODERATE",
            ImbalanceLevel::Balanced => "BALANCED",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ClassBalance {
    pub legitimate: usize,
    pub fraudulent: usize,
    pub legitimate_pct: f64,
    pub fraudulent_pct: f64,
    /// fraudulent / legitimate
    pub fraud_ratio: Option<f64>,
    pub imbalance: Option<ImbalanceLevel>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AmountByClass {
    pub legitimate: Option<Describe>,
    pub fraudulent: Option<Describe>,
    /// Mean fraudulent amount over mean legitimate amount
    pub mean_ratio: Option<f64>,
}

/// Fraud metrics for one value of a grouping column
#[derive(Debug, Clone, Serialize)]
pub struct GroupRisk {
    pub key: String,
    pub total: usize,
    pub fraud_count: usize,
    pub fraud_rate: f64,
    pub avg_amount: Option<f64>,
    pub total_amount: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct UserRisk {
    pub user: String,
    pub fraud_count: usize,
    pub fraud_amount: f64,
    pub total: usize,
    pub fraud_rate: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct UserConcentration {
    pub unique_users: usize,
    pub users_with_fraud: usize,
    pub top_users: Vec<UserRisk>,
    /// Share of all fraud incidents owned by `top_users`, in percent
    pub top_share_pct: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct HourRisk {
    pub hour: u32,
    pub total: usize,
    pub fraud_count: usize,
    pub fraud_rate: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct TemporalPattern {
    pub hours: Vec<HourRisk>,
    pub riskiest_hours: Vec<HourRisk>,
    pub peak_hour: Option<HourRisk>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DeviceRisk {
    pub device: String,
    pub total: usize,
    pub fraud_count: usize,
    pub fraud_rate: f64,
    pub avg_amount: Option<f64>,
    pub unique_users: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct DeviceSummary {
    pub unique_devices: usize,
    pub devices_with_fraud: usize,
    pub top_devices: Vec<DeviceRisk>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FeatureCorrelation {
    pub feature: String,
    pub correlation: Option<Correlation>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExploratoryReport {
    pub overview: Overview,
    pub class_balance: ClassBalance,
    pub amounts: AmountByClass,
    pub payment_methods: Vec<GroupRisk>,
    pub categories: Vec<GroupRisk>,
    pub users: UserConcentration,
    pub temporal: TemporalPattern,
    pub devices: DeviceSummary,
    pub correlations: Vec<FeatureCorrelation>,
}

struct TxView<'a> {
    fraud: bool,
    user: Option<String>,
    device: Option<String>,
    amount: Option<f64>,
    device_value: Option<f64>,
    time: Option<f64>,
    payment_method: Option<&'a str>,
    category: Option<&'a str>,
}

// Integral numbers group by their integer spelling, so "7" and "7.0" agree
fn group_key(cell: &str) -> String {
    match parse_number(cell) {
        Some(v) if v.fract() == 0.0 && v.abs() < 1e15 => format!("{}", v as i64),
        _ => cell.trim().to_string(),
    }
}

fn pct(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64 * 100.0
    }
}

fn views(table: &Table) -> Result<Vec<TxView<'_>>> {
    let fraud = table.text_column(FRAUD)?;
    let users = table.text_column(USER_ID)?;
    let devices = table.text_column(DEVICE_ID)?;
    let payments = table.text_column(PAYMENT_METHOD)?;
    let categories = table.text_column(CATEGORY)?;
    let amounts = table.numeric_column(AMOUNT)?;
    let device_values = table.numeric_column(DEVICE_ID)?;
    let times = table.numeric_column(TIME)?;

    let mut out = Vec::with_capacity(table.row_count());
    for i in 0..table.row_count() {
        // the cleaner guarantees a label; skip defensively on raw input
        let Some(raw) = fraud[i] else {
            debug!(row = i + 1, "Skipping row without a fraud label");
            continue;
        };
        let label = canonical_label(raw).ok_or_else(|| PipelineError::UnrecognizedLabel {
            row: i + 1,
            value: raw.to_string(),
        })?;
        out.push(TxView {
            fraud: label == LABEL_YES,
            user: users[i].map(group_key),
            device: devices[i].map(group_key),
            amount: amounts[i],
            device_value: device_values[i],
            time: times[i],
            payment_method: payments[i].map(str::trim),
            category: categories[i].map(str::trim),
        });
    }
    Ok(out)
}

#[derive(Default)]
struct Acc {
    total: usize,
    fraud: usize,
    amounts: Vec<f64>,
    fraud_amount: f64,
    users: HashSet<String>,
}

impl Acc {
    fn add(&mut self, tx: &TxView<'_>) {
        self.total += 1;
        if tx.fraud {
            self.fraud += 1;
        }
        if let Some(amount) = tx.amount {
            self.amounts.push(amount);
            if tx.fraud {
                self.fraud_amount += amount;
            }
        }
        if let Some(user) = &tx.user {
            self.users.insert(user.clone());
        }
    }

    fn avg_amount(&self) -> Option<f64> {
        (!self.amounts.is_empty()).then(|| mean(&self.amounts))
    }

    fn rate(&self) -> f64 {
        pct(self.fraud, self.total)
    }
}

fn group_by<'a, F>(txs: &[TxView<'a>], key: F) -> BTreeMap<String, Acc>
where
    F: Fn(&TxView<'a>) -> Option<String>,
{
    let mut groups: BTreeMap<String, Acc> = BTreeMap::new();
    for tx in txs {
        if let Some(k) = key(tx) {
            groups.entry(k).or_default().add(tx);
        }
    }
    groups
}

fn group_risks(groups: BTreeMap<String, Acc>) -> Vec<GroupRisk> {
    groups
        .into_iter()
        .map(|(key, acc)| GroupRisk {
            fraud_rate: acc.rate(),
            avg_amount: acc.avg_amount(),
            total_amount: acc.amounts.iter().sum(),
            total: acc.total,
            fraud_count: acc.fraud,
            key,
        })
        .collect()
}

fn class_balance(txs: &[TxView<'_>]) -> ClassBalance {
    let fraudulent = txs.iter().filter(|t| t.fraud).count();
    let legitimate = txs.len() - fraudulent;
    let fraud_ratio = (legitimate > 0).then(|| fraudulent as f64 / legitimate as f64);

    ClassBalance {
        legitimate,
        fraudulent,
        legitimate_pct: pct(legitimate, txs.len()),
        fraudulent_pct: pct(fraudulent, txs.len()),
        fraud_ratio,
        imbalance: fraud_ratio.map(ImbalanceLevel::from_ratio),
    }
}

fn amounts_by_class(txs: &[TxView<'_>]) -> AmountByClass {
    let collect = |fraud: bool| -> Vec<f64> {
        txs.iter()
            .filter(|t| t.fraud == fraud)
            .filter_map(|t| t.amount)
            .collect()
    };
    let legitimate = Describe::compute(&collect(false));
    let fraudulent = Describe::compute(&collect(true));
    let mean_ratio = match (&legitimate, &fraudulent) {
        (Some(l), Some(f)) if l.mean != 0.0 => Some(f.mean / l.mean),
        _ => None,
    };

    AmountByClass {
        legitimate,
        fraudulent,
        mean_ratio,
    }
}

fn user_concentration(txs: &[TxView<'_>], top_n: usize) -> UserConcentration {
    let groups = group_by(txs, |t| t.user.clone());
    let unique_users = groups.len();

    let mut fraud_users: Vec<UserRisk> = groups
        .into_iter()
        .filter(|(_, acc)| acc.fraud > 0)
        .map(|(user, acc)| UserRisk {
            fraud_count: acc.fraud,
            fraud_amount: acc.fraud_amount,
            total: acc.total,
            fraud_rate: acc.rate(),
            user,
        })
        .collect();
    fraud_users.sort_by(|a, b| b.fraud_count.cmp(&a.fraud_count));

    let users_with_fraud = fraud_users.len();
    let all_fraud: usize = fraud_users.iter().map(|u| u.fraud_count).sum();
    fraud_users.truncate(top_n);
    let top_fraud: usize = fraud_users.iter().map(|u| u.fraud_count).sum();

    UserConcentration {
        unique_users,
        users_with_fraud,
        top_users: fraud_users,
        top_share_pct: pct(top_fraud, all_fraud),
    }
}

fn temporal_pattern(txs: &[TxView<'_>], top_hours: usize) -> TemporalPattern {
    let mut buckets: BTreeMap<u32, (usize, usize)> = BTreeMap::new();
    for tx in txs {
        if let Some(time) = tx.time {
            let entry = buckets.entry(hour_of_day(time)).or_default();
            entry.0 += 1;
            if tx.fraud {
                entry.1 += 1;
            }
        }
    }

    let hours: Vec<HourRisk> = buckets
        .into_iter()
        .map(|(hour, (total, fraud_count))| HourRisk {
            hour,
            total,
            fraud_count,
            fraud_rate: pct(fraud_count, total),
        })
        .collect();

    let mut riskiest_hours = hours.clone();
    riskiest_hours.sort_by(|a, b| b.fraud_rate.total_cmp(&a.fraud_rate));
    riskiest_hours.truncate(top_hours);

    // first hour with the highest fraud count
    let peak_hour = hours
        .iter()
        .fold(None::<&HourRisk>, |best, h| match best {
            Some(b) if b.fraud_count >= h.fraud_count => Some(b),
            _ => Some(h),
        })
        .cloned();

    TemporalPattern {
        hours,
        riskiest_hours,
        peak_hour,
    }
}

fn device_summary(txs: &[TxView<'_>], top_n: usize) -> DeviceSummary {
    let groups = group_by(txs, |t| t.device.clone());
    let unique_devices = groups.len();

    let mut flagged: Vec<DeviceRisk> = groups
        .into_iter()
        .filter(|(_, acc)| acc.fraud > 0)
        .map(|(device, acc)| DeviceRisk {
            total: acc.total,
            fraud_count: acc.fraud,
            fraud_rate: acc.rate(),
            avg_amount: acc.avg_amount(),
            unique_users: acc.users.len(),
            device,
        })
        .collect();
    flagged.sort_by(|a, b| b.fraud_count.cmp(&a.fraud_count));

    let devices_with_fraud = flagged.len();
    flagged.truncate(top_n);

    DeviceSummary {
        unique_devices,
        devices_with_fraud,
        top_devices: flagged,
    }
}

fn correlations(txs: &[TxView<'_>]) -> Vec<FeatureCorrelation> {
    let features: [(&str, fn(&TxView<'_>) -> Option<f64>); 3] = [
        (AMOUNT, |t| t.amount),
        (DEVICE_ID, |t| t.device_value),
        (TIME, |t| t.time),
    ];

    features
        .iter()
        .map(|(name, value)| {
            let (labels, values): (Vec<bool>, Vec<f64>) = txs
                .iter()
                .filter_map(|t| value(t).map(|v| (t.fraud, v)))
                .unzip();
            FeatureCorrelation {
                feature: name.to_string(),
                correlation: point_biserial(&labels, &values),
            }
        })
        .collect()
}

// Builds the exploratory report
// Inputs: cleaned table (read-only), ranking sizes
// Outputs: every report section, ready for Display or JSON
pub fn analyze(table: &Table, config: &ReportConfig) -> Result<ExploratoryReport> {
    let txs = views(table)?;

    let overview = Overview {
        rows: table.row_count(),
        columns: table
            .null_counts()
            .into_iter()
            .zip(table.kinds())
            .map(|((name, nulls), kind)| ColumnSummary {
                name,
                kind: *kind,
                nulls,
            })
            .collect(),
    };

    let mut payment_methods = group_risks(group_by(&txs, |t| t.payment_method.map(String::from)));
    payment_methods.sort_by(|a, b| b.fraud_rate.total_cmp(&a.fraud_rate));

    let mut categories = group_risks(group_by(&txs, |t| t.category.map(String::from)));
    categories.sort_by(|a, b| b.fraud_count.cmp(&a.fraud_count));

    let report = ExploratoryReport {
        overview,
        class_balance: class_balance(&txs),
        amounts: amounts_by_class(&txs),
        payment_methods,
        categories,
        users: user_concentration(&txs, config.top_n),
        temporal: temporal_pattern(&txs, config.top_hours),
        devices: device_summary(&txs, config.top_n),
        correlations: correlations(&txs),
    };

    info!(
        transactions = txs.len(),
        fraudulent = report.class_balance.fraudulent,
        "Exploratory analysis complete"
    );
    Ok(report)
}

fn section(f: &mut fmt::Formatter<'_>, title: &str) -> fmt::Result {
    writeln!(f, "\n{title}")?;
    writeln!(f, "{}", "-".repeat(70))
}

fn money(value: Option<f64>) -> String {
    value.map_or_else(|| "n/a".to_string(), |v| format!("${v:.2}"))
}

fn write_groups(f: &mut fmt::Formatter<'_>, label: &str, groups: &[GroupRisk]) -> fmt::Result {
    let width = groups.iter().map(|g| g.key.len()).max().unwrap_or(0).max(label.len());
    writeln!(
        f,
        "{:<width$}  {:>8}  {:>8}  {:>9}  {:>12}  {:>14}",
        label, "Total", "Fraud", "Rate %", "Avg Amount", "Total Amount"
    )?;
    for g in groups {
        writeln!(
            f,
            "{:<width$}  {:>8}  {:>8}  {:>9.2}  {:>12}  {:>14.2}",
            g.key,
            g.total,
            g.fraud_count,
            g.fraud_rate,
            money(g.avg_amount),
            g.total_amount
        )?;
    }
    Ok(())
}

fn write_amounts(f: &mut fmt::Formatter<'_>, title: &str, d: &Option<Describe>) -> fmt::Result {
    writeln!(f, "\n{title}:")?;
    match d {
        None => writeln!(f, "  Count: 0"),
        Some(d) => {
            writeln!(f, "  Count: {}", d.count)?;
            writeln!(f, "  Mean: ${:.2}", d.mean)?;
            writeln!(f, "  Median: ${:.2}", d.median)?;
            writeln!(f, "  Std Dev: {}", money(d.std))?;
            writeln!(f, "  Min: ${:.2}", d.min)?;
            writeln!(f, "  Max: ${:.2}", d.max)?;
            writeln!(f, "  Q1: ${:.2}", d.q1)?;
            writeln!(f, "  Q3: ${:.2}", d.q3)?;
            writeln!(f, "  IQR: ${:.2}", d.iqr())
        }
    }
}

impl fmt::Display for ExploratoryReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        section(f, "[1] DATASET OVERVIEW")?;
        writeln!(f, "Dataset Shape: ({}, {})", self.overview.rows, self.overview.columns.len())?;
        for c in &self.overview.columns {
            writeln!(f, "  {:<16} {:<12} missing: {}", c.name, format!("{:?}", c.kind), c.nulls)?;
        }

        section(f, "[2] CLASS IMBALANCE & FRAUD RATE")?;
        let cb = &self.class_balance;
        writeln!(f, "  NO: {} transactions ({:.2}%)", cb.legitimate, cb.legitimate_pct)?;
        writeln!(f, "  YES: {} transactions ({:.2}%)", cb.fraudulent, cb.fraudulent_pct)?;
        if let (Some(ratio), Some(level)) = (cb.fraud_ratio, cb.imbalance) {
            writeln!(f, "Fraud Ratio (Fraud:Legitimate): 1:{ratio:.2}")?;
            writeln!(f, "Imbalance Level: {level}")?;
        }

        section(f, "[3] TRANSACTION AMOUNT")?;
        write_amounts(f, "NO (Legitimate)", &self.amounts.legitimate)?;
        write_amounts(f, "YES (Fraudulent)", &self.amounts.fraudulent)?;
        if let Some(ratio) = self.amounts.mean_ratio {
            writeln!(f, "\nMean Value Ratio (Fraud:Legitimate): {ratio:.2}x")?;
        }

        section(f, "[4] PAYMENT METHOD RISK")?;
        write_groups(f, "payment_method", &self.payment_methods)?;

        section(f, "[5] PRODUCT CATEGORY RISK")?;
        write_groups(f, "category", &self.categories)?;

        section(f, "[6] USER CONCENTRATION")?;
        let users = &self.users;
        writeln!(f, "Total Unique Users: {}", users.unique_users)?;
        writeln!(f, "Users with Fraud: {}", users.users_with_fraud)?;
        for (i, u) in users.top_users.iter().enumerate() {
            writeln!(
                f,
                "  {}. User {}: {} frauds (${:.2}), {:.1}% fraud rate out of {} transactions",
                i + 1,
                u.user,
                u.fraud_count,
                u.fraud_amount,
                u.fraud_rate,
                u.total
            )?;
        }
        writeln!(
            f,
            "Top {} users account for {:.1}% of all fraud incidents",
            users.top_users.len(),
            users.top_share_pct
        )?;

        section(f, "[7] TEMPORAL PATTERNS")?;
        writeln!(f, "{:>4}  {:>8}  {:>8}  {:>9}", "Hour", "Total", "Fraud", "Rate %")?;
        for h in &self.temporal.riskiest_hours {
            writeln!(f, "{:>4}  {:>8}  {:>8}  {:>9.2}", h.hour, h.total, h.fraud_count, h.fraud_rate)?;
        }
        if let Some(peak) = &self.temporal.peak_hour {
            writeln!(f, "Peak Fraud Hour: {}:00 (UTC) with {} incidents", peak.hour, peak.fraud_count)?;
        }

        section(f, "[8] DEVICE RISK")?;
        writeln!(f, "Total Devices: {}", self.devices.unique_devices)?;
        writeln!(f, "Devices with Fraud: {}", self.devices.devices_with_fraud)?;
        for d in &self.devices.top_devices {
            writeln!(
                f,
                "  Device {}: {} of {} fraudulent ({:.2}%), avg {}, {} users",
                d.device,
                d.fraud_count,
                d.total,
                d.fraud_rate,
                money(d.avg_amount),
                d.unique_users
            )?;
        }

        section(f, "[9] POINT-BISERIAL CORRELATIONS WITH FRAUD")?;
        for c in &self.correlations {
            match &c.correlation {
                Some(r) => writeln!(
                    f,
                    "  {}: r={:.4}, p-value={:.6} {}",
                    c.feature,
                    r.r,
                    r.p_value,
                    r.significance()
                )?,
                None => writeln!(f, "  {}: undefined (constant or too few values)", c.feature)?,
            }
        }
        write!(f, "\n*** p < 0.001  ** p < 0.01  * p < 0.05  ns = not significant")
    }
}
