//! Container for the output of valuation algorithms.
//!
//! A [`ValuationResult`] holds one value per data index together with the
//! running variance and number of updates behind it, so that results from
//! independent runs or workers can be merged without losing statistics.
//!
//! Results can be sorted by value, variance, index or name. Sorting changes
//! the order of every accessor and of iteration, but never the data.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::io::{Read, Write};

use rand::{Rng, SeedableRng};
use rand_xoshiro::Xoshiro256PlusPlus;
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::Status;
use crate::error::ValuationError;
use crate::numeric::running_moments;

/// Variances below this are reported as numerical noise when merging.
const NEGATIVE_VARIANCE_TOLERANCE: f64 = -1e-6;

// =============================================================================
// ValueItem
// =============================================================================

/// The value of a single data point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValueItem {
    pub index: usize,
    pub name: String,
    #[serde(with = "json_float")]
    pub value: f64,
    #[serde(with = "json_float")]
    pub variance: f64,
    pub count: usize,
}

impl ValueItem {
    /// Standard error of the value estimate.
    pub fn stderr(&self) -> f64 {
        (self.variance / self.count.max(1) as f64).sqrt()
    }
}

/// Key used by [`ValuationResult::sort`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortKey {
    #[default]
    Value,
    Variance,
    Index,
    Name,
}

// =============================================================================
// ValuationResult
// =============================================================================

/// Values computed by a valuation algorithm.
#[derive(Debug, Clone)]
pub struct ValuationResult {
    algorithm: String,
    status: Status,
    indices: Vec<usize>,
    names: Vec<String>,
    values: Vec<f64>,
    variances: Vec<f64>,
    counts: Vec<usize>,
    extra: BTreeMap<String, f64>,
    /// Iteration order as positions into the arrays above.
    order: Vec<usize>,
    /// Data index to array position.
    positions: HashMap<usize, usize>,
}

impl ValuationResult {
    fn from_arrays(
        algorithm: String,
        status: Status,
        indices: Vec<usize>,
        names: Vec<String>,
        values: Vec<f64>,
        variances: Vec<f64>,
        counts: Vec<usize>,
    ) -> Result<Self, ValuationError> {
        let n = indices.len();
        for (what, len) in [
            ("names", names.len()),
            ("values", values.len()),
            ("variances", variances.len()),
            ("counts", counts.len()),
        ] {
            if len != n {
                return Err(ValuationError::InvalidArgument(format!(
                    "{what} has length {len}, expected {n}"
                )));
            }
        }
        let positions: HashMap<usize, usize> =
            indices.iter().enumerate().map(|(p, &i)| (i, p)).collect();
        if positions.len() != n {
            return Err(ValuationError::InvalidArgument(
                "indices must be unique".to_string(),
            ));
        }
        Ok(Self {
            algorithm,
            status,
            indices,
            names,
            values,
            variances,
            counts,
            extra: BTreeMap::new(),
            order: (0..n).collect(),
            positions,
        })
    }

    /// A result with no data points. Merging with it is the identity.
    pub fn empty(algorithm: impl Into<String>) -> Self {
        Self {
            algorithm: algorithm.into(),
            status: Status::Pending,
            indices: Vec::new(),
            names: Vec::new(),
            values: Vec::new(),
            variances: Vec::new(),
            counts: Vec::new(),
            extra: BTreeMap::new(),
            order: Vec::new(),
            positions: HashMap::new(),
        }
    }

    /// Zero values with zero counts for the given indices.
    pub fn zeros(
        algorithm: impl Into<String>,
        indices: Vec<usize>,
        names: Vec<String>,
    ) -> Result<Self, ValuationError> {
        let n = indices.len();
        Self::from_arrays(
            algorithm.into(),
            Status::Pending,
            indices,
            names,
            vec![0.0; n],
            vec![0.0; n],
            vec![0; n],
        )
    }

    /// Values for indices `0..values.len()`, each counted once with zero variance.
    pub fn from_values(
        algorithm: impl Into<String>,
        values: Vec<f64>,
        names: Vec<String>,
        status: Status,
    ) -> Result<Self, ValuationError> {
        let n = values.len();
        Self::from_arrays(
            algorithm.into(),
            status,
            (0..n).collect(),
            names,
            values,
            vec![0.0; n],
            vec![1; n],
        )
    }

    /// Replace variances, in index order.
    pub fn with_variances(mut self, variances: Vec<f64>) -> Result<Self, ValuationError> {
        if variances.len() != self.values.len() {
            return Err(ValuationError::InvalidArgument(format!(
                "variances has length {}, expected {}",
                variances.len(),
                self.values.len()
            )));
        }
        self.variances = variances;
        Ok(self)
    }

    /// Replace update counts, in index order.
    pub fn with_counts(mut self, counts: Vec<usize>) -> Result<Self, ValuationError> {
        if counts.len() != self.values.len() {
            return Err(ValuationError::InvalidArgument(format!(
                "counts has length {}, expected {}",
                counts.len(),
                self.values.len()
            )));
        }
        self.counts = counts;
        Ok(self)
    }

    /// Attach an algorithm-specific scalar, such as the least core subsidy.
    pub fn with_extra(mut self, key: impl Into<String>, value: f64) -> Self {
        self.extra.insert(key.into(), value);
        self
    }

    /// Uniform random values in `[-1, 1]` with status `Converged`. Useful as a baseline.
    pub fn from_random(n: usize, seed: u64) -> Self {
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(seed);
        let values = (0..n).map(|_| rng.gen_range(-1.0..=1.0)).collect();
        let names = (0..n).map(|i| i.to_string()).collect();
        // Lengths agree by construction.
        Self::from_values("random", values, names, Status::Converged)
            .unwrap_or_else(|_| Self::empty("random"))
    }

    // -------------------------------------------------------------------------
    // Updates
    // -------------------------------------------------------------------------

    /// Fold a new sample for `data_index` into its running mean and variance.
    pub fn update(&mut self, data_index: usize, value: f64) -> Result<(), ValuationError> {
        let pos = *self
            .positions
            .get(&data_index)
            .ok_or(ValuationError::UnknownIndex(data_index))?;
        let (mean, var) =
            running_moments(self.values[pos], self.variances[pos], self.counts[pos], value);
        self.values[pos] = mean;
        self.variances[pos] = var;
        self.counts[pos] += 1;
        Ok(())
    }

    /// Combine two results as if all their updates had gone into one.
    ///
    /// Indices are united. Values are count-weighted means and variances are
    /// pooled. The status is the `&` of both. An empty operand is the identity.
    pub fn merge(&self, other: &ValuationResult) -> Result<ValuationResult, ValuationError> {
        if other.is_empty() {
            return Ok(self.clone());
        }
        if self.is_empty() {
            return Ok(other.clone());
        }
        if self.algorithm != other.algorithm {
            return Err(ValuationError::AlgorithmMismatch {
                left: self.algorithm.clone(),
                right: other.algorithm.clone(),
            });
        }

        let mut indices: Vec<usize> = self.indices.iter().chain(&other.indices).copied().collect();
        indices.sort_unstable();
        indices.dedup();

        let n = indices.len();
        let mut names = Vec::with_capacity(n);
        let mut values = Vec::with_capacity(n);
        let mut variances = Vec::with_capacity(n);
        let mut counts = Vec::with_capacity(n);

        for &idx in &indices {
            let a = self.positions.get(&idx).map(|&p| self.raw_item(p));
            let b = other.positions.get(&idx).map(|&p| other.raw_item(p));
            let item = match (a, b) {
                (Some(a), None) => a,
                (None, Some(b)) => b,
                (Some(a), Some(b)) => {
                    if a.name != b.name {
                        return Err(ValuationError::NameMismatch {
                            index: idx,
                            left: a.name,
                            right: b.name,
                        });
                    }
                    pool(a, b)
                }
                (None, None) => unreachable!("index comes from one of the operands"),
            };
            names.push(item.name);
            values.push(item.value);
            variances.push(item.variance);
            counts.push(item.count);
        }

        let mut merged = Self::from_arrays(
            self.algorithm.clone(),
            self.status & other.status,
            indices,
            names,
            values,
            variances,
            counts,
        )?;
        merged.extra = self.extra.clone();
        merged.extra.extend(other.extra.clone());
        Ok(merged)
    }

    // -------------------------------------------------------------------------
    // Ordering
    // -------------------------------------------------------------------------

    /// Sort by `key`, ascending unless `reverse`. Ties keep their current order.
    pub fn sort(&mut self, reverse: bool, key: SortKey) {
        let compare = |a: &usize, b: &usize| -> Ordering {
            let (a, b) = (*a, *b);
            let ord = match key {
                SortKey::Value => self.values[a].total_cmp(&self.values[b]),
                SortKey::Variance => self.variances[a].total_cmp(&self.variances[b]),
                SortKey::Index => self.indices[a].cmp(&self.indices[b]),
                SortKey::Name => self.names[a].cmp(&self.names[b]),
            };
            if reverse {
                ord.reverse()
            } else {
                ord
            }
        };
        let mut order = self.order.clone();
        order.sort_by(compare);
        self.order = order;
    }

    // -------------------------------------------------------------------------
    // Access
    // -------------------------------------------------------------------------

    fn raw_item(&self, pos: usize) -> ValueItem {
        ValueItem {
            index: self.indices[pos],
            name: self.names[pos].clone(),
            value: self.values[pos],
            variance: self.variances[pos],
            count: self.counts[pos],
        }
    }

    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    pub fn algorithm(&self) -> &str {
        &self.algorithm
    }

    pub fn status(&self) -> Status {
        self.status
    }

    pub fn set_status(&mut self, status: Status) {
        self.status = status;
    }

    /// Item for a data index.
    pub fn get(&self, data_index: usize) -> Result<ValueItem, ValuationError> {
        self.positions
            .get(&data_index)
            .map(|&p| self.raw_item(p))
            .ok_or(ValuationError::UnknownIndex(data_index))
    }

    /// Item at a position in the current order.
    pub fn item(&self, position: usize) -> Option<ValueItem> {
        self.order.get(position).map(|&p| self.raw_item(p))
    }

    /// Items in the current order.
    pub fn iter(&self) -> impl Iterator<Item = ValueItem> + '_ {
        self.order.iter().map(|&p| self.raw_item(p))
    }

    fn ordered<T: Clone>(&self, data: &[T]) -> Vec<T> {
        self.order.iter().map(|&p| data[p].clone()).collect()
    }

    pub fn indices(&self) -> Vec<usize> {
        self.ordered(&self.indices)
    }

    pub fn names(&self) -> Vec<String> {
        self.ordered(&self.names)
    }

    pub fn values(&self) -> Vec<f64> {
        self.ordered(&self.values)
    }

    pub fn variances(&self) -> Vec<f64> {
        self.ordered(&self.variances)
    }

    pub fn counts(&self) -> Vec<usize> {
        self.ordered(&self.counts)
    }

    /// Standard errors `sqrt(variance / max(1, count))`.
    pub fn stderr(&self) -> Vec<f64> {
        self.order
            .iter()
            .map(|&p| (self.variances[p] / self.counts[p].max(1) as f64).sqrt())
            .collect()
    }

    pub fn extra(&self, key: &str) -> Option<f64> {
        self.extra.get(key).copied()
    }

    /// Value of each data index, in index order regardless of sorting.
    pub fn values_by_index(&self) -> Vec<(usize, f64)> {
        let mut pairs: Vec<(usize, f64)> = self
            .indices
            .iter()
            .copied()
            .zip(self.values.iter().copied())
            .collect();
        pairs.sort_unstable_by_key(|&(i, _)| i);
        pairs
    }

    /// Items in index order regardless of sorting.
    pub fn items_by_index(&self) -> Vec<ValueItem> {
        let mut positions: Vec<usize> = (0..self.indices.len()).collect();
        positions.sort_unstable_by_key(|&p| self.indices[p]);
        positions.into_iter().map(|p| self.raw_item(p)).collect()
    }

    /// Update counts in index order regardless of sorting.
    pub fn counts_by_index(&self) -> Vec<usize> {
        let mut pairs: Vec<(usize, usize)> = self
            .indices
            .iter()
            .copied()
            .zip(self.counts.iter().copied())
            .collect();
        pairs.sort_unstable_by_key(|&(i, _)| i);
        pairs.into_iter().map(|(_, c)| c).collect()
    }

    // -------------------------------------------------------------------------
    // Serialization
    // -------------------------------------------------------------------------

    /// Write as a JSON document with one record per data point, in the current order.
    pub fn to_json_writer<W: Write>(&self, writer: W) -> Result<(), ValuationError> {
        let doc = ResultDocument {
            algorithm: self.algorithm.clone(),
            status: self.status,
            extra: self.extra.clone(),
            values: self.iter().collect(),
        };
        serde_json::to_writer_pretty(writer, &doc)?;
        Ok(())
    }

    pub fn from_json_reader<R: Read>(reader: R) -> Result<Self, ValuationError> {
        let doc: ResultDocument = serde_json::from_reader(reader)?;
        let n = doc.values.len();
        let mut indices = Vec::with_capacity(n);
        let mut names = Vec::with_capacity(n);
        let mut values = Vec::with_capacity(n);
        let mut variances = Vec::with_capacity(n);
        let mut counts = Vec::with_capacity(n);
        for item in doc.values {
            indices.push(item.index);
            names.push(item.name);
            values.push(item.value);
            variances.push(item.variance);
            counts.push(item.count);
        }
        let mut result = Self::from_arrays(
            doc.algorithm,
            doc.status,
            indices,
            names,
            values,
            variances,
            counts,
        )?;
        result.extra = doc.extra;
        Ok(result)
    }
}

impl std::ops::Add for &ValuationResult {
    type Output = Result<ValuationResult, ValuationError>;

    /// Same as [`ValuationResult::merge`].
    fn add(self, rhs: &ValuationResult) -> Self::Output {
        self.merge(rhs)
    }
}

/// Pool two estimates of the same quantity.
fn pool(a: ValueItem, b: ValueItem) -> ValueItem {
    let n = a.count as f64;
    let m = b.count as f64;
    let total = n + m;
    if total == 0.0 {
        return a;
    }
    let value = (n * a.value + m * b.value) / total;
    let second_moment =
        (n * (a.variance + a.value.powi(2)) + m * (b.variance + b.value.powi(2))) / total;
    let mut variance = second_moment - value.powi(2);
    if variance < 0.0 {
        if variance < NEGATIVE_VARIANCE_TOLERANCE {
            warn!(index = a.index, variance, "negative pooled variance clipped to zero");
        }
        variance = 0.0;
    }
    ValueItem {
        index: a.index,
        name: a.name,
        value,
        variance,
        count: a.count + b.count,
    }
}

#[derive(Serialize, Deserialize)]
struct ResultDocument {
    algorithm: String,
    status: Status,
    #[serde(default, with = "json_float::map")]
    extra: BTreeMap<String, f64>,
    values: Vec<ValueItem>,
}

/// JSON has no NaN or infinity, so non-finite floats are written as the
/// strings `"NaN"`, `"inf"` and `"-inf"`. `null` reads back as NaN.
mod json_float {
    use std::fmt;

    use serde::de::{self, Visitor};
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub struct Float(pub f64);

    impl Serialize for Float {
        fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
            let v = self.0;
            if v.is_finite() {
                serializer.serialize_f64(v)
            } else if v.is_nan() {
                serializer.serialize_str("NaN")
            } else if v > 0.0 {
                serializer.serialize_str("inf")
            } else {
                serializer.serialize_str("-inf")
            }
        }
    }

    impl<'de> Deserialize<'de> for Float {
        fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
            deserializer.deserialize_any(FloatVisitor)
        }
    }

    struct FloatVisitor;

    impl<'de> Visitor<'de> for FloatVisitor {
        type Value = Float;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("a number, null, \"NaN\", \"inf\" or \"-inf\"")
        }

        fn visit_f64<E: de::Error>(self, v: f64) -> Result<Float, E> {
            Ok(Float(v))
        }

        fn visit_i64<E: de::Error>(self, v: i64) -> Result<Float, E> {
            Ok(Float(v as f64))
        }

        fn visit_u64<E: de::Error>(self, v: u64) -> Result<Float, E> {
            Ok(Float(v as f64))
        }

        fn visit_unit<E: de::Error>(self) -> Result<Float, E> {
            Ok(Float(f64::NAN))
        }

        fn visit_none<E: de::Error>(self) -> Result<Float, E> {
            Ok(Float(f64::NAN))
        }

        fn visit_str<E: de::Error>(self, v: &str) -> Result<Float, E> {
            match v {
                "NaN" | "nan" => Ok(Float(f64::NAN)),
                "inf" | "Infinity" => Ok(Float(f64::INFINITY)),
                "-inf" | "-Infinity" => Ok(Float(f64::NEG_INFINITY)),
                other => Err(E::invalid_value(de::Unexpected::Str(other), &self)),
            }
        }
    }

    pub fn serialize<S: Serializer>(v: &f64, serializer: S) -> Result<S::Ok, S::Error> {
        Float(*v).serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
        Float::deserialize(deserializer).map(|f| f.0)
    }

    pub mod map {
        use std::collections::BTreeMap;

        use serde::{Deserialize, Deserializer, Serializer};

        use super::Float;

        pub fn serialize<S: Serializer>(
            map: &BTreeMap<String, f64>,
            serializer: S,
        ) -> Result<S::Ok, S::Error> {
            serializer.collect_map(map.iter().map(|(k, &v)| (k, Float(v))))
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(
            deserializer: D,
        ) -> Result<BTreeMap<String, f64>, D::Error> {
            let raw = BTreeMap::<String, Float>::deserialize(deserializer)?;
            Ok(raw.into_iter().map(|(k, v)| (k, v.0)).collect())
        }
    }
}
