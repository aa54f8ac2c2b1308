use std::collections::BTreeMap;
use std::ops::Range;

use itertools::Itertools;
use serde::{Deserialize, Serialize};

use crate::errors::TuningError;
use crate::library::{Assignment, DomainPoint, Value};

/// Ordered candidate values for each parameter of one model.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ParameterRanges {
    ranges: Vec<(String, Vec<Value>)>,
}

impl ParameterRanges {
    pub fn new() -> Self {
        Self { ranges: Vec::new() }
    }

    pub fn add<V: Into<Value>>(
        mut self,
        name: impl Into<String>,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        self.ranges
            .push((name.into(), values.into_iter().map(Into::into).collect()));
        self
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[Value])> {
        self.ranges.iter().map(|(n, v)| (n.as_str(), v.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }
}

/// A contiguous block of domain indices owned by one model.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelPartition {
    pub model_id: String,
    pub indices: Range<usize>,
}

impl ModelPartition {
    pub fn new(model_id: impl Into<String>, indices: Range<usize>) -> Self {
        Self {
            model_id: model_id.into(),
            indices,
        }
    }

    pub fn contains(&self, point: usize) -> bool {
        self.indices.contains(&point)
    }
}

/// Flat, indexed domain of every configuration of every declared model.
///
/// Adding the same model twice appends a second independent partition instead
/// of merging with the first one.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParameterSpace {
    models: Vec<(String, ParameterRanges)>,
    domain: Vec<DomainPoint>,
    partitions: Vec<ModelPartition>,
}

impl ParameterSpace {
    pub fn new() -> Self {
        Self::default()
    }

    /// Expands the cartesian product of `ranges` (first parameter outermost)
    /// and appends it to the domain. Returns the indices of the new block.
    pub fn add_model(
        &mut self,
        model_id: impl Into<String>,
        ranges: ParameterRanges,
    ) -> Result<Range<usize>, TuningError> {
        let model_id = model_id.into();
        for (i, (name, values)) in ranges.ranges.iter().enumerate() {
            if values.is_empty() {
                return Err(TuningError::EmptyRange {
                    model: model_id,
                    parameter: name.clone(),
                });
            }
            if ranges.ranges[..i].iter().any(|(other, _)| other == name) {
                return Err(TuningError::DuplicateParameter {
                    model: model_id,
                    parameter: name.clone(),
                });
            }
        }

        let names = ranges
            .ranges
            .iter()
            .map(|(name, _)| name.clone())
            .collect::<Vec<_>>();
        let combinations: Vec<Vec<Value>> = if ranges.is_empty() {
            vec![Vec::new()]
        } else {
            ranges
                .ranges
                .iter()
                .map(|(_, values)| values.iter().cloned())
                .multi_cartesian_product()
                .collect()
        };

        let start = self.domain.len();
        self.domain
            .extend(combinations.into_iter().map(|values| DomainPoint {
                model_id: model_id.clone(),
                params: Assignment::new(names.iter().cloned().zip(values).collect()),
            }));
        let indices = start..self.domain.len();
        log::debug!(
            "Model '{}' expanded into {} points ({:?})",
            model_id,
            indices.len(),
            indices
        );

        self.partitions
            .push(ModelPartition::new(model_id.clone(), indices.clone()));
        self.models.push((model_id, ranges));
        Ok(indices)
    }

    pub fn len(&self) -> usize {
        self.domain.len()
    }

    pub fn is_empty(&self) -> bool {
        self.domain.is_empty()
    }

    pub fn domain(&self) -> &[DomainPoint] {
        &self.domain
    }

    pub fn domain_indices(&self) -> Range<usize> {
        0..self.domain.len()
    }

    pub fn point(&self, index: usize) -> Option<&DomainPoint> {
        self.domain.get(index)
    }

    pub fn partitions(&self) -> &[ModelPartition] {
        &self.partitions
    }

    /// Declared ranges per model, in declaration order.
    pub fn models(&self) -> impl Iterator<Item = (&str, &ParameterRanges)> {
        self.models.iter().map(|(id, r)| (id.as_str(), r))
    }

    /// Domain indices of one model, over every block it was added with.
    pub fn model_domain(&self, model_id: &str) -> Vec<usize> {
        self.partitions
            .iter()
            .filter(|p| p.model_id == model_id)
            .flat_map(|p| p.indices.clone())
            .collect()
    }

    pub fn models_domains(&self) -> BTreeMap<String, Vec<usize>> {
        let mut result: BTreeMap<String, Vec<usize>> = BTreeMap::new();
        for partition in &self.partitions {
            result
                .entry(partition.model_id.clone())
                .or_default()
                .extend(partition.indices.clone());
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(point: &DomainPoint) -> Vec<(String, Value)> {
        point
            .params
            .iter()
            .map(|(n, v)| (n.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn expands_single_parameter_array() {
        let mut space = ParameterSpace::new();
        space
            .add_model("m", ParameterRanges::new().add("a", [1, 2]).add("b", [10]))
            .unwrap();
        assert_eq!(space.len(), 2);
        assert_eq!(
            params(&space.domain()[0]),
            vec![("a".into(), Value::Integer(1)), ("b".into(), Value::Integer(10))]
        );
        assert_eq!(
            params(&space.domain()[1]),
            vec![("a".into(), Value::Integer(2)), ("b".into(), Value::Integer(10))]
        );
    }

    #[test]
    fn first_parameter_varies_slowest() {
        let mut space = ParameterSpace::new();
        space
            .add_model("m", ParameterRanges::new().add("a", [1, 2]).add("b", [3, 6]))
            .unwrap();
        let pairs = space
            .domain()
            .iter()
            .map(|p| {
                (
                    p.params.get("a").and_then(Value::as_i64).unwrap(),
                    p.params.get("b").and_then(Value::as_i64).unwrap(),
                )
            })
            .collect::<Vec<_>>();
        assert_eq!(pairs, vec![(1, 3), (1, 6), (2, 3), (2, 6)]);
    }

    #[test]
    fn assigns_contiguous_blocks_per_model() {
        let mut space = ParameterSpace::new();
        space
            .add_model("m1", ParameterRanges::new().add("a", [1, 2]))
            .unwrap();
        space
            .add_model("m2", ParameterRanges::new().add("a", [1, 2]))
            .unwrap();
        assert_eq!(space.model_domain("m1"), vec![0, 1]);
        assert_eq!(space.model_domain("m2"), vec![2, 3]);
        assert_eq!(space.domain()[2].model_id, "m2");
    }

    #[test]
    fn partitions_cover_domain_without_overlap() {
        let mut space = ParameterSpace::new();
        space
            .add_model("a", ParameterRanges::new().add("x", [1, 2, 3]).add("y", ["p", "q"]))
            .unwrap();
        space.add_model("b", ParameterRanges::new()).unwrap();
        space
            .add_model("a", ParameterRanges::new().add("x", [0.1, 0.2]))
            .unwrap();

        let mut covered = vec![0usize; space.len()];
        for partition in space.partitions() {
            for i in partition.indices.clone() {
                covered[i] += 1;
            }
        }
        assert!(covered.iter().all(|&c| c == 1));
        assert_eq!(space.len(), 6 + 1 + 2);
        assert_eq!(space.partitions().len(), 3);
        assert_eq!(space.model_domain("a"), vec![0, 1, 2, 3, 4, 5, 7, 8]);

        let domains = space.models_domains();
        assert_eq!(domains.len(), 2);
        assert_eq!(domains["a"], vec![0, 1, 2, 3, 4, 5, 7, 8]);
        assert_eq!(domains["b"], vec![6]);
        let mut union = domains.values().flatten().copied().collect::<Vec<_>>();
        union.sort_unstable();
        assert_eq!(union, space.domain_indices().collect::<Vec<_>>());
    }

    #[test]
    fn empty_range_set_yields_single_point() {
        let mut space = ParameterSpace::new();
        let block = space.add_model("constant", ParameterRanges::new()).unwrap();
        assert_eq!(block, 0..1);
        assert!(space.domain()[0].params.is_empty());
    }

    #[test]
    fn empty_values_are_rejected_without_growing_the_domain() {
        let mut space = ParameterSpace::new();
        let err = space
            .add_model("m", ParameterRanges::new().add("a", Vec::<i32>::new()))
            .unwrap_err();
        assert!(matches!(err, TuningError::EmptyRange { .. }));
        assert!(space.is_empty());
        assert!(space.partitions().is_empty());
    }

    #[test]
    fn duplicate_parameter_is_rejected() {
        let mut space = ParameterSpace::new();
        let err = space
            .add_model("m", ParameterRanges::new().add("a", [1]).add("a", [2]))
            .unwrap_err();
        assert!(matches!(err, TuningError::DuplicateParameter { .. }));
    }
}
