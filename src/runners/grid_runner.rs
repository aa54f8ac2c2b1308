use crate::errors::TuningError;

use super::{validate_sample, Observation, SearchOptimizer, Step};

/// Walks the domain in ascending index order.
///
/// Once every point has been handed out the next call reports
/// [`Step::Exhausted`] and rewinds the cursor, so a following call starts a
/// new cycle from index 0.
pub struct GridSearchOptimizer {
    domain_size: usize,
    cursor: usize,
    observations: Vec<Observation>,
}

impl GridSearchOptimizer {
    pub fn new(domain_size: usize) -> Self {
        Self {
            domain_size,
            cursor: 0,
            observations: Vec::new(),
        }
    }

    pub fn observations(&self) -> &[Observation] {
        &self.observations
    }
}

impl SearchOptimizer for GridSearchOptimizer {
    fn next_point(&mut self) -> Step {
        if self.cursor >= self.domain_size {
            self.cursor = 0;
            return Step::Exhausted;
        }
        let point = self.cursor;
        self.cursor += 1;
        Step::Sample {
            point,
            acquisition: Step::UNINFORMED_ACQUISITION,
        }
    }

    fn add_sample(&mut self, point: usize, value: f64, delay: f64) -> Result<(), TuningError> {
        validate_sample(point, value, delay, self.domain_size)?;
        self.observations.push(Observation { point, value, delay });
        Ok(())
    }

    fn name(&self) -> &str {
        "grid"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn visits_every_point_in_order_before_exhausting() {
        let mut grid = GridSearchOptimizer::new(4);
        let points = (0..4)
            .map(|_| grid.next_point().point().unwrap())
            .collect::<Vec<_>>();
        assert_eq!(points, vec![0, 1, 2, 3]);
        assert_eq!(grid.next_point(), Step::Exhausted);
    }

    #[test]
    fn starts_a_new_cycle_after_exhaustion() {
        let mut grid = GridSearchOptimizer::new(2);
        grid.next_point();
        grid.next_point();
        assert!(grid.next_point().is_exhausted());
        assert_eq!(grid.next_point().point(), Some(0));
    }

    #[test]
    fn samples_do_not_change_the_schedule() {
        let mut grid = GridSearchOptimizer::new(3);
        assert_eq!(grid.next_point().point(), Some(0));
        grid.add_sample(2, 10.0, 1.0).unwrap();
        assert_eq!(grid.next_point().point(), Some(1));
        assert_eq!(grid.observations().len(), 1);
        assert!(grid.add_sample(3, 1.0, 1.0).is_err());
    }

    #[test]
    fn empty_domain_is_exhausted_immediately() {
        let mut grid = GridSearchOptimizer::new(0);
        assert!(grid.next_point().is_exhausted());
    }
}
