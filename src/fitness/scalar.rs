use super::Fitness;
use std::any::Any;

/// Single-objective fitness. The stored value doubles as the probability
/// base.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ScalarFitness {
    value: f32,
}

impl ScalarFitness {
    pub fn new(value: f32) -> Self {
        Self { value }
    }

    pub fn value(&self) -> f32 {
        self.value
    }

    pub fn set_value(&mut self, value: f32) {
        self.value = value;
    }
}

impl Fitness for ScalarFitness {
    fn clone_boxed(&self) -> Box<dyn Fitness> {
        Box::new(self.clone())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn probability_base(&self) -> f32 {
        self.value
    }

    fn component_count(&self) -> usize {
        1
    }

    fn component(&self, _index: usize) -> f32 {
        self.value
    }

    fn distance(&self, other: &dyn Fitness) -> f32 {
        (self.value - other.probability_base()).abs()
    }

    fn accumulate(&mut self, other: &dyn Fitness) {
        self.value += other.probability_base();
    }

    fn subtract(&mut self, other: &dyn Fitness) {
        self.value -= other.probability_base();
    }

    fn scaled_by(&self, factor: f32) -> Box<dyn Fitness> {
        Box::new(Self::new(self.value * factor))
    }

    fn clear(&mut self) {
        self.value = 0.0;
    }
}
