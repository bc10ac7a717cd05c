use std::{fmt, sync::Arc};

use indexmap::IndexMap;
use parking_lot::RwLock;
use uuid::Uuid;

use crate::{
    dictionary::value::ValueType,
    modeling::predictor::{
        BaselinePredictor, NaiveBayesPredictor, Predictor, UnivariatePredictor, BASELINE,
        NAIVE_BAYES, UNIVARIATE,
    },
};

/// Builds a fresh untrained predictor.
pub type PredictorFactory = Arc<dyn Fn() -> Box<dyn Predictor> + Send + Sync>;

/// Registered predictor.
#[derive(Clone)]
pub struct PredictorDescriptor {
    /// Unique identifier.
    pub id: Uuid,
    /// Name used by predictor specs.
    pub name: String,
    factory: PredictorFactory,
}

impl fmt::Debug for PredictorDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PredictorDescriptor")
            .field("id", &self.id)
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

impl PredictorDescriptor {
    /// Creates a descriptor.
    #[must_use]
    pub fn new(name: impl Into<String>, factory: PredictorFactory) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            factory,
        }
    }

    /// New untrained instance.
    #[must_use]
    pub fn create(&self) -> Box<dyn Predictor> {
        (self.factory)()
    }

    /// Whether the predictor handles a target type.
    #[must_use]
    pub fn is_target_type_managed(&self, target_type: ValueType) -> bool {
        self.create().is_target_type_managed(target_type)
    }
}

/// Predictors available to the benchmarks, by name.
#[derive(Debug, Clone, Default)]
pub struct PredictorRegistry {
    inner: Arc<RwLock<IndexMap<String, PredictorDescriptor>>>,
}

impl PredictorRegistry {
    /// Registry holding the built-in predictors.
    #[must_use]
    pub fn with_builtins() -> Self {
        let registry = Self::default();
        registry.register(PredictorDescriptor::new(
            BASELINE,
            Arc::new(|| Box::new(BaselinePredictor::new()) as Box<dyn Predictor>),
        ));
        registry.register(PredictorDescriptor::new(
            NAIVE_BAYES,
            Arc::new(|| Box::new(NaiveBayesPredictor::new()) as Box<dyn Predictor>),
        ));
        registry.register(PredictorDescriptor::new(
            UNIVARIATE,
            Arc::new(|| Box::new(UnivariatePredictor::new()) as Box<dyn Predictor>),
        ));
        registry
    }

    /// Registers or replaces a predictor.
    pub fn register(&self, descriptor: PredictorDescriptor) {
        self.inner.write().insert(descriptor.name.clone(), descriptor);
    }

    /// Descriptor of a predictor.
    #[must_use]
    pub fn lookup(&self, name: &str) -> Option<PredictorDescriptor> {
        self.inner.read().get(name).cloned()
    }

    /// New instance of a registered predictor.
    #[must_use]
    pub fn create(&self, name: &str) -> Option<Box<dyn Predictor>> {
        self.inner.read().get(name).map(PredictorDescriptor::create)
    }

    /// Registered names, in registration order.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.inner.read().keys().cloned().collect()
    }

    /// Registered names allowed by a `;` separated filter; an empty filter allows all.
    #[must_use]
    pub fn names_with_filter(&self, filter: &str) -> Vec<String> {
        self.inner
            .read()
            .keys()
            .filter(|name| is_allowed(name, filter))
            .cloned()
            .collect()
    }
}

/// Whether a name belongs to a `;` separated list; an empty list allows every name.
#[must_use]
pub fn is_allowed(name: &str, filter: &str) -> bool {
    filter.trim().is_empty() || filter.split(';').any(|allowed| allowed.trim() == name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtins_are_registered_in_order() {
        let registry = PredictorRegistry::with_builtins();
        assert_eq!(registry.names(), vec![BASELINE, NAIVE_BAYES, UNIVARIATE]);
        let predictor = registry.create(NAIVE_BAYES).unwrap();
        assert_eq!(predictor.name(), NAIVE_BAYES);
        assert!(!predictor.is_trained());
        assert!(registry.create("Tree").is_none());
    }

    #[test]
    fn filters_select_names() {
        let registry = PredictorRegistry::with_builtins();
        assert_eq!(registry.names_with_filter("").len(), 3);
        assert_eq!(registry.names_with_filter(UNIVARIATE), vec![UNIVARIATE]);
        assert_eq!(
            registry.names_with_filter("Baseline; Naive Bayes"),
            vec![BASELINE, NAIVE_BAYES]
        );
        assert!(!is_allowed("Tree", "Baseline;Naive Bayes"));
    }

    #[test]
    fn registering_twice_replaces_the_descriptor() {
        let registry = PredictorRegistry::default();
        let first = PredictorDescriptor::new(
            BASELINE,
            Arc::new(|| Box::new(BaselinePredictor::new()) as Box<dyn Predictor>),
        );
        let first_id = first.id;
        registry.register(first);
        registry.register(PredictorDescriptor::new(
            BASELINE,
            Arc::new(|| Box::new(BaselinePredictor::new()) as Box<dyn Predictor>),
        ));
        assert_eq!(registry.names().len(), 1);
        assert_ne!(registry.lookup(BASELINE).unwrap().id, first_id);
        assert!(registry
            .lookup(BASELINE)
            .unwrap()
            .is_target_type_managed(ValueType::Symbol));
        assert!(!registry
            .lookup(BASELINE)
            .unwrap()
            .is_target_type_managed(ValueType::None));
    }
}
