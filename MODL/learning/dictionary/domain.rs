use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::Mutex;

use super::class::Class;
use crate::errors::LearningError;

/// Named set of classes.
#[derive(Debug, Clone)]
pub struct ClassDomain {
    name: String,
    classes: IndexMap<String, Class>,
}

impl ClassDomain {
    /// Creates an empty domain.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            classes: IndexMap::new(),
        }
    }

    /// Domain name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Adds a class.
    pub fn insert_class(&mut self, class: Class) -> Result<(), LearningError> {
        if self.classes.contains_key(class.name()) {
            return Err(LearningError::InvalidArgument(format!(
                "dictionary {} already exists in domain {}",
                class.name(),
                self.name
            )));
        }
        self.classes.insert(class.name().to_owned(), class);
        Ok(())
    }

    /// Class by name.
    #[must_use]
    pub fn lookup_class(&self, name: &str) -> Option<&Class> {
        self.classes.get(name)
    }

    /// Mutable class by name.
    pub fn lookup_class_mut(&mut self, name: &str) -> Option<&mut Class> {
        self.classes.get_mut(name)
    }

    /// Number of classes.
    #[must_use]
    pub fn class_number(&self) -> usize {
        self.classes.len()
    }

    /// New domain holding a copy of one class of this domain.
    pub fn clone_from_class(&self, class_name: &str, domain_name: &str) -> Result<Self, LearningError> {
        let class = self
            .lookup_class(class_name)
            .ok_or_else(|| LearningError::UnknownClass(class_name.to_owned()))?;
        let mut domain = Self::new(domain_name);
        domain.insert_class(class.clone())?;
        Ok(domain)
    }

    /// Compiles every class.
    pub fn compile(&mut self) -> Result<(), LearningError> {
        for class in self.classes.values_mut() {
            class.compile()?;
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
struct RegistryState {
    current: Option<Arc<ClassDomain>>,
    scoped: bool,
}

/// Holder of the current class domain.
///
/// Scratch domains are installed through [`DomainRegistry::install`]; the returned guard
/// restores the previous domain when dropped, whatever the exit path.
#[derive(Debug, Clone, Default)]
pub struct DomainRegistry {
    state: Arc<Mutex<RegistryState>>,
}

impl DomainRegistry {
    /// Creates a registry without current domain.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current domain.
    #[must_use]
    pub fn current(&self) -> Option<Arc<ClassDomain>> {
        self.state.lock().current.clone()
    }

    /// Sets the base domain; rejected while a scoped domain is installed.
    pub fn set_current(&self, domain: ClassDomain) -> Result<(), LearningError> {
        let mut state = self.state.lock();
        if state.scoped {
            return Err(LearningError::DomainBusy);
        }
        state.current = Some(Arc::new(domain));
        Ok(())
    }

    /// Whether a scoped domain is installed.
    #[must_use]
    pub fn is_scoped(&self) -> bool {
        self.state.lock().scoped
    }

    /// Installs a scoped domain until the guard is dropped.
    pub fn install(&self, domain: ClassDomain) -> Result<DomainGuard, LearningError> {
        let mut state = self.state.lock();
        if state.scoped {
            return Err(LearningError::DomainBusy);
        }
        let domain = Arc::new(domain);
        let previous = state.current.replace(Arc::clone(&domain));
        state.scoped = true;
        Ok(DomainGuard {
            state: Arc::clone(&self.state),
            previous,
            domain,
        })
    }
}

/// Scope of an installed domain.
#[derive(Debug)]
#[must_use = "the domain is uninstalled as soon as the guard is dropped"]
pub struct DomainGuard {
    state: Arc<Mutex<RegistryState>>,
    previous: Option<Arc<ClassDomain>>,
    domain: Arc<ClassDomain>,
}

impl DomainGuard {
    /// Installed domain.
    #[must_use]
    pub fn domain(&self) -> &ClassDomain {
        &self.domain
    }
}

impl Drop for DomainGuard {
    fn drop(&mut self) {
        let mut state = self.state.lock();
        state.current = self.previous.take();
        state.scoped = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guard_restores_previous_domain() {
        let registry = DomainRegistry::new();
        registry.set_current(ClassDomain::new("Root")).unwrap();
        {
            let guard = registry.install(ClassDomain::new("Evaluation")).unwrap();
            assert_eq!(guard.domain().name(), "Evaluation");
            assert_eq!(registry.current().unwrap().name(), "Evaluation");
            assert!(matches!(
                registry.install(ClassDomain::new("Other")),
                Err(LearningError::DomainBusy)
            ));
        }
        assert_eq!(registry.current().unwrap().name(), "Root");
        assert!(!registry.is_scoped());
    }

    #[test]
    fn guard_restores_on_early_return() {
        fn failing(registry: &DomainRegistry) -> Result<(), LearningError> {
            let _guard = registry.install(ClassDomain::new("Evaluation"))?;
            Err(LearningError::Evaluation("interrupted".into()))
        }
        let registry = DomainRegistry::new();
        assert!(failing(&registry).is_err());
        assert!(registry.current().is_none());
        assert!(registry.install(ClassDomain::new("Again")).is_ok());
    }

    #[test]
    fn clone_from_class_copies_one_class() {
        let mut domain = ClassDomain::new("Root");
        domain.insert_class(Class::new("Iris")).unwrap();
        domain.insert_class(Class::new("Adult")).unwrap();
        let copy = domain.clone_from_class("Iris", "Preparation").unwrap();
        assert_eq!(copy.class_number(), 1);
        assert!(copy.lookup_class("Iris").is_some());
        assert!(domain.clone_from_class("Missing", "X").is_err());
    }
}
