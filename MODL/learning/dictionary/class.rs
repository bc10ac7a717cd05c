use std::{collections::HashSet, fmt};

use indexmap::IndexMap;

use super::{
    rule::DerivationRule,
    value::{format_continuous, Value, ValueType},
};
use crate::errors::LearningError;

/// Meta-data key holding the preparation level of an attribute.
pub const LEVEL_META_DATA_KEY: &str = "Level";

/// Meta-data value.
#[derive(Debug, Clone, PartialEq)]
pub enum MetaValue {
    /// Free text.
    Text(String),
    /// Number.
    Number(f64),
}

/// Ordered key/value annotations of an attribute.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetaData {
    entries: IndexMap<String, MetaValue>,
}

impl MetaData {
    /// Sets a numerical entry.
    pub fn set_double(&mut self, key: &str, value: f64) {
        self.entries.insert(key.to_owned(), MetaValue::Number(value));
    }

    /// Sets a text entry.
    pub fn set_string(&mut self, key: &str, value: &str) {
        self.entries
            .insert(key.to_owned(), MetaValue::Text(value.to_owned()));
    }

    /// Numerical entry, if any.
    #[must_use]
    pub fn get_double(&self, key: &str) -> Option<f64> {
        match self.entries.get(key) {
            Some(MetaValue::Number(value)) => Some(*value),
            _ => None,
        }
    }

    /// Removes an entry.
    pub fn remove_key(&mut self, key: &str) {
        self.entries.shift_remove(key);
    }

    /// Whether the key is present.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }
}

/// Dictionary attribute.
#[derive(Debug, Clone)]
pub struct Attribute {
    /// Name, unique in its class.
    pub name: String,
    /// Value type.
    pub value_type: ValueType,
    /// Whether the attribute belongs to the class output.
    pub used: bool,
    /// Whether the attribute is evaluated; native attributes are always loaded.
    pub loaded: bool,
    /// Derivation rule, `None` for native attributes.
    pub rule: Option<DerivationRule>,
    /// Annotations.
    pub meta_data: MetaData,
    /// Free label.
    pub label: String,
}

impl Attribute {
    /// Creates a used native attribute.
    #[must_use]
    pub fn new(name: impl Into<String>, value_type: ValueType) -> Self {
        Self {
            name: name.into(),
            value_type,
            used: true,
            loaded: true,
            rule: None,
            meta_data: MetaData::default(),
            label: String::new(),
        }
    }

    /// Creates a used derived attribute typed after its rule.
    #[must_use]
    pub fn derived(name: impl Into<String>, rule: DerivationRule) -> Self {
        Self {
            value_type: rule.value_type(),
            rule: Some(rule),
            ..Self::new(name, ValueType::None)
        }
    }

    /// Whether the attribute is read from data rather than derived.
    #[must_use]
    pub const fn is_native(&self) -> bool {
        self.rule.is_none()
    }
}

/// Dictionary of a class: ordered attributes and their derivation graph.
#[derive(Debug, Clone)]
pub struct Class {
    name: String,
    attributes: IndexMap<String, Attribute>,
    evaluation_order: Vec<String>,
    compiled: bool,
}

impl Class {
    /// Creates an empty class.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attributes: IndexMap::new(),
            evaluation_order: Vec::new(),
            compiled: false,
        }
    }

    /// Class name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Renames the class.
    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    /// Attribute by name.
    #[must_use]
    pub fn lookup_attribute(&self, name: &str) -> Option<&Attribute> {
        self.attributes.get(name)
    }

    /// Mutable attribute by name; invalidates compilation.
    pub fn lookup_attribute_mut(&mut self, name: &str) -> Option<&mut Attribute> {
        self.compiled = false;
        self.attributes.get_mut(name)
    }

    /// Appends an attribute.
    pub fn insert_attribute(&mut self, attribute: Attribute) -> Result<(), LearningError> {
        if self.attributes.contains_key(&attribute.name) {
            return Err(LearningError::DuplicateAttribute(attribute.name));
        }
        self.compiled = false;
        self.attributes.insert(attribute.name.clone(), attribute);
        Ok(())
    }

    /// Removes an attribute, keeping the order of the others.
    pub fn remove_attribute(&mut self, name: &str) -> Option<Attribute> {
        self.compiled = false;
        self.attributes.shift_remove(name)
    }

    /// Attributes in declaration order.
    pub fn attributes(&self) -> impl Iterator<Item = &Attribute> {
        self.attributes.values()
    }

    /// Mutable attributes in declaration order; invalidates compilation.
    pub fn attributes_mut(&mut self) -> impl Iterator<Item = &mut Attribute> {
        self.compiled = false;
        self.attributes.values_mut()
    }

    /// Number of attributes.
    #[must_use]
    pub fn attribute_number(&self) -> usize {
        self.attributes.len()
    }

    /// Number of used attributes.
    #[must_use]
    pub fn used_attribute_number(&self) -> usize {
        self.attributes().filter(|attribute| attribute.used).count()
    }

    /// Number of used attributes of the given type.
    #[must_use]
    pub fn used_attribute_number_for_type(&self, value_type: ValueType) -> usize {
        self.attributes()
            .filter(|attribute| attribute.used && attribute.value_type == value_type)
            .count()
    }

    /// Native attributes, read from data.
    pub fn native_attributes(&self) -> impl Iterator<Item = &Attribute> {
        self.attributes().filter(|attribute| attribute.is_native())
    }

    /// Returns `prefix` if unused as a name, else the first free `prefix_<k>`.
    #[must_use]
    pub fn build_attribute_name(&self, prefix: &str) -> String {
        if !self.attributes.contains_key(prefix) {
            return prefix.to_owned();
        }
        (1..)
            .map(|index| format!("{prefix}_{index}"))
            .find(|candidate| !self.attributes.contains_key(candidate))
            .unwrap_or_else(|| prefix.to_owned())
    }

    /// Removes a meta-data key from every attribute.
    pub fn remove_all_attributes_meta_data_key(&mut self, key: &str) {
        for attribute in self.attributes.values_mut() {
            attribute.meta_data.remove_key(key);
        }
    }

    /// Validates rule operands, orders derived attributes and flags the loaded ones.
    ///
    /// A derived attribute is loaded when it is used or needed by a loaded attribute.
    pub fn compile(&mut self) -> Result<(), LearningError> {
        for attribute in self.attributes.values() {
            let Some(rule) = &attribute.rule else { continue };
            for operand in rule.operand_attributes() {
                if !self.attributes.contains_key(operand) {
                    return Err(LearningError::Derivation(format!(
                        "variable {operand} used in the rule of {} is unknown in dictionary {}",
                        attribute.name, self.name
                    )));
                }
            }
            for operand in rule.structure_operands() {
                if self.attributes[operand].value_type != ValueType::Structure {
                    return Err(LearningError::Derivation(format!(
                        "variable {operand} used in the rule of {} must be a structure",
                        attribute.name
                    )));
                }
            }
        }

        let mut order = Vec::new();
        let mut done = HashSet::new();
        let mut visiting = HashSet::new();
        for name in self.attributes.keys() {
            self.visit(name, &mut visiting, &mut done, &mut order)?;
        }

        let mut loaded: HashSet<String> = HashSet::new();
        for name in order.iter().rev() {
            let attribute = &self.attributes[name.as_str()];
            if attribute.used || loaded.contains(name) {
                loaded.insert(name.clone());
                if let Some(rule) = &attribute.rule {
                    loaded.extend(rule.operand_attributes().into_iter().map(str::to_owned));
                }
            }
        }
        for attribute in self.attributes.values_mut() {
            attribute.loaded = attribute.is_native() || loaded.contains(&attribute.name);
        }
        self.evaluation_order = order
            .into_iter()
            .filter(|name| !self.attributes[name.as_str()].is_native())
            .collect();
        self.compiled = true;
        Ok(())
    }

    fn visit(
        &self,
        name: &str,
        visiting: &mut HashSet<String>,
        done: &mut HashSet<String>,
        order: &mut Vec<String>,
    ) -> Result<(), LearningError> {
        if done.contains(name) {
            return Ok(());
        }
        if !visiting.insert(name.to_owned()) {
            return Err(LearningError::Derivation(format!(
                "derivation cycle through variable {name}"
            )));
        }
        if let Some(rule) = &self.attributes[name].rule {
            for operand in rule.operand_attributes() {
                self.visit(operand, visiting, done, order)?;
            }
        }
        visiting.remove(name);
        done.insert(name.to_owned());
        order.push(name.to_owned());
        Ok(())
    }

    /// Whether [`Class::compile`] succeeded since the last change.
    #[must_use]
    pub const fn is_compiled(&self) -> bool {
        self.compiled
    }

    /// Evaluates the loaded derived attributes of one record.
    ///
    /// `names` and `record` hold the native values, in the same order.
    pub fn evaluate(
        &self,
        names: &[String],
        record: &[Value],
    ) -> Result<IndexMap<String, Value>, LearningError> {
        if !self.compiled {
            return Err(LearningError::Derivation(format!(
                "dictionary {} is not compiled",
                self.name
            )));
        }
        let mut values: IndexMap<String, Value> = names
            .iter()
            .cloned()
            .zip(record.iter().cloned())
            .collect();
        for name in &self.evaluation_order {
            let attribute = &self.attributes[name.as_str()];
            if !attribute.loaded {
                continue;
            }
            if let Some(rule) = &attribute.rule {
                let value = rule.evaluate(&values)?;
                values.insert(name.clone(), value);
            }
        }
        Ok(values)
    }
}

impl fmt::Display for Class {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Dictionary\t{}", self.name)?;
        writeln!(f, "{{")?;
        for attribute in self.attributes() {
            if !attribute.used {
                f.write_str("Unused")?;
            }
            write!(f, "\t{}\t{}", attribute.value_type, attribute.name)?;
            if let Some(rule) = &attribute.rule {
                write!(f, "\t = {rule}")?;
            }
            f.write_str("\t;")?;
            if let Some(level) = attribute.meta_data.get_double(LEVEL_META_DATA_KEY) {
                write!(f, "\t<{LEVEL_META_DATA_KEY}={}>", format_continuous(level))?;
            }
            if !attribute.label.is_empty() {
                write!(f, "\t// {}", attribute.label)?;
            }
            writeln!(f)?;
        }
        writeln!(f, "}};")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dictionary::rule::Operand;

    fn iris() -> Class {
        let mut class = Class::new("Iris");
        class
            .insert_attribute(Attribute::new("PetalLength", ValueType::Continuous))
            .unwrap();
        class
            .insert_attribute(Attribute::new("Class", ValueType::Symbol))
            .unwrap();
        class
    }

    #[test]
    fn build_attribute_name_skips_used_names() {
        let mut class = iris();
        assert_eq!(class.build_attribute_name("PPetalLength"), "PPetalLength");
        assert_eq!(class.build_attribute_name("Class"), "Class_1");
        class
            .insert_attribute(Attribute::new("Class_1", ValueType::Symbol))
            .unwrap();
        assert_eq!(class.build_attribute_name("Class"), "Class_2");
        assert!(matches!(
            class.insert_attribute(Attribute::new("Class", ValueType::Symbol)),
            Err(LearningError::DuplicateAttribute(_))
        ));
    }

    #[test]
    fn compile_orders_and_loads_dependencies() {
        let mut class = iris();
        let mut double = Attribute::derived(
            "Double",
            DerivationRule::Sum(vec![
                Operand::Attribute("PetalLength".into()),
                Operand::Attribute("PetalLength".into()),
            ]),
        );
        double.used = false;
        class.insert_attribute(double).unwrap();
        class
            .insert_attribute(Attribute::derived(
                "Scaled",
                DerivationRule::Product(vec![
                    Operand::Attribute("Double".into()),
                    Operand::Constant(10.0),
                ]),
            ))
            .unwrap();
        class.compile().unwrap();
        assert!(class.lookup_attribute("Double").unwrap().loaded);

        let names = vec!["PetalLength".to_owned(), "Class".to_owned()];
        let values = class
            .evaluate(&names, &[Value::Continuous(1.5), Value::Symbol("setosa".into())])
            .unwrap();
        assert!((values["Scaled"].as_continuous() - 30.0).abs() < 1e-12);
    }

    #[test]
    fn compile_rejects_unknown_operand_and_cycles() {
        let mut class = iris();
        class
            .insert_attribute(Attribute::derived(
                "A",
                DerivationRule::Sum(vec![Operand::Attribute("B".into())]),
            ))
            .unwrap();
        assert!(class.compile().is_err());
        class
            .insert_attribute(Attribute::derived(
                "B",
                DerivationRule::Sum(vec![Operand::Attribute("A".into())]),
            ))
            .unwrap();
        let err = class.compile().unwrap_err();
        assert!(err.to_string().contains("cycle"));
    }

    #[test]
    fn display_prints_dictionary_lines() {
        let mut class = iris();
        let mut zero = Attribute::derived("Zero", DerivationRule::Constant(0.0));
        zero.used = false;
        zero.meta_data.set_double(LEVEL_META_DATA_KEY, 0.5);
        class.insert_attribute(zero).unwrap();
        let text = class.to_string();
        assert!(text.starts_with("Dictionary\tIris\n{\n"));
        assert!(text.contains("\tNumerical\tPetalLength\t;\n"));
        assert!(text.contains("Unused\tNumerical\tZero\t = Constant(0)\t;\t<Level=0.5>\n"));
        assert!(text.ends_with("};\n"));
    }

    #[test]
    fn unused_unneeded_attributes_are_not_loaded() {
        let mut class = iris();
        let mut constant = Attribute::derived("Zero", DerivationRule::Constant(0.0));
        constant.used = false;
        class.insert_attribute(constant).unwrap();
        class.compile().unwrap();
        assert!(!class.lookup_attribute("Zero").unwrap().loaded);
        assert!(class.lookup_attribute("Class").unwrap().loaded);
    }
}
