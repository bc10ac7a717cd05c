use std::{
    fs,
    io::{BufRead, BufReader, BufWriter, Write},
    path::Path,
};

use thiserror::Error;

use crate::dictionary::{
    class::{Attribute, Class},
    value::{Value, ValueType},
};

/// In-memory table of the records of a class, with an instance selection.
///
/// Columns are the native attributes of the class with a simple type, in class order.
#[derive(Debug, Clone)]
pub struct Database {
    name: String,
    class_name: String,
    attribute_names: Vec<String>,
    value_types: Vec<ValueType>,
    records: Vec<Vec<Value>>,
    selection: Option<Vec<bool>>,
}

impl Database {
    /// Creates an empty database for a class.
    #[must_use]
    pub fn new(name: impl Into<String>, class: &Class) -> Self {
        let (attribute_names, value_types) = class
            .native_attributes()
            .filter(|attribute| attribute.value_type.is_simple())
            .map(|attribute| (attribute.name.clone(), attribute.value_type))
            .unzip();
        Self {
            name: name.into(),
            class_name: class.name().to_owned(),
            attribute_names,
            value_types,
            records: Vec::new(),
            selection: None,
        }
    }

    /// Creates a database from records laid out in column order.
    pub fn from_records(
        name: impl Into<String>,
        class: &Class,
        records: Vec<Vec<Value>>,
    ) -> Result<Self, DatabaseError> {
        let mut database = Self::new(name, class);
        for record in records {
            database.add_record(record)?;
        }
        Ok(database)
    }

    /// Reads a tab-separated file with a header line; empty fields are missing.
    pub fn read_tsv(path: impl AsRef<Path>, class: &Class) -> Result<Self, DatabaseError> {
        let path = path.as_ref();
        let reader = BufReader::new(fs::File::open(path)?);
        let mut lines = reader.lines();
        let header = lines.next().ok_or(DatabaseError::Empty)??;
        let fields: Vec<&str> = header.split('\t').map(str::trim).collect();

        let mut database = Self::new(database_name(path), class);
        let positions = database
            .attribute_names
            .iter()
            .map(|name| {
                fields
                    .iter()
                    .position(|field| *field == name.as_str())
                    .ok_or_else(|| DatabaseError::MissingColumn(name.clone()))
            })
            .collect::<Result<Vec<_>, _>>()?;

        for (line_index, line) in lines.enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let values: Vec<&str> = line.split('\t').collect();
            let record = positions
                .iter()
                .zip(&database.value_types)
                .map(|(position, value_type)| {
                    Value::parse(*value_type, values.get(*position).copied().unwrap_or(""))
                })
                .collect();
            if values.len() > fields.len() {
                return Err(DatabaseError::Malformed {
                    line: line_index + 2,
                    reason: format!("{} fields for {} columns", values.len(), fields.len()),
                });
            }
            database.records.push(record);
        }
        Ok(database)
    }

    /// Reads a tab-separated file and infers a class from it: columns whose present
    /// values all parse as numbers are numerical, the others categorical.
    pub fn read_tsv_inferring_class(
        path: impl AsRef<Path>,
        class_name: &str,
    ) -> Result<(Class, Self), DatabaseError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)?;
        let mut lines = content.lines().filter(|line| !line.trim().is_empty());
        let header = lines.next().ok_or(DatabaseError::Empty)?;
        let names: Vec<&str> = header.split('\t').map(str::trim).collect();
        let rows: Vec<Vec<&str>> = lines.map(|line| line.split('\t').collect()).collect();

        let mut class = Class::new(class_name);
        for (index, name) in names.iter().enumerate() {
            let numerical = rows.iter().all(|row| {
                let field = row.get(index).map_or("", |field| field.trim());
                field.is_empty() || field.parse::<f64>().is_ok()
            });
            let value_type = if numerical { ValueType::Continuous } else { ValueType::Symbol };
            class
                .insert_attribute(Attribute::new(*name, value_type))
                .map_err(|_| DatabaseError::DuplicateColumn((*name).to_owned()))?;
        }
        class
            .compile()
            .map_err(|err| DatabaseError::Malformed { line: 1, reason: err.to_string() })?;
        let database = Self::read_tsv(path, &class)?;
        Ok((class, database))
    }

    /// Appends a record in column order.
    pub fn add_record(&mut self, record: Vec<Value>) -> Result<(), DatabaseError> {
        if record.len() != self.attribute_names.len() {
            return Err(DatabaseError::Malformed {
                line: self.records.len() + 1,
                reason: format!(
                    "{} values for {} columns",
                    record.len(),
                    self.attribute_names.len()
                ),
            });
        }
        self.records.push(record);
        self.selection = None;
        Ok(())
    }

    /// Database name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Renames the database.
    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    /// Name of the class of the records.
    #[must_use]
    pub fn class_name(&self) -> &str {
        &self.class_name
    }

    /// Column names.
    #[must_use]
    pub fn attribute_names(&self) -> &[String] {
        &self.attribute_names
    }

    /// Position of a column.
    #[must_use]
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.attribute_names.iter().position(|candidate| candidate == name)
    }

    /// Number of records.
    #[must_use]
    pub fn instance_number(&self) -> usize {
        self.records.len()
    }

    /// Number of selected records.
    #[must_use]
    pub fn selected_instance_number(&self) -> usize {
        self.selection.as_ref().map_or(self.records.len(), |selection| {
            selection.iter().filter(|selected| **selected).count()
        })
    }

    /// Selects the records of one fold, or every other fold when `excluding`.
    pub fn select_instances(&mut self, fold_indexes: &[usize], fold: usize, excluding: bool) {
        debug_assert_eq!(fold_indexes.len(), self.records.len());
        self.selection = Some(
            fold_indexes
                .iter()
                .map(|index| (*index == fold) != excluding)
                .collect(),
        );
    }

    /// Selects every record.
    pub fn clear_selection(&mut self) {
        self.selection = None;
    }

    /// Whether a record is selected.
    #[must_use]
    pub fn is_selected(&self, index: usize) -> bool {
        self.selection
            .as_ref()
            .map_or(true, |selection| selection[index])
    }

    /// Every record, selected or not.
    #[must_use]
    pub fn records(&self) -> &[Vec<Value>] {
        &self.records
    }

    /// Selected records.
    pub fn selected_records(&self) -> impl Iterator<Item = &[Value]> + '_ {
        self.records
            .iter()
            .enumerate()
            .filter(|(index, _)| self.is_selected(*index))
            .map(|(_, record)| record.as_slice())
    }

    /// Writes the selected records of some columns as tab-separated text.
    pub fn write_tsv(&self, path: impl AsRef<Path>, attributes: &[String]) -> Result<(), DatabaseError> {
        let positions = attributes
            .iter()
            .map(|name| {
                self.column_index(name)
                    .ok_or_else(|| DatabaseError::MissingColumn(name.clone()))
            })
            .collect::<Result<Vec<_>, _>>()?;
        let mut writer = BufWriter::new(fs::File::create(path)?);
        writeln!(writer, "{}", attributes.join("\t"))?;
        for record in self.selected_records() {
            let fields: Vec<String> = positions.iter().map(|position| record[*position].to_field()).collect();
            writeln!(writer, "{}", fields.join("\t"))?;
        }
        writer.flush()?;
        Ok(())
    }
}

fn database_name(path: &Path) -> String {
    path.file_name()
        .map_or_else(|| path.display().to_string(), |name| name.to_string_lossy().into_owned())
}

/// Errors raised while reading or writing databases.
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// File without header line.
    #[error("database file is empty")]
    Empty,
    /// Class attribute absent from the header.
    #[error("column {0} missing from the database header")]
    MissingColumn(String),
    /// Column name repeated in the header.
    #[error("column {0} appears twice in the database header")]
    DuplicateColumn(String),
    /// Record that does not fit the header.
    #[error("line {line}: {reason}")]
    Malformed {
        /// One-based line number.
        line: usize,
        /// Description.
        reason: String,
    },
    /// I/O error (filesystem).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn class() -> Class {
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
    fn reads_columns_by_name() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("iris.txt");
        fs::write(&path, "Class\tSepal\tPetalLength\nsetosa\t5.1\t1.4\nvirginica\t6.3\t\n").unwrap();
        let database = Database::read_tsv(&path, &class()).unwrap();
        assert_eq!(database.name(), "iris.txt");
        assert_eq!(database.instance_number(), 2);
        let records: Vec<&[Value]> = database.selected_records().collect();
        assert!((records[0][0].as_continuous() - 1.4).abs() < 1e-12);
        assert!(records[1][0].is_missing());
        assert_eq!(records[1][1].as_symbol(), "virginica");
    }

    #[test]
    fn missing_column_is_an_error() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("iris.txt");
        fs::write(&path, "Class\nsetosa\n").unwrap();
        assert!(matches!(
            Database::read_tsv(&path, &class()),
            Err(DatabaseError::MissingColumn(name)) if name == "PetalLength"
        ));
    }

    #[test]
    fn fold_selection_and_export() {
        let records = (0..6)
            .map(|index| vec![Value::Continuous(f64::from(index)), Value::Symbol("a".into())])
            .collect();
        let mut database = Database::from_records("toy", &class(), records).unwrap();
        let folds = [0, 1, 2, 0, 1, 2];
        database.select_instances(&folds, 1, false);
        assert_eq!(database.selected_instance_number(), 2);
        database.select_instances(&folds, 1, true);
        assert_eq!(database.selected_instance_number(), 4);

        let tmp = tempdir().unwrap();
        let path = tmp.path().join("train.txt");
        database.write_tsv(&path, &["PetalLength".to_owned()]).unwrap();
        let content = fs::read_to_string(&path).unwrap();
        assert_eq!(content, "PetalLength\n0\n2\n3\n5\n");
        database.clear_selection();
        assert_eq!(database.selected_instance_number(), 6);
    }

    #[test]
    fn infers_types_from_values() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("toy.txt");
        fs::write(&path, "Age\tColor\n12\tred\n\tblue\n7.5\tred\n").unwrap();
        let (class, database) = Database::read_tsv_inferring_class(&path, "Toy").unwrap();
        assert_eq!(class.lookup_attribute("Age").unwrap().value_type, ValueType::Continuous);
        assert_eq!(class.lookup_attribute("Color").unwrap().value_type, ValueType::Symbol);
        assert_eq!(database.instance_number(), 3);
    }
}
