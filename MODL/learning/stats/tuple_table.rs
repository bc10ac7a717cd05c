use std::cmp::Ordering;

use crate::dictionary::value::MISSING_VALUE;

/// Key of a tuple table.
pub trait TupleKey: Clone {
    /// Total order; missing values sort first.
    fn compare(&self, other: &Self) -> Ordering;
    /// Whether the key is the missing sentinel.
    fn is_missing(&self) -> bool;
}

impl TupleKey for f64 {
    fn compare(&self, other: &Self) -> Ordering {
        self.total_cmp(other)
    }

    fn is_missing(&self) -> bool {
        *self == MISSING_VALUE
    }
}

impl TupleKey for String {
    fn compare(&self, other: &Self) -> Ordering {
        self.cmp(other)
    }

    fn is_missing(&self) -> bool {
        self.is_empty()
    }
}

impl<K: TupleKey> TupleKey for (K, usize) {
    fn compare(&self, other: &Self) -> Ordering {
        self.0.compare(&other.0).then(self.1.cmp(&other.1))
    }

    fn is_missing(&self) -> bool {
        self.0.is_missing()
    }
}

/// One distinct key with its frequency.
#[derive(Debug, Clone, PartialEq)]
pub struct Tuple<K> {
    /// Distinct key.
    pub key: K,
    /// Number of occurrences.
    pub frequency: usize,
}

/// Distinct keys sorted ascending with their frequencies.
#[derive(Debug, Clone)]
pub struct TupleTable<K> {
    tuples: Vec<Tuple<K>>,
    total_frequency: usize,
}

impl<K: TupleKey> TupleTable<K> {
    /// Sorts and aggregates the keys.
    #[must_use]
    pub fn from_keys(keys: impl IntoIterator<Item = K>) -> Self {
        let mut keys: Vec<K> = keys.into_iter().collect();
        keys.sort_by(K::compare);
        let total_frequency = keys.len();
        let mut tuples: Vec<Tuple<K>> = Vec::new();
        for key in keys {
            match tuples.last_mut() {
                Some(last) if last.key.compare(&key) == Ordering::Equal => last.frequency += 1,
                _ => tuples.push(Tuple { key, frequency: 1 }),
            }
        }
        Self {
            tuples,
            total_frequency,
        }
    }

    /// Number of distinct keys.
    #[must_use]
    pub fn size(&self) -> usize {
        self.tuples.len()
    }

    /// Tuple at a position.
    #[must_use]
    pub fn at(&self, index: usize) -> &Tuple<K> {
        &self.tuples[index]
    }

    /// Tuples in ascending order.
    #[must_use]
    pub fn tuples(&self) -> &[Tuple<K>] {
        &self.tuples
    }

    /// Sum of the frequencies.
    #[must_use]
    pub const fn total_frequency(&self) -> usize {
        self.total_frequency
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aggregates_and_sorts_missing_first() {
        let table = TupleTable::from_keys([3.0, MISSING_VALUE, 1.0, 2.0, 2.0, MISSING_VALUE]);
        assert_eq!(table.size(), 4);
        assert_eq!(table.total_frequency(), 6);
        assert!(table.at(0).key.is_missing());
        assert_eq!(table.at(0).frequency, 2);
        assert_eq!(table.at(2).frequency, 2);
    }

    #[test]
    fn bivariate_keys_sort_by_value_then_part() {
        let table = TupleTable::from_keys([
            ("b".to_owned(), 1),
            ("a".to_owned(), 1),
            ("a".to_owned(), 0),
            ("a".to_owned(), 1),
        ]);
        assert_eq!(table.size(), 3);
        assert_eq!(table.at(0).key, ("a".to_owned(), 0));
        assert_eq!(table.at(1).frequency, 2);
    }
}
