use std::collections::HashSet;

/// Unordered set of string keys (resource IDs in practice). The algebra
/// methods never mutate their inputs, they allocate the result.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Set {
    inner: HashSet<String>,
}

impl Set {
    pub fn new() -> Self {
        Set {
            inner: HashSet::new(),
        }
    }

    pub fn insert(&mut self, key: impl Into<String>) -> bool {
        self.inner.insert(key.into())
    }

    pub fn remove(&mut self, key: &str) -> bool {
        self.inner.remove(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.inner.contains(key)
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.inner.iter().map(String::as_str)
    }

    pub fn union(&self, other: &Set) -> Set {
        self.inner.union(&other.inner).cloned().collect()
    }

    pub fn difference(&self, other: &Set) -> Set {
        self.inner.difference(&other.inner).cloned().collect()
    }

    pub fn intersection(&self, other: &Set) -> Set {
        self.inner.intersection(&other.inner).cloned().collect()
    }

    /// Keys in ascending order, handy for logging and stable request building.
    pub fn to_sorted_vec(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.inner.iter().cloned().collect();
        keys.sort();
        keys
    }
}

impl FromIterator<String> for Set {
    fn from_iter<I: IntoIterator<Item = String>>(iter: I) -> Self {
        Set {
            inner: iter.into_iter().collect(),
        }
    }
}

impl<'a> FromIterator<&'a str> for Set {
    fn from_iter<I: IntoIterator<Item = &'a str>>(iter: I) -> Self {
        iter.into_iter().map(str::to_string).collect()
    }
}

impl Extend<String> for Set {
    fn extend<I: IntoIterator<Item = String>>(&mut self, iter: I) {
        self.inner.extend(iter)
    }
}

impl IntoIterator for Set {
    type Item = String;
    type IntoIter = std::collections::hash_set::IntoIter<String>;

    fn into_iter(self) -> Self::IntoIter {
        self.inner.into_iter()
    }
}
