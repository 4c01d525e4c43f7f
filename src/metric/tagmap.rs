//! tagmap is the canonical label set that identifies a series. Think of it as
//! a specialized map: keys are kept sorted, values are already stringified, so
//! two label sets holding the same pairs compare, hash and render identically
//! no matter the order their attributes arrived in.

use std::cmp;
use std::collections::BTreeMap;
use std::fmt;
use std::hash::Hash;
use std::slice::Iter;

/// The tagmap key, value collection. Behaves similarly to
/// `std::collections::BTreeMap` but with a specialized implementation for fast
/// searching over a small collection.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TagMap<K, V>
where
    K: Hash,
    V: Hash,
{
    inner: Vec<(K, V)>,
}

impl<K, V> TagMap<K, V>
where
    K: cmp::Ord + Hash,
    V: Hash,
{
    /// Create a `tagmap::Iter`.
    pub fn iter(&self) -> Iter<(K, V)> {
        self.inner.iter()
    }

    /// Get a value from the tagmap, if it exists.
    pub fn get(&self, key: &K) -> Option<&V> {
        match self.inner.binary_search_by(|probe| probe.0.cmp(key)) {
            Ok(idx) => Some(&self.inner[idx].1),
            Err(_) => None,
        }
    }

    /// Determine if the tagmap is empty.
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Insert a key / value into self
    ///
    /// This method will return the value previously stored under the given key,
    /// if there was such a value.
    pub fn insert(&mut self, key: K, val: V) -> Option<V> {
        match self.inner.binary_search_by(|probe| probe.0.cmp(&key)) {
            Ok(idx) => Some(::std::mem::replace(&mut self.inner[idx].1, val)),
            Err(idx) => {
                self.inner.insert(idx, (key, val));
                None
            }
        }
    }

    /// Return the length of the tagmap. This is the total number of key /
    /// values stored in the map.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Iterate the keys of the tagmap in sorted order.
    pub fn keys<'a>(&'a self) -> impl Iterator<Item = &'a K> + 'a {
        self.inner.iter().map(|&(ref k, _)| k)
    }
}

impl TagMap<String, String> {
    /// Project the tagmap onto `keys`
    ///
    /// Only the requested keys survive. Keys the tagmap does not carry are
    /// omitted rather than reported empty, and duplicate requests collapse.
    pub fn project<S>(&self, keys: &[S]) -> BTreeMap<String, String>
    where
        S: AsRef<str>,
    {
        let mut projected = BTreeMap::new();
        for key in keys {
            let key = key.as_ref();
            if let Ok(idx) = self.inner.binary_search_by(|probe| probe.0.as_str().cmp(key)) {
                let (ref k, ref v) = self.inner[idx];
                projected.insert(k.clone(), v.clone());
            }
        }
        projected
    }
}

impl<K, V> Default for TagMap<K, V>
where
    K: Hash,
    V: Hash,
{
    fn default() -> TagMap<K, V> {
        TagMap {
            inner: Vec::with_capacity(8),
        }
    }
}

/// Renders as `k=v|k=v`, keys in sorted order. This is the label half of a
/// series key.
impl<K, V> fmt::Display for TagMap<K, V>
where
    K: Hash + fmt::Display,
    V: Hash + fmt::Display,
{
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let mut first = true;
        for &(ref k, ref v) in &self.inner {
            if !first {
                f.write_str("|")?;
            }
            first = false;
            write!(f, "{}={}", k, v)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use quickcheck::{QuickCheck, TestResult};

    type Tags = TagMap<String, String>;

    #[test]
    fn insert_keeps_keys_sorted() {
        let mut tags = Tags::default();
        tags.insert("to_node".into(), "2".into());
        tags.insert("from_node".into(), "1".into());
        tags.insert("az".into(), "us-west-2a".into());

        let keys: Vec<&String> = tags.keys().collect();
        assert_eq!(keys, vec!["az", "from_node", "to_node"]);
        assert_eq!(format!("{}", tags), "az=us-west-2a|from_node=1|to_node=2");
    }

    #[test]
    fn insert_replaces_existing_value() {
        let mut tags = Tags::default();
        assert_eq!(None, tags.insert("node".into(), "1".into()));
        assert_eq!(Some("1".to_string()), tags.insert("node".into(), "7".into()));
        assert_eq!(1, tags.len());
        assert_eq!(Some(&"7".to_string()), tags.get(&"node".to_string()));
    }

    #[test]
    fn project_omits_absent_keys() {
        let mut tags = Tags::default();
        tags.insert("from_node".into(), "1".into());
        tags.insert("to_node".into(), "3".into());

        let projected = tags.project(&["from_node", "region"]);
        assert_eq!(1, projected.len());
        assert_eq!(Some(&"1".to_string()), projected.get("from_node"));
        assert!(tags.project::<&str>(&[]).is_empty());
    }

    #[test]
    fn empty_tagmap_renders_empty() {
        assert_eq!("", format!("{}", Tags::default()));
    }

    #[test]
    fn insertion_order_is_irrelevant() {
        fn inner(pairs: Vec<(String, String)>) -> TestResult {
            let mut forward = Tags::default();
            for &(ref k, ref v) in &pairs {
                forward.insert(k.clone(), v.clone());
            }
            // later inserts win, so de-duplicate the reversed input the same
            // way before replaying it
            let mut last: BTreeMap<String, String> = BTreeMap::new();
            for &(ref k, ref v) in &pairs {
                last.insert(k.clone(), v.clone());
            }
            let mut backward = Tags::default();
            for (k, v) in last.into_iter().rev() {
                backward.insert(k, v);
            }
            assert_eq!(forward, backward);
            assert_eq!(format!("{}", forward), format!("{}", backward));
            TestResult::passed()
        }
        QuickCheck::new()
            .tests(500)
            .quickcheck(inner as fn(Vec<(String, String)>) -> TestResult);
    }
}
