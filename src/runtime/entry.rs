use std::collections::HashMap;
use std::rc::Rc;

use super::value::Value;

/// One bibliographic record. Field names and the entry type are
/// case-insensitive and stored lowercased; the key keeps its spelling.
///
/// Fields are never changed by a style. Only the entry variables declared by
/// `ENTRY` (and the implicit `sort.key$`) are written while executing.
#[derive(Debug, Clone, PartialEq)]
pub struct Entry {
    key: Rc<str>,
    entry_type: Rc<str>,
    fields: HashMap<String, Rc<str>>,
    pub(crate) vars: HashMap<Rc<str>, Value>,
}

impl Entry {
    pub fn new(key: &str, entry_type: &str) -> Self {
        Self{
            key: Rc::from(key),
            entry_type: Rc::from(entry_type.to_lowercase()),
            fields: HashMap::new(),
            vars: HashMap::new(),
        }
    }

    pub fn with_field(mut self, name: &str, value: &str) -> Self {
        self.set_field(name, value);
        self
    }

    pub fn set_field(&mut self, name: &str, value: &str) {
        self.fields.insert(name.to_lowercase(), Rc::from(value));
    }

    pub fn key(&self) -> &Rc<str> {
        &self.key
    }

    pub fn entry_type(&self) -> &Rc<str> {
        &self.entry_type
    }

    pub fn field(&self, name: &str) -> Option<&Rc<str>> {
        match self.fields.get(name) {
            Some(v) => Some(v),
            None => self.fields.get(&name.to_lowercase()),
        }
    }

    pub fn crossref(&self) -> Option<&Rc<str>> {
        self.field("crossref")
    }

    /// Field names in sorted order
    pub fn field_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.fields.keys().map(|v| v.as_str()).collect();
        names.sort_unstable();
        names
    }

    pub fn var(&self, name: &str) -> Option<&Value> {
        self.vars.get(name)
    }
}

/// Copies fields that an entry lacks from the entry named by its `crossref`
/// field. Keys are matched case-insensitively. Only one level of
/// cross-referencing is followed, unknown targets are left alone.
pub fn resolve_crossrefs(entries: &mut [Entry]) {
    let by_key: HashMap<String, usize> = entries.iter()
        .enumerate()
        .map(|(idx, entry)| (entry.key.to_lowercase(), idx))
        .collect();

    let mut inherited = Vec::new();
    for (idx, entry) in entries.iter().enumerate() {
        let parent_idx = match entry.crossref().and_then(|v| by_key.get(&v.to_lowercase())) {
            Some(parent_idx) if *parent_idx != idx => *parent_idx,
            _ => continue,
        };
        let parent = &entries[parent_idx];
        for (name, value) in parent.fields.iter() {
            if name != "crossref" && !entry.fields.contains_key(name) {
                inherited.push((idx, name.clone(), value.clone()));
            }
        }
    }

    for (idx, name, value) in inherited {
        entries[idx].fields.insert(name, value);
    }
}
