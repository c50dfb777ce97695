//! Tab schema and normalization
//!
//! The store never interprets records. The only shape it enforces is that a
//! fixed set of tabs is always present and always an array.

use serde_json::Value;

use super::Dataset;

/// Tabs every dataset must carry.
pub const REQUIRED_TABS: [&str; 6] = [
    "driversSep",
    "leads",
    "otrHires",
    "ag4Hires",
    "ag4Sep",
    "historical",
];

/// The set of tabs normalization guarantees.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TabSchema {
    required: Vec<String>,
    extra: Vec<String>,
}

impl Default for TabSchema {
    fn default() -> Self {
        Self::with_extra_tabs(Vec::<String>::new())
    }
}

impl TabSchema {
    /// Required tabs plus the given extra tabs. Blank names and names that
    /// duplicate a required tab are dropped.
    pub fn with_extra_tabs<I, S>(extra: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let required: Vec<String> = REQUIRED_TABS.iter().map(|t| t.to_string()).collect();
        let mut extra_tabs: Vec<String> = Vec::new();
        for tab in extra {
            let tab = tab.into().trim().to_string();
            if tab.is_empty() || required.contains(&tab) || extra_tabs.contains(&tab) {
                continue;
            }
            extra_tabs.push(tab);
        }
        Self {
            required,
            extra: extra_tabs,
        }
    }

    pub fn required(&self) -> &[String] {
        &self.required
    }

    pub fn extra(&self) -> &[String] {
        &self.extra
    }

    /// Required tabs followed by extra tabs.
    pub fn all_tabs(&self) -> impl Iterator<Item = &str> {
        self.required
            .iter()
            .chain(self.extra.iter())
            .map(String::as_str)
    }

    /// Fill every known tab that is missing or not an array with `[]`.
    ///
    /// Unknown keys are preserved. Applying this twice is the same as
    /// applying it once.
    pub fn normalize(&self, mut dataset: Dataset) -> Dataset {
        for tab in self.all_tabs() {
            let needs_reset = !matches!(dataset.0.get(tab), Some(Value::Array(_)));
            if needs_reset {
                dataset.0.insert(tab.to_string(), Value::Array(Vec::new()));
            }
        }
        dataset
    }

    /// An empty dataset carrying every known tab.
    pub fn empty(&self) -> Dataset {
        self.normalize(Dataset::default())
    }

    /// Whether a stored document is usable as-is: a JSON object whose
    /// required tabs are all arrays.
    pub fn is_complete(&self, value: &Value) -> bool {
        match value {
            Value::Object(map) => self
                .required
                .iter()
                .all(|tab| matches!(map.get(tab), Some(Value::Array(_)))),
            _ => false,
        }
    }
}
