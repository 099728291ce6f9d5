/// Append-only ordered list stored as a single comma-joined value.
///
/// An empty stored string is an empty list, so "registered but has no
/// followers yet" and "never registered" stay distinguishable: the first is a
/// present key holding `""`, the second an absent key.
///
/// Entries must not contain `,`. Usernames are checked at registration and
/// warble ids are numeric.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdList {
    entries: Vec<String>,
}

const SEPARATOR: char = ',';

impl IdList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn decode(raw: &str) -> Self {
        if raw.is_empty() {
            return Self::new();
        }
        Self {
            entries: raw.split(SEPARATOR).map(str::to_string).collect(),
        }
    }

    pub fn encode(&self) -> String {
        self.entries.join(",")
    }

    pub fn push(&mut self, entry: impl Into<String>) {
        self.entries.push(entry.into());
    }

    /// Appends `entry` unless it is already listed. Returns whether it was added.
    pub fn push_unique(&mut self, entry: &str) -> bool {
        if self.contains(entry) {
            return false;
        }
        self.push(entry);
        true
    }

    pub fn contains(&self, entry: &str) -> bool {
        self.entries.iter().any(|existing| existing == entry)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn into_vec(self) -> Vec<String> {
        self.entries
    }
}
