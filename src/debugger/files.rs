use std::collections::BTreeMap;
use std::sync::Arc;

/// Source units the controller has open, keyed by filename.
#[derive(Debug, Clone, Default)]
pub struct SourceFiles {
    files: BTreeMap<String, Arc<str>>,
}

impl SourceFiles {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn open(&mut self, name: impl Into<String>, text: impl AsRef<str>) {
        self.files.insert(name.into(), Arc::from(text.as_ref()));
    }

    pub fn close(&mut self, name: &str) -> bool {
        self.files.remove(name).is_some()
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.files.get(name).map(|s| s.as_ref())
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.files.keys().map(String::as_str)
    }

    /// Materialize the current set as a read-only namespace for one run.
    pub fn sync(&self) -> FileNamespace {
        FileNamespace {
            files: Arc::new(self.files.clone()),
        }
    }
}

/// Read-only file namespace seen by a run. Filenames here match the
/// `filename` of the units compiled from them.
#[derive(Debug, Clone, Default)]
pub struct FileNamespace {
    files: Arc<BTreeMap<String, Arc<str>>>,
}

impl FileNamespace {
    pub fn contains(&self, name: &str) -> bool {
        self.files.contains_key(name)
    }

    pub fn read(&self, name: &str) -> Option<&str> {
        self.files.get(name).map(|s| s.as_ref())
    }

    /// Text of 1-based `line`, without its line terminator.
    pub fn line(&self, name: &str, line: u32) -> Option<&str> {
        let index = (line as usize).checked_sub(1)?;
        self.read(name)?.lines().nth(index)
    }

    pub fn line_count(&self, name: &str) -> Option<u32> {
        self.read(name).map(|s| s.lines().count() as u32)
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}
