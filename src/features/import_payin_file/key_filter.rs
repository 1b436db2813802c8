use crate::shared::constants::extension_of;

/// Accepts object keys that live under a target folder and carry an
/// importable extension
#[derive(Debug, Clone)]
pub struct KeyFilter {
    /// Folder prefixes, each normalised to end with `/`
    folders: Vec<String>,
    extensions: Vec<String>,
}

impl KeyFilter {
    pub fn new<F, E>(folders: F, extensions: E) -> Self
    where
        F: IntoIterator,
        F::Item: AsRef<str>,
        E: IntoIterator,
        E::Item: AsRef<str>,
    {
        let folders = folders
            .into_iter()
            .map(|f| f.as_ref().trim_matches('/').to_string())
            .filter(|f| !f.is_empty())
            .map(|f| format!("{}/", f))
            .collect();

        let extensions = extensions
            .into_iter()
            .map(|e| e.as_ref().trim_start_matches('.').to_ascii_lowercase())
            .collect();

        Self {
            folders,
            extensions,
        }
    }

    pub fn matches(&self, key: &str) -> bool {
        let in_folder = self.folders.iter().any(|folder| key.starts_with(folder.as_str()));
        if !in_folder {
            return false;
        }

        extension_of(key)
            .map(|ext| self.extensions.iter().any(|accepted| *accepted == ext))
            .unwrap_or(false)
    }

    pub fn folders(&self) -> &[String] {
        &self.folders
    }
}
