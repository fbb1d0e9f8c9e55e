use std::collections::HashMap;
use std::path::Path;

use crate::error::{Error, Result};

/// key/value settings loaded from `.env` files and passed along to
/// attribute parsing and scripts. later inserts win.
#[derive(Debug, Default, Clone)]
pub struct Variables {
    values: HashMap<String, String>,
}

impl Variables {
    pub fn new() -> Self {
        Self::default()
    }

    /// read a `.env` file from disk and merge it in.
    pub fn load_dot_env<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| {
            Error::Parse(format!("Failed to load .env file {}: {}", path.display(), e))
        })?;
        self.merge_dot_env(&contents)?;
        tracing::debug!(path = %path.display(), count = self.values.len(), "loaded .env");
        Ok(())
    }

    pub fn merge_dot_env(&mut self, contents: &str) -> Result<()> {
        for (line_no, line) in contents.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let line = line.strip_prefix("export ").unwrap_or(line);
            let (key, val) = line.split_once('=').ok_or_else(|| {
                Error::Parse(format!("line {}: expected KEY=value, found {:?}", line_no + 1, line))
            })?;
            let key = key.trim();
            if key.is_empty() {
                return Err(Error::Parse(format!("line {}: missing key before '='", line_no + 1)));
            }
            self.set(key, unquote(val.trim()));
        }
        Ok(())
    }

    pub fn set(&mut self, key: &str, val: &str) {
        self.values.insert(key.into(), val.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn get_or<'a>(&'a self, key: &str, default: &'a str) -> &'a str {
        self.get(key).unwrap_or(default)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &String)> {
        self.values.iter()
    }
}

fn unquote(val: &str) -> &str {
    for q in ['"', '\''] {
        if val.len() >= 2 && val.starts_with(q) && val.ends_with(q) {
            return &val[1..val.len() - 1];
        }
    }
    val
}
