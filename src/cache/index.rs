use std::{
    fs,
    path::{Path, PathBuf},
};

use ini::Ini;

use crate::{
    aws::RoleIdentity,
    constants::INDEX_SECTION_PREFIX,
    error::{Error, Result},
};

/// Ini file listing every role identity ever cached.
///
/// Each role gets a `[role.<encoded>]` section holding `name = <role>`.
/// Only used to find secrets again for a bulk clear.
#[derive(Debug, Clone)]
pub struct RoleIndex {
    path: PathBuf,
}

impl RoleIndex {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn section_name(role: &RoleIdentity) -> String {
        format!("{INDEX_SECTION_PREFIX}.{}", role.encode())
    }

    fn load(&self) -> Result<Ini> {
        if !self.path.exists() {
            return Ok(Ini::new());
        }
        Ini::load_from_file(&self.path).map_err(|e| self.error(e))
    }

    fn save(&self, ini: &Ini) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| self.error(e))?;
        }
        ini.write_to_file(&self.path).map_err(|e| self.error(e))
    }

    fn error(&self, e: impl std::fmt::Display) -> Error {
        Error::Index {
            path: self.path.clone(),
            message: e.to_string(),
        }
    }

    /// Add `role` unless already present
    pub fn register(&self, role: &RoleIdentity) -> Result<()> {
        let mut ini = self.load()?;
        let section = Self::section_name(role);
        if ini.section(Some(section.as_str())).is_some() {
            return Ok(());
        }

        ini.with_section(Some(section)).set("name", role.as_str());
        self.save(&ini)
    }

    /// All indexed roles, in file order
    pub fn roles(&self) -> Result<Vec<RoleIdentity>> {
        let ini = self.load()?;
        let prefix = format!("{INDEX_SECTION_PREFIX}.");

        Ok(ini
            .iter()
            .filter_map(|(section, props)| {
                let key = section?.strip_prefix(&prefix)?;
                Some(
                    props
                        .get("name")
                        .map_or_else(|| RoleIdentity::decode(key), RoleIdentity::new),
                )
            })
            .collect())
    }

    /// Drop the given roles from the index
    pub fn remove(&self, roles: &[RoleIdentity]) -> Result<()> {
        if roles.is_empty() {
            return Ok(());
        }
        let mut ini = self.load()?;
        for role in roles {
            ini.delete(Some(Self::section_name(role).as_str()));
        }
        self.save(&ini)
    }
}
